use std::collections::BTreeSet;

use crate::coord::{Coord3, OvermapId, OvermapLocal, map_to_overmap, parse_map_basename, parse_overmap_path};
use crate::error::CoreError;

/// Full keep/delete classification of a database, computed up front and free
/// of side effects. The dry-run report and the executor both consume the
/// same plan, so they cannot disagree.
#[derive(Debug, Clone)]
pub struct PrunePlan {
    pub span: i64,
    pub keep_coords: BTreeSet<Coord3>,
    pub keep_basenames: BTreeSet<String>,
    pub keep_overmaps: BTreeSet<OvermapId>,
    /// Per keep-coordinate overmap mapping, for reporting.
    pub mappings: Vec<(Coord3, OvermapLocal)>,
    pub kept_map_paths: Vec<String>,
    pub delete_map_paths: Vec<String>,
    /// Paths under `maps/` that do not follow the `<x>.<y>.<z>.map` naming
    /// pattern; left alone entirely.
    pub ignored_map_paths: Vec<String>,
    pub kept_overmap_paths: Vec<String>,
    pub delete_overmap_paths: Vec<String>,
    pub ignored_overmap_paths: Vec<String>,
}

impl PrunePlan {
    pub fn build(
        keep_coords: &[Coord3],
        span: i64,
        map_paths: &[String],
        overmap_paths: &[String],
    ) -> Result<Self, CoreError> {
        if span <= 0 {
            return Err(CoreError::config(format!(
                "span must be a positive integer, got {span}"
            )));
        }
        if keep_coords.is_empty() {
            return Err(CoreError::config("keep list is empty"));
        }

        let keep_coords: BTreeSet<Coord3> = keep_coords.iter().copied().collect();
        let keep_basenames: BTreeSet<String> =
            keep_coords.iter().map(Coord3::map_basename).collect();

        let mut keep_overmaps = BTreeSet::new();
        let mut mappings = Vec::with_capacity(keep_coords.len());
        for &coord in &keep_coords {
            let mapped = map_to_overmap(coord.x, coord.y, span);
            keep_overmaps.insert(mapped.id);
            mappings.push((coord, mapped));
        }

        let mut kept_map_paths = Vec::new();
        let mut delete_map_paths = Vec::new();
        let mut ignored_map_paths = Vec::new();
        for path in map_paths {
            let basename = path.rsplit('/').next().unwrap_or(path);
            if keep_basenames.contains(basename) {
                kept_map_paths.push(path.clone());
            } else if parse_map_basename(basename).is_some() {
                delete_map_paths.push(path.clone());
            } else {
                ignored_map_paths.push(path.clone());
            }
        }

        let mut kept_overmap_paths = Vec::new();
        let mut delete_overmap_paths = Vec::new();
        let mut ignored_overmap_paths = Vec::new();
        for path in overmap_paths {
            match parse_overmap_path(path) {
                Some(id) if keep_overmaps.contains(&id) => kept_overmap_paths.push(path.clone()),
                Some(_) => delete_overmap_paths.push(path.clone()),
                None => ignored_overmap_paths.push(path.clone()),
            }
        }

        Ok(Self {
            span,
            keep_coords,
            keep_basenames,
            keep_overmaps,
            mappings,
            kept_map_paths,
            delete_map_paths,
            ignored_map_paths,
            kept_overmap_paths,
            delete_overmap_paths,
            ignored_overmap_paths,
        })
    }

    /// Paths of every keep-overmap, whether or not it exists in the store.
    pub fn keep_overmap_paths(&self) -> Vec<String> {
        self.keep_overmaps.iter().map(OvermapId::path).collect()
    }
}
