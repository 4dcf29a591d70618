use std::collections::BTreeSet;
use std::path::Path;

use serde_json::Value;

use crate::blob::{BlobCompression, decode_overmap_blob};
use crate::coord::{Coord3, OvermapId, local_to_global};
use crate::error::CoreError;
use crate::store::MapDb;

/// Undirected relationship between two kept coordinates, canonicalized with
/// the smaller endpoint first so edge sets compare deterministically.
pub type Edge = (Coord3, Coord3);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSets {
    pub electric: BTreeSet<Edge>,
    pub fluid: BTreeSet<Edge>,
}

#[derive(Debug, Clone)]
pub struct EdgeDiff {
    pub original: usize,
    pub target: usize,
    pub missing: BTreeSet<Edge>,
}

/// Verdict of an original-vs-target edge comparison. Missing edges are
/// report data, not errors.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub electric: EdgeDiff,
    pub fluid: EdgeDiff,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.electric.missing.is_empty() && self.fluid.missing.is_empty()
    }
}

fn as_int_triple(value: &Value) -> Option<(i64, i64, i64)> {
    let items = value.as_array()?;
    if items.len() != 3 {
        return None;
    }
    Some((
        items[0].as_i64()?,
        items[1].as_i64()?,
        items[2].as_i64()?,
    ))
}

/// Collect edges from one connection list. Entries look like
/// `[[lx, ly, lz], [dx, dy, dz], ...]`: an anchor in overmap-local
/// coordinates followed by offsets to its neighbors. Malformed entries are
/// skipped, never errors.
fn consume_connections(
    connections: &Value,
    id: OvermapId,
    span: i64,
    keep_coords: &BTreeSet<Coord3>,
    out: &mut BTreeSet<Edge>,
) {
    let Some(entries) = connections.as_array() else {
        return;
    };
    for entry in entries {
        let Some(entry) = entry.as_array() else {
            continue;
        };
        if entry.len() < 2 {
            continue;
        }
        let Some((lx, ly, lz)) = as_int_triple(&entry[0]) else {
            continue;
        };
        let anchor = local_to_global(id, lx, ly, lz, span);
        if !keep_coords.contains(&anchor) {
            continue;
        }
        for delta in &entry[1..] {
            let Some((dx, dy, dz)) = as_int_triple(delta) else {
                continue;
            };
            let neighbor = Coord3::new(anchor.x + dx, anchor.y + dy, anchor.z + dz);
            if !keep_coords.contains(&neighbor) {
                continue;
            }
            let edge = if anchor <= neighbor {
                (anchor, neighbor)
            } else {
                (neighbor, anchor)
            };
            out.insert(edge);
        }
    }
}

fn edges_in_document(
    doc: &Value,
    id: OvermapId,
    span: i64,
    keep_coords: &BTreeSet<Coord3>,
    out: &mut EdgeSets,
) {
    let empty = Value::Array(Vec::new());
    let electric = doc.get("electric_grid_connections").unwrap_or(&empty);
    let fluid = doc.get("fluid_grid_connections").unwrap_or(&empty);
    consume_connections(electric, id, span, keep_coords, &mut out.electric);
    consume_connections(fluid, id, span, keep_coords, &mut out.fluid);
}

/// Reconstruct the edges touching only kept coordinates from every kept
/// overmap present in the store.
pub fn extract_edges(
    db: &MapDb,
    keep_coords: &BTreeSet<Coord3>,
    keep_overmaps: &BTreeSet<OvermapId>,
    span: i64,
) -> Result<EdgeSets, CoreError> {
    let mut out = EdgeSets::default();
    for id in keep_overmaps {
        let Some(record) = db.fetch_record(&id.path())? else {
            continue;
        };
        let compression = BlobCompression::from_tag(record.compression.as_deref())?;
        let (_version_line, doc) = decode_overmap_blob(compression, &record.data)?;
        edges_in_document(&doc, *id, span, keep_coords, &mut out);
    }
    Ok(out)
}

/// Compare kept-coordinate edges between an original and a pruned database.
/// Both are opened read-only and never mutated.
pub fn verify(
    original_db: impl AsRef<Path>,
    target_db: impl AsRef<Path>,
    keep_coords: &BTreeSet<Coord3>,
    keep_overmaps: &BTreeSet<OvermapId>,
    span: i64,
) -> Result<VerifyReport, CoreError> {
    let original = MapDb::open_read_only(original_db)?;
    let target = MapDb::open_read_only(target_db)?;

    let original_edges = extract_edges(&original, keep_coords, keep_overmaps, span)?;
    let target_edges = extract_edges(&target, keep_coords, keep_overmaps, span)?;

    Ok(VerifyReport {
        electric: diff_edges(&original_edges.electric, &target_edges.electric),
        fluid: diff_edges(&original_edges.fluid, &target_edges.fluid),
    })
}

fn diff_edges(original: &BTreeSet<Edge>, target: &BTreeSet<Edge>) -> EdgeDiff {
    EdgeDiff {
        original: original.len(),
        target: target.len(),
        missing: original.difference(target).copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn keep(coords: &[(i64, i64, i64)]) -> BTreeSet<Coord3> {
        coords.iter().map(|&(x, y, z)| Coord3::new(x, y, z)).collect()
    }

    #[test]
    fn extracts_canonicalized_edges_between_kept_coords() {
        let doc = json!({
            "electric_grid_connections": [
                [[119, 3, 10], [0, 0, -1]],
                [[119, 2, 10], [1, 0, 0]],
            ],
            "fluid_grid_connections": [],
        });
        let keep = keep(&[(119, 183, 10), (119, 183, 9)]);
        let mut out = EdgeSets::default();
        edges_in_document(&doc, OvermapId::new(0, 1), 180, &keep, &mut out);

        let expected: BTreeSet<Edge> =
            [(Coord3::new(119, 183, 9), Coord3::new(119, 183, 10))].into();
        assert_eq!(out.electric, expected);
        assert!(out.fluid.is_empty());
    }

    #[test]
    fn edge_pairs_are_order_independent() {
        // Same connection recorded from both endpoints collapses to one edge.
        let doc = json!({
            "electric_grid_connections": [
                [[119, 3, 10], [0, 0, -1]],
                [[119, 3, 9], [0, 0, 1]],
            ],
        });
        let keep = keep(&[(119, 183, 10), (119, 183, 9)]);
        let mut out = EdgeSets::default();
        edges_in_document(&doc, OvermapId::new(0, 1), 180, &keep, &mut out);
        assert_eq!(out.electric.len(), 1);
    }

    #[test]
    fn skips_malformed_entries_silently() {
        let doc = json!({
            "electric_grid_connections": [
                "not-a-list",
                [[1, 2]],
                [[1, 2, 3]],
                [[0, 0, 0], [0, 1]],
                [[0, 0, 0], ["a", "b", "c"]],
                [[0.5, 0, 0], [0, 1, 0]],
                [[0, 0, 0], [1, 0, 0]],
            ],
        });
        let keep = keep(&[(0, 0, 0), (1, 0, 0)]);
        let mut out = EdgeSets::default();
        edges_in_document(&doc, OvermapId::new(0, 0), 180, &keep, &mut out);
        assert_eq!(out.electric.len(), 1);
    }

    #[test]
    fn drops_edges_reaching_outside_keep_set() {
        let doc = json!({
            "fluid_grid_connections": [
                [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
            ],
        });
        let keep = keep(&[(0, 0, 0), (1, 0, 0)]);
        let mut out = EdgeSets::default();
        edges_in_document(&doc, OvermapId::new(0, 0), 180, &keep, &mut out);
        assert_eq!(out.fluid.len(), 1);
    }
}
