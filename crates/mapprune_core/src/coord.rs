use std::fmt;

use crate::error::CoreError;

/// A global map coordinate, as used in `maps/.../<x>.<y>.<z>.map` paths and
/// in keep lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord3 {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Coord3 {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Basename of the fine-grained map entry for this coordinate.
    pub fn map_basename(&self) -> String {
        format!("{}.{}.{}.map", self.x, self.y, self.z)
    }
}

impl fmt::Display for Coord3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.x, self.y, self.z)
    }
}

/// Identifier of one overmap entry (`o.<omx>.<omy>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OvermapId {
    pub omx: i64,
    pub omy: i64,
}

impl OvermapId {
    pub fn new(omx: i64, omy: i64) -> Self {
        Self { omx, omy }
    }

    pub fn path(&self) -> String {
        format!("o.{}.{}", self.omx, self.omy)
    }
}

/// Result of mapping a global (x, y) onto its owning overmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvermapLocal {
    pub id: OvermapId,
    pub local_x: i64,
    pub local_y: i64,
}

/// Map a global coordinate onto the overmap that owns it, using `span` as the
/// overmap side length. Floor division, so negative coordinates land in the
/// correct negative overmap and locals are always in `0..span`.
///
/// Example with span 180: (119, 183) -> o.0.1, local (119, 3).
pub fn map_to_overmap(x: i64, y: i64, span: i64) -> OvermapLocal {
    let omx = x.div_euclid(span);
    let omy = y.div_euclid(span);
    OvermapLocal {
        id: OvermapId::new(omx, omy),
        local_x: x - omx * span,
        local_y: y - omy * span,
    }
}

/// Inverse of the local mapping: overmap-local (lx, ly) back to global.
pub fn local_to_global(id: OvermapId, lx: i64, ly: i64, lz: i64, span: i64) -> Coord3 {
    Coord3::new(id.omx * span + lx, id.omy * span + ly, lz)
}

fn parse_i64(s: &str) -> Option<i64> {
    // Reject forms i64::from_str would accept but coordinate names never
    // contain, such as a leading '+'.
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_dotted(s: &str, n: usize) -> Option<Vec<i64>> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != n {
        return None;
    }
    parts.iter().copied().map(parse_i64).collect()
}

/// Parse a `"<x>.<y>.<z>"` keep token; surrounding whitespace is allowed.
pub fn parse_coord_token(token: &str) -> Result<Coord3, CoreError> {
    let trimmed = token.trim();
    parse_dotted(trimmed, 3)
        .map(|v| Coord3::new(v[0], v[1], v[2]))
        .ok_or_else(|| {
            CoreError::config(format!(
                "invalid coordinate {trimmed:?} (expected e.g. 119.183.10)"
            ))
        })
}

/// Split keep-list text into raw coordinate tokens. Accepts comma-separated
/// tokens, one or more per line; blank lines and `#` comment lines are
/// skipped.
pub fn split_keep_text(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for part in line.split(',') {
            let part = part.trim();
            if !part.is_empty() {
                out.push(part.to_string());
            }
        }
    }
    out
}

/// Parse a batch of keep tokens. An empty batch is a configuration error.
pub fn parse_keep_items<I, S>(items: I) -> Result<Vec<Coord3>, CoreError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut coords = Vec::new();
    for item in items {
        let item = item.as_ref().trim();
        if item.is_empty() {
            continue;
        }
        coords.push(parse_coord_token(item)?);
    }
    if coords.is_empty() {
        return Err(CoreError::config("keep list is empty"));
    }
    Ok(coords)
}

/// Parse the `<x>.<y>.<z>.map` basename of a fine-grained map entry.
/// Returns `None` for basenames that do not follow the naming pattern.
pub fn parse_map_basename(basename: &str) -> Option<Coord3> {
    let stem = basename.strip_suffix(".map")?;
    parse_dotted(stem, 3).map(|v| Coord3::new(v[0], v[1], v[2]))
}

/// Parse an `o.<omx>.<omy>` overmap path.
pub fn parse_overmap_path(path: &str) -> Option<OvermapId> {
    let rest = path.strip_prefix("o.")?;
    parse_dotted(rest, 2).map(|v| OvermapId::new(v[0], v[1]))
}
