use rusqlite::Connection;
use serde_json::Value;

use crate::blob::{BlobCompression, decode_overmap_blob, encode_overmap_blob};
use crate::error::{CoreError, CoreErrorCode};
use crate::store;

/// The overmap JSON fields that carry grid relationship data. These must
/// survive a prune verbatim (or be deliberately wiped).
pub const GRID_FIELDS: [&str; 3] = [
    "electric_grid_connections",
    "fluid_grid_connections",
    "fluid_grid_storage",
];

/// Deep copies of the three grid fields of one overmap, taken before any
/// deletion so later mutation of the live document cannot alias them.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    fields: [Value; 3],
}

impl GridSnapshot {
    pub fn field(&self, index: usize) -> &Value {
        &self.fields[index]
    }
}

/// Capture the grid fields of `overmap_path`. Returns `Ok(None)` when the
/// overmap is absent from the store; the caller should warn, since a missing
/// keep-overmap usually means the span is wrong.
pub fn snapshot_grids(
    conn: &Connection,
    overmap_path: &str,
) -> Result<Option<GridSnapshot>, CoreError> {
    let Some(record) = store::fetch_record(conn, overmap_path)? else {
        return Ok(None);
    };
    let compression = BlobCompression::from_tag(record.compression.as_deref())?;
    let (_version_line, doc) = decode_overmap_blob(compression, &record.data)?;

    let fields = GRID_FIELDS.map(|key| {
        doc.get(key)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    });
    Ok(Some(GridSnapshot { fields }))
}

/// Write the grid fields of `overmap_path` back: either restore them from
/// `snapshot` or, when `wipe` is set or no snapshot was captured, set all
/// three to empty arrays. Every other field of the document is untouched.
///
/// A missing overmap here is fatal: the record was classified as kept, so if
/// it vanished between snapshot and restore the delete phase removed it.
pub fn restore_grids(
    conn: &Connection,
    overmap_path: &str,
    snapshot: Option<&GridSnapshot>,
    wipe: bool,
) -> Result<(), CoreError> {
    let Some(record) = store::fetch_record(conn, overmap_path)? else {
        return Err(CoreError::new(
            CoreErrorCode::Consistency,
            format!("overmap not found after prune: {overmap_path}"),
        ));
    };
    let compression = BlobCompression::from_tag(record.compression.as_deref())?;
    let (version_line, mut doc) = decode_overmap_blob(compression, &record.data)?;

    let Some(obj) = doc.as_object_mut() else {
        return Err(CoreError::format(format!(
            "overmap {overmap_path} payload is not a JSON object"
        )));
    };
    for (index, key) in GRID_FIELDS.iter().enumerate() {
        let value = match (wipe, snapshot) {
            (false, Some(snapshot)) => snapshot.field(index).clone(),
            _ => Value::Array(Vec::new()),
        };
        obj.insert((*key).to_string(), value);
    }

    let blob = encode_overmap_blob(compression, &version_line, &doc)?;
    store::update_record_data(conn, overmap_path, &blob)
}
