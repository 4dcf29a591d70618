pub mod blob;
pub mod coord;
mod error;
pub mod plan;
pub mod prune;
pub mod snapshot;
pub mod store;
pub mod verify;

pub use blob::{BlobCompression, decode_overmap_blob, encode_overmap_blob};
pub use coord::{
    Coord3, OvermapId, OvermapLocal, map_to_overmap, parse_coord_token, parse_keep_items,
    split_keep_text,
};
pub use error::{CoreError, CoreErrorCode};
pub use plan::PrunePlan;
pub use prune::{PruneOptions, PruneReport, execute_prune, missing_keep_overmaps};
pub use snapshot::{GRID_FIELDS, GridSnapshot, restore_grids, snapshot_grids};
pub use store::{MapDb, RawRecord};
pub use verify::{Edge, EdgeSets, VerifyReport, extract_edges, verify};
