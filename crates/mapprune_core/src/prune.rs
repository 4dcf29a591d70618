use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::plan::PrunePlan;
use crate::snapshot::{GridSnapshot, restore_grids, snapshot_grids};
use crate::store::{self, MapDb};

/// Execution knobs for a prune run. Everything the original script kept in
/// ambient flags arrives here explicitly.
#[derive(Debug, Clone, Copy)]
pub struct PruneOptions {
    /// Wipe the grid fields of kept overmaps instead of restoring them.
    pub wipe_grids: bool,
    /// Run VACUUM after the commit. Idempotent, safe to skip.
    pub vacuum: bool,
}

impl Default for PruneOptions {
    fn default() -> Self {
        Self {
            wipe_grids: false,
            vacuum: true,
        }
    }
}

/// Outcome of an executed prune.
#[derive(Debug, Clone)]
pub struct PruneReport {
    pub deleted_map_entries: usize,
    pub deleted_overmap_entries: usize,
    pub restored_overmaps: usize,
    pub wiped_overmaps: usize,
    /// Keep-overmaps that were absent from the store at snapshot time.
    /// Usually a sign the span is wrong for this save.
    pub missing_overmaps: Vec<String>,
    pub remaining_map_entries: u64,
    pub remaining_overmap_entries: u64,
    pub remaining_total_entries: u64,
}

/// Keep-overmaps the plan expects but the store does not hold. Exposed so a
/// frontend can warn before asking for confirmation.
pub fn missing_keep_overmaps(db: &MapDb, plan: &PrunePlan) -> Result<Vec<String>, CoreError> {
    let mut missing = Vec::new();
    for path in plan.keep_overmap_paths() {
        if db.fetch_record(&path)?.is_none() {
            missing.push(path);
        }
    }
    Ok(missing)
}

/// Run the full snapshot / delete / restore sequence as one transaction.
///
/// Order inside the transaction:
/// 1. snapshot the grid fields of every kept overmap that exists;
/// 2. delete the planned map entries, then the planned overmap entries, in
///    bounded chunks;
/// 3. write the grid fields of every kept overmap back (restore or wipe).
///
/// Any error rolls the whole transaction back, leaving the store exactly as
/// it was. VACUUM, when enabled, runs only after a successful commit.
pub fn execute_prune(
    db: &mut MapDb,
    plan: &PrunePlan,
    options: &PruneOptions,
) -> Result<PruneReport, CoreError> {
    let keep_overmap_paths = plan.keep_overmap_paths();

    let deleted_map_entries;
    let deleted_overmap_entries;
    let mut restored_overmaps = 0;
    let mut wiped_overmaps = 0;
    let mut missing_overmaps = Vec::new();

    {
        let tx = db.transaction()?;

        let mut snapshots: BTreeMap<String, GridSnapshot> = BTreeMap::new();
        for path in &keep_overmap_paths {
            if options.wipe_grids {
                // No snapshot needed, but still probe so the report can warn
                // about keep-overmaps the store never had.
                if store::fetch_record(&tx, path)?.is_none() {
                    missing_overmaps.push(path.clone());
                }
            } else {
                match snapshot_grids(&tx, path)? {
                    Some(snapshot) => {
                        snapshots.insert(path.clone(), snapshot);
                    }
                    None => missing_overmaps.push(path.clone()),
                }
            }
        }

        deleted_map_entries = store::delete_paths(&tx, &plan.delete_map_paths)?;
        deleted_overmap_entries = store::delete_paths(&tx, &plan.delete_overmap_paths)?;

        for path in &keep_overmap_paths {
            if missing_overmaps.contains(path) {
                // Absent at snapshot time. If something recreated it since,
                // it holds no grids worth keeping; wipe with empty defaults.
                // Still absent means there is nothing to patch.
                if store::fetch_record(&tx, path)?.is_some() {
                    restore_grids(&tx, path, None, true)?;
                    wiped_overmaps += 1;
                }
                continue;
            }
            restore_grids(&tx, path, snapshots.get(path), options.wipe_grids)?;
            if options.wipe_grids {
                wiped_overmaps += 1;
            } else {
                restored_overmaps += 1;
            }
        }

        tx.commit()?;
    }

    if options.vacuum {
        db.vacuum()?;
    }

    Ok(PruneReport {
        deleted_map_entries,
        deleted_overmap_entries,
        restored_overmaps,
        wiped_overmaps,
        missing_overmaps,
        remaining_map_entries: db.count_map_entries()?,
        remaining_overmap_entries: db.count_overmap_entries()?,
        remaining_total_entries: db.count_all_entries()?,
    })
}
