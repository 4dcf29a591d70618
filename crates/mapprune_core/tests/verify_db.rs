use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::write::ZlibEncoder;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use mapprune_core::{
    Coord3, MapDb, OvermapId, PruneOptions, PrunePlan, execute_prune, extract_edges, verify,
};

fn temp_db_path(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{}_{}.sqlite3", std::process::id(), nanos))
}

fn create_files_db(path: &Path) -> Connection {
    let conn = Connection::open(path).expect("failed to create fixture db");
    conn.execute_batch(
        "CREATE TABLE files (
            path TEXT PRIMARY KEY,
            compression TEXT,
            data BLOB NOT NULL
        )",
    )
    .expect("failed to create files table");
    conn
}

fn insert_overmap(conn: &Connection, path: &str, doc: &Value) {
    let text = format!("# version 33\n{}", serde_json::to_string(doc).unwrap());
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    let blob = encoder.finish().unwrap();
    conn.execute(
        "INSERT INTO files (path, compression, data) VALUES (?1, 'zlib', ?2)",
        params![path, blob],
    )
    .unwrap();
}

fn insert_map(conn: &Connection, path: &str) {
    conn.execute(
        "INSERT INTO files (path, compression, data) VALUES (?1, NULL, x'00')",
        params![path],
    )
    .unwrap();
}

/// Two kept coordinates wired together electrically and to fluid storage,
/// plus an electric run off to a coordinate that will not be kept.
fn build_wired_db(path: &Path) {
    let conn = create_files_db(path);
    insert_map(&conn, "maps/5.9.0/119.183.10.map");
    insert_map(&conn, "maps/5.9.0/119.183.9.map");
    insert_map(&conn, "maps/5.9.0/120.183.10.map");
    insert_overmap(
        &conn,
        "o.0.1",
        &json!({
            "electric_grid_connections": [
                [[119, 3, 10], [0, 0, -1], [1, 0, 0]],
            ],
            "fluid_grid_connections": [
                [[119, 3, 9], [0, 0, 1]],
            ],
            "fluid_grid_storage": [[[119, 3, 10], 800]],
        }),
    );
    insert_overmap(&conn, "o.3.3", &json!({"electric_grid_connections": []}));
}

fn keep_sets(coords: &[Coord3], span: i64) -> (BTreeSet<Coord3>, BTreeSet<OvermapId>) {
    let keep: BTreeSet<Coord3> = coords.iter().copied().collect();
    let overmaps = keep
        .iter()
        .map(|c| mapprune_core::map_to_overmap(c.x, c.y, span).id)
        .collect();
    (keep, overmaps)
}

#[test]
fn edges_survive_a_default_prune() {
    let original = temp_db_path("mapprune_verify_orig");
    let target = temp_db_path("mapprune_verify_target");
    build_wired_db(&original);
    std::fs::copy(&original, &target).unwrap();

    let keep = [Coord3::new(119, 183, 10), Coord3::new(119, 183, 9)];
    let mut db = MapDb::open(&target).unwrap();
    let plan = PrunePlan::build(
        &keep,
        180,
        &db.map_paths().unwrap(),
        &db.overmap_paths().unwrap(),
    )
    .unwrap();
    execute_prune(&mut db, &plan, &PruneOptions::default()).unwrap();

    let (keep_set, keep_overmaps) = keep_sets(&keep, 180);
    let report = verify(&original, &target, &keep_set, &keep_overmaps, 180).unwrap();
    assert!(report.passed());
    // Both link fields carried exactly one kept-kept edge; the run to the
    // unkept 120.183.10 never counts.
    assert_eq!(report.electric.original, 1);
    assert_eq!(report.electric.target, 1);
    assert_eq!(report.fluid.original, 1);

    std::fs::remove_file(&original).ok();
    std::fs::remove_file(&target).ok();
}

#[test]
fn verification_reports_lost_edges() {
    let original = temp_db_path("mapprune_verify_lost_orig");
    let target = temp_db_path("mapprune_verify_lost_target");
    build_wired_db(&original);

    // Target has the same overmap but with its electric links wiped.
    let conn = create_files_db(&target);
    insert_overmap(
        &conn,
        "o.0.1",
        &json!({
            "electric_grid_connections": [],
            "fluid_grid_connections": [
                [[119, 3, 9], [0, 0, 1]],
            ],
            "fluid_grid_storage": [],
        }),
    );
    drop(conn);

    let keep = [Coord3::new(119, 183, 10), Coord3::new(119, 183, 9)];
    let (keep_set, keep_overmaps) = keep_sets(&keep, 180);
    let report = verify(&original, &target, &keep_set, &keep_overmaps, 180).unwrap();

    assert!(!report.passed());
    let expected = (Coord3::new(119, 183, 9), Coord3::new(119, 183, 10));
    assert_eq!(report.electric.missing, BTreeSet::from([expected]));
    assert!(report.fluid.missing.is_empty());

    std::fs::remove_file(&original).ok();
    std::fs::remove_file(&target).ok();
}

#[test]
fn verification_is_deterministic() {
    let original = temp_db_path("mapprune_verify_det_orig");
    let target = temp_db_path("mapprune_verify_det_target");
    build_wired_db(&original);
    std::fs::copy(&original, &target).unwrap();

    let keep = [
        Coord3::new(119, 183, 10),
        Coord3::new(119, 183, 9),
        Coord3::new(120, 183, 10),
    ];
    let (keep_set, keep_overmaps) = keep_sets(&keep, 180);

    let first = verify(&original, &target, &keep_set, &keep_overmaps, 180).unwrap();
    let second = verify(&original, &target, &keep_set, &keep_overmaps, 180).unwrap();
    assert_eq!(first.electric.missing, second.electric.missing);
    assert_eq!(first.fluid.missing, second.fluid.missing);
    assert_eq!(first.electric.original, second.electric.original);
    assert_eq!(first.fluid.target, second.fluid.target);

    std::fs::remove_file(&original).ok();
    std::fs::remove_file(&target).ok();
}

#[test]
fn extraction_skips_overmaps_absent_from_the_store() {
    let db_path = temp_db_path("mapprune_verify_absent");
    build_wired_db(&db_path);

    let keep = [Coord3::new(119, 183, 10), Coord3::new(700, 700, 0)];
    let (keep_set, mut keep_overmaps) = keep_sets(&keep, 180);
    // o.3.3 exists but holds no links; o.5.5 does not exist at all.
    keep_overmaps.insert(OvermapId::new(5, 5));

    let db = MapDb::open_read_only(&db_path).unwrap();
    let edges = extract_edges(&db, &keep_set, &keep_overmaps, 180).unwrap();
    assert!(edges.electric.is_empty());
    assert!(edges.fluid.is_empty());

    std::fs::remove_file(&db_path).ok();
}
