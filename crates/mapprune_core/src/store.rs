use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, params};

use crate::error::{CoreError, CoreErrorCode};

/// Rows deleted per `DELETE ... WHERE path IN (...)` statement. Stays under
/// SQLite's default bind-parameter limit.
const DELETE_CHUNK: usize = 800;

/// One raw `files` row: compression tag column plus payload bytes.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub compression: Option<String>,
    pub data: Vec<u8>,
}

/// Handle on a Bright Nights `map.sqlite3` database.
#[derive(Debug)]
pub struct MapDb {
    conn: Connection,
}

impl MapDb {
    /// Open an existing database read-write. The file must already exist;
    /// this tool never creates databases.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let db = Self { conn };
        db.require_files_table()?;
        Ok(db)
    }

    /// Open read-only, for verification passes that must never mutate.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let db = Self { conn };
        db.require_files_table()?;
        Ok(db)
    }

    fn require_files_table(&self) -> Result<(), CoreError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='files'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(CoreError::new(
                CoreErrorCode::Store,
                "database has no 'files' table (not a Bright Nights map.sqlite3?)",
            ));
        }
        Ok(())
    }

    /// All fine-grained map entry paths (`maps/.../<x>.<y>.<z>.map`).
    pub fn map_paths(&self) -> Result<Vec<String>, CoreError> {
        self.paths_where("path LIKE 'maps/%' AND path LIKE '%.map'")
    }

    /// All overmap entry paths (`o.<omx>.<omy>`).
    pub fn overmap_paths(&self) -> Result<Vec<String>, CoreError> {
        self.paths_where("path LIKE 'o.%'")
    }

    fn paths_where(&self, predicate: &str) -> Result<Vec<String>, CoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT path FROM files WHERE {predicate}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn fetch_record(&self, path: &str) -> Result<Option<RawRecord>, CoreError> {
        fetch_record(&self.conn, path)
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>, CoreError> {
        Ok(self.conn.transaction()?)
    }

    /// Reclaim freed pages. Idempotent; safe to skip.
    pub fn vacuum(&self) -> Result<(), CoreError> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }

    pub fn count_map_entries(&self) -> Result<u64, CoreError> {
        self.count_where("path LIKE 'maps/%' AND path LIKE '%.map'")
    }

    pub fn count_overmap_entries(&self) -> Result<u64, CoreError> {
        self.count_where("path LIKE 'o.%'")
    }

    pub fn count_all_entries(&self) -> Result<u64, CoreError> {
        self.count_where("1=1")
    }

    fn count_where(&self, predicate: &str) -> Result<u64, CoreError> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM files WHERE {predicate}"),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

/// Fetch one row by path. Connection-level so it works both inside and
/// outside a transaction (`Transaction` derefs to `Connection`).
pub fn fetch_record(conn: &Connection, path: &str) -> Result<Option<RawRecord>, CoreError> {
    let row = conn
        .query_row(
            "SELECT compression, data FROM files WHERE path=?1",
            params![path],
            |row| {
                Ok(RawRecord {
                    compression: row.get(0)?,
                    data: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn update_record_data(conn: &Connection, path: &str, data: &[u8]) -> Result<(), CoreError> {
    conn.execute(
        "UPDATE files SET data=?1 WHERE path=?2",
        params![data, path],
    )?;
    Ok(())
}

/// Delete the given paths in bounded-size chunks.
pub fn delete_paths(conn: &Connection, paths: &[String]) -> Result<usize, CoreError> {
    let mut deleted = 0;
    for chunk in paths.chunks(DELETE_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(",");
        let sql = format!("DELETE FROM files WHERE path IN ({placeholders})");
        deleted += conn.execute(&sql, rusqlite::params_from_iter(chunk.iter()))?;
    }
    Ok(deleted)
}
