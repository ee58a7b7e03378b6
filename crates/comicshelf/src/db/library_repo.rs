//! Library repository: scan roots and their `scanning` / `last_scanned` state.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{now_timestamp, Database, DatabaseError};

/// A scan root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub scanning: bool,
    pub last_scanned: Option<String>,
    pub created_at: String,
}

impl Library {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            path: row.get("path")?,
            scanning: row.get("scanning")?,
            last_scanned: row.get("last_scanned")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Registers a library by path, returning the existing row when the path is
/// already known. The name of an existing library is updated.
pub fn ensure(db: &Database, name: &str, path: &str) -> Result<Library, DatabaseError> {
    db.with_transaction(|tx| {
        tx.execute(
            "INSERT INTO libraries (name, path, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET name = excluded.name",
            params![name, path, now_timestamp()],
        )?;
        Ok(tx.query_row(
            "SELECT * FROM libraries WHERE path = ?1",
            params![path],
            Library::from_row,
        )?)
    })
}

/// Finds a library by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Library>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM libraries WHERE id = ?1",
                params![id],
                Library::from_row,
            )
            .optional()?)
    })
}

/// Finds a library by name or path.
pub fn find_by_name_or_path(db: &Database, key: &str) -> Result<Option<Library>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM libraries WHERE name = ?1 OR path = ?1 ORDER BY id LIMIT 1",
                params![key],
                Library::from_row,
            )
            .optional()?)
    })
}

/// Lists all libraries ordered by id.
pub fn list(db: &Database) -> Result<Vec<Library>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM libraries ORDER BY id")?;
        let rows = stmt
            .query_map([], Library::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Raw write of the `scanning` flag. Job code goes through the
/// orchestrator's retrying helper instead of calling this directly.
pub(crate) fn set_scanning(db: &Database, id: i64, scanning: bool) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE libraries SET scanning = ?2 WHERE id = ?1",
            params![id, scanning],
        )?;
        Ok(())
    })
}

/// Clears the `scanning` flag on every library that has no running job.
/// Returns the number of libraries reset.
pub(crate) fn clear_stale_scanning(db: &Database) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE libraries SET scanning = 0
             WHERE scanning = 1 AND id NOT IN (
                 SELECT library_id FROM jobs
                 WHERE status = 'running' AND library_id IS NOT NULL
             )",
            [],
        )?)
    })
}

/// Records the completion time of a scan.
pub fn set_last_scanned(db: &Database, id: i64, at: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE libraries SET last_scanned = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    })
}
