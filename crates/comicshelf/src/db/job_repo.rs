//! Job repository: queue operations on the `jobs` table.
//!
//! Every status change is a conditional update on the expected prior status,
//! so transitions stay monotonic even with several orchestrators sharing one
//! catalog file.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{now_timestamp, Database, DatabaseError};
use crate::jobs::{EnqueueOutcome, Job, JobStatus, JobType};

const SELECT_COLUMNS: &str = "id, job_type, status, library_id, force, created_at, started_at,
     completed_at, result_summary, error_message";

fn parse_column<T: std::str::FromStr<Err = String>>(
    row: &Row<'_>,
    idx: usize,
) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let summary: Option<String> = row.get(8)?;
    let result_summary = match summary {
        Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(Job {
        id: row.get(0)?,
        job_type: parse_column(row, 1)?,
        status: parse_column(row, 2)?,
        library_id: row.get(3)?,
        force: row.get(4)?,
        created_at: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        result_summary,
        error_message: row.get(9)?,
    })
}

fn insert(
    conn: &Connection,
    job_type: JobType,
    library_id: Option<i64>,
    force: bool,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (job_type, status, library_id, force, created_at)
         VALUES (?1, 'pending', ?2, ?3, ?4)",
        params![job_type.as_str(), library_id, force, now_timestamp()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds an active (pending or running) job that blocks a new enqueue of
/// `job_type` for `library_id`.
///
/// Scans are blocked by an active scan of the same library. Cleanups are
/// blocked by an active global cleanup or one with the same scope; a global
/// cleanup is blocked by any active cleanup.
fn find_blocking(
    conn: &Connection,
    job_type: JobType,
    library_id: Option<i64>,
) -> Result<Option<i64>, DatabaseError> {
    let id = match (job_type, library_id) {
        (JobType::Scan, Some(lib)) => conn
            .query_row(
                "SELECT id FROM jobs WHERE job_type = 'scan' AND library_id = ?1
                 AND status IN ('pending', 'running') ORDER BY id LIMIT 1",
                params![lib],
                |r| r.get(0),
            )
            .optional()?,
        (JobType::Cleanup, Some(lib)) => conn
            .query_row(
                "SELECT id FROM jobs WHERE job_type = 'cleanup'
                 AND (library_id IS NULL OR library_id = ?1)
                 AND status IN ('pending', 'running') ORDER BY id LIMIT 1",
                params![lib],
                |r| r.get(0),
            )
            .optional()?,
        (JobType::Cleanup, None) => conn
            .query_row(
                "SELECT id FROM jobs WHERE job_type = 'cleanup'
                 AND status IN ('pending', 'running') ORDER BY id LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?,
        _ => None,
    };
    Ok(id)
}

/// Inserts a pending job unless an active job already covers it.
///
/// The check and the insert share one IMMEDIATE transaction. The partial
/// unique index on active scans is the storage-level backstop.
pub fn enqueue(
    db: &Database,
    job_type: JobType,
    library_id: Option<i64>,
    force: bool,
) -> Result<EnqueueOutcome, DatabaseError> {
    let result = db.with_transaction(|tx| {
        if let Some(existing) = find_blocking(tx, job_type, library_id)? {
            return Ok(EnqueueOutcome::AlreadyQueued(existing));
        }
        Ok(EnqueueOutcome::Queued(insert(tx, job_type, library_id, force)?))
    });

    match result {
        Err(e) if e.is_constraint_violation() => {
            let existing = db.with_conn(|conn| find_blocking(conn, job_type, library_id))?;
            match existing {
                Some(id) => Ok(EnqueueOutcome::AlreadyQueued(id)),
                None => Err(e),
            }
        }
        other => other,
    }
}

/// Finds a job by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", SELECT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], job_from_row).optional()?)
    })
}

/// Returns the next pending job: scans first, then thumbnails, then
/// cleanups; oldest first within a type.
pub fn next_pending(db: &Database) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM jobs WHERE status = 'pending'
             ORDER BY CASE job_type WHEN 'scan' THEN 0 WHEN 'thumbnail' THEN 1 ELSE 2 END,
                      created_at, id
             LIMIT 1",
            SELECT_COLUMNS
        );
        Ok(conn.query_row(&sql, [], job_from_row).optional()?)
    })
}

/// Atomically moves a job from pending to running.
///
/// Returns `false` when no row changed, meaning another worker claimed it
/// first (or it is no longer pending).
pub fn claim(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'running', started_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, now_timestamp()],
        )?;
        Ok(changed == 1)
    })
}

/// Marks a running job completed with its result counters.
pub fn complete(
    db: &Database,
    id: i64,
    summary: &serde_json::Value,
) -> Result<bool, DatabaseError> {
    let summary = serde_json::to_string(summary)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'completed', completed_at = ?2, result_summary = ?3
             WHERE id = ?1 AND status = 'running'",
            params![id, now_timestamp(), summary],
        )?;
        Ok(changed == 1)
    })
}

/// Marks a running job failed with an error message.
pub fn fail(db: &Database, id: i64, message: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'failed', completed_at = ?2, error_message = ?3
             WHERE id = ?1 AND status = 'running'",
            params![id, now_timestamp(), message],
        )?;
        Ok(changed == 1)
    })
}

/// Fails every running job with `message` and returns the failed jobs.
pub fn fail_all_running(db: &Database, message: &str) -> Result<Vec<Job>, DatabaseError> {
    db.with_transaction(|tx| {
        let sql = format!("SELECT {} FROM jobs WHERE status = 'running'", SELECT_COLUMNS);
        let mut stmt = tx.prepare(&sql)?;
        let stuck = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        tx.execute(
            "UPDATE jobs SET status = 'failed', completed_at = ?1, error_message = ?2
             WHERE status = 'running'",
            params![now_timestamp(), message],
        )?;
        Ok(stuck)
    })
}

/// Lists the most recent jobs, newest first.
pub fn recent(db: &Database, limit: u64) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC, id DESC LIMIT ?1",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
