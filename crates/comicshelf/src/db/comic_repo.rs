//! Catalog entries (comics) and their series/volume grouping.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;

use super::{now_timestamp, Database, DatabaseError};

/// A catalog entry as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comic {
    pub id: i64,
    pub library_id: i64,
    pub volume_id: i64,
    pub filename: String,
    pub file_path: String,
    pub file_modified_at: f64,
    pub page_count: i64,
    pub number: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub thumbnail_path: Option<String>,
    pub color_primary: Option<String>,
    pub color_secondary: Option<String>,
    pub color_palette: Option<String>,
}

impl Comic {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            library_id: row.get("library_id")?,
            volume_id: row.get("volume_id")?,
            filename: row.get("filename")?,
            file_path: row.get("file_path")?,
            file_modified_at: row.get("file_modified_at")?,
            page_count: row.get("page_count")?,
            number: row.get("number")?,
            title: row.get("title")?,
            year: row.get("year")?,
            thumbnail_path: row.get("thumbnail_path")?,
            color_primary: row.get("color_primary")?,
            color_secondary: row.get("color_secondary")?,
            color_palette: row.get("color_palette")?,
        })
    }
}

/// What the scanner knows about an already-cataloged file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedFile {
    pub id: i64,
    pub file_modified_at: f64,
}

/// Everything the scanner writes for one archive.
#[derive(Debug, Clone, Default)]
pub struct ComicRecord {
    pub library_id: i64,
    pub file_path: String,
    pub filename: String,
    pub file_modified_at: f64,
    pub page_count: i64,
    pub series: String,
    pub volume: i64,
    pub number: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub writer: Option<String>,
    pub penciller: Option<String>,
    pub publisher: Option<String>,
    pub alternate_series: Option<String>,
    pub alternate_number: Option<String>,
    pub story_arc: Option<String>,
    pub metadata_json: Option<String>,
}

/// Whether an upsert created or replaced the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted(i64),
    Updated(i64),
}

impl Upserted {
    pub fn id(self) -> i64 {
        match self {
            Upserted::Inserted(id) | Upserted::Updated(id) => id,
        }
    }
}

/// Entry that needs (or may need) a cover thumbnail.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailCandidate {
    pub id: i64,
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub has_colors: bool,
}

/// Derived cover data written back by the thumbnail pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverUpdate {
    pub thumbnail_path: String,
    pub color_primary: String,
    pub color_secondary: String,
    pub color_palette: Vec<String>,
}

/// Path and modification time of every entry in a library, keyed by path.
pub fn indexed_files(
    db: &Database,
    library_id: i64,
) -> Result<HashMap<String, IndexedFile>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id, file_path, file_modified_at FROM comics WHERE library_id = ?1")?;
        let rows = stmt.query_map(params![library_id], |row| {
            Ok((
                row.get::<_, String>(1)?,
                IndexedFile {
                    id: row.get(0)?,
                    file_modified_at: row.get(2)?,
                },
            ))
        })?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    })
}

/// Returns the series id for `name` in a library, creating it if needed.
pub fn resolve_series(conn: &Connection, library_id: i64, name: &str) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO series (library_id, name) VALUES (?1, ?2)",
        params![library_id, name],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM series WHERE library_id = ?1 AND name = ?2",
        params![library_id, name],
        |r| r.get(0),
    )?)
}

/// Returns the volume id for `number` in a series, creating it if needed.
pub fn resolve_volume(conn: &Connection, series_id: i64, number: i64) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO volumes (series_id, volume_number) VALUES (?1, ?2)",
        params![series_id, number],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM volumes WHERE series_id = ?1 AND volume_number = ?2",
        params![series_id, number],
        |r| r.get(0),
    )?)
}

/// Inserts or replaces the entry for `record.file_path`.
///
/// Replacing an entry clears its cover data, since the archive changed.
pub fn upsert(tx: &Transaction<'_>, record: &ComicRecord) -> Result<Upserted, DatabaseError> {
    let series_id = resolve_series(tx, record.library_id, &record.series)?;
    let volume_id = resolve_volume(tx, series_id, record.volume)?;
    let now = now_timestamp();

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM comics WHERE file_path = ?1",
            params![record.file_path],
            |r| r.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            tx.execute(
                "UPDATE comics SET
                    volume_id = ?2, library_id = ?3, filename = ?4, file_modified_at = ?5,
                    page_count = ?6, number = ?7, title = ?8, summary = ?9, year = ?10,
                    month = ?11, writer = ?12, penciller = ?13, publisher = ?14,
                    alternate_series = ?15, alternate_number = ?16, story_arc = ?17,
                    metadata_json = ?18, thumbnail_path = NULL, color_primary = NULL,
                    color_secondary = NULL, color_palette = NULL, updated_at = ?19
                 WHERE id = ?1",
                params![
                    id,
                    volume_id,
                    record.library_id,
                    record.filename,
                    record.file_modified_at,
                    record.page_count,
                    record.number,
                    record.title,
                    record.summary,
                    record.year,
                    record.month,
                    record.writer,
                    record.penciller,
                    record.publisher,
                    record.alternate_series,
                    record.alternate_number,
                    record.story_arc,
                    record.metadata_json,
                    now,
                ],
            )?;
            Ok(Upserted::Updated(id))
        }
        None => {
            tx.execute(
                "INSERT INTO comics (
                    volume_id, library_id, filename, file_path, file_modified_at, page_count,
                    number, title, summary, year, month, writer, penciller, publisher,
                    alternate_series, alternate_number, story_arc, metadata_json,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                           ?15, ?16, ?17, ?18, ?19, ?19)",
                params![
                    volume_id,
                    record.library_id,
                    record.filename,
                    record.file_path,
                    record.file_modified_at,
                    record.page_count,
                    record.number,
                    record.title,
                    record.summary,
                    record.year,
                    record.month,
                    record.writer,
                    record.penciller,
                    record.publisher,
                    record.alternate_series,
                    record.alternate_number,
                    record.story_arc,
                    record.metadata_json,
                    now,
                ],
            )?;
            Ok(Upserted::Inserted(tx.last_insert_rowid()))
        }
    }
}

/// Deletes entries by id. Links to people, characters and containers go
/// with them through `ON DELETE CASCADE`.
pub fn delete_many(db: &Database, ids: &[i64]) -> Result<usize, DatabaseError> {
    if ids.is_empty() {
        return Ok(0);
    }
    db.with_transaction(|tx| {
        let mut stmt = tx.prepare("DELETE FROM comics WHERE id = ?1")?;
        let mut deleted = 0;
        for id in ids {
            deleted += stmt.execute(params![id])?;
        }
        Ok(deleted)
    })
}

/// Removes volumes without entries, then series without volumes.
///
/// Returns `(volumes, series)` deleted. `None` sweeps every library.
pub fn prune_empty_groups(
    conn: &Connection,
    library_id: Option<i64>,
) -> Result<(usize, usize), DatabaseError> {
    let volumes = conn.execute(
        "DELETE FROM volumes
         WHERE NOT EXISTS (SELECT 1 FROM comics c WHERE c.volume_id = volumes.id)
           AND (?1 IS NULL OR series_id IN (SELECT id FROM series WHERE library_id = ?1))",
        params![library_id],
    )?;
    let series = conn.execute(
        "DELETE FROM series
         WHERE NOT EXISTS (SELECT 1 FROM volumes v WHERE v.series_id = series.id)
           AND (?1 IS NULL OR library_id = ?1)",
        params![library_id],
    )?;
    Ok((volumes, series))
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Comic>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row("SELECT * FROM comics WHERE id = ?1", params![id], Comic::from_row)
            .optional()?)
    })
}

pub fn find_by_path(db: &Database, file_path: &str) -> Result<Option<Comic>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM comics WHERE file_path = ?1",
                params![file_path],
                Comic::from_row,
            )
            .optional()?)
    })
}

pub fn count_for_library(db: &Database, library_id: i64) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM comics WHERE library_id = ?1",
            params![library_id],
            |r| r.get(0),
        )?)
    })
}

/// Every entry of a library with the fields thumbnail selection needs,
/// ordered by id.
pub fn thumbnail_candidates(
    db: &Database,
    library_id: i64,
) -> Result<Vec<ThumbnailCandidate>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, file_path, thumbnail_path, color_primary IS NOT NULL AS has_colors
             FROM comics WHERE library_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![library_id], |row| {
                Ok(ThumbnailCandidate {
                    id: row.get(0)?,
                    file_path: row.get(1)?,
                    thumbnail_path: row.get(2)?,
                    has_colors: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Persists a generated cover and its palette. Returns false if the entry
/// is gone.
pub fn update_cover(db: &Database, id: i64, cover: &CoverUpdate) -> Result<bool, DatabaseError> {
    let palette = serde_json::to_string(&cover.color_palette)?;
    db.with_conn(|conn| {
        let updated = conn.execute(
            "UPDATE comics SET thumbnail_path = ?2, color_primary = ?3, color_secondary = ?4,
                               color_palette = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                cover.thumbnail_path,
                cover.color_primary,
                cover.color_secondary,
                palette,
                now_timestamp(),
            ],
        )?;
        Ok(updated == 1)
    })
}
