//! Library scanner: diffs a library root against the catalog.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};

use log::{debug, info, warn};
use serde::Serialize;
use tracing::info_span;
use walkdir::WalkDir;

use crate::archive::{ComicArchive, ToolPaths};
use crate::db::comic_repo::{self, ComicRecord, Upserted};
use crate::db::entity_repo::{self, EntityKind, ListEntry};
use crate::db::library_repo::{self, Library};
use crate::db::{now_timestamp, Database};
use crate::error::ScanError;
use crate::metadata::{parse_comic_info, parse_filename, split_names, ComicInfo};

/// Counters reported by one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStats {
    pub imported: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: usize,
    /// Wall time in seconds.
    pub elapsed: f64,
}

/// What the scanner needs from configuration.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Lowercase extensions without the dot.
    pub supported_extensions: Vec<String>,
    pub tools: ToolPaths,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            supported_extensions: vec!["cbz".to_string(), "cbr".to_string(), "cb7".to_string()],
            tools: ToolPaths::default(),
        }
    }
}

enum FileState {
    New,
    Changed,
    Unchanged,
}

pub struct LibraryScanner {
    db: Database,
    options: ScanOptions,
}

impl LibraryScanner {
    pub fn new(db: Database, options: ScanOptions) -> Self {
        Self { db, options }
    }

    /// Synchronizes the catalog with the files under `library.path`.
    ///
    /// `force` re-imports files whose modification time is unchanged.
    /// `last_scanned` is written only when the scan runs to completion.
    pub fn scan(&self, library: &Library, force: bool) -> Result<ScanStats, ScanError> {
        let _span = info_span!("scan", library = %library.name, force).entered();
        let started = Instant::now();
        let root = PathBuf::from(&library.path);

        if !root.is_dir() {
            return Err(ScanError::RootMissing(root));
        }

        info!("Scanning library '{}' at {}", library.name, root.display());

        let indexed = comic_repo::indexed_files(&self.db, library.id)?;
        let mut stats = ScanStats::default();
        let mut seen = HashSet::new();

        for entry in WalkDir::new(&root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.clone());
                    warn!("Skipping: {}", ScanError::Walk { path, source: e });
                    stats.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.is_supported(entry.path()) {
                continue;
            }

            let path = entry.path();
            let key = path.to_string_lossy().into_owned();

            let mtime = match modified_seconds(path) {
                Ok(mtime) => mtime,
                Err(e) => {
                    warn!("{}", e);
                    stats.errors += 1;
                    continue;
                }
            };
            seen.insert(key.clone());

            let state = match indexed.get(&key) {
                None => FileState::New,
                Some(known) if force || known.file_modified_at != mtime => FileState::Changed,
                Some(_) => FileState::Unchanged,
            };
            if matches!(state, FileState::Unchanged) {
                continue;
            }

            match self.import_file(library.id, path, mtime) {
                Ok(Upserted::Inserted(id)) => {
                    debug!("Imported {} as comic {}", path.display(), id);
                    stats.imported += 1;
                }
                Ok(Upserted::Updated(id)) => {
                    debug!("Updated comic {} from {}", id, path.display());
                    stats.updated += 1;
                }
                Err(e) => {
                    warn!("Failed to import {}: {}", path.display(), e);
                    stats.errors += 1;
                }
            }
        }

        // Only files that are really gone; a walk error must not drop entries.
        let missing: Vec<i64> = indexed
            .iter()
            .filter(|(path, _)| !seen.contains(*path) && !Path::new(path).exists())
            .map(|(_, file)| file.id)
            .collect();
        stats.deleted = comic_repo::delete_many(&self.db, &missing)?;

        let (volumes, series) = self
            .db
            .with_transaction(|tx| comic_repo::prune_empty_groups(tx, Some(library.id)))?;
        if volumes + series > 0 {
            debug!("Pruned {} empty volumes and {} empty series", volumes, series);
        }

        library_repo::set_last_scanned(&self.db, library.id, &now_timestamp())?;

        stats.elapsed = started.elapsed().as_secs_f64();
        info!(
            "Scan of '{}' complete: {} imported, {} updated, {} deleted, {} errors in {:.2}s",
            library.name, stats.imported, stats.updated, stats.deleted, stats.errors, stats.elapsed
        );
        Ok(stats)
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.options.supported_extensions.iter().any(|s| *s == ext)
            })
            .unwrap_or(false)
    }

    /// Reads one archive and writes its entry and links in one transaction.
    fn import_file(&self, library_id: i64, path: &Path, mtime: f64) -> Result<Upserted, ScanError> {
        let mut archive = ComicArchive::open(path, &self.options.tools)?;
        let page_count = archive.list_pages().len() as i64;
        let info = match archive.comic_info()? {
            Some(xml) => match parse_comic_info(&xml) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("Ignoring metadata in {}: {}", path.display(), e);
                    None
                }
            },
            None => None,
        };
        archive.close();

        let record = build_record(library_id, path, mtime, page_count, info.as_ref());
        let info = info.unwrap_or_default();

        let credits: Vec<(&str, Vec<String>)> = info
            .credits()
            .into_iter()
            .map(|(role, names)| (role, split_names(names)))
            .collect();
        let lists = reading_lists(&info, record.number.as_deref());
        let collections = info
            .series_group
            .as_deref()
            .map(split_names)
            .unwrap_or_default();
        let tags = [
            (EntityKind::Character, info.characters.as_deref()),
            (EntityKind::Team, info.teams.as_deref()),
            (EntityKind::Location, info.locations.as_deref()),
        ];

        let upserted = self.db.with_transaction(|tx| {
            let upserted = comic_repo::upsert(tx, &record)?;
            let id = upserted.id();
            entity_repo::replace_credits(tx, id, &credits)?;
            for (kind, names) in &tags {
                let names = names.map(split_names).unwrap_or_default();
                entity_repo::replace_tags(tx, *kind, id, &names)?;
            }
            entity_repo::replace_containers(tx, id, &lists, &collections)?;
            Ok(upserted)
        })?;
        Ok(upserted)
    }
}

fn modified_seconds(path: &Path) -> Result<f64, ScanError> {
    let stat_err = |source| ScanError::Stat {
        path: path.to_path_buf(),
        source,
    };
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(stat_err)?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}

/// Merges descriptor metadata with filename heuristics. The descriptor wins
/// wherever it has a value.
fn build_record(
    library_id: i64,
    path: &Path,
    mtime: f64,
    page_count: i64,
    info: Option<&ComicInfo>,
) -> ComicRecord {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let guessed = parse_filename(&stem);

    let field = |f: fn(&ComicInfo) -> Option<String>| info.and_then(f);

    ComicRecord {
        library_id,
        file_path: path.to_string_lossy().into_owned(),
        filename,
        file_modified_at: mtime,
        page_count,
        series: field(|i| i.series.clone()).unwrap_or(guessed.series),
        volume: info
            .and_then(|i| i.volume)
            .or(guessed.volume)
            .unwrap_or(1),
        number: field(|i| i.number.clone()).or(guessed.number),
        title: field(|i| i.title.clone()),
        summary: field(|i| i.summary.clone()),
        year: info.and_then(|i| i.year).or(guessed.year),
        month: info.and_then(|i| i.month),
        writer: field(|i| i.writer.clone()),
        penciller: field(|i| i.penciller.clone()),
        publisher: field(|i| i.publisher.clone()),
        alternate_series: field(|i| i.alternate_series.clone()),
        alternate_number: field(|i| i.alternate_number.clone()),
        story_arc: field(|i| i.story_arc.clone()),
        metadata_json: info.and_then(|i| serde_json::to_string(&i.fields).ok()),
    }
}

/// Story arcs are positioned by issue number, alternate series by the
/// alternate number.
fn reading_lists(info: &ComicInfo, number: Option<&str>) -> Vec<ListEntry> {
    let mut lists: Vec<ListEntry> = info
        .story_arc
        .as_deref()
        .map(split_names)
        .unwrap_or_default()
        .into_iter()
        .map(|arc| ListEntry {
            list: arc,
            position: number.map(str::to_string),
        })
        .collect();

    if let Some(alt) = info.alternate_series.as_deref().map(str::trim) {
        if !alt.is_empty() && !lists.iter().any(|l| l.list == alt) {
            lists.push(ListEntry {
                list: alt.to_string(),
                position: info.alternate_number.clone(),
            });
        }
    }
    lists
}
