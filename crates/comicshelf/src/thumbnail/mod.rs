//! Cover thumbnails and color palettes for catalog entries.

pub mod cover;
pub mod palette;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use serde::Serialize;
use tracing::info_span;

use crate::archive::{ComicArchive, ToolPaths};
use crate::db::comic_repo::{self, CoverUpdate, ThumbnailCandidate};
use crate::db::Database;
use crate::error::{panic_message, ThumbnailError};

pub use cover::{render_cover, CoverSpec, RenderedCover};
pub use palette::{extract_palette, Palette};

/// Hex characters of the path hash used in cover file names.
const COVER_NAME_LEN: usize = 32;

/// Counters reported by one thumbnail batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThumbnailStats {
    pub processed: usize,
    pub errors: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ThumbnailOptions {
    pub cover_dir: PathBuf,
    pub spec: CoverSpec,
    /// Worker threads for the parallel mode.
    pub workers: usize,
    pub tools: ToolPaths,
}

pub struct ThumbnailService {
    db: Database,
    options: ThumbnailOptions,
}

impl ThumbnailService {
    pub fn new(db: Database, options: ThumbnailOptions) -> Self {
        Self { db, options }
    }

    /// Where the cover for `file_path` lives.
    pub fn cover_path(&self, file_path: &str) -> PathBuf {
        let hash = blake3::hash(file_path.as_bytes()).to_hex();
        self.options
            .cover_dir
            .join(format!("{}.webp", &hash.as_str()[..COVER_NAME_LEN]))
    }

    /// Generates covers for the library's entries one at a time.
    pub fn process_missing(&self, library_id: i64, force: bool) -> Result<ThumbnailStats, ThumbnailError> {
        let _span = info_span!("thumbnails", library_id, force, parallel = false).entered();
        let (todo, mut stats) = self.select(library_id, force)?;
        info!(
            "Generating {} thumbnails for library {} ({} up to date)",
            todo.len(),
            library_id,
            stats.skipped
        );

        for candidate in &todo {
            match self.process_guarded(candidate) {
                Ok(()) => stats.processed += 1,
                Err(e) => {
                    warn!("Thumbnail failed for {}: {}", candidate.file_path, e);
                    stats.errors += 1;
                }
            }
        }

        info!(
            "Thumbnails for library {}: {} processed, {} errors, {} skipped",
            library_id, stats.processed, stats.errors, stats.skipped
        );
        Ok(stats)
    }

    /// Same result as [`process_missing`](Self::process_missing), spread over
    /// worker threads. Each worker owns a disjoint slice of the entries and
    /// reports outcomes over a channel.
    pub fn process_missing_parallel(
        &self,
        library_id: i64,
        force: bool,
    ) -> Result<ThumbnailStats, ThumbnailError> {
        let _span = info_span!("thumbnails", library_id, force, parallel = true).entered();
        let (todo, mut stats) = self.select(library_id, force)?;
        if todo.is_empty() {
            return Ok(stats);
        }

        let workers = self.options.workers.clamp(1, todo.len());
        let chunk_size = todo.len().div_ceil(workers);
        info!(
            "Generating {} thumbnails for library {} on {} workers",
            todo.len(),
            library_id,
            workers
        );

        let (tx, rx) = unbounded::<(String, Result<(), ThumbnailError>)>();
        std::thread::scope(|scope| {
            for chunk in todo.chunks(chunk_size) {
                let tx = tx.clone();
                scope.spawn(move || {
                    for candidate in chunk {
                        let outcome = self.process_guarded(candidate);
                        if tx.send((candidate.file_path.clone(), outcome)).is_err() {
                            return;
                        }
                    }
                });
            }
            drop(tx);

            for (file_path, outcome) in rx.iter() {
                match outcome {
                    Ok(()) => stats.processed += 1,
                    Err(e) => {
                        warn!("Thumbnail failed for {}: {}", file_path, e);
                        stats.errors += 1;
                    }
                }
            }
        });

        info!(
            "Thumbnails for library {}: {} processed, {} errors, {} skipped",
            library_id, stats.processed, stats.errors, stats.skipped
        );
        Ok(stats)
    }

    /// Splits the library's entries into work and already-complete ones.
    fn select(
        &self,
        library_id: i64,
        force: bool,
    ) -> Result<(Vec<ThumbnailCandidate>, ThumbnailStats), ThumbnailError> {
        let candidates = comic_repo::thumbnail_candidates(&self.db, library_id)?;
        let mut stats = ThumbnailStats::default();
        let mut todo = Vec::new();

        for candidate in candidates {
            let complete = candidate.has_colors
                && candidate
                    .thumbnail_path
                    .as_deref()
                    .map(|p| Path::new(p).is_file())
                    .unwrap_or(false);
            if complete && !force {
                stats.skipped += 1;
            } else {
                todo.push(candidate);
            }
        }
        Ok((todo, stats))
    }

    /// A panicking decoder costs one entry, not the batch.
    fn process_guarded(&self, candidate: &ThumbnailCandidate) -> Result<(), ThumbnailError> {
        catch_unwind(AssertUnwindSafe(|| self.process_one(candidate))).unwrap_or_else(|panic| {
            Err(ThumbnailError::ImageProcessing(format!(
                "panicked: {}",
                panic_message(panic.as_ref())
            )))
        })
    }

    fn process_one(&self, candidate: &ThumbnailCandidate) -> Result<(), ThumbnailError> {
        let source = Path::new(&candidate.file_path);
        let mut archive = ComicArchive::open(source, &self.options.tools)?;
        if archive.list_pages().is_empty() {
            return Err(ThumbnailError::NoPages(source.to_path_buf()));
        }
        let page = archive.cover()?;
        archive.close();

        let rendered = render_cover(&page, &self.options.spec)?;
        let target = self.cover_path(&candidate.file_path);
        write_atomic(&target, &rendered.webp)?;

        let update = CoverUpdate {
            thumbnail_path: target.to_string_lossy().into_owned(),
            color_primary: rendered.palette.primary,
            color_secondary: rendered.palette.secondary,
            color_palette: rendered.palette.colors,
        };
        if !comic_repo::update_cover(&self.db, candidate.id, &update)? {
            debug!("Comic {} vanished before its cover was saved", candidate.id);
        }
        Ok(())
    }
}

/// Writes through a sibling temp file and renames it into place, so readers
/// never see a partial cover.
fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), ThumbnailError> {
    let write_err = |source| ThumbnailError::WriteFile {
        path: target.to_path_buf(),
        source,
    };
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(write_err)?;
    }

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    std::fs::write(&tmp, bytes).map_err(write_err)?;
    if let Err(e) = std::fs::rename(&tmp, target) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}
