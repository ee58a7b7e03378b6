//! Isolated environment for pipeline tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use comicshelf::db::library_repo::{self, Library};
use comicshelf::jobs::{Job, JobOrchestrator, OrchestratorSettings};
use comicshelf::thumbnail::CoverSpec;
use comicshelf::{Database, ScanOptions, ThumbnailOptions, ToolPaths};

use super::builders::CbzBuilder;

pub struct TestHarness {
    temp_dir: TempDir,
    /// Root of the test library.
    pub library_dir: PathBuf,
    pub cover_dir: PathBuf,
    pub db_path: PathBuf,
    pub db: Database,
    pub library: Library,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let library_dir = base.join("library");
        let cover_dir = base.join("covers");
        let db_path = base.join("data").join("catalog.db");
        std::fs::create_dir_all(&library_dir).expect("Failed to create library dir");

        let db = Database::open(&db_path).expect("Failed to open catalog");
        let library = library_repo::ensure(&db, "Test", &library_dir.to_string_lossy())
            .expect("Failed to register library");

        Self {
            temp_dir,
            library_dir,
            cover_dir,
            db_path,
            db,
            library,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A second, independent connection to the same catalog file.
    pub fn reopen(&self) -> Database {
        Database::open(&self.db_path).expect("Failed to reopen catalog")
    }

    /// Writes a CBZ relative to the library root and returns its full path.
    pub fn add_comic(&self, relative: &str, builder: CbzBuilder) -> PathBuf {
        let path = self.library_dir.join(relative);
        builder.write(&path);
        path
    }

    /// Writes `count` simple comics into `Series/`.
    pub fn add_series(&self, series: &str, count: usize) -> Vec<PathBuf> {
        (1..=count)
            .map(|n| {
                self.add_comic(
                    &format!("{0}/{0} #{1:03}.cbz", series, n),
                    CbzBuilder::new().pages(2, [200, (n * 20) as u8, 40]),
                )
            })
            .collect()
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            poll_interval: Duration::from_millis(20),
            scan: ScanOptions::default(),
            thumbnails: ThumbnailOptions {
                cover_dir: self.cover_dir.clone(),
                spec: CoverSpec::default(),
                workers: 3,
                tools: ToolPaths::default(),
            },
            parallel_thumbnails: false,
        }
    }

    pub fn orchestrator(&self) -> JobOrchestrator {
        JobOrchestrator::new(self.db.clone(), self.settings())
    }

    pub fn library(&self) -> Library {
        library_repo::find_by_id(&self.db, self.library.id)
            .expect("query library")
            .expect("library exists")
    }

    /// Polls until `done` holds for the job list or the timeout passes.
    pub fn wait_for<F>(&self, orchestrator: &JobOrchestrator, timeout: Duration, mut done: F) -> Vec<Job>
    where
        F: FnMut(&[Job]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let jobs = orchestrator.recent_jobs(100).expect("list jobs");
            if done(&jobs) || Instant::now() >= deadline {
                return jobs;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}
