use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tracing::info_span;

use super::job::{EnqueueOutcome, Job, JobStatus, JobType};
use super::retry::{retry_on_contention, RETRY_ATTEMPTS, RETRY_DELAY};
use crate::config::Config;
use crate::db::{job_repo, library_repo, Database, DatabaseError};
use crate::error::{panic_message, JobError};
use crate::maintenance::MaintenanceSweeper;
use crate::scanner::{LibraryScanner, ScanOptions};
use crate::thumbnail::{CoverSpec, ThumbnailOptions, ThumbnailService};

/// Error recorded on jobs that were running when the process went away.
pub const INTERRUPTED_MESSAGE: &str = "Job interrupted by server restart";

/// Granularity of the idle sleep, so `stop()` is noticed promptly.
const STOP_CHECK: Duration = Duration::from_millis(100);

/// Everything the orchestrator and its handlers need to run.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub scan: ScanOptions,
    pub thumbnails: ThumbnailOptions,
    pub parallel_thumbnails: bool,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let tools = config.tools.tool_paths();
        Self {
            poll_interval: config.worker.poll_interval(),
            scan: ScanOptions {
                supported_extensions: config.supported_extensions.clone(),
                tools: tools.clone(),
            },
            thumbnails: ThumbnailOptions {
                cover_dir: config.resolved_cover_directory(),
                spec: CoverSpec {
                    max_width: config.thumbnail.max_width,
                    max_height: config.thumbnail.max_height,
                    quality: config.thumbnail.quality,
                },
                workers: config.thumbnail.workers,
                tools,
            },
            parallel_thumbnails: config.thumbnail.parallel,
        }
    }
}

/// What one worker iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No pending job.
    Idle,
    /// Another worker claimed the selected job first.
    ClaimLost,
    /// The catalog was locked; try again after the poll interval.
    Busy,
    /// A job ran to a terminal status.
    Ran { job_id: i64, status: JobStatus },
}

/// Persistent job queue with a single serial worker.
///
/// Scans chain a thumbnail job, plus a cleanup job when the library had
/// been scanned before.
pub struct JobOrchestrator {
    core: Arc<Core>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Core {
    db: Database,
    settings: OrchestratorSettings,
    scanner: LibraryScanner,
    thumbnails: ThumbnailService,
    sweeper: MaintenanceSweeper,
    /// Held while a job is claimed and handled; one job at a time.
    running: Mutex<()>,
}

impl JobOrchestrator {
    pub fn new(db: Database, settings: OrchestratorSettings) -> Self {
        let core = Core {
            scanner: LibraryScanner::new(db.clone(), settings.scan.clone()),
            thumbnails: ThumbnailService::new(db.clone(), settings.thumbnails.clone()),
            sweeper: MaintenanceSweeper::new(db.clone()),
            db,
            settings,
            running: Mutex::new(()),
        };
        Self {
            core: Arc::new(core),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Recovers interrupted work, then starts the worker thread.
    pub fn start(&self) -> Result<(), JobError> {
        let mut worker = self.worker.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        if worker.is_some() {
            return Err(JobError::AlreadyStarted);
        }

        self.recover()?;
        self.shutdown.store(false, Ordering::Relaxed);

        let core = Arc::clone(&self.core);
        let shutdown = Arc::clone(&self.shutdown);
        let handle = thread::Builder::new()
            .name("comicshelf-jobs".to_string())
            .spawn(move || run_worker(core, shutdown))
            .map_err(|e| JobError::SpawnFailed(e.to_string()))?;
        *worker = Some(handle);

        info!(
            "Job orchestrator started (poll interval {:?})",
            self.core.settings.poll_interval
        );
        Ok(())
    }

    /// Asks the worker to exit after its current iteration. An in-flight job
    /// is never interrupted.
    pub fn stop(&self) {
        info!("Stopping job orchestrator...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Waits for the worker thread to exit.
    pub fn join(&self) {
        let handle = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.join() {
                error!("Job worker panicked: {}", panic_message(e.as_ref()));
            }
            info!("Job orchestrator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .map(|w| w.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Fails jobs left running by a previous process and clears stale
    /// `scanning` flags. Returns the jobs that were failed.
    pub fn recover(&self) -> Result<Vec<Job>, JobError> {
        let stuck = job_repo::fail_all_running(&self.core.db, INTERRUPTED_MESSAGE)?;
        for job in &stuck {
            warn!("Marked interrupted {} job {} as failed", job.job_type, job.id);
        }
        let cleared = library_repo::clear_stale_scanning(&self.core.db)?;
        if cleared > 0 {
            info!("Cleared stale scanning flag on {} libraries", cleared);
        }
        Ok(stuck)
    }

    /// Queues a job unless an equivalent one is already pending or running.
    pub fn enqueue(
        &self,
        library_id: Option<i64>,
        job_type: JobType,
        force: bool,
    ) -> Result<EnqueueOutcome, JobError> {
        self.core.enqueue(library_id, job_type, force)
    }

    pub fn job_status(&self, job_id: i64) -> Result<Option<Job>, JobError> {
        Ok(job_repo::find_by_id(&self.core.db, job_id)?)
    }

    /// Job history, newest first.
    pub fn recent_jobs(&self, limit: u64) -> Result<Vec<Job>, JobError> {
        Ok(job_repo::recent(&self.core.db, limit)?)
    }

    /// Runs one worker iteration on the calling thread.
    pub fn process_next(&self) -> Result<Tick, JobError> {
        self.core.process_next()
    }

    /// Processes jobs until the queue is empty.
    pub fn drain(&self) -> Result<Vec<(i64, JobStatus)>, JobError> {
        let mut ran = Vec::new();
        loop {
            match self.process_next()? {
                Tick::Ran { job_id, status } => ran.push((job_id, status)),
                Tick::ClaimLost => continue,
                Tick::Idle | Tick::Busy => return Ok(ran),
            }
        }
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn run_worker(core: Arc<Core>, shutdown: Arc<AtomicBool>) {
    debug!("Job worker started");

    while !shutdown.load(Ordering::Relaxed) {
        let tick = catch_unwind(AssertUnwindSafe(|| core.process_next()));
        match tick {
            Ok(Ok(Tick::Ran { .. })) | Ok(Ok(Tick::ClaimLost)) => {}
            Ok(Ok(Tick::Idle)) | Ok(Ok(Tick::Busy)) => {
                sleep_unless_stopped(core.settings.poll_interval, &shutdown)
            }
            Ok(Err(e)) => {
                error!("Job worker iteration failed: {}", e);
                sleep_unless_stopped(core.settings.poll_interval, &shutdown);
            }
            Err(panic) => {
                error!("Job worker iteration panicked: {}", panic_message(panic.as_ref()));
                sleep_unless_stopped(core.settings.poll_interval, &shutdown);
            }
        }
    }

    debug!("Job worker received shutdown signal");
}

fn sleep_unless_stopped(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STOP_CHECK.min(deadline - now));
    }
}

/// Clears a library's `scanning` flag when dropped, including on unwind.
struct ScanningFlag<'a> {
    db: &'a Database,
    library_id: i64,
}

impl<'a> ScanningFlag<'a> {
    fn raise(db: &'a Database, library_id: i64) -> Self {
        set_scanning(db, library_id, true);
        Self { db, library_id }
    }
}

impl Drop for ScanningFlag<'_> {
    fn drop(&mut self) {
        set_scanning(self.db, self.library_id, false);
    }
}

fn set_scanning(db: &Database, library_id: i64, scanning: bool) {
    let label = format!("set scanning={} on library {}", scanning, library_id);
    if let Err(e) = retry_on_contention(&label, RETRY_ATTEMPTS, RETRY_DELAY, || {
        library_repo::set_scanning(db, library_id, scanning)
    }) {
        error!("Failed to {}: {}", label, e);
    }
}

impl Core {
    fn enqueue(
        &self,
        library_id: Option<i64>,
        job_type: JobType,
        force: bool,
    ) -> Result<EnqueueOutcome, JobError> {
        match library_id {
            None if !job_type.allows_global_scope() => {
                return Err(JobError::LibraryRequired(job_type));
            }
            Some(id) => {
                if library_repo::find_by_id(&self.db, id)?.is_none() {
                    return Err(JobError::LibraryNotFound(id));
                }
            }
            None => {}
        }

        let outcome = job_repo::enqueue(&self.db, job_type, library_id, force)?;
        match outcome {
            EnqueueOutcome::Queued(id) => {
                info!("Queued {} job {} (library {:?}, force={})", job_type, id, library_id, force)
            }
            EnqueueOutcome::AlreadyQueued(id) => {
                debug!("{} for library {:?} already queued as job {}", job_type, library_id, id)
            }
        }
        Ok(outcome)
    }

    fn process_next(&self) -> Result<Tick, JobError> {
        let _running = self.running.lock().unwrap_or_else(|p| p.into_inner());

        let job = match job_repo::next_pending(&self.db) {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(Tick::Idle),
            Err(e) if e.is_contention() => return Ok(Tick::Busy),
            Err(e) => return Err(e.into()),
        };

        match job_repo::claim(&self.db, job.id) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Job {} was claimed elsewhere", job.id);
                return Ok(Tick::ClaimLost);
            }
            Err(e) if e.is_contention() => return Ok(Tick::Busy),
            Err(e) => return Err(e.into()),
        }

        let status = self.run_claimed(&job);
        Ok(Tick::Ran {
            job_id: job.id,
            status,
        })
    }

    /// Runs a claimed job to a terminal status. Handler errors and panics
    /// fail the job; they never escape.
    fn run_claimed(&self, job: &Job) -> JobStatus {
        let _span = info_span!("job", id = job.id, kind = %job.job_type, library_id = ?job.library_id)
            .entered();
        info!("Running {} job {}", job.job_type, job.id);

        let flag = job.library_id.map(|id| ScanningFlag::raise(&self.db, id));

        // Read before the scan writes it.
        let first_scan = match (job.job_type, job.library_id) {
            (JobType::Scan, Some(id)) => library_repo::find_by_id(&self.db, id)
                .ok()
                .flatten()
                .map(|lib| lib.last_scanned.is_none())
                .unwrap_or(true),
            _ => false,
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| self.handle(job)))
            .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(panic.as_ref()))));

        let (status, persisted) = match outcome {
            Ok(summary) => {
                let persisted =
                    self.finish(job.id, "complete", |db| job_repo::complete(db, job.id, &summary));
                info!("Job {} completed: {}", job.id, summary);
                (JobStatus::Completed, persisted)
            }
            Err(e) => {
                let message = e.to_string();
                let persisted =
                    self.finish(job.id, "fail", |db| job_repo::fail(db, job.id, &message));
                error!("Job {} failed: {}", job.id, message);
                (JobStatus::Failed, persisted)
            }
        };

        drop(flag);

        // Follow-up work only once the scan is recorded as completed.
        if job.job_type == JobType::Scan && status == JobStatus::Completed && persisted {
            if let Some(library_id) = job.library_id {
                self.chain_after_scan(library_id, job.force, first_scan);
            }
        }
        status
    }

    /// Writes a terminal status. Returns whether the row now holds it.
    fn finish<F>(&self, job_id: i64, action: &str, mut op: F) -> bool
    where
        F: FnMut(&Database) -> Result<bool, DatabaseError>,
    {
        let label = format!("{} job {}", action, job_id);
        match retry_on_contention(&label, RETRY_ATTEMPTS, RETRY_DELAY, || op(&self.db)) {
            Ok(true) => true,
            Ok(false) => {
                warn!("Job {} was no longer running; could not {}", job_id, action);
                false
            }
            Err(e) => {
                error!("Failed to {}: {}", label, e);
                false
            }
        }
    }

    fn chain_after_scan(&self, library_id: i64, force: bool, first_scan: bool) {
        if let Err(e) = self.enqueue(Some(library_id), JobType::Thumbnail, force) {
            error!("Failed to queue thumbnails for library {}: {}", library_id, e);
        }
        if first_scan {
            debug!("First scan of library {}; skipping cleanup", library_id);
        } else if let Err(e) = self.enqueue(Some(library_id), JobType::Cleanup, false) {
            error!("Failed to queue cleanup for library {}: {}", library_id, e);
        }
    }

    fn handle(&self, job: &Job) -> Result<serde_json::Value, JobError> {
        let summary = match job.job_type {
            JobType::Scan => {
                let library_id = job.library_id.ok_or(JobError::LibraryRequired(JobType::Scan))?;
                let library = library_repo::find_by_id(&self.db, library_id)?
                    .ok_or(JobError::LibraryNotFound(library_id))?;
                let stats = self.scanner.scan(&library, job.force)?;
                serde_json::to_value(stats)
            }
            JobType::Thumbnail => {
                let library_id = job
                    .library_id
                    .ok_or(JobError::LibraryRequired(JobType::Thumbnail))?;
                let stats = if self.settings.parallel_thumbnails {
                    self.thumbnails.process_missing_parallel(library_id, job.force)?
                } else {
                    self.thumbnails.process_missing(library_id, job.force)?
                };
                serde_json::to_value(stats)
            }
            JobType::Cleanup => {
                let stats = self.sweeper.cleanup_orphans(job.library_id)?;
                serde_json::to_value(stats)
            }
        };
        Ok(summary.map_err(DatabaseError::from)?)
    }
}
