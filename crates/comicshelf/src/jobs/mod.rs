//! Persistent job queue and its serial worker.

pub mod job;
pub mod orchestrator;
pub mod retry;

pub use job::{EnqueueOutcome, Job, JobStatus, JobType};
pub use orchestrator::{JobOrchestrator, OrchestratorSettings, Tick, INTERRUPTED_MESSAGE};
