use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of work a job performs.
///
/// Declaration order is the claim priority: scans before thumbnails before
/// cleanups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Scan,
    Thumbnail,
    Cleanup,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Scan => "scan",
            JobType::Thumbnail => "thumbnail",
            JobType::Cleanup => "cleanup",
        }
    }

    /// Whether a job of this type may run without a library.
    pub fn allows_global_scope(&self) -> bool {
        matches!(self, JobType::Cleanup)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(JobType::Scan),
            "thumbnail" => Ok(JobType::Thumbnail),
            "cleanup" => Ok(JobType::Cleanup),
            other => Err(format!("unknown job type '{}'", other)),
        }
    }
}

/// Lifecycle state of a job. Transitions only move forward:
/// `Pending -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// A persisted work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    /// `None` means global scope (cleanup only).
    pub library_id: Option<i64>,
    pub force: bool,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// Handler counters, as JSON.
    pub result_summary: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "job_id", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Queued(i64),
    AlreadyQueued(i64),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> i64 {
        match self {
            EnqueueOutcome::Queued(id) | EnqueueOutcome::AlreadyQueued(id) => *id,
        }
    }

    pub fn was_queued(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trips_through_str() {
        for t in [JobType::Scan, JobType::Thumbnail, JobType::Cleanup] {
            assert_eq!(t.as_str().parse::<JobType>().unwrap(), t);
        }
        assert!("backup".parse::<JobType>().is_err());
    }

    #[test]
    fn test_job_type_priority_order() {
        let mut types = vec![JobType::Cleanup, JobType::Scan, JobType::Thumbnail];
        types.sort();
        assert_eq!(types, vec![JobType::Scan, JobType::Thumbnail, JobType::Cleanup]);
    }

    #[test]
    fn test_only_cleanup_is_global() {
        assert!(JobType::Cleanup.allows_global_scope());
        assert!(!JobType::Scan.allows_global_scope());
        assert!(!JobType::Thumbnail.allows_global_scope());
    }

    #[test]
    fn test_status_flags() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_enqueue_outcome_serializes_tagged() {
        let json = serde_json::to_value(EnqueueOutcome::AlreadyQueued(7)).unwrap();
        assert_eq!(json["status"], "already_queued");
        assert_eq!(json["job_id"], 7);
        assert_eq!(EnqueueOutcome::Queued(3).job_id(), 3);
        assert!(EnqueueOutcome::Queued(3).was_queued());
    }
}
