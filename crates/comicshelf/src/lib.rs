pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod maintenance;
pub mod metadata;
pub mod scanner;
pub mod thumbnail;

pub use archive::{ArchiveFormat, ComicArchive, ToolPaths};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{
    ArchiveError, ComicshelfError, ConfigError, JobError, MetadataError, Result, ScanError,
    ThumbnailError,
};
pub use jobs::{EnqueueOutcome, Job, JobOrchestrator, JobStatus, JobType, OrchestratorSettings};
pub use maintenance::{CleanupStats, DescriptionSeed, DescriptionStats, MaintenanceSweeper};
pub use scanner::{LibraryScanner, ScanOptions, ScanStats};
pub use thumbnail::{ThumbnailOptions, ThumbnailService, ThumbnailStats};
