use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComicshelfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Thumbnail error: {0}")]
    Thumbnail(#[from] ThumbnailError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive file missing: {0}")]
    FileMissing(PathBuf),

    #[error("Failed to open archive '{path}': {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Archive member not found: {0}")]
    MemberNotFound(String),

    #[error("Failed to read '{name}' from archive: {reason}")]
    Read { name: String, reason: String },

    #[error("External tool '{tool}' failed: {reason}")]
    ToolFailed { tool: String, reason: String },
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to parse ComicInfo.xml: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Library root '{0}' does not exist or is not a directory")]
    RootMissing(PathBuf),

    #[error("Directory walk failed under '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read file metadata for '{path}': {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Archive has no pages: {0}")]
    NoPages(PathBuf),

    #[error("Failed to process image: {0}")]
    ImageProcessing(String),

    #[error("Failed to encode thumbnail: {0}")]
    Encode(String),

    #[error("Failed to write thumbnail '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("{0} jobs require a library")]
    LibraryRequired(crate::jobs::JobType),

    #[error("Library {0} not found")]
    LibraryNotFound(i64),

    #[error("Orchestrator is already running")]
    AlreadyStarted,

    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(String),

    #[error("Job handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, ComicshelfError>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
