use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive::ToolPaths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub cover_directory: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryConfig>,
    #[serde(default = "default_extensions")]
    pub supported_extensions: Vec<String>,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    /// JSON object mapping story arc names to descriptions.
    #[serde(default)]
    pub reading_list_descriptions: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            cover_directory: None,
            libraries: Vec::new(),
            supported_extensions: default_extensions(),
            thumbnail: ThumbnailConfig::default(),
            tools: ToolsConfig::default(),
            worker: WorkerConfig::default(),
            reading_list_descriptions: None,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["cbz".to_string(), "cbr".to_string(), "cb7".to_string()]
}

/// A scan root registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_quality")]
    pub quality: f32,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_max_width() -> u32 {
    320
}

fn default_max_height() -> u32 {
    455
}

fn default_quality() -> f32 {
    85.0
}

fn default_workers() -> usize {
    num_cpus::get()
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            quality: default_quality(),
            parallel: false,
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_unrar")]
    pub unrar_path: String,
    #[serde(default = "default_sevenzip")]
    pub sevenzip_path: String,
}

fn default_unrar() -> String {
    "unrar".to_string()
}

fn default_sevenzip() -> String {
    "7z".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            unrar_path: default_unrar(),
            sevenzip_path: default_sevenzip(),
        }
    }
}

impl ToolsConfig {
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            unrar: PathBuf::from(&self.unrar_path),
            sevenzip: PathBuf::from(&self.sevenzip_path),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
