use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::schema::Config;
use crate::db::library_repo::{self, Library};
use crate::db::Database;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;
    normalize(&mut config);

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let mut names = HashSet::new();
    let mut paths = HashSet::new();
    for library in &config.libraries {
        if !names.insert(library.name.as_str()) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate library name: {}", library.name),
            });
        }
        if !paths.insert(library.path.as_str()) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate library path: {}", library.path),
            });
        }
    }

    Ok(())
}

/// Lowercases extensions, strips leading dots and expands `~/` in paths.
fn normalize(config: &mut Config) {
    for ext in &mut config.supported_extensions {
        *ext = ext.trim_start_matches('.').to_ascii_lowercase();
    }
    config.database_path = config.database_path.as_deref().map(expand_home);
    config.cover_directory = config.cover_directory.as_deref().map(expand_home);
    config.reading_list_descriptions = config
        .reading_list_descriptions
        .as_deref()
        .map(expand_home);
    for library in &mut config.libraries {
        library.path = expand_home(&library.path);
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}

impl Config {
    /// Catalog file: the configured path or `~/.comicshelf/data/comicshelf.db`.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
            .unwrap_or_else(|| PathBuf::from("comicshelf.db"))
    }

    /// Cover cache: the configured directory or `~/.comicshelf/covers`.
    pub fn resolved_cover_directory(&self) -> PathBuf {
        self.cover_directory
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".comicshelf").join("covers")))
            .unwrap_or_else(|| PathBuf::from("covers"))
    }

    /// Opens the catalog and registers every configured library in it.
    pub fn open_catalog(&self) -> crate::Result<(Database, Vec<Library>)> {
        let db = Database::open(&self.resolved_database_path())?;

        let mut libraries = Vec::with_capacity(self.libraries.len());
        for lib in &self.libraries {
            let library = library_repo::ensure(&db, &lib.name, &lib.path)?;
            info!("Library '{}' -> {} (id {})", library.name, library.path, library.id);
            libraries.push(library);
        }
        Ok((db, libraries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert!(config.libraries.is_empty());
        assert_eq!(config.supported_extensions, vec!["cbz", "cbr", "cb7"]);
        assert_eq!(config.thumbnail.max_width, 320);
        assert_eq!(config.thumbnail.max_height, 455);
        assert_eq!(config.thumbnail.quality, 85.0);
        assert!(!config.thumbnail.parallel);
        assert!(config.thumbnail.workers >= 1);
        assert_eq!(config.tools.unrar_path, "unrar");
        assert_eq!(config.tools.sevenzip_path, "7z");
        assert_eq!(config.worker.poll_interval_ms, 2000);
        assert!(config
            .resolved_database_path()
            .ends_with("comicshelf.db"));
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "version": "1.0",
            "database_path": "/var/lib/comicshelf/catalog.db",
            "cover_directory": "/var/cache/comicshelf",
            "libraries": [
                { "name": "Comics", "path": "/srv/comics" },
                { "name": "Manga", "path": "/srv/manga" }
            ],
            "supported_extensions": [".CBZ", "cbr"],
            "thumbnail": { "max_width": 200, "parallel": true, "workers": 3 },
            "tools": { "unrar_path": "/opt/bin/unrar" },
            "worker": { "poll_interval_ms": 500 },
            "reading_list_descriptions": "/etc/comicshelf/events.json"
        }"#;
        let config = load_config_from_str(json).unwrap();

        assert_eq!(config.libraries.len(), 2);
        assert_eq!(config.supported_extensions, vec!["cbz", "cbr"]);
        assert_eq!(config.thumbnail.max_width, 200);
        assert_eq!(config.thumbnail.max_height, 455);
        assert_eq!(config.thumbnail.workers, 3);
        assert_eq!(
            config.tools.tool_paths().unrar,
            PathBuf::from("/opt/bin/unrar")
        );
        assert_eq!(config.worker.poll_interval().as_millis(), 500);
        assert_eq!(
            config.reading_list_descriptions.as_deref(),
            Some("/etc/comicshelf/events.json")
        );
        assert_eq!(
            config.resolved_database_path(),
            PathBuf::from("/var/lib/comicshelf/catalog.db")
        );
        assert_eq!(
            config.resolved_cover_directory(),
            PathBuf::from("/var/cache/comicshelf")
        );
    }

    #[test]
    fn test_open_catalog_registers_libraries_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = load_config_from_str(
            r#"{ "version": "1.0", "libraries": [{ "name": "Comics", "path": "/srv/comics" }] }"#,
        )
        .unwrap();
        config.database_path = Some(dir.path().join("catalog.db").to_string_lossy().into_owned());

        let (_, first) = config.open_catalog().unwrap();
        let (db, second) = config.open_catalog().unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(
            library_repo::find_by_name_or_path(&db, "/srv/comics")
                .unwrap()
                .map(|lib| lib.name),
            Some("Comics".to_string())
        );
    }

    #[test]
    fn test_wrong_version_rejected() {
        let err = load_config_from_str(r#"{ "version": "2.0" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_schema_rejects_unknown_keys_and_bad_values() {
        let err = load_config_from_str(r#"{ "version": "1.0", "colour": "red" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));

        let err = load_config_from_str(r#"{ "version": "1.0", "thumbnail": { "quality": 150 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));

        let err = load_config_from_str(r#"{ "libraries": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_duplicate_libraries_rejected() {
        let json = r#"{
            "version": "1.0",
            "libraries": [
                { "name": "Comics", "path": "/a" },
                { "name": "Comics", "path": "/b" }
            ]
        }"#;
        assert!(matches!(
            load_config_from_str(json),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            load_config_from_str("{ not json"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comicshelf.json");
        std::fs::write(&path, r#"{ "version": "1.0" }"#).unwrap();
        assert!(load_config(&path).is_ok());

        let missing = load_config(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::ReadFile { .. }));
    }
}
