//! Orphan sweep for derived metadata, and reading-list descriptions from a
//! curated seed file.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;
use tracing::info_span;

use crate::db::entity_repo::{self, EntityKind};
use crate::db::{comic_repo, Database, DatabaseError};
use crate::error::ConfigError;

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub characters: usize,
    pub teams: usize,
    pub locations: usize,
    pub people: usize,
    pub empty_lists: usize,
    pub empty_collections: usize,
    pub empty_volumes: usize,
    pub empty_series: usize,
}

impl CleanupStats {
    pub fn total(&self) -> usize {
        self.characters
            + self.teams
            + self.locations
            + self.people
            + self.empty_lists
            + self.empty_collections
            + self.empty_volumes
            + self.empty_series
    }
}

/// Outcome of a description refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DescriptionStats {
    pub updated: usize,
    pub total_scanned: usize,
}

/// Descriptions for story arcs and events, keyed by normalized name.
///
/// The seed file is a flat JSON object of `"name": "description"` pairs.
#[derive(Debug, Clone, Default)]
pub struct DescriptionSeed {
    entries: HashMap<String, String>,
}

impl DescriptionSeed {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, String> = serde_json::from_str(content)?;
        let entries = raw
            .into_iter()
            .map(|(name, description)| (normalize_list_name(&name), description))
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, list_name: &str) -> Option<&str> {
        self.entries
            .get(&normalize_list_name(list_name))
            .map(String::as_str)
    }
}

/// Matching key for list names: lowercased, a leading "the " dropped, and
/// everything but ASCII letters, digits and whitespace removed.
pub fn normalize_list_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let rest = lower.strip_prefix("the ").unwrap_or(&lower);
    rest.chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

pub struct MaintenanceSweeper {
    db: Database,
}

impl MaintenanceSweeper {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Deletes unpinned entities nothing references, auto-generated
    /// containers with no items, and empty volumes and series.
    ///
    /// `library_id` limits the volume/series sweep to one library. Entities
    /// are shared across libraries, so their sweep is always global.
    pub fn cleanup_orphans(&self, library_id: Option<i64>) -> Result<CleanupStats, DatabaseError> {
        let _span = info_span!("cleanup", library_id = ?library_id).entered();

        let stats = self.db.with_transaction(|tx| {
            let mut stats = CleanupStats::default();
            for kind in EntityKind::ALL {
                let deleted = entity_repo::delete_orphans(tx, kind)?;
                match kind {
                    EntityKind::Character => stats.characters = deleted,
                    EntityKind::Team => stats.teams = deleted,
                    EntityKind::Location => stats.locations = deleted,
                    EntityKind::Person => stats.people = deleted,
                }
            }
            stats.empty_lists = entity_repo::delete_empty_reading_lists(tx)?;
            stats.empty_collections = entity_repo::delete_empty_collections(tx)?;

            let (volumes, series) = comic_repo::prune_empty_groups(tx, library_id)?;
            stats.empty_volumes = volumes;
            stats.empty_series = series;
            Ok(stats)
        })?;

        info!(
            "Cleanup removed {} rows ({} people, {} characters, {} teams, {} locations, {} lists, {} collections)",
            stats.total(),
            stats.people,
            stats.characters,
            stats.teams,
            stats.locations,
            stats.empty_lists,
            stats.empty_collections
        );
        Ok(stats)
    }

    /// Fills in descriptions of auto-generated reading lists from `seed`.
    ///
    /// Lists the seed does not know keep their description. A seed entry
    /// overwrites an existing description that differs from it.
    pub fn refresh_reading_list_descriptions(
        &self,
        seed: &DescriptionSeed,
    ) -> Result<DescriptionStats, DatabaseError> {
        let _span = info_span!("describe_lists", seed_entries = seed.len()).entered();

        let stats = self.db.with_transaction(|tx| {
            let lists = entity_repo::generated_reading_lists(tx)?;
            let mut stats = DescriptionStats {
                total_scanned: lists.len(),
                ..Default::default()
            };
            for list in lists {
                let Some(description) = seed.get(&list.name) else {
                    continue;
                };
                if list.description.as_deref() != Some(description) {
                    debug!("Describing reading list '{}'", list.name);
                    entity_repo::set_reading_list_description(tx, list.id, description)?;
                    stats.updated += 1;
                }
            }
            Ok(stats)
        })?;

        info!(
            "Updated {} of {} reading list descriptions",
            stats.updated, stats.total_scanned
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::comic_repo::ComicRecord;
    use crate::db::library_repo;

    #[test]
    fn test_empty_catalog() {
        let sweeper = MaintenanceSweeper::new(Database::open_in_memory().unwrap());
        assert_eq!(sweeper.cleanup_orphans(None).unwrap(), CleanupStats::default());
    }

    #[test]
    fn test_sweep_counts_each_kind() {
        let db = Database::open_in_memory().unwrap();
        let lib = library_repo::ensure(&db, "Comics", "/c").unwrap();
        let comic = db
            .with_transaction(|tx| {
                comic_repo::upsert(
                    tx,
                    &ComicRecord {
                        library_id: lib.id,
                        file_path: "/c/a.cbz".to_string(),
                        filename: "a.cbz".to_string(),
                        series: "Saga".to_string(),
                        volume: 1,
                        ..Default::default()
                    },
                )
            })
            .unwrap()
            .id();

        db.with_transaction(|tx| {
            entity_repo::replace_credits(tx, comic, &[("writer", vec!["Kept".to_string()])])?;
            entity_repo::get_or_create(tx, EntityKind::Person, "Gone")?;
            entity_repo::get_or_create(tx, EntityKind::Team, "Gone Team")?;
            entity_repo::get_or_create(tx, EntityKind::Location, "Gone Place")?;
            entity_repo::replace_containers(tx, comic, &[], &["Kept Group".to_string()])?;
            tx.execute(
                "INSERT INTO collections (name, auto_generated) VALUES ('Empty Auto', 1), ('Empty Manual', 0)",
                [],
            )?;
            tx.execute(
                "INSERT INTO series (library_id, name) VALUES (?1, 'Hollow')",
                rusqlite::params![lib.id],
            )?;
            Ok(())
        })
        .unwrap();

        let stats = MaintenanceSweeper::new(db.clone())
            .cleanup_orphans(Some(lib.id))
            .unwrap();
        assert_eq!(stats.people, 1);
        assert_eq!(stats.teams, 1);
        assert_eq!(stats.locations, 1);
        assert_eq!(stats.characters, 0);
        assert_eq!(stats.empty_collections, 1);
        assert_eq!(stats.empty_series, 1);
        assert_eq!(stats.total(), 5);

        assert_eq!(
            entity_repo::names(&db, EntityKind::Person).unwrap(),
            vec!["Kept"]
        );
    }

    #[test]
    fn test_list_names_normalize_for_matching() {
        assert_eq!(normalize_list_name("The Infinity Gauntlet"), "infinity gauntlet");
        assert_eq!(normalize_list_name("Knightfall: Part 1!"), "knightfall part 1");
        assert_eq!(normalize_list_name("  Theatre  "), "theatre");
        assert_eq!(normalize_list_name("the"), "the");
    }

    #[test]
    fn test_seed_rejects_non_object() {
        assert!(matches!(
            DescriptionSeed::from_json_str("[1, 2]"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    fn test_refresh_describes_only_known_generated_lists() {
        let db = Database::open_in_memory().unwrap();
        db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO reading_lists (name, auto_generated, description) VALUES
                   ('Infinity Gauntlet', 1, NULL),
                   ('Knightfall', 1, 'Bane breaks the Bat.'),
                   ('Unknown Arc', 1, NULL),
                   ('The Infinity Gauntlet', 0, NULL)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let seed = DescriptionSeed::from_json_str(
            r#"{
                "the infinity gauntlet": "Thanos gathers the gems.",
                "Knightfall": "Bane breaks the Bat."
            }"#,
        )
        .unwrap();
        let sweeper = MaintenanceSweeper::new(db.clone());

        let stats = sweeper.refresh_reading_list_descriptions(&seed).unwrap();
        assert_eq!(
            stats,
            DescriptionStats {
                updated: 1,
                total_scanned: 3
            }
        );

        let descriptions: Vec<(String, Option<String>)> = db
            .with_conn(|conn| {
                let mut stmt =
                    conn.prepare("SELECT name, description FROM reading_lists ORDER BY id")?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .unwrap();
        assert_eq!(
            descriptions[0].1.as_deref(),
            Some("Thanos gathers the gems.")
        );
        assert_eq!(descriptions[2].1, None);
        // Hand-made lists are left alone.
        assert_eq!(descriptions[3].1, None);

        // Nothing left to change on a second pass.
        let again = sweeper.refresh_reading_list_descriptions(&seed).unwrap();
        assert_eq!(again.updated, 0);
    }
}
