//! Derived metadata: people and their credits, tags (characters, teams,
//! locations), and the auto-generated reading lists and collections.

use rusqlite::{params, Connection};

use super::{Database, DatabaseError};

/// Entities that hang off catalog entries by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Person,
    Character,
    Team,
    Location,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Character,
        EntityKind::Team,
        EntityKind::Location,
        EntityKind::Person,
    ];

    fn table(self) -> &'static str {
        match self {
            EntityKind::Person => "people",
            EntityKind::Character => "characters",
            EntityKind::Team => "teams",
            EntityKind::Location => "locations",
        }
    }

    /// Join table and its foreign key column.
    fn link(self) -> (&'static str, &'static str) {
        match self {
            EntityKind::Person => ("comic_credits", "person_id"),
            EntityKind::Character => ("comic_characters", "character_id"),
            EntityKind::Team => ("comic_teams", "team_id"),
            EntityKind::Location => ("comic_locations", "location_id"),
        }
    }
}

/// Returns the id of the entity named `name`, creating it if needed.
pub fn get_or_create(conn: &Connection, kind: EntityKind, name: &str) -> Result<i64, DatabaseError> {
    let table = kind.table();
    conn.execute(
        &format!("INSERT OR IGNORE INTO {} (name) VALUES (?1)", table),
        params![name],
    )?;
    Ok(conn.query_row(
        &format!("SELECT id FROM {} WHERE name = ?1", table),
        params![name],
        |r| r.get(0),
    )?)
}

/// Replaces every credit of a comic. `credits` pairs a role with its names.
pub fn replace_credits(
    conn: &Connection,
    comic_id: i64,
    credits: &[(&str, Vec<String>)],
) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM comic_credits WHERE comic_id = ?1", params![comic_id])?;
    for (role, names) in credits {
        for name in names {
            let person_id = get_or_create(conn, EntityKind::Person, name)?;
            conn.execute(
                "INSERT OR IGNORE INTO comic_credits (comic_id, person_id, role)
                 VALUES (?1, ?2, ?3)",
                params![comic_id, person_id, role],
            )?;
        }
    }
    Ok(())
}

/// Replaces a comic's characters, teams or locations.
pub fn replace_tags(
    conn: &Connection,
    kind: EntityKind,
    comic_id: i64,
    names: &[String],
) -> Result<(), DatabaseError> {
    let (link, column) = kind.link();
    conn.execute(
        &format!("DELETE FROM {} WHERE comic_id = ?1", link),
        params![comic_id],
    )?;
    for name in names {
        let id = get_or_create(conn, kind, name)?;
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (comic_id, {}) VALUES (?1, ?2)",
                link, column
            ),
            params![comic_id, id],
        )?;
    }
    Ok(())
}

/// A reading list membership derived from metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub list: String,
    pub position: Option<String>,
}

/// Rebuilds a comic's membership in auto-generated reading lists and
/// collections. Membership in hand-made containers is left alone.
pub fn replace_containers(
    conn: &Connection,
    comic_id: i64,
    lists: &[ListEntry],
    collections: &[String],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM reading_list_items WHERE comic_id = ?1
           AND reading_list_id IN (SELECT id FROM reading_lists WHERE auto_generated = 1)",
        params![comic_id],
    )?;
    conn.execute(
        "DELETE FROM collection_items WHERE comic_id = ?1
           AND collection_id IN (SELECT id FROM collections WHERE auto_generated = 1)",
        params![comic_id],
    )?;

    for entry in lists {
        conn.execute(
            "INSERT OR IGNORE INTO reading_lists (name, auto_generated) VALUES (?1, 1)",
            params![entry.list],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO reading_list_items (reading_list_id, comic_id, position)
             SELECT id, ?2, ?3 FROM reading_lists WHERE name = ?1",
            params![entry.list, comic_id, entry.position],
        )?;
    }

    for name in collections {
        conn.execute(
            "INSERT OR IGNORE INTO collections (name, auto_generated) VALUES (?1, 1)",
            params![name],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO collection_items (collection_id, comic_id)
             SELECT id, ?2 FROM collections WHERE name = ?1",
            params![name, comic_id],
        )?;
    }
    Ok(())
}

/// Deletes unpinned entities of `kind` that no comic references.
pub fn delete_orphans(conn: &Connection, kind: EntityKind) -> Result<usize, DatabaseError> {
    let table = kind.table();
    let (link, column) = kind.link();
    Ok(conn.execute(
        &format!(
            "DELETE FROM {table} WHERE pinned = 0
               AND NOT EXISTS (SELECT 1 FROM {link} l WHERE l.{column} = {table}.id)"
        ),
        [],
    )?)
}

/// Deletes auto-generated reading lists that have no items.
pub fn delete_empty_reading_lists(conn: &Connection) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM reading_lists WHERE auto_generated = 1
           AND NOT EXISTS (SELECT 1 FROM reading_list_items i WHERE i.reading_list_id = reading_lists.id)",
        [],
    )?)
}

/// Deletes auto-generated collections that have no items.
pub fn delete_empty_collections(conn: &Connection) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM collections WHERE auto_generated = 1
           AND NOT EXISTS (SELECT 1 FROM collection_items i WHERE i.collection_id = collections.id)",
        [],
    )?)
}

/// An auto-generated reading list and its current description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedList {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Every auto-generated reading list, by name.
pub fn generated_reading_lists(conn: &Connection) -> Result<Vec<GeneratedList>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description FROM reading_lists WHERE auto_generated = 1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(GeneratedList {
                id: r.get(0)?,
                name: r.get(1)?,
                description: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_reading_list_description(
    conn: &Connection,
    list_id: i64,
    description: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE reading_lists SET description = ?2 WHERE id = ?1",
        params![list_id, description],
    )?;
    Ok(())
}

/// Pins or unpins an entity so the orphan sweep keeps it. Returns false if
/// no entity has that name.
pub fn set_pinned(
    db: &Database,
    kind: EntityKind,
    name: &str,
    pinned: bool,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let updated = conn.execute(
            &format!("UPDATE {} SET pinned = ?2 WHERE name = ?1", kind.table()),
            params![name, pinned],
        )?;
        Ok(updated == 1)
    })
}

/// Names of every entity of `kind`, sorted.
pub fn names(db: &Database, kind: EntityKind) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT name FROM {} ORDER BY name", kind.table()))?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    })
}
