//! Orphan sweep after metadata changes, and reading list descriptions.

mod common;

use comicshelf::db::entity_repo::{self, EntityKind};
use comicshelf::{DescriptionSeed, LibraryScanner, MaintenanceSweeper, ScanOptions};

use common::{CbzBuilder, ComicInfoBuilder, TestHarness};

#[test]
fn test_unreferenced_character_is_swept_and_referenced_one_kept() {
    let h = TestHarness::new();
    let archive = "Batman/Batman 001.cbz";
    h.add_comic(
        archive,
        CbzBuilder::new()
            .pages(1, [0, 0, 0])
            .comic_info(&ComicInfoBuilder::new().series("Batman").characters("Batman, Robin")),
    );
    let scanner = LibraryScanner::new(h.db.clone(), ScanOptions::default());
    scanner.scan(&h.library(), false).unwrap();

    h.add_comic(
        archive,
        CbzBuilder::new()
            .pages(1, [0, 0, 0])
            .comic_info(&ComicInfoBuilder::new().series("Batman").characters("Batman")),
    );
    scanner.scan(&h.library(), true).unwrap();
    assert_eq!(
        entity_repo::names(&h.db, EntityKind::Character).unwrap(),
        vec!["Batman".to_string(), "Robin".to_string()]
    );

    let stats = MaintenanceSweeper::new(h.db.clone())
        .cleanup_orphans(Some(h.library.id))
        .unwrap();
    assert_eq!(stats.characters, 1);
    assert_eq!(
        entity_repo::names(&h.db, EntityKind::Character).unwrap(),
        vec!["Batman".to_string()]
    );

    let again = MaintenanceSweeper::new(h.db.clone()).cleanup_orphans(None).unwrap();
    assert_eq!(again.total(), 0);
}

#[test]
fn test_pinned_entities_survive() {
    let h = TestHarness::new();
    h.db.with_conn(|conn| {
        entity_repo::get_or_create(conn, EntityKind::Team, "Justice League")?;
        entity_repo::get_or_create(conn, EntityKind::Team, "Teen Titans")?;
        Ok(())
    })
    .unwrap();
    assert!(entity_repo::set_pinned(&h.db, EntityKind::Team, "Justice League", true).unwrap());

    let stats = MaintenanceSweeper::new(h.db.clone()).cleanup_orphans(None).unwrap();
    assert_eq!(stats.teams, 1);
    assert_eq!(
        entity_repo::names(&h.db, EntityKind::Team).unwrap(),
        vec!["Justice League".to_string()]
    );
}

#[test]
fn test_scanned_story_arc_gets_seeded_description() {
    let h = TestHarness::new();
    h.add_comic(
        "Batman/Batman 492.cbz",
        CbzBuilder::new().pages(1, [0, 0, 0]).comic_info(
            &ComicInfoBuilder::new()
                .series("Batman")
                .field("StoryArc", "Knightfall"),
        ),
    );
    LibraryScanner::new(h.db.clone(), ScanOptions::default())
        .scan(&h.library(), false)
        .unwrap();

    let seed_path = h.temp_path().join("events.json");
    std::fs::write(&seed_path, r#"{ "The Knightfall": "Bane breaks the Bat." }"#).unwrap();
    let seed = DescriptionSeed::load(&seed_path).unwrap();

    let stats = MaintenanceSweeper::new(h.db.clone())
        .refresh_reading_list_descriptions(&seed)
        .unwrap();
    assert_eq!((stats.updated, stats.total_scanned), (1, 1));

    let description: Option<String> = h
        .db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT description FROM reading_lists WHERE name = 'Knightfall'",
                [],
                |r| r.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(description.as_deref(), Some("Bane breaks the Bat."));
}
