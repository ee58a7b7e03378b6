//! Shared utilities for comicshelf integration tests.
//!
//! - `TestHarness`: temp library root, cover cache and an on-disk catalog
//! - builders for CBZ archives with generated PNG pages and ComicInfo.xml

pub mod builders;
pub mod harness;

#[allow(unused_imports)]
pub use builders::*;
#[allow(unused_imports)]
pub use harness::TestHarness;
