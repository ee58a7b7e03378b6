use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;

use crate::error::MetadataError;

/// Flat attribute set decoded from a `ComicInfo.xml` document.
///
/// Only direct children of the root element are read; nested blocks such
/// as `<Pages>` are skipped. Every text field is also kept verbatim in
/// `fields` so nothing in the descriptor is lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComicInfo {
    pub series: Option<String>,
    pub number: Option<String>,
    pub volume: Option<i64>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub writer: Option<String>,
    pub penciller: Option<String>,
    pub inker: Option<String>,
    pub colorist: Option<String>,
    pub letterer: Option<String>,
    pub cover_artist: Option<String>,
    pub editor: Option<String>,
    pub publisher: Option<String>,
    /// Declared page count. The archive's real page list wins over this.
    pub page_count: Option<u32>,
    pub alternate_series: Option<String>,
    pub alternate_number: Option<String>,
    pub story_arc: Option<String>,
    pub series_group: Option<String>,
    pub characters: Option<String>,
    pub teams: Option<String>,
    pub locations: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl ComicInfo {
    fn from_fields(fields: BTreeMap<String, String>) -> Self {
        let text = |key: &str| fields.get(key).cloned();
        let number = |key: &str| fields.get(key).and_then(|v| v.parse().ok());

        Self {
            series: text("Series"),
            number: text("Number"),
            volume: number("Volume"),
            title: text("Title"),
            summary: text("Summary"),
            year: fields.get("Year").and_then(|v| v.parse().ok()),
            month: fields
                .get("Month")
                .and_then(|v| v.parse().ok())
                .filter(|m| (1..=12).contains(m)),
            writer: text("Writer"),
            penciller: text("Penciller"),
            inker: text("Inker"),
            colorist: text("Colorist"),
            letterer: text("Letterer"),
            cover_artist: text("CoverArtist"),
            editor: text("Editor"),
            publisher: text("Publisher"),
            page_count: number("PageCount").and_then(|n: i64| u32::try_from(n).ok()),
            alternate_series: text("AlternateSeries"),
            alternate_number: text("AlternateNumber"),
            story_arc: text("StoryArc"),
            series_group: text("SeriesGroup"),
            characters: text("Characters"),
            teams: text("Teams"),
            locations: text("Locations"),
            fields,
        }
    }

    /// Credit roles paired with their comma-separated name lists.
    pub fn credits(&self) -> Vec<(&'static str, &str)> {
        [
            ("writer", &self.writer),
            ("penciller", &self.penciller),
            ("inker", &self.inker),
            ("colorist", &self.colorist),
            ("letterer", &self.letterer),
            ("cover_artist", &self.cover_artist),
            ("editor", &self.editor),
        ]
        .into_iter()
        .filter_map(|(role, names)| names.as_deref().map(|n| (role, n)))
        .collect()
    }
}

/// Parses a `ComicInfo.xml` document.
pub fn parse_comic_info(xml: &[u8]) -> Result<ComicInfo, MetadataError> {
    let xml = std::str::from_utf8(xml)
        .map_err(|e| MetadataError::Parse(format!("descriptor is not UTF-8: {}", e)))?;
    let xml = xml.trim_start_matches('\u{feff}');

    // Untrimmed: entity references split text into several events, so
    // values are trimmed once, whole, at the closing tag.
    let mut reader = Reader::from_str(xml);

    let mut fields = BTreeMap::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut current: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                if depth == 1 {
                    saw_root = true;
                } else if depth == 2 {
                    current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    text.clear();
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    if let Some(name) = current.take() {
                        let value = text.trim();
                        if !value.is_empty() {
                            fields.insert(name, value.to_string());
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    saw_root = true;
                }
            }
            Ok(Event::Text(e)) => {
                if depth == 2 && current.is_some() {
                    let decoded = e
                        .decode()
                        .map_err(|err| MetadataError::Parse(err.to_string()))?;
                    text.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if depth == 2 && current.is_some() {
                    if let Ok(Some(ch)) = r.resolve_char_ref() {
                        text.push(ch);
                    } else {
                        let name = String::from_utf8_lossy(r.as_ref()).into_owned();
                        match quick_xml::escape::resolve_predefined_entity(&name) {
                            Some(value) => text.push_str(value),
                            None => {
                                return Err(MetadataError::Parse(format!(
                                    "unknown entity '&{};'",
                                    name
                                )))
                            }
                        }
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if depth == 2 && current.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(MetadataError::Parse(format!(
                    "XML error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
        }
    }

    if !saw_root {
        return Err(MetadataError::Parse("document has no root element".to_string()));
    }
    if depth != 0 {
        return Err(MetadataError::Parse("unexpected end of document".to_string()));
    }

    Ok(ComicInfo::from_fields(fields))
}

/// Splits a comma-separated name list, trimming and de-duplicating while
/// keeping first-seen order.
pub fn split_names(names: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !out.iter().any(|seen| seen == name) {
            out.push(name.to_string());
        }
    }
    out
}
