//! Series/issue heuristics for archives that carry no `ComicInfo.xml`.

use std::sync::OnceLock;

use regex::Regex;

/// What a filename says about its comic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameInfo {
    pub series: String,
    pub number: Option<String>,
    pub volume: Option<i64>,
    pub year: Option<i32>,
}

fn bracketed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]|\{[^}]*\}").expect("valid regex"))
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d{4})\)").expect("valid regex"))
}

fn volume_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:v|vol\.?|volume)\s*(\d{1,4})\b").expect("valid regex"))
}

fn issue_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:#|\s)(\d+(?:\.\d+)?)(?:\s|$)").expect("valid regex"))
}

/// Strips leading zeros from an issue number, keeping at least one digit.
fn normalize_issue(raw: &str) -> String {
    let (whole, fraction) = match raw.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (raw, None),
    };
    let trimmed = whole.trim_start_matches('0');
    let whole = if trimmed.is_empty() { "0" } else { trimmed };
    match fraction {
        Some(f) => format!("{}.{}", whole, f),
        None => whole.to_string(),
    }
}

/// Parses a file stem such as `Batman v2 #013 (2012) (Digital)`.
///
/// The series is the text before the issue number (or the volume marker),
/// with bracketed groups removed and underscores read as spaces.
pub fn parse_filename(stem: &str) -> FilenameInfo {
    let year = year_re()
        .captures(stem)
        .and_then(|c| c[1].parse::<i32>().ok());

    let cleaned = bracketed().replace_all(stem, " ");
    let cleaned = cleaned.replace('_', " ");
    let cleaned = format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "));

    let mut cut = cleaned.len();
    let volume = volume_re().captures(&cleaned).and_then(|c| {
        let whole = c.get(0)?;
        cut = cut.min(whole.start());
        c[1].parse::<i64>().ok()
    });

    let number = issue_re()
        .captures_iter(&cleaned)
        .filter(|c| {
            // A volume marker's digits are not an issue number.
            let m = c.get(1).map(|m| m.start()).unwrap_or(0);
            volume_re()
                .find_iter(&cleaned)
                .all(|v| !(v.start() <= m && m < v.end()))
        })
        .last()
        .and_then(|c| {
            let m = c.get(1)?;
            if m.start() > 1 {
                cut = cut.min(c.get(0)?.start());
            }
            Some(normalize_issue(m.as_str()))
        });

    let series = cleaned[..cut]
        .trim()
        .trim_end_matches(['-', '#', ':'])
        .trim()
        .to_string();
    let series = if series.is_empty() {
        stem.trim().to_string()
    } else {
        series
    };

    FilenameInfo {
        series,
        number,
        volume,
        year,
    }
}
