//! Natural ordering for archive member names.
//!
//! Names are lowercased, `-` and `_` are demoted below every letter and
//! digit, and the result is split into alternating text and digit runs.
//! Digit runs compare by numeric value, text runs compare lexically.

use std::cmp::Ordering;

/// Sort key for separators; above every letter and digit.
const SEPARATOR_KEY: char = char::MAX;

#[derive(Debug, PartialEq, Eq)]
enum Run {
    Text(Vec<char>),
    /// Digits with leading zeros removed, plus the original run length.
    Number(String, usize),
}

impl Ord for Run {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Run::Text(a), Run::Text(b)) => a.cmp(b),
            (Run::Number(a, a_len), Run::Number(b, b_len)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                // "01" after "1" so equal values still order deterministically.
                .then_with(|| a_len.cmp(b_len)),
            (Run::Number(..), Run::Text(_)) => Ordering::Less,
            (Run::Text(_), Run::Number(..)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Run {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn sort_char(c: char) -> char {
    match c {
        '-' | '_' => SEPARATOR_KEY,
        other => other,
    }
}

/// Splits a name into runs. The first run is always text (possibly empty),
/// so runs at the same position always have the same kind.
fn runs(name: &str) -> Vec<Run> {
    let lowered = name.to_lowercase();
    let mut out = Vec::new();
    let mut text = Vec::new();
    let mut digits = String::new();

    for c in lowered.chars() {
        if c.is_ascii_digit() {
            if digits.is_empty() {
                out.push(Run::Text(std::mem::take(&mut text)));
            }
            digits.push(c);
        } else {
            if !digits.is_empty() {
                out.push(number_run(std::mem::take(&mut digits)));
            }
            text.push(sort_char(c));
        }
    }

    if !digits.is_empty() {
        out.push(number_run(digits));
    } else {
        out.push(Run::Text(text));
    }
    out
}

fn number_run(digits: String) -> Run {
    let len = digits.len();
    let stripped = digits.trim_start_matches('0');
    let value = if stripped.is_empty() { "0" } else { stripped };
    Run::Number(value.to_string(), len)
}

/// Compares two names in natural order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    runs(a).cmp(&runs(b)).then_with(|| a.cmp(b))
}

/// Sorts names in natural order, computing each key once.
pub fn natural_sort(names: &mut [String]) {
    names.sort_by_cached_key(|name| (runs(name), name.clone()));
}
