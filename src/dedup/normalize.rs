//! Text normalization and bigram extraction for finding comparison.

use std::collections::HashSet;

use super::parser::extract_table_field;

/// Field labels used in the finding tables emitted by review agents.
pub const FIELD_PRIORITY: &str = "Priority";
pub const FIELD_SUMMARY: &str = "指摘の概要";
pub const FIELD_LOCATION: &str = "該当箇所";

/// Characters whose runs collapse to a single space.
fn is_collapsible(c: char) -> bool {
    matches!(c, '|' | '/' | '\t' | '\n' | '\r' | ' ' | '・')
}

/// Markdown formatting characters stripped outright.
fn is_stripped(c: char) -> bool {
    matches!(c, '`' | '*' | '_')
}

/// Lowercase, strip markdown formatting, collapse separator runs to one
/// space, trim.
pub fn normalize_text(input: &str) -> String {
    let lowered = input.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for c in lowered.chars() {
        if is_stripped(c) {
            continue;
        }
        if is_collapsible(c) {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    out
}

/// Character-bigram set over the whitespace-removed text, packed as
/// `(a << 16) | b` over adjacent UTF-16 code units. Empty text yields an
/// empty set; a single code unit yields a singleton of itself.
pub fn bigram_set(normalized: &str) -> HashSet<u32> {
    let compact: Vec<u16> = normalized
        .chars()
        .filter(|c| *c != ' ')
        .collect::<String>()
        .encode_utf16()
        .collect();

    match compact.len() {
        0 => HashSet::new(),
        1 => HashSet::from([compact[0] as u32]),
        _ => compact
            .windows(2)
            .map(|pair| ((pair[0] as u32) << 16) | pair[1] as u32)
            .collect(),
    }
}

/// One finding reduced to comparable form: normalized fields plus their
/// bigram sets. Inert data; similarity decisions live elsewhere.
#[derive(Debug, Clone)]
pub struct NormalizedFinding {
    pub title: String,
    pub priority: String,
    pub summary: String,
    pub location: String,
    pub title_bigrams: HashSet<u32>,
    pub summary_bigrams: HashSet<u32>,
    pub location_bigrams: HashSet<u32>,
}

impl NormalizedFinding {
    pub fn new(raw_title: &str, raw_body: &str) -> Self {
        let title = normalize_text(raw_title);
        let priority = normalize_text(&extract_table_field(raw_body, FIELD_PRIORITY));
        let summary = normalize_text(&extract_table_field(raw_body, FIELD_SUMMARY));
        let location = normalize_text(&extract_table_field(raw_body, FIELD_LOCATION));

        let title_bigrams = bigram_set(&title);
        let summary_bigrams = bigram_set(&summary);
        let location_bigrams = bigram_set(&location);

        Self {
            title,
            priority,
            summary,
            location,
            title_bigrams,
            summary_bigrams,
            location_bigrams,
        }
    }

    /// First eight characters of the normalized title, the second index
    /// level after priority.
    pub fn title_prefix(&self) -> String {
        self.title.chars().take(8).collect()
    }
}
