//! Resolves raw candidate fields into canonical dates, locations and entities.
//!
//! Every registry lives for a single `normalize` call, so two documents never
//! share dedup state.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use super::extractor::{CandidateEvent, Provenance};
use super::ids::IdAssigner;
use crate::graph::{EntityRecord, LocationRecord, NodeKind};

/// Tried in order after RFC 3339. Each format only runs on input of its own
/// shape, since chrono lets a space in the format match no whitespace at all.
const DATE_FORMATS: &[(&str, &str)] = &[
    (r"^\d{4}-\d{1,2}-\d{1,2}$", "%Y-%m-%d"),
    (r"^[A-Za-z]+ \d{1,2}, \d{4}$", "%B %d, %Y"),
    (r"^[A-Za-z]+ \d{1,2} \d{4}$", "%B %d %Y"),
    (r"^\d{1,2} [A-Za-z]+ \d{4}$", "%d %B %Y"),
    (r"^\d{1,2}/\d{1,2}/\d{4}$", "%d/%m/%Y"),
    (r"^\d{1,2}-\d{1,2}-\d{4}$", "%d-%m-%Y"),
    (r"^\d{4}/\d{1,2}/\d{1,2}$", "%Y/%m/%d"),
];

const DERIVED_TITLE_CHARS: usize = 80;

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("ordinal pattern"));

static DATE_SHAPES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    DATE_FORMATS
        .iter()
        .map(|(shape, format)| (Regex::new(shape).expect("date shape pattern"), *format))
        .collect()
});

static SEPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bsept\b").expect("sept pattern"));

static PARTICIPANT_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:[,;]|\band\b|\bor\b)\s*").expect("participant separator pattern")
});

/// Parses a free-form absolute date. Relative or partial expressions yield `None`.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }

    let cleaned = ORDINAL_SUFFIX.replace_all(raw, "$1").replace('.', "");
    let cleaned = SEPT.replace_all(&cleaned, "Sep");
    let cleaned = collapse_whitespace(&cleaned);

    DATE_SHAPES
        .iter()
        .filter(|(shape, _)| shape.is_match(&cleaned))
        .find_map(|(_, format)| NaiveDate::parse_from_str(&cleaned, format).ok())
}

/// Trims, collapses inner whitespace and strips surrounding punctuation.
#[must_use]
pub fn clean_name(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    collapsed
        .trim_matches(|c: char| {
            c.is_whitespace()
                || matches!(
                    c,
                    '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' | '(' | ')' | '[' | ']' | '-'
                )
        })
        .to_string()
}

/// Splits a raw participant string on commas, semicolons and `and`/`or`.
#[must_use]
pub fn split_participants(raw: &str) -> Vec<String> {
    PARTICIPANT_SEPARATOR
        .split(raw)
        .map(clean_name)
        .filter(|name| !name.is_empty())
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dedup_key(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive exact-match registry for one node kind. The first
/// spelling seen becomes the canonical one.
#[derive(Debug)]
pub struct DedupRegistry {
    kind: NodeKind,
    index: HashMap<String, usize>,
    entries: Vec<(String, String)>,
}

impl DedupRegistry {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Returns the id for `raw`, allocating one the first time a name is seen.
    /// Blank names resolve to nothing.
    pub fn resolve(&mut self, raw: &str, ids: &mut IdAssigner) -> Option<String> {
        let name = clean_name(raw);
        if name.is_empty() {
            return None;
        }

        let key = dedup_key(&name);
        if let Some(&slot) = self.index.get(&key) {
            return Some(self.entries[slot].0.clone());
        }

        let id = ids.next(self.kind)?;
        self.index.insert(key, self.entries.len());
        self.entries.push((id.clone(), name));
        Some(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(id, canonical name)` pairs in first-seen order.
    pub fn into_entries(self) -> Vec<(String, String)> {
        self.entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub title: String,
    pub summary: String,
    pub date: Option<NaiveDate>,
    pub location_id: Option<String>,
    pub participant_ids: Vec<String>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationOutput {
    pub events: Vec<NormalizedEvent>,
    pub locations: Vec<LocationRecord>,
    pub entities: Vec<EntityRecord>,
}

impl NormalizationOutput {
    #[must_use]
    pub fn dated_event_count(&self) -> usize {
        self.events.iter().filter(|e| e.date.is_some()).count()
    }
}

#[derive(Debug, Default)]
pub struct Normalizer;

impl Normalizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        candidates: Vec<CandidateEvent>,
        ids: &mut IdAssigner,
    ) -> NormalizationOutput {
        let mut locations = DedupRegistry::new(NodeKind::Location);
        let mut entities = DedupRegistry::new(NodeKind::Entity);
        let mut events: Vec<NormalizedEvent> = Vec::with_capacity(candidates.len());
        let mut seen: HashMap<(String, String, Option<NaiveDate>), usize> = HashMap::new();

        for candidate in candidates {
            let Some((title, summary)) = event_text(&candidate.title, &candidate.summary) else {
                debug!("Dropping candidate with blank title and summary");
                continue;
            };

            let date = candidate.raw_date.as_deref().and_then(|raw| {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    debug!(raw, "Unresolvable date dropped");
                }
                parsed
            });

            let key = (dedup_key(&title), dedup_key(&summary), date);
            let slot = match seen.get(&key) {
                Some(&slot) => slot,
                None => {
                    seen.insert(key, events.len());
                    events.push(NormalizedEvent {
                        title,
                        summary,
                        date,
                        location_id: None,
                        participant_ids: Vec::new(),
                        provenance: candidate.provenance,
                    });
                    events.len() - 1
                }
            };
            let event = &mut events[slot];

            if event.location_id.is_none() {
                event.location_id = candidate
                    .raw_location
                    .as_deref()
                    .and_then(|raw| locations.resolve(raw, ids));
            }

            for raw in &candidate.raw_participants {
                for name in split_participants(raw) {
                    if let Some(id) = entities.resolve(&name, ids) {
                        if !event.participant_ids.contains(&id) {
                            event.participant_ids.push(id);
                        }
                    }
                }
            }
        }

        debug!(
            events = events.len(),
            locations = locations.len(),
            entities = entities.len(),
            "Normalization complete"
        );

        NormalizationOutput {
            events,
            locations: locations
                .into_entries()
                .into_iter()
                .map(|(id, address)| LocationRecord { id, address })
                .collect(),
            entities: entities
                .into_entries()
                .into_iter()
                .map(|(id, name)| EntityRecord { id, name })
                .collect(),
        }
    }
}

/// Trimmed `(title, summary)`; either one stands in for the other when blank.
fn event_text(title: &str, summary: &str) -> Option<(String, String)> {
    let title = collapse_whitespace(title);
    let summary = collapse_whitespace(summary);

    match (title.is_empty(), summary.is_empty()) {
        (true, true) => None,
        (false, true) => Some((title.clone(), title)),
        (true, false) => Some((derive_title(&summary), summary)),
        (false, false) => Some((title, summary)),
    }
}

fn derive_title(summary: &str) -> String {
    match summary.char_indices().nth(DERIVED_TITLE_CHARS) {
        Some((cut, _)) => format!("{}...", summary[..cut].trim_end()),
        None => summary.to_string(),
    }
}
