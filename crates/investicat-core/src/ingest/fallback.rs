//! Deterministic keyword-driven event extraction. Makes no external calls and
//! cannot fail: anything it cannot resolve is left empty.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::extractor::{
    CandidateEvent, ExtractionResult, ExtractionStrategy, Extractor, Provenance,
};
use super::parser::ParsedDocument;
use super::passage::Passage;
use crate::config::FallbackConfig;

static EVENT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)\b(?:
            meet|meets|meeting|meetings|met
            | transactions?
            | announce|announced|announces|announcements?
            | approve|approved|approves|approving|approvals?
            | sign|signs|signed|signing|signings
            | filed|filing|filings
            | investigate|investigated|investigates|investigating|investigations?
            | ruled|ruling|rulings
            | decide|decided|decides|decisions?
            | contracts?|contracted
            | agree|agreed|agrees|agreements?
            | merge|merged|merges|merging|mergers?
            | acquire|acquired|acquires|acquisitions?
            | completed|finali[sz]ed|reported|deals?
        )\b",
    )
    .expect("event keyword pattern")
});

static ABSOLUTE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \b(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?
            |Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)
            \.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}\b
        | \b\d{4}-\d{2}-\d{2}\b
        | \b\d{1,2}/\d{1,2}/\d{4}\b",
    )
    .expect("absolute date pattern")
});

static LOCATION_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:in|at|near)\s+([A-Z][A-Za-z0-9'&-]*(?:\s+(?:of\s+)?[A-Z][A-Za-z0-9'&-]*)*)")
        .expect("location pattern")
});

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank line pattern"));

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Za-z'&-]*").expect("capitalized word pattern"));

const STOPWORDS: &[&str] = &[
    "A", "After", "An", "And", "As", "At", "Before", "But", "By", "During", "Following", "For",
    "From", "He", "Her", "His", "However", "I", "In", "It", "Its", "Meanwhile", "Near", "Of", "On",
    "Our", "She", "That", "The", "Their", "These", "They", "This", "Those", "To", "Today", "We",
    "When", "While", "With", "Yesterday",
];

const CALENDAR_WORDS: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December", "Jan", "Feb", "Mar", "Apr", "Jun", "Jul", "Aug", "Sep",
    "Sept", "Oct", "Nov", "Dec", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday",
    "Saturday", "Sunday",
];

/// Company suffixes end a sentence only when a capitalized word follows.
const CORPORATE_SUFFIXES: &[&str] = &["Inc", "Corp", "Ltd", "Co"];

const ABBREVIATIONS: &[&str] = &[
    "Mr", "Mrs", "Ms", "Dr", "Jr", "Sr", "St", "Mt", "No", "Gov",
    "Sen", "Rep", "Gen", "Prof", "Jan", "Feb", "Mar", "Apr", "Jun", "Jul", "Aug", "Sep", "Sept",
    "Oct", "Nov", "Dec",
];

pub struct PatternExtractor {
    config: FallbackConfig,
}

impl PatternExtractor {
    #[must_use]
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    /// Treats `text` as a single passage.
    #[must_use]
    pub fn extract_text(&self, text: &str) -> Vec<CandidateEvent> {
        let passage = Passage {
            index: 0,
            start: 0,
            end: text.len(),
            text: text.to_string(),
        };
        self.extract_passage(&passage)
    }

    /// One candidate per sentence that mentions at least one event keyword.
    #[must_use]
    pub fn extract_passage(&self, passage: &Passage) -> Vec<CandidateEvent> {
        sentence_spans(&passage.text)
            .into_iter()
            .filter_map(|span| {
                let sentence = &passage.text[span.clone()];
                self.extract_sentence(sentence).map(|candidate| CandidateEvent {
                    provenance: Provenance {
                        strategy: ExtractionStrategy::Fallback,
                        passage: Some(passage.index),
                        offset: Some(passage.start + span.start),
                    },
                    ..candidate
                })
            })
            .collect()
    }

    fn extract_sentence(&self, sentence: &str) -> Option<CandidateEvent> {
        if sentence.chars().count() < self.config.min_sentence_chars {
            return None;
        }
        let anchor = EVENT_KEYWORD.find(sentence)?.range();

        let summary = collapse_whitespace(sentence);
        let title = truncate_title(&summary, self.config.max_title_chars);

        let dates: Vec<Range<usize>> = ABSOLUTE_DATE
            .find_iter(sentence)
            .map(|m| m.range())
            .collect();
        let date = dates
            .iter()
            .min_by_key(|d| distance(d, &anchor))
            .map(|d| collapse_whitespace(&sentence[d.clone()]));

        let location = find_location(sentence, &dates);

        let mut claimed = dates;
        if let Some((_, span)) = &location {
            claimed.push(span.clone());
        }
        let participants = find_participants(sentence, &claimed, self.config.max_participants);

        let provenance = Provenance {
            strategy: ExtractionStrategy::Fallback,
            passage: None,
            offset: None,
        };
        let mut candidate =
            CandidateEvent::new(title, summary, provenance).with_participants(participants);
        if let Some(date) = date {
            candidate = candidate.with_date(date);
        }
        if let Some((text, _)) = location {
            candidate =
                candidate.with_location(truncate_words(&text, self.config.max_location_chars));
        }

        Some(candidate)
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new(FallbackConfig::default())
    }
}

#[async_trait::async_trait]
impl Extractor for PatternExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Fallback
    }

    async fn extract(&self, document: &ParsedDocument) -> ExtractionResult<Vec<CandidateEvent>> {
        let mut candidates: Vec<CandidateEvent> = if document.passages.is_empty() {
            self.extract_text(&document.full_text)
        } else {
            document
                .passages
                .iter()
                .flat_map(|p| self.extract_passage(p))
                .collect()
        };

        if candidates.len() > self.config.max_events {
            tracing::debug!(
                found = candidates.len(),
                kept = self.config.max_events,
                "Capping pattern-extracted events"
            );
            candidates.truncate(self.config.max_events);
        }

        Ok(candidates)
    }
}

/// Sentence spans, never crossing a blank line.
fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut block_start = 0;
    for gap in BLANK_LINE.find_iter(text) {
        block_sentences(text, block_start..gap.start(), &mut spans);
        block_start = gap.end();
    }
    block_sentences(text, block_start..text.len(), &mut spans);

    spans
}

fn block_sentences(text: &str, block: Range<usize>, spans: &mut Vec<Range<usize>>) {
    let mut start = block.start;
    let mut chars = text[block.clone()].char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let followed_by_space = chars.peek().is_none_or(|&(_, n)| n.is_whitespace());
        let i = block.start + offset;
        let end = i + c.len_utf8();
        if !followed_by_space
            || (c == '.' && is_abbreviation(&text[start..i], &text[end..block.end]))
        {
            continue;
        }
        push_trimmed(text, start..end, spans);
        start = end;
    }
    push_trimmed(text, start..block.end, spans);
}

fn push_trimmed(text: &str, span: Range<usize>, out: &mut Vec<Range<usize>>) {
    let slice = &text[span.clone()];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let start = span.start + (slice.len() - slice.trim_start().len());
    out.push(start..start + trimmed.len());
}

fn is_abbreviation(before_period: &str, after_period: &str) -> bool {
    let word = before_period
        .rsplit(|c: char| !c.is_alphabetic())
        .next()
        .unwrap_or("");
    if CORPORATE_SUFFIXES.contains(&word) {
        return !after_period.trim_start().starts_with(char::is_uppercase);
    }
    let single_initial = word.chars().count() == 1 && word.chars().all(char::is_uppercase);
    single_initial || ABBREVIATIONS.contains(&word)
}

fn distance(a: &Range<usize>, b: &Range<usize>) -> usize {
    if a.end <= b.start {
        b.start - a.end
    } else if b.end <= a.start {
        a.start - b.end
    } else {
        0
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn find_location(sentence: &str, dates: &[Range<usize>]) -> Option<(String, Range<usize>)> {
    LOCATION_PHRASE
        .captures_iter(sentence)
        .filter_map(|caps| caps.get(1))
        .find(|m| {
            let first = m.as_str().split_whitespace().next().unwrap_or("");
            !CALENDAR_WORDS.contains(&first) && !dates.iter().any(|d| overlaps(d, &m.range()))
        })
        .map(|m| (collapse_whitespace(m.as_str()), m.range()))
}

/// Runs of two or more adjacent capitalized words not claimed by a date or
/// location and not broken by a stopword or calendar word.
fn find_participants(sentence: &str, claimed: &[Range<usize>], limit: usize) -> Vec<String> {
    fn flush(run: &mut Vec<&str>, participants: &mut Vec<String>) {
        if run.len() >= 2 {
            let name = run.join(" ");
            if !participants.iter().any(|p| p.eq_ignore_ascii_case(&name)) {
                participants.push(name);
            }
        }
        run.clear();
    }

    let mut participants: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut last_end: Option<usize> = None;

    for m in CAPITALIZED_WORD.find_iter(sentence) {
        let adjacent = last_end.is_some_and(|end| sentence[end..m.start()].trim().is_empty());
        if !adjacent {
            flush(&mut run, &mut participants);
        }
        last_end = Some(m.end());

        let word = m.as_str().trim_end_matches("'s");
        let breaks = STOPWORDS.contains(&word)
            || CALENDAR_WORDS.contains(&word)
            || claimed.iter().any(|c| overlaps(c, &m.range()));

        if breaks {
            flush(&mut run, &mut participants);
        } else {
            run.push(word);
        }
    }
    flush(&mut run, &mut participants);

    participants.truncate(limit);
    participants
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_title(summary: &str, max_chars: usize) -> String {
    if summary.chars().count() <= max_chars {
        return summary.to_string();
    }
    let head: String = summary.chars().take(max_chars).collect();
    format!("{}...", head.trim_end())
}

fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = String::new();
    for word in text.split_whitespace() {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        text.chars().take(max_chars).collect()
    } else {
        out
    }
}
