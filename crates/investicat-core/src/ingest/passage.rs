//! Splits decoded document text into bounded, ordered passages.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::parser::{InputError, InputResult};

static PARAGRAPH_BREAK: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\n[ \t]*\n").expect("paragraph break pattern"));

/// A contiguous span of the source text. `text == source[start..end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Passage {
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Segments `text` into passages of at most `max_chars` bytes.
///
/// Paragraphs (blank-line separated) become passages; longer paragraphs are
/// cut at the last sentence end inside the limit, or on a char boundary when
/// no sentence end exists.
pub fn segment(text: &str, max_chars: usize) -> InputResult<Vec<Passage>> {
    if text.trim().is_empty() {
        return Err(InputError::EmptyDocument);
    }

    let max_chars = max_chars.max(1);
    let mut spans = Vec::new();
    let mut cursor = 0;

    for m in PARAGRAPH_BREAK.find_iter(text) {
        split_paragraph(text, cursor, m.start(), max_chars, &mut spans);
        cursor = m.end();
    }
    split_paragraph(text, cursor, text.len(), max_chars, &mut spans);

    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| Passage {
            index,
            start,
            end,
            text: text[start..end].to_string(),
        })
        .collect())
}

fn split_paragraph(
    text: &str,
    start: usize,
    end: usize,
    max: usize,
    out: &mut Vec<(usize, usize)>,
) {
    let Some((mut start, end)) = trim_span(text, start, end) else {
        return;
    };

    while end - start > max {
        let window_end = floor_char_boundary(text, start + max);
        let cut = last_sentence_end(&text[start..window_end])
            .map(|offset| start + offset)
            .filter(|&cut| cut > start)
            .unwrap_or_else(|| hard_cut(text, start, window_end));

        if let Some(span) = trim_span(text, start, cut) {
            out.push(span);
        }

        match trim_span(text, cut, end) {
            Some((next, _)) => start = next,
            None => return,
        }
    }

    out.push((start, end));
}

fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    Some((start + lead, start + lead + trimmed.len()))
}

/// Byte offset just past the last sentence terminator in `window`.
fn last_sentence_end(window: &str) -> Option<usize> {
    let mut best = None;
    let mut chars = window.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        let ends = match c {
            '.' | '!' | '?' => next.is_some_and(char::is_whitespace),
            '\n' => true,
            _ => false,
        };
        if ends {
            best = Some(i + c.len_utf8());
        }
    }

    best
}

fn hard_cut(text: &str, start: usize, window_end: usize) -> usize {
    if window_end > start {
        return window_end;
    }
    // A single char wider than the limit still has to go somewhere.
    text[start..]
        .char_indices()
        .nth(1)
        .map_or(text.len(), |(i, _)| start + i)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
