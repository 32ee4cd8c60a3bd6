use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::parser::ParsedDocument;

/// Why the AI extractor could not produce events. Every variant is
/// recoverable by switching to pattern extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum AiUnavailable {
    #[error("no API credential configured")]
    NoCredential,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("credential rejected")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("AI extraction unavailable: {0}")]
    AiUnavailable(#[from] AiUnavailable),
    #[error("Extraction failed: {0}")]
    Failed(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    Ai,
    Fallback,
}

impl ExtractionStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub strategy: ExtractionStrategy,
    /// Passage index, when the event came from a single passage
    pub passage: Option<usize>,
    /// Byte offset of the source sentence within the document
    pub offset: Option<usize>,
}

/// An unvalidated event as the extractor saw it, before any field is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub title: String,
    pub summary: String,
    pub raw_date: Option<String>,
    pub raw_location: Option<String>,
    pub raw_participants: Vec<String>,
    pub provenance: Provenance,
}

impl CandidateEvent {
    #[must_use]
    pub fn new(title: String, summary: String, provenance: Provenance) -> Self {
        Self {
            title,
            summary,
            raw_date: None,
            raw_location: None,
            raw_participants: Vec::new(),
            provenance,
        }
    }

    #[must_use]
    pub fn with_date(mut self, raw: impl Into<String>) -> Self {
        self.raw_date = Some(raw.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, raw: impl Into<String>) -> Self {
        self.raw_location = Some(raw.into());
        self
    }

    #[must_use]
    pub fn with_participant(mut self, raw: impl Into<String>) -> Self {
        self.raw_participants.push(raw.into());
        self
    }

    #[must_use]
    pub fn with_participants(mut self, raw: Vec<String>) -> Self {
        self.raw_participants = raw;
        self
    }
}

/// One extraction strategy. A run uses exactly one implementation's output.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    fn strategy(&self) -> ExtractionStrategy;

    async fn extract(&self, document: &ParsedDocument) -> ExtractionResult<Vec<CandidateEvent>>;
}
