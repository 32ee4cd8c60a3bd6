use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::passage::Passage;

/// Fatal, per-document input failures.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("Document contains no text")]
    EmptyDocument,
}

pub type InputResult<T> = Result<T, InputError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "text" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> InputResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| InputError::UnsupportedFormat("no extension".into()))?;

        Self::from_extension(ext).ok_or_else(|| InputError::UnsupportedFormat(ext.into()))
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub format: DocumentFormat,
    pub full_text: String,
    pub passages: Vec<Passage>,
}

impl ParsedDocument {
    #[must_use]
    pub fn new(format: DocumentFormat, full_text: String) -> Self {
        Self {
            format,
            full_text,
            passages: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_passages(mut self, passages: Vec<Passage>) -> Self {
        self.passages = passages;
        self
    }
}

/// Decodes raw file bytes to text. PDF and DOCX decoders live outside this
/// crate and plug in through this trait.
#[async_trait::async_trait]
pub trait Parser: Send + Sync {
    fn supported_formats(&self) -> &[DocumentFormat];

    fn can_parse(&self, format: DocumentFormat) -> bool {
        self.supported_formats().contains(&format)
    }

    async fn parse_bytes(&self, data: &[u8], format: DocumentFormat) -> InputResult<ParsedDocument>;

    async fn parse_file(&self, path: &Path) -> InputResult<ParsedDocument> {
        let format = DocumentFormat::from_path(path)?;

        if !self.can_parse(format) {
            return Err(InputError::UnsupportedFormat(format!(
                "no decoder registered for {format}"
            )));
        }

        let data = tokio::fs::read(path).await?;
        self.parse_bytes(&data, format).await
    }
}

pub struct PlainTextParser;

impl PlainTextParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Parser for PlainTextParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::PlainText, DocumentFormat::Markdown]
    }

    async fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
    ) -> InputResult<ParsedDocument> {
        let text =
            String::from_utf8(data.to_vec()).map_err(|e| InputError::Encoding(e.to_string()))?;
        let text = text
            .strip_prefix('\u{feff}')
            .map(String::from)
            .unwrap_or(text);

        Ok(ParsedDocument::new(format, text.replace("\r\n", "\n")))
    }
}

pub struct CompositeParser {
    parsers: Vec<Box<dyn Parser>>,
}

impl CompositeParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parsers.push(parser);
        self
    }

    fn find_parser(&self, format: DocumentFormat) -> Option<&dyn Parser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(format))
            .map(AsRef::as_ref)
    }
}

impl Default for CompositeParser {
    fn default() -> Self {
        Self::new().with_parser(Box::new(PlainTextParser::new()))
    }
}

#[async_trait::async_trait]
impl Parser for CompositeParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[
            DocumentFormat::PlainText,
            DocumentFormat::Markdown,
            DocumentFormat::Pdf,
            DocumentFormat::Docx,
        ]
    }

    fn can_parse(&self, format: DocumentFormat) -> bool {
        self.find_parser(format).is_some()
    }

    async fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
    ) -> InputResult<ParsedDocument> {
        let parser = self.find_parser(format).ok_or_else(|| {
            InputError::UnsupportedFormat(format!("no decoder registered for {format}"))
        })?;

        parser.parse_bytes(data, format).await
    }
}
