use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ingest::{content_hash, DocumentFormat};

/// Where a document came from. One source yields exactly one document node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub format: DocumentFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl Source {
    #[must_use]
    pub fn new(filename: String, format: DocumentFormat) -> Self {
        Self {
            filename,
            uri: None,
            format,
            content_hash: None,
        }
    }

    #[must_use]
    pub fn file(path: &Path, format: DocumentFormat) -> Self {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or_else(|| path.to_string_lossy().into_owned(), String::from);

        Self {
            filename,
            uri: Some(path.to_string_lossy().into_owned()),
            format,
            content_hash: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, text: &str) -> Self {
        self.content_hash = Some(content_hash(text.as_bytes()));
        self
    }

    /// Path if known, otherwise the filename. Used when reporting failures.
    #[must_use]
    pub fn display_path(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.filename)
    }
}
