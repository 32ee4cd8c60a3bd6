//! Generative-model event extraction against an OpenAI-compatible endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::extractor::{
    AiUnavailable, CandidateEvent, ExtractionResult, ExtractionStrategy, Extractor, Provenance,
};
use super::parser::ParsedDocument;
use crate::config::{AiConfig, ConfigError};

const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_JITTER_MS: u64 = 250;
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Credential rejected")]
    Unauthorized,
    #[error("Rate limited")]
    RateLimited,
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Response contained no completion")]
    EmptyResponse,
    #[error("Response body could not be decoded: {0}")]
    InvalidBody(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CompletionError {
    /// Rate limits and transport failures are worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Http(_))
    }
}

impl From<CompletionError> for AiUnavailable {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Unauthorized => Self::Unauthorized,
            CompletionError::RateLimited => Self::RateLimited,
            CompletionError::EmptyResponse => {
                Self::MalformedResponse("no completion returned".into())
            }
            CompletionError::InvalidBody(msg) => Self::MalformedResponse(msg),
            other @ (CompletionError::Status { .. }
            | CompletionError::Http(_)
            | CompletionError::Config(_)) => Self::Transport(other.to_string()),
        }
    }
}

/// Prompt in, completion text out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// `/chat/completions` client with bearer auth.
pub struct OpenAiClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig, api_key: impl Into<String>) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint: config.completions_url()?,
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(prompt_length = prompt.len(), model = %self.model, "Requesting completion");

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CompletionError::Unauthorized);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                CompletionError::InvalidBody(e.to_string())
            } else {
                CompletionError::Http(e)
            }
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        info!(response_length = content.len(), model = %self.model, "Completion received");
        Ok(content)
    }
}

/// Event extraction through a [`CompletionClient`]. Without a client every
/// call reports [`AiUnavailable::NoCredential`].
pub struct AiExtractor {
    client: Option<Arc<dyn CompletionClient>>,
    config: AiConfig,
}

impl AiExtractor {
    #[must_use]
    pub fn new(client: Arc<dyn CompletionClient>, config: AiConfig) -> Self {
        Self {
            client: Some(client),
            config,
        }
    }

    /// Builds an [`OpenAiClient`] from `config`, or an extractor that is
    /// always unavailable when no API key is configured.
    pub fn from_config(config: &AiConfig) -> Result<Self, CompletionError> {
        let client: Option<Arc<dyn CompletionClient>> = match config.api_key.as_deref() {
            Some(key) if config.has_credential() => Some(Arc::new(OpenAiClient::new(config, key)?)),
            _ => None,
        };

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    #[must_use]
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    async fn complete_with_retry(
        &self,
        client: &dyn CompletionClient,
        prompt: &str,
    ) -> Result<String, AiUnavailable> {
        let mut attempt = 0;
        loop {
            match client.complete(prompt).await {
                Ok(content) => return Ok(content),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[async_trait]
impl Extractor for AiExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Ai
    }

    async fn extract(&self, document: &ParsedDocument) -> ExtractionResult<Vec<CandidateEvent>> {
        let Some(client) = self.client.as_deref() else {
            return Err(AiUnavailable::NoCredential.into());
        };

        let prompt = build_prompt(&document.full_text, self.config.max_input_chars);
        let deadline = self.config.request_timeout();

        let content = tokio::time::timeout(deadline, self.complete_with_retry(client, &prompt))
            .await
            .map_err(|_| AiUnavailable::Timeout(deadline))??;

        let events = parse_response(&content)?;
        info!(events = events.len(), "AI extraction complete");
        Ok(events)
    }
}

fn retry_delay(attempt: u32) -> Duration {
    use rand::Rng;

    let exponential = RETRY_BASE_DELAY_MS.saturating_mul(1 << attempt.saturating_sub(1).min(6));
    let jitter = rand::rng().random_range(0..=RETRY_JITTER_MS);
    Duration::from_millis(exponential + jitter)
}

/// Builds the extraction prompt over the first `max_chars` characters of `text`.
#[must_use]
pub fn build_prompt(text: &str, max_chars: usize) -> String {
    let excerpt = match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    };

    format!(
        r#"Extract timeline events from this investigative document. For each significant event, provide:
- title: Brief descriptive title (max 80 chars)
- summary: Detailed description
- date: Date in YYYY-MM-DD format (null if not found)
- location: Specific location/address (null if not found)
- participants: List of people/organizations involved

Focus on: meetings, transactions, announcements, approvals, signings, filings, investigations.

Return as JSON array:
[{{"title": "Event Title", "summary": "Detailed description", "date": "2024-01-15", "location": "New York City", "participants": ["John Doe", "Acme Corp"]}}]

Document text:
{excerpt}
"#
    )
}

/// Removes a surrounding Markdown code fence, with or without a language tag.
#[must_use]
pub fn strip_code_fences(content: &str) -> &str {
    let mut body = content.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Non-blank string value of `key`. Any other type costs only that field.
fn string_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::String(_) | Value::Null => None,
        other => {
            debug!(field = key, value = %other, "Ignoring non-string AI event field");
            None
        }
    }
}

/// Participants as a list of names or `{"name": ...}` objects, or one name.
fn participant_names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(name)) => vec![name.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name.clone()),
                Value::Object(map) => map.get("name").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Parses a completion into candidates. The payload must be a JSON array or
/// an object with an `events` array; individual bad records are skipped.
pub fn parse_response(content: &str) -> Result<Vec<CandidateEvent>, AiUnavailable> {
    let body = strip_code_fences(content);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AiUnavailable::MalformedResponse(format!("invalid JSON: {e}")))?;

    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("events") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(AiUnavailable::MalformedResponse(
                    "object without an events array".into(),
                ))
            }
        },
        _ => {
            return Err(AiUnavailable::MalformedResponse(
                "expected a JSON array".into(),
            ))
        }
    };

    let provenance = Provenance {
        strategy: ExtractionStrategy::Ai,
        passage: None,
        offset: None,
    };

    let mut candidates = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let Value::Object(record) = record else {
            warn!(index, "Skipping AI event record that is not an object");
            continue;
        };
        let Some(title) = string_field(&record, "title") else {
            warn!(index, "Skipping AI event record without a title");
            continue;
        };
        let summary = string_field(&record, "summary").unwrap_or_else(|| title.clone());

        let mut candidate = CandidateEvent::new(title, summary, provenance)
            .with_participants(participant_names(record.get("participants")));
        if let Some(date) = string_field(&record, "date") {
            candidate = candidate.with_date(date);
        }
        if let Some(location) = string_field(&record, "location") {
            candidate = candidate.with_location(location);
        }
        candidates.push(candidate);
    }

    Ok(candidates)
}
