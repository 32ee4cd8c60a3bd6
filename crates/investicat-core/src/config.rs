use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const ENV_API_KEY: &str = "INVESTICAT_AI_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "INVESTICAT_AI_BASE_URL";
pub const ENV_MODEL: &str = "INVESTICAT_AI_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "INVESTICAT_AI_TIMEOUT_SECS";
pub const ENV_DISABLE_AI: &str = "INVESTICAT_DISABLE_AI";
pub const ENV_SYSTEM_USER_EMAIL: &str = "INVESTICAT_SYSTEM_USER_EMAIL";
pub const ENV_SYSTEM_USER_NAME: &str = "INVESTICAT_SYSTEM_USER_NAME";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Invalid AI endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("max_passage_chars must be at least {min}, got {actual}")]
    PassageTooSmall { min: usize, actual: usize },
    #[error("Could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Generative-model extraction settings. There is no built-in credential:
/// without an `api_key` the AI extractor reports itself unavailable.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Whether to attempt AI extraction at all
    pub enabled: bool,
    /// Bearer token for the completion endpoint (never serialized)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Deadline for the whole AI call, retries included
    pub request_timeout_seconds: u32,
    pub connect_timeout_seconds: u32,
    /// Only this many leading characters of the document are sent
    pub max_input_chars: usize,
    /// Extra attempts after a rate limit or transport failure
    pub max_retries: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 2000,
            request_timeout_seconds: 60,
            connect_timeout_seconds: 10,
            max_input_chars: 4000,
            max_retries: 1,
        }
    }
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("max_input_chars", &self.max_input_chars)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl AiConfig {
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout_seconds))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.connect_timeout_seconds))
    }

    pub fn completions_url(&self) -> ConfigResult<Url> {
        let base = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        Ok(Url::parse(&base)?.join("chat/completions")?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::Zero("request_timeout_seconds"));
        }
        if self.max_input_chars == 0 {
            return Err(ConfigError::Zero("max_input_chars"));
        }
        self.completions_url()?;
        Ok(())
    }
}

/// Limits for the pattern-based extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Sentences shorter than this are not considered
    pub min_sentence_chars: usize,
    pub max_title_chars: usize,
    pub max_location_chars: usize,
    pub max_participants: usize,
    pub max_events: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: 16,
            max_title_chars: 80,
            max_location_chars: 50,
            max_participants: 5,
            max_events: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUserConfig {
    pub email: String,
    pub name: String,
}

pub const MIN_PASSAGE_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ai: AiConfig,
    pub fallback: FallbackConfig,
    /// Upper bound on a single passage, in bytes
    pub max_passage_chars: usize,
    /// Emit a placeholder user node with every graph
    pub system_user: Option<SystemUserConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ai: AiConfig::default(),
            fallback: FallbackConfig::default(),
            max_passage_chars: 2000,
            system_user: None,
        }
    }
}

impl PipelineConfig {
    /// Pattern extraction only.
    #[must_use]
    pub fn fallback_only() -> Self {
        let mut config = Self::default();
        config.ai.enabled = false;
        config
    }

    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `INVESTICAT_*` overrides from `lookup` on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY).or_else(|| non_empty(ENV_OPENAI_API_KEY)) {
            self.ai.api_key = Some(key);
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.ai.base_url = url;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.ai.model = model;
        }
        if let Some(raw) = non_empty(ENV_TIMEOUT_SECS) {
            self.ai.request_timeout_seconds =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_TIMEOUT_SECS.to_string(),
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = non_empty(ENV_DISABLE_AI) {
            if raw == "1" || raw.eq_ignore_ascii_case("true") {
                self.ai.enabled = false;
            }
        }
        if let Some(email) = non_empty(ENV_SYSTEM_USER_EMAIL) {
            let name = non_empty(ENV_SYSTEM_USER_NAME).unwrap_or_else(|| "System User".to_string());
            self.system_user = Some(SystemUserConfig { email, name });
        }

        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_passage_chars < MIN_PASSAGE_CHARS {
            return Err(ConfigError::PassageTooSmall {
                min: MIN_PASSAGE_CHARS,
                actual: self.max_passage_chars,
            });
        }
        if self.fallback.max_title_chars == 0 {
            return Err(ConfigError::Zero("fallback.max_title_chars"));
        }
        if self.ai.enabled {
            self.ai.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_has_no_credential() {
        let config = PipelineConfig::default();
        assert!(config.ai.enabled);
        assert!(config.ai.api_key.is_none());
        assert!(!config.ai.has_credential());
        assert!(config.system_user.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "sk-test"),
            (ENV_MODEL, "gpt-4o"),
            (ENV_TIMEOUT_SECS, "5"),
            (ENV_SYSTEM_USER_EMAIL, "journalist@example.com"),
        ]))
        .unwrap();

        assert!(config.ai.has_credential());
        assert_eq!(config.ai.model, "gpt-4o");
        assert_eq!(config.ai.request_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.system_user,
            Some(SystemUserConfig {
                email: "journalist@example.com".into(),
                name: "System User".into(),
            })
        );
    }

    #[test]
    fn test_openai_key_is_secondary() {
        let config = PipelineConfig::from_lookup(lookup(&[
            (ENV_OPENAI_API_KEY, "sk-openai"),
            (ENV_API_KEY, "sk-primary"),
        ]))
        .unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-primary"));

        let config =
            PipelineConfig::from_lookup(lookup(&[(ENV_OPENAI_API_KEY, "sk-openai")])).unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-openai"));
    }

    #[test]
    fn test_disable_ai() {
        let config = PipelineConfig::from_lookup(lookup(&[(ENV_DISABLE_AI, "true")])).unwrap();
        assert!(!config.ai.enabled);
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = PipelineConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Zero("request_timeout_seconds")));
    }

    #[test]
    fn test_completions_url() {
        let mut ai = AiConfig::default();
        assert_eq!(
            ai.completions_url().unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );

        ai.base_url = "http://127.0.0.1:8080/v1/".into();
        assert_eq!(
            ai.completions_url().unwrap().as_str(),
            "http://127.0.0.1:8080/v1/chat/completions"
        );

        ai.base_url = "not a url".into();
        assert!(ai.validate().is_err());
    }

    #[test]
    fn test_passage_limit_validated() {
        let config = PipelineConfig {
            max_passage_chars: 10,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PassageTooSmall { .. })
        ));
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = PipelineConfig::default();
        config.ai.api_key = Some("sk-secret".into());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!format!("{config:?}").contains("sk-secret"));

        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert!(parsed.ai.api_key.is_none());
        assert_eq!(parsed.max_passage_chars, config.max_passage_chars);
    }

    #[test]
    fn test_json_file_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("investicat.json");
        std::fs::write(
            &path,
            r#"{"ai": {"enabled": false}, "fallback": {"max_events": 3}}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();

        assert!(!config.ai.enabled);
        assert_eq!(config.fallback.max_events, 3);
        assert_eq!(config.fallback.max_title_chars, 80);
        assert_eq!(config.max_passage_chars, 2000);
    }
}
