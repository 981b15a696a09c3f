//! Scoring client configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScorerError;

const OPENAI_URL: &str = "https://api.openai.com";
const ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// LLM vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_URL,
            Self::Anthropic => ANTHROPIC_URL,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = ScorerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ScorerError::Config(format!("unknown LLM provider: {}", other))),
        }
    }
}

/// Scoring client configuration.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub provider: LlmProvider,
    /// Without a key every chunk gets the neutral score
    pub api_key: Option<String>,
    /// Overrides the provider's default model
    pub model: Option<String>,
    /// API origin, overridable for proxies and tests
    pub base_url: String,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            api_key: None,
            model: None,
            base_url: OPENAI_URL.to_string(),
            batch_size: 10,
            timeout: Duration::from_secs(60),
        }
    }
}

impl ScorerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let provider = std::env::var("LLM_PROVIDER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let provider_key = match provider {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        };
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var(provider_key))
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self {
            provider,
            api_key,
            model: std::env::var("LLM_MODEL").ok().filter(|m| !m.is_empty()),
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| provider.default_base_url().to_string()),
            batch_size: 10,
            timeout: Duration::from_secs(
                std::env::var("LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    /// Config for `provider` with its default endpoint.
    pub fn for_provider(provider: LlmProvider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: Some(api_key.into()),
            base_url: provider.default_base_url().to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Model in effect.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}
