//! Provider configuration and per-model parameter policy.

use crate::error::{LlmError, Result};
use bioweave_graph::llm::ChatConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// Anthropic messages API
    Anthropic,
    /// OpenAI chat completions API
    OpenAi,
    /// Azure-hosted OpenAI deployments
    Azure,
    /// Google Gemini generateContent API
    Google,
}

impl FromStr for ApiType {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "azure" => Ok(Self::Azure),
            "google" => Ok(Self::Google),
            other => Err(LlmError::ConfigError(format!("Invalid API type: {other}"))),
        }
    }
}

impl std::fmt::Display for ApiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Azure => "azure",
            Self::Google => "google",
        };
        f.write_str(s)
    }
}

/// Configuration for one provider + model pair.
///
/// The gateway builds a fresh client from this on every call; nothing is
/// cached between calls.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider family
    pub api_type: ApiType,
    /// Model name (or Azure deployment name)
    pub model: String,
    /// API key
    pub api_key: String,
    /// Endpoint override; required for Azure, optional elsewhere
    pub endpoint: Option<String>,
    /// Per-request HTTP timeout for the underlying client
    pub http_timeout: Duration,
}

impl ProviderConfig {
    /// Create a configuration
    pub fn new(api_type: ApiType, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_type,
            model: model.into(),
            api_key: api_key.into(),
            endpoint: None,
            http_timeout: Duration::from_secs(600),
        }
    }

    /// Set the endpoint (Azure resource URL or a base-URL override)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the HTTP client timeout
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Models that accept `max_completion_tokens`.
const MAX_COMPLETION_TOKEN_MODELS: &[&str] = &["o3-mini", "o3-preview"];

/// Default generation parameters for a model family.
///
/// Claude models get an extended-thinking budget and a completion cap;
/// GPT models get a medium reasoning effort and a completion-token cap.
pub fn default_chat_config(model: &str) -> ChatConfig {
    let lower = model.to_lowercase();
    let mut config = ChatConfig::default();
    if lower.contains("claude") {
        config.thinking_budget_tokens = Some(5000);
        config.max_tokens = Some(10000);
    }
    if lower.contains("gpt") {
        config.reasoning_effort = Some("medium".to_string());
        config.max_completion_tokens = Some(5000);
    }
    config
}

/// Strip parameters the target provider or model cannot accept.
///
/// - Azure does not take `reasoning_effort`.
/// - `thinking_budget_tokens` is Anthropic-only.
/// - `max_completion_tokens` is dropped for every model outside the
///   accepting set.
pub fn sanitize_config(api_type: ApiType, model: &str, config: &mut ChatConfig) {
    if api_type == ApiType::Azure {
        config.reasoning_effort = None;
    }
    if api_type != ApiType::Anthropic {
        config.thinking_budget_tokens = None;
    }
    if !MAX_COMPLETION_TOKEN_MODELS.contains(&model) {
        config.max_completion_tokens = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_type_parse() {
        assert_eq!("anthropic".parse::<ApiType>().unwrap(), ApiType::Anthropic);
        assert!("together".parse::<ApiType>().is_err());
    }

    #[test]
    fn test_default_config_claude() {
        let config = default_chat_config("claude-sonnet-4-5");
        assert_eq!(config.thinking_budget_tokens, Some(5000));
        assert_eq!(config.max_tokens, Some(10000));
        assert!(config.reasoning_effort.is_none());
    }

    #[test]
    fn test_default_config_gpt() {
        let config = default_chat_config("gpt-5-mini");
        assert_eq!(config.reasoning_effort.as_deref(), Some("medium"));
        assert_eq!(config.max_completion_tokens, Some(5000));
    }

    #[test]
    fn test_sanitize_strips_reasoning_effort_for_azure() {
        let mut config = default_chat_config("gpt-4o");
        sanitize_config(ApiType::Azure, "gpt-4o", &mut config);
        assert!(config.reasoning_effort.is_none());
    }

    #[test]
    fn test_sanitize_strips_max_completion_tokens_for_most_models() {
        let mut config = default_chat_config("gpt-4o");
        sanitize_config(ApiType::OpenAi, "gpt-4o", &mut config);
        assert!(config.max_completion_tokens.is_none());

        let mut config = ChatConfig {
            max_completion_tokens: Some(4000),
            ..Default::default()
        };
        sanitize_config(ApiType::OpenAi, "o3-mini", &mut config);
        assert_eq!(config.max_completion_tokens, Some(4000));
    }
}
