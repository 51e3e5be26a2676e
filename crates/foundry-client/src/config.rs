//! Client and model configuration.

use std::time::Duration;

use foundry_core::RetryPolicy;
use foundry_types::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://llm.api.cloud.yandex.net/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

const ENV_BASE_URL: &str = "FOUNDRY_BASE_URL";
const ENV_API_KEY: &str = "FOUNDRY_API_KEY";
const ENV_TIMEOUT_SECS: &str = "FOUNDRY_TIMEOUT_SECS";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Default per-call timeout, shared by all attempts of a call.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Reads `FOUNDRY_BASE_URL`, `FOUNDRY_API_KEY` and `FOUNDRY_TIMEOUT_SECS`.
    ///
    /// Unusable values are logged and replaced by defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_BASE_URL) {
            match parse_base_url(&raw) {
                Ok(url) => config.base_url = url,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_BASE_URL, e),
            }
        }
        config.api_key = lookup(ENV_API_KEY).filter(|key| !key.trim().is_empty());
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<f64>().ok().and_then(|s| Duration::try_from_secs_f64(s).ok()) {
                Some(timeout) if !timeout.is_zero() => config.timeout = timeout,
                _ => tracing::warn!("Ignoring {}: invalid value {:?}", ENV_TIMEOUT_SECS, raw),
            }
        }
        config
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_base_url(&self.base_url)?;
        self.retry.validate()
    }
}

fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let invalid = || ConfigError::InvalidUrl { url: raw.to_string() };
    let url = Url::parse(trimmed).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Amount of reasoning the model performs before answering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningMode {
    Low,
    Medium,
    High,
}

impl ReasoningMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Per-model request options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatModelConfig {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub reasoning_mode: Option<ReasoningMode>,
    /// Raw `response_format` object, e.g. `{"type": "json_schema", "json_schema": {...}}`.
    pub response_format: Option<Value>,
    /// Tool definitions in ChatCompletions form.
    pub tools: Option<Vec<Value>>,
    pub parallel_tool_calls: Option<bool>,
    /// `"none"`, `"auto"`, `"required"` or a function selector object.
    pub tool_choice: Option<Value>,
    /// Extra top-level request fields, applied last.
    pub extra_query: Option<Map<String, Value>>,
}

impl ChatModelConfig {
    /// Copies the configured options into a request body.
    pub fn apply(&self, body: &mut Map<String, Value>) -> Result<(), ConfigError> {
        if let Some(temperature) = self.temperature {
            body.insert("temperature".into(), temperature.into());
        }
        if let Some(max_tokens) = self.max_tokens {
            body.insert("max_tokens".into(), max_tokens.into());
        }
        if let Some(format) = &self.response_format {
            validate_response_format(format)?;
            body.insert("response_format".into(), format.clone());
        }
        if let Some(mode) = self.reasoning_mode {
            body.insert("reasoning_effort".into(), mode.as_str().into());
        }
        if let Some(tools) = &self.tools {
            body.insert("tools".into(), Value::Array(tools.clone()));
        }
        if let Some(parallel) = self.parallel_tool_calls {
            body.insert("parallel_tool_calls".into(), parallel.into());
        }
        if let Some(choice) = &self.tool_choice {
            body.insert("tool_choice".into(), choice.clone());
        }
        if let Some(extra) = &self.extra_query {
            body.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(())
    }
}

fn validate_response_format(format: &Value) -> Result<(), ConfigError> {
    if format.get("type").and_then(Value::as_str) != Some("json_schema") {
        return Ok(());
    }
    let named = format
        .get("json_schema")
        .and_then(Value::as_object)
        .is_some_and(|schema| schema.contains_key("name"));
    if named {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            field: "response_format".to_string(),
            message: "\"name\" field is required in a json_schema response_format".to_string(),
        })
    }
}
