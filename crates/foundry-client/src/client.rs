use foundry_core::RetryingChannel;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::model::ChatModel;
use crate::transport::HttpTransport;

/// Entry point: owns the HTTP pool and the retry policy shared by all models.
#[derive(Clone)]
pub struct FoundryClient {
    config: ClientConfig,
    channel: RetryingChannel<HttpTransport>,
}

impl FoundryClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        let channel = RetryingChannel::new(transport, &config.retry);
        tracing::info!(
            "Foundry client ready at {} (max_attempts={}, timeout={}s)",
            config.base_url,
            config.retry.max_attempts,
            config.timeout.as_secs()
        );
        Ok(Self { config, channel })
    }

    /// Builds a client from `FOUNDRY_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Chat model addressed by `uri`, e.g. `gpt://<folder>/yandexgpt/latest`.
    pub fn chat_model(&self, uri: impl Into<String>) -> ChatModel {
        ChatModel::new(uri.into(), self.channel.clone(), self.config.timeout)
    }
}
