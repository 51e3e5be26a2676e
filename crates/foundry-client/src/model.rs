//! Chat model bound to a client channel.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use foundry_core::{
    LiveCall, RetryKind, RetryingChannel, StreamCallHandle, StreamingCompletionDecoder,
};
use foundry_types::{ChatChunk, ChatMessage, ChatModelResult};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ChatModelConfig;
use crate::error::ClientError;
use crate::transport::{HttpCall, HttpTransport, CHAT_COMPLETIONS};

/// A chat-completions model.
///
/// Cheap to clone; clones share the underlying HTTP connection pool.
#[derive(Clone)]
pub struct ChatModel {
    uri: String,
    config: ChatModelConfig,
    channel: RetryingChannel<HttpTransport>,
    default_timeout: Duration,
}

impl ChatModel {
    pub(crate) fn new(
        uri: String,
        channel: RetryingChannel<HttpTransport>,
        default_timeout: Duration,
    ) -> Self {
        Self { uri, config: ChatModelConfig::default(), channel, default_timeout }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn config(&self) -> &ChatModelConfig {
        &self.config
    }

    /// Returns a copy of this model with `config` applied.
    #[must_use]
    pub fn configure(&self, config: ChatModelConfig) -> Self {
        Self { config, ..self.clone() }
    }

    /// Request body for `messages`.
    pub fn build_request_json(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<Value, ClientError> {
        let mut body = Map::new();
        body.insert("model".into(), Value::String(self.uri.clone()));
        let messages = serde_json::to_value(messages)
            .map_err(|e| ClientError::Internal(format!("failed to encode messages: {e}")))?;
        body.insert("messages".into(), messages);
        body.insert("stream".into(), Value::Bool(stream));
        self.config.apply(&mut body)?;
        Ok(Value::Object(body))
    }

    /// Runs a non-streamed completion.
    pub async fn run(
        &self,
        messages: &[ChatMessage],
        timeout: Option<Duration>,
    ) -> Result<ChatModelResult, ClientError> {
        let body = self.build_request_json(messages, false)?;
        let timeout = timeout.unwrap_or(self.default_timeout);
        let raw = self
            .channel
            .call_unary(CHAT_COMPLETIONS, body, Some(timeout), RetryKind::Single)
            .await?;
        Ok(ChatModelResult::try_from(raw)?)
    }

    /// Runs a streamed completion.
    ///
    /// When a retry restarts the stream, the decoder starts over as well, so
    /// chunks after the retry describe the new attempt only.
    pub fn run_stream(
        &self,
        messages: &[ChatMessage],
        timeout: Option<Duration>,
    ) -> Result<CompletionStream, ClientError> {
        let body = self.build_request_json(messages, true)?;
        let timeout = timeout.unwrap_or(self.default_timeout);
        let mut proxy = self.channel.call_server_streaming(
            CHAT_COMPLETIONS,
            body,
            Some(timeout),
            RetryKind::Single,
        )?;
        let handle = proxy.handle();

        let chunks = async_stream::stream! {
            let mut decoder = StreamingCompletionDecoder::new();
            let mut attempt: Option<Arc<HttpCall>> = None;
            while let Some(item) = proxy.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(error) => {
                        yield Err(ClientError::from(error));
                        return;
                    }
                };

                let current = proxy.current_call();
                if let (Some(previous), Some(current)) = (&attempt, &current) {
                    if !Arc::ptr_eq(previous, current) {
                        debug!("Stream restarted by a retry, resetting decoder");
                        decoder.reset();
                    }
                }
                attempt = current;

                match decoder.decode(event) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => {}
                    Err(error) => {
                        proxy.cancel();
                        yield Err(ClientError::from(error));
                        return;
                    }
                }
            }
        };

        Ok(CompletionStream { handle, chunks: Box::pin(chunks) })
    }
}

/// Logical chunks of a streamed completion plus control over the live call.
pub struct CompletionStream {
    handle: StreamCallHandle<HttpCall>,
    chunks: BoxStream<'static, Result<ChatChunk, ClientError>>,
}

impl CompletionStream {
    /// Control surface of the attempt currently streaming.
    pub fn handle(&self) -> &StreamCallHandle<HttpCall> {
        &self.handle
    }

    /// Cancels the attempt currently streaming.
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }
}

impl Stream for CompletionStream {
    type Item = Result<ChatChunk, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().chunks.as_mut().poll_next(cx)
    }
}
