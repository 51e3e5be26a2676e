//! Streaming completion decoder.
//!
//! Turns the raw delta events of a streamed chat completion into logical
//! [`ChatChunk`]s: sticky role, cumulative text and reasoning, reassembled
//! tool calls and a classified finish reason. Empty keep-alive events are
//! swallowed.

mod tool_calls;

pub use tool_calls::ToolCallsBuffer;

use chrono::DateTime;
use foundry_types::protocol::ChatCompletionChunk;
use foundry_types::{ChatChunk, DecodeError, FinishReason};
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

/// Accumulation state for one streamed response.
#[derive(Debug, Default)]
pub struct StreamingCompletionDecoder {
    role: Option<String>,
    content: Option<String>,
    reasoning: Option<String>,
    tool_calls: ToolCallsBuffer,
    finish_reason: FinishReason,
}

impl StreamingCompletionDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything accumulated so far, e.g. when a retried attempt
    /// restarts the stream from its beginning.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn reasoning_text(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    /// Finish reason of the most recent event.
    pub fn finish_reason(&self) -> FinishReason {
        self.finish_reason
    }

    /// Parses and decodes one `data:` payload.
    pub fn decode_json(&mut self, payload: &str) -> Result<Option<ChatChunk>, DecodeError> {
        let event: ChatCompletionChunk = serde_json::from_str(payload)?;
        self.decode(event)
    }

    /// Feeds one wire event; returns the logical chunk it produced, if any.
    pub fn decode(&mut self, event: ChatCompletionChunk) -> Result<Option<ChatChunk>, DecodeError> {
        let ChatCompletionChunk { id, created, model, mut choices, usage, .. } = event;
        // Usage-only events may arrive without any choice.
        let choice = if choices.is_empty() { Default::default() } else { choices.swap_remove(0) };
        let delta = choice.delta.unwrap_or_default();

        if let Some(fragments) = delta.tool_calls {
            self.tool_calls.update(fragments)?;
        }
        if let Some(role) = delta.role.filter(|role| !role.is_empty()) {
            self.role = Some(role);
        }

        let content = delta.content.filter(|c| !c.is_empty());
        if let Some(fragment) = &content {
            self.content.get_or_insert_with(String::new).push_str(fragment);
        }
        let reasoning = delta.reasoning_content.filter(|r| !r.is_empty());
        if let Some(fragment) = &reasoning {
            self.reasoning.get_or_insert_with(String::new).push_str(fragment);
        }

        let mut finish_reason = FinishReason::coerce(choice.finish_reason.as_deref())?;
        if finish_reason == FinishReason::Null && usage.is_some() {
            finish_reason = FinishReason::Usage;
        }
        self.finish_reason = finish_reason;

        let mut tool_calls = None;
        let text = match finish_reason {
            // Content-filtered events carry whole content, not a delta.
            FinishReason::ContentFilter => content.clone().unwrap_or_default(),
            FinishReason::ToolCalls => {
                let drained = self.tool_calls.drain()?;
                if !drained.is_empty() {
                    debug!("Flushed {} assembled tool calls", drained.len());
                    tool_calls = Some(drained);
                }
                String::new()
            }
            _ => self.text().to_string(),
        };

        let terminal = matches!(finish_reason, FinishReason::Stop | FinishReason::Usage);
        if content.is_none() && reasoning.is_none() && tool_calls.is_none() && !terminal {
            trace!("Suppressed empty delta event (finish_reason={})", finish_reason);
            return Ok(None);
        }

        Ok(Some(ChatChunk {
            id,
            model,
            created: created.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            role: self.role.clone(),
            delta: content.unwrap_or_default(),
            text,
            reasoning_delta: reasoning,
            reasoning_text: self.reasoning.clone(),
            finish_reason,
            status: finish_reason.status(),
            tool_calls,
            usage,
        }))
    }
}

/// Decodes a stream of wire events into logical chunks.
///
/// The first decode failure is yielded and ends the stream.
pub fn decode_stream<S, E>(events: S) -> impl Stream<Item = Result<ChatChunk, E>> + Send
where
    S: Stream<Item = Result<ChatCompletionChunk, E>> + Send + 'static,
    E: From<DecodeError> + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = StreamingCompletionDecoder::new();
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            let decoded = match event {
                Ok(event) => decoder.decode(event).map_err(E::from),
                Err(error) => Err(error),
            };
            match decoded {
                Ok(Some(chunk)) => yield Ok(chunk),
                Ok(None) => {}
                Err(error) => {
                    yield Err(error);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
