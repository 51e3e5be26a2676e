//! Logical streamed chunk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finish::{AlternativeStatus, FinishReason};
use crate::protocol::{ToolCall, Usage};

/// One reconstructed unit of streamed output.
///
/// `text` and `reasoning_text` are growing prefixes of the whole answer,
/// `delta` and `reasoning_delta` carry only what this event added. A
/// `content_filter` chunk's `text` is the raw content of that event, and a
/// `tool_calls` chunk carries the assembled calls instead of text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChatChunk {
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<DateTime<Utc>>,
    /// Sticky role; `None` until the provider reported one.
    pub role: Option<String>,
    pub delta: String,
    pub text: String,
    pub reasoning_delta: Option<String>,
    pub reasoning_text: Option<String>,
    pub finish_reason: FinishReason,
    pub status: AlternativeStatus,
    /// Present only on the tool-calls terminal chunk.
    pub tool_calls: Option<Vec<ToolCall>>,
    pub usage: Option<Usage>,
}

impl ChatChunk {
    /// Alias for [`ChatChunk::text`], matching chat naming.
    pub fn content(&self) -> &str {
        &self.text
    }

    /// Alias for [`ChatChunk::reasoning_text`], matching chat naming.
    pub fn reasoning_content(&self) -> Option<&str> {
        self.reasoning_text.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_terminal()
    }
}
