//! Finish reasons and alternative statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DecodeError;

/// Why a completion (or a streamed event) finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Completion finished as expected
    Stop,
    /// Terminated by the `max_tokens` limit
    Length,
    /// Terminated by the content filter
    ContentFilter,
    /// Model returned tool calls
    ToolCalls,
    /// Streamed completion still in progress
    #[default]
    Null,
    /// Trailing streamed event carrying only usage
    Usage,
}

impl FinishReason {
    /// Normalise a raw wire value; absent means "still in progress".
    pub fn coerce(value: Option<&str>) -> Result<Self, DecodeError> {
        let Some(raw) = value else {
            return Ok(Self::Null);
        };
        match raw.to_ascii_lowercase().as_str() {
            "stop" => Ok(Self::Stop),
            "length" => Ok(Self::Length),
            "content_filter" => Ok(Self::ContentFilter),
            "tool_calls" => Ok(Self::ToolCalls),
            "null" | "" => Ok(Self::Null),
            "usage" => Ok(Self::Usage),
            _ => Err(DecodeError::UnknownFinishReason { value: raw.to_string() }),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
            Self::Null => "null",
            Self::Usage => "usage",
        }
    }

    /// Friendlier status for this finish reason.
    pub const fn status(self) -> AlternativeStatus {
        match self {
            Self::Stop => AlternativeStatus::Final,
            Self::Length => AlternativeStatus::TruncatedFinal,
            Self::ContentFilter => AlternativeStatus::ContentFilter,
            Self::ToolCalls => AlternativeStatus::ToolCalls,
            Self::Null => AlternativeStatus::Partial,
            Self::Usage => AlternativeStatus::Usage,
        }
    }

    /// True for every state other than "in progress".
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Null)
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a generated alternative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlternativeStatus {
    #[default]
    Unspecified,
    Partial,
    TruncatedFinal,
    Final,
    ContentFilter,
    ToolCalls,
    Usage,
    Unknown,
}
