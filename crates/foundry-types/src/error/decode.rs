//! Streaming decode errors.
//!
//! Every variant is fatal for the logical response being decoded: partially
//! assembled tool-call arguments are never surfaced.

use thiserror::Error;

/// Errors raised while turning wire delta events into logical chunks.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A tool-call fragment arrived without its `index`
    #[error("Tool call fragment is missing its index")]
    MissingToolCallIndex,

    /// Only `function` tool calls can be assembled
    #[error("Unsupported tool call type: {kind}")]
    UnsupportedToolCallType {
        /// The type reported by the provider
        kind: String,
    },

    /// A completed tool call never received an id
    #[error("Tool call #{index} finished without an id")]
    MissingToolCallId {
        /// Index of the offending tool call
        index: u32,
    },

    /// Finish reason outside the known set
    #[error("Unknown finish reason: {value}")]
    UnknownFinishReason {
        /// Raw value reported by the provider
        value: String,
    },

    /// Event payload is not valid JSON for the expected shape
    #[error("Malformed event payload: {0}")]
    Json(#[from] serde_json::Error),
}
