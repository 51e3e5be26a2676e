use serde::{Deserialize, Serialize};
use std::fmt;

/// How a logical call should be retried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    /// Single pass-through attempt.
    None,
    /// Restart the whole call on a retriable failure.
    #[default]
    Single,
    /// Resume a broken stream where it stopped. Not implemented.
    Continuation,
}

impl fmt::Display for RetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Single => "single",
            Self::Continuation => "continuation",
        })
    }
}

/// Call shape an interceptor is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    Unary,
    ServerStreaming,
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unary => "unary",
            Self::ServerStreaming => "server-streaming",
        })
    }
}
