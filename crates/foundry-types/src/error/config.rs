//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building or validating configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// Retry policy parameters are inconsistent
    #[error("Invalid retry policy: {reason}")]
    InvalidRetryPolicy {
        /// Description of the violated constraint
        reason: String,
    },

    /// Base URL could not be parsed
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// The rejected value
        url: String,
    },

    /// Status code name is not a canonical RPC code
    #[error("Unknown status code: {name}")]
    UnknownStatusCode {
        /// The rejected name
        name: String,
    },

    /// A request option failed validation
    #[error("Config validation error for {field}: {message}")]
    ValidationError {
        /// Name of the field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },
}

impl ConfigError {
    /// Create a retry policy error from a reason string.
    pub fn retry_policy(reason: impl Into<String>) -> Self {
        Self::InvalidRetryPolicy { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_roundtrip() {
        let err = ConfigError::InvalidUrl { url: "not a url".to_string() };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("InvalidUrl"));

        let back: ConfigError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
