//! Error types for the Foundry client.

use foundry_core::{RetryError, RpcStatus};
use foundry_types::{Code, ConfigError, DecodeError};
use thiserror::Error;

/// Failure of a single HTTP attempt, classified for the retry layer.
#[derive(Error, Debug)]
pub enum HttpError {
    /// Server answered with a non-success status.
    #[error("HTTP {status} ({code}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Canonical code the status maps to.
        code: Code,
        /// Response body, if any.
        message: String,
    },

    /// Request could not be sent or the body could not be read.
    ///
    /// reqwest reports a body cut off mid-stream as a decode error.
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Call was cancelled through its live handle.
    #[error("Call cancelled")]
    Cancelled,

    /// Response body does not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The SSE byte stream is malformed.
    #[error("Stream error: {0}")]
    Stream(String),

    /// An SSE frame could not be parsed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl HttpError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status { status, code: Code::from_http_status(status), message: message.into() }
    }
}

impl RpcStatus for HttpError {
    fn code(&self) -> Code {
        match self {
            Self::Status { code, .. } => *code,
            Self::Request(e) => request_code(e),
            Self::Cancelled => Code::Cancelled,
            Self::InvalidResponse(_) | Self::Stream(_) | Self::Decode(_) => Code::Internal,
        }
    }

    fn details(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

fn request_code(error: &reqwest::Error) -> Code {
    if error.is_timeout() {
        Code::DeadlineExceeded
    } else if error.is_connect() || error.is_body() || error.is_decode() {
        Code::Unavailable
    } else {
        Code::Unknown
    }
}

/// Errors that can occur when using the Foundry client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned a non-success status.
    #[error("HTTP error {status} ({code}): {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Canonical code the status maps to.
        code: Code,
        /// Error message from server.
        message: String,
    },

    /// Server returned an invalid or unparseable response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Error occurred during SSE streaming.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Streamed events could not be assembled into chunks.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Client or model configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Call was cancelled before it completed.
    #[error("Call cancelled")]
    Cancelled,

    /// Requested retry behaviour is not available.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Retry engine ended in an impossible state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Canonical code of this failure.
    pub fn code(&self) -> Code {
        match self {
            Self::Request(e) => request_code(e),
            Self::Http { code, .. } => *code,
            Self::InvalidResponse(_) | Self::Stream(_) | Self::Decode(_) | Self::Internal(_) => {
                Code::Internal
            },
            Self::Config(_) => Code::InvalidArgument,
            Self::Cancelled => Code::Cancelled,
            Self::NotImplemented(_) => Code::Unimplemented,
        }
    }
}

impl From<HttpError> for ClientError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Status { status, code, message } => Self::Http { status, code, message },
            HttpError::Request(e) => Self::Request(e),
            HttpError::Cancelled => Self::Cancelled,
            HttpError::InvalidResponse(message) => Self::InvalidResponse(message),
            HttpError::Stream(message) => Self::Stream(message),
            HttpError::Decode(e) => Self::Decode(e),
        }
    }
}

impl From<RetryError<HttpError>> for ClientError {
    fn from(error: RetryError<HttpError>) -> Self {
        match error {
            RetryError::Transport(e) => e.into(),
            e @ RetryError::NotImplemented { .. } => Self::NotImplemented(e.to_string()),
            e @ RetryError::LoopExhausted { .. } => Self::Internal(e.to_string()),
        }
    }
}
