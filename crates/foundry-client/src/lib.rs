#![doc = include_str!("../README.md")]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing))]

mod client;
mod config;
mod error;
mod model;
mod sse;
mod transport;

pub use client::FoundryClient;
pub use config::{ChatModelConfig, ClientConfig, ReasoningMode, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use error::{ClientError, HttpError};
pub use model::{ChatModel, CompletionStream};
pub use sse::{SseFrame, SseLineBuffer};
pub use transport::{HttpCall, HttpTransport, CHAT_COMPLETIONS};

pub use foundry_core::{RetryKind, RetryPolicy};
pub use foundry_types::{ChatChunk, ChatMessage, ChatModelResult, Code, FinishReason};
