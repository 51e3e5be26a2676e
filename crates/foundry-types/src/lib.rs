//! # Foundry Types
//!
//! Core types, models, and error definitions for Foundry.
//!
//! This crate provides the foundational type system for the Foundry workspace:
//!
//! - **`error`** - Typed error hierarchy for stream decoding and configuration
//! - **`models`** - Logical results (`ChatChunk`, `ChatModelResult`, finish reasons)
//! - **`protocol`** - ChatCompletions wire messages and streamed delta events
//! - **`status`** - Canonical RPC status codes used for retry classification
//!
//! ## Architecture Role
//!
//! `foundry-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!                foundry-types (this crate)
//!                        │
//!                        ▼
//!                  foundry-core
//!                        │
//!                        ▼
//!                 foundry-client
//! ```

pub mod error;
pub mod models;
pub mod protocol;
pub mod status;

// Re-export error types for convenience
pub use error::{ConfigError, DecodeError};

// Re-export core model types
pub use models::{AlternativeStatus, ChatChoice, ChatChunk, ChatModelResult, FinishReason};
pub use protocol::{ChatCompletionChunk, ChatMessage, ToolCall, Usage};
pub use status::Code;
