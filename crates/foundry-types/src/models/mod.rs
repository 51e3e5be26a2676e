//! Logical result models.
//!
//! Wire events are normalised into these before reaching callers.

pub mod chunk;
pub mod finish;
pub mod result;

pub use chunk::ChatChunk;
pub use finish::{AlternativeStatus, FinishReason};
pub use result::{ChatChoice, ChatModelResult};
