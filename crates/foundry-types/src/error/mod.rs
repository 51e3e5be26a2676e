//! Typed error definitions for Foundry.
//!
//! Each domain has its own enum: [`DecodeError`] for streamed events that
//! cannot be assembled, [`ConfigError`] for rejected configuration.

mod config;
mod decode;

pub use config::ConfigError;
pub use decode::DecodeError;
