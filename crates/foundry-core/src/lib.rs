//! # Foundry Core
//!
//! Resilient call layer and streaming decoder for Foundry.
//!
//! ## Architecture
//!
//! ```text
//! foundry-core/src/
//! ├── transport.rs   # Transport / LiveCall seam, CallDetails, Metadata
//! ├── retry/         # RetryPolicy, Retrier, StreamCallProxy, interceptors, RetryingChannel
//! ├── decoder/       # StreamingCompletionDecoder, tool-call reassembly
//! └── logging.rs     # tracing-subscriber bootstrap
//! ```
//!
//! The retry engine is generic over the transport; `foundry-client` plugs an
//! HTTP transport into it.

#![allow(
    clippy::significant_drop_tightening,
    reason = "RwLock guards around the call slot are held for a single read or write"
)]
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::indexing_slicing,
        clippy::float_cmp
    )
)]

pub mod decoder;
pub mod logging;
pub mod retry;
pub mod transport;

pub use decoder::{decode_stream, StreamingCompletionDecoder, ToolCallsBuffer};
pub use logging::init_tracing;
pub use retry::{
    RetryError, RetryInterceptor, RetryKind, RetryPolicy, Retrier, RetryingChannel,
    StreamCallHandle, StreamCallProxy, StreamRetryInterceptor, UnaryRetryInterceptor,
};
pub use transport::{Attempt, AttemptOutput, CallDetails, LiveCall, Metadata, RpcStatus, Transport};
