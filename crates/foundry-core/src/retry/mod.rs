//! Transparent retries for unary and server-streaming calls.
//!
//! A [`RetryPolicy`] produces interceptors; the interceptors dispatch on the
//! call's [`RetryKind`] and hand the call to a [`Retrier`]. Streaming calls
//! come back wrapped in a [`StreamCallProxy`] whose control surface follows
//! the attempt that is currently running.
//!
//! Every attempt of one logical call carries the same `idempotency-key`
//! metadata value; retries additionally carry `x-retry-attempt`.

mod channel;
mod error;
mod interceptor;
mod kind;
mod policy;
mod proxy;
mod retrier;

pub use channel::{ChannelStream, RetryingChannel};
pub use error::RetryError;
pub use interceptor::{RetryInterceptor, StreamRetryInterceptor, UnaryRetryInterceptor};
pub use kind::{CallShape, RetryKind};
pub use policy::RetryPolicy;
pub use proxy::{StreamCallHandle, StreamCallProxy};
pub use retrier::{pass_through, Retrier, RetryStream, ATTEMPT_KEY, IDEMPOTENCY_KEY};
