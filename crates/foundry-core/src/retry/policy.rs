//! Retry policy: attempt budget, backoff curve and retriable codes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use foundry_types::{Code, ConfigError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::interceptor::{RetryInterceptor, StreamRetryInterceptor, UnaryRetryInterceptor};

/// Immutable retry configuration shared by every call that uses it.
///
/// A negative `max_attempts` retries forever (bounded only by the call
/// deadline). Backoff for the n-th retry (n starting at 0) is
/// `initial_backoff * backoff_multiplier^n + uniform(0, jitter)`, clamped by
/// `max_backoff` and by the time left until the deadline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    #[serde(with = "duration_secs")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    #[serde(with = "duration_secs")]
    pub jitter: Duration,
    pub retriable_codes: BTreeSet<Code>,
    /// Install the unary interceptor.
    pub intercept_unary: bool,
    /// Install the server-streaming interceptor.
    pub intercept_streaming: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 1.5,
            jitter: Duration::from_secs(1),
            retriable_codes: [Code::Unavailable, Code::ResourceExhausted].into_iter().collect(),
            intercept_unary: true,
            intercept_streaming: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that installs no interceptors: every call is a single attempt.
    pub fn no_retry() -> Self {
        Self { intercept_unary: false, intercept_streaming: false, ..Self::default() }
    }

    pub fn is_no_retry(&self) -> bool {
        !self.intercept_unary && !self.intercept_streaming
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_retriable_codes(mut self, codes: impl IntoIterator<Item = Code>) -> Self {
        self.retriable_codes = codes.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::retry_policy(format!(
                "backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::retry_policy(format!(
                "max_backoff ({:?}) is shorter than initial_backoff ({:?})",
                self.max_backoff, self.initial_backoff
            )));
        }
        Ok(())
    }

    pub fn is_retriable(&self, code: Code) -> bool {
        self.retriable_codes.contains(&code)
    }

    /// Interceptors this policy installs, unary first.
    pub fn interceptors(&self) -> Vec<RetryInterceptor> {
        let shared = Arc::new(self.clone());
        let mut interceptors = Vec::with_capacity(2);
        if self.intercept_unary {
            interceptors
                .push(RetryInterceptor::Unary(UnaryRetryInterceptor::new(Arc::clone(&shared))));
        }
        if self.intercept_streaming {
            interceptors.push(RetryInterceptor::Stream(StreamRetryInterceptor::new(shared)));
        }
        interceptors
    }

    /// Deterministic part of the backoff computation.
    ///
    /// `retry` is the zero-based retry index, `jitter` the sampled jitter and
    /// `remaining` the time left until the deadline.
    pub fn backoff_for(&self, retry: u32, jitter: Duration, remaining: Option<Duration>) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent)
            + jitter.as_secs_f64();
        let delay = if raw.is_nan() || raw <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(raw).unwrap_or(self.max_backoff)
        };
        let delay = delay.min(self.max_backoff);
        match remaining {
            Some(remaining) => delay.min(remaining),
            None => delay,
        }
    }

    /// Backoff for the `retry`-th retry with a freshly sampled jitter.
    pub fn backoff(&self, retry: u32, deadline: Option<Instant>) -> Duration {
        let jitter_secs = self.jitter.as_secs_f64();
        let sampled = if jitter_secs > 0.0 {
            Duration::try_from_secs_f64(rand::thread_rng().gen_range(0.0..=jitter_secs))
                .unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        self.backoff_for(retry, sampled, remaining)
    }

    /// Sleeps for the `retry`-th backoff and returns how long it waited.
    pub async fn sleep(&self, retry: u32, deadline: Option<Instant>) -> Duration {
        let delay = self.backoff(retry, deadline);
        tokio::time::sleep(delay).await;
        delay
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
