//! Transport seam.
//!
//! The retry layer never talks to a network directly. It issues attempts
//! through a [`Transport`] and observes each attempt through the
//! [`LiveCall`] handle the transport hands back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use foundry_types::Code;

use crate::retry::RetryKind;

/// Ordered outgoing (or received) call metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Everything the transport needs to issue one attempt.
#[derive(Debug, Clone)]
pub struct CallDetails {
    /// Fully qualified method (an RPC path or an HTTP route).
    pub method: String,
    pub metadata: Metadata,
    /// Per-attempt timeout. The retrier rewrites it on every retry.
    pub timeout: Option<Duration>,
    /// Local dispatch tag. Transports must not put it on the wire.
    pub retry_kind: RetryKind,
}

impl CallDetails {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            metadata: Metadata::new(),
            timeout: None,
            retry_kind: RetryKind::default(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry_kind(mut self, kind: RetryKind) -> Self {
        self.retry_kind = kind;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value);
        self
    }
}

/// A failure that carries a canonical status code.
pub trait RpcStatus: std::error::Error + Send + Sync + 'static {
    fn code(&self) -> Code;

    fn details(&self) -> String {
        self.to_string()
    }
}

/// Control surface of one in-flight attempt.
#[async_trait]
pub trait LiveCall: Send + Sync + 'static {
    /// Requests cancellation. Returns `false` when the call had already finished.
    fn cancel(&self) -> bool;

    fn cancelled(&self) -> bool;

    fn done(&self) -> bool;

    /// Time left before the attempt's own deadline, if it has one.
    fn time_remaining(&self) -> Option<Duration>;

    async fn initial_metadata(&self) -> Metadata;

    async fn trailing_metadata(&self) -> Metadata;

    async fn code(&self) -> Code;

    async fn details(&self) -> String;

    async fn wait_for_connection(&self) {}
}

/// What one attempt produces once issued.
pub enum AttemptOutput<T, E> {
    Single(BoxFuture<'static, Result<T, E>>),
    Stream(BoxStream<'static, Result<T, E>>),
}

/// A live call together with its pending output.
pub struct Attempt<C, T, E> {
    pub call: Arc<C>,
    pub output: AttemptOutput<T, E>,
}

impl<C, T, E> Attempt<C, T, E> {
    pub fn single(call: Arc<C>, response: BoxFuture<'static, Result<T, E>>) -> Self {
        Self { call, output: AttemptOutput::Single(response) }
    }

    pub fn stream(call: Arc<C>, messages: BoxStream<'static, Result<T, E>>) -> Self {
        Self { call, output: AttemptOutput::Stream(messages) }
    }
}

/// Issues single attempts of the two supported call shapes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Request: Clone + Send + Sync + 'static;
    type Response: Send + 'static;
    type Message: Send + 'static;
    type Error: RpcStatus;
    type Call: LiveCall;

    async fn unary(
        &self,
        details: CallDetails,
        request: Self::Request,
    ) -> Result<Attempt<Self::Call, Self::Response, Self::Error>, Self::Error>;

    async fn server_streaming(
        &self,
        details: CallDetails,
        request: Self::Request,
    ) -> Result<Attempt<Self::Call, Self::Message, Self::Error>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_ordered_and_replaces() {
        let mut metadata: Metadata = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(metadata.insert("a", "3"), Some("1".to_string()));
        let keys: Vec<_> = metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(metadata.get("a"), Some("3"));
    }

    #[test]
    fn call_details_builder() {
        let details = CallDetails::new("/chat/completions")
            .with_timeout(Some(Duration::from_secs(3)))
            .with_retry_kind(RetryKind::None)
            .with_metadata("x-folder-id", "b1g");
        assert_eq!(details.retry_kind, RetryKind::None);
        assert_eq!(details.timeout, Some(Duration::from_secs(3)));
        assert_eq!(details.metadata.get("x-folder-id"), Some("b1g"));
    }
}
