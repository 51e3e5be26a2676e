//! Transport wrapped with the interceptors of a retry policy.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::error::RetryError;
use super::interceptor::{RetryInterceptor, StreamRetryInterceptor, UnaryRetryInterceptor};
use super::kind::RetryKind;
use super::policy::RetryPolicy;
use super::proxy::StreamCallProxy;
use super::retrier::pass_through;
use crate::transport::{CallDetails, Transport};

/// Proxy type returned by [`RetryingChannel::call_server_streaming`].
pub type ChannelStream<T> =
    StreamCallProxy<<T as Transport>::Call, <T as Transport>::Message, <T as Transport>::Error>;

/// Issues calls through a [`Transport`], retrying per policy.
pub struct RetryingChannel<T> {
    transport: Arc<T>,
    unary: Option<UnaryRetryInterceptor>,
    streaming: Option<StreamRetryInterceptor>,
}

impl<T> Clone for RetryingChannel<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            unary: self.unary.clone(),
            streaming: self.streaming.clone(),
        }
    }
}

impl<T: Transport> RetryingChannel<T> {
    pub fn new(transport: T, policy: &RetryPolicy) -> Self {
        let mut unary = None;
        let mut streaming = None;
        for interceptor in policy.interceptors() {
            match interceptor {
                RetryInterceptor::Unary(i) => unary = Some(i),
                RetryInterceptor::Stream(i) => streaming = Some(i),
            }
        }
        Self { transport: Arc::new(transport), unary, streaming }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn call_unary(
        &self,
        method: &str,
        request: T::Request,
        timeout: Option<Duration>,
        kind: RetryKind,
    ) -> Result<T::Response, RetryError<T::Error>> {
        let details = CallDetails::new(method).with_timeout(timeout).with_retry_kind(kind);
        self.call_unary_with(details, request).await
    }

    /// Like [`call_unary`](Self::call_unary) with caller-built details.
    pub async fn call_unary_with(
        &self,
        details: CallDetails,
        request: T::Request,
    ) -> Result<T::Response, RetryError<T::Error>> {
        let transport = Arc::clone(&self.transport);
        let continuation = move |details: CallDetails, request: T::Request| {
            let transport = Arc::clone(&transport);
            async move { transport.unary(details, request).await }
        };
        match &self.unary {
            Some(interceptor) => interceptor.intercept(continuation, details, request).await,
            None => match pass_through(continuation, details, request).next().await {
                Some(result) => result.map(|(_, value)| value),
                None => Err(RetryError::LoopExhausted { attempts: 0 }),
            },
        }
    }

    pub fn call_server_streaming(
        &self,
        method: &str,
        request: T::Request,
        timeout: Option<Duration>,
        kind: RetryKind,
    ) -> Result<ChannelStream<T>, RetryError<T::Error>> {
        let details = CallDetails::new(method).with_timeout(timeout).with_retry_kind(kind);
        self.call_server_streaming_with(details, request)
    }

    pub fn call_server_streaming_with(
        &self,
        details: CallDetails,
        request: T::Request,
    ) -> Result<ChannelStream<T>, RetryError<T::Error>> {
        let transport = Arc::clone(&self.transport);
        let continuation = move |details: CallDetails, request: T::Request| {
            let transport = Arc::clone(&transport);
            async move { transport.server_streaming(details, request).await }
        };
        match &self.streaming {
            Some(interceptor) => interceptor.intercept(continuation, details, request),
            None => Ok(StreamCallProxy::new(pass_through(continuation, details, request))),
        }
    }
}
