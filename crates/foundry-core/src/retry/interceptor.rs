//! Adapters binding the retrier to the two call shapes.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;

use super::error::RetryError;
use super::kind::{CallShape, RetryKind};
use super::policy::RetryPolicy;
use super::proxy::StreamCallProxy;
use super::retrier::{pass_through, Retrier};
use crate::transport::{Attempt, CallDetails, LiveCall, RpcStatus};

/// An interceptor produced by [`RetryPolicy::interceptors`].
#[derive(Debug, Clone)]
pub enum RetryInterceptor {
    Unary(UnaryRetryInterceptor),
    Stream(StreamRetryInterceptor),
}

/// Retries unary calls according to their [`RetryKind`].
#[derive(Debug, Clone)]
pub struct UnaryRetryInterceptor {
    retrier: Retrier,
}

impl UnaryRetryInterceptor {
    pub fn new(policy: Arc<RetryPolicy>) -> Self {
        Self { retrier: Retrier::new(policy) }
    }

    pub async fn intercept<C, T, E, Req, F, Fut>(
        &self,
        continuation: F,
        details: CallDetails,
        request: Req,
    ) -> Result<T, RetryError<E>>
    where
        C: LiveCall,
        T: Send + 'static,
        E: RpcStatus,
        Req: Clone + Send + 'static,
        F: Fn(CallDetails, Req) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Attempt<C, T, E>, E>> + Send + 'static,
    {
        let mut results = match details.retry_kind {
            RetryKind::None => pass_through(continuation, details, request),
            RetryKind::Single => self.retrier.retry(continuation, details, request),
            RetryKind::Continuation => {
                return Err(RetryError::NotImplemented {
                    kind: RetryKind::Continuation,
                    shape: CallShape::Unary,
                })
            }
        };
        match results.next().await {
            Some(result) => result.map(|(_, value)| value),
            None => Err(RetryError::LoopExhausted { attempts: 0 }),
        }
    }
}

/// Retries server-streaming calls and hands back a [`StreamCallProxy`].
#[derive(Debug, Clone)]
pub struct StreamRetryInterceptor {
    retrier: Retrier,
}

impl StreamRetryInterceptor {
    pub fn new(policy: Arc<RetryPolicy>) -> Self {
        Self { retrier: Retrier::new(policy) }
    }

    /// Nothing is issued until the returned proxy is first polled.
    pub fn intercept<C, T, E, Req, F, Fut>(
        &self,
        continuation: F,
        details: CallDetails,
        request: Req,
    ) -> Result<StreamCallProxy<C, T, E>, RetryError<E>>
    where
        C: LiveCall,
        T: Send + 'static,
        E: RpcStatus,
        Req: Clone + Send + 'static,
        F: Fn(CallDetails, Req) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Attempt<C, T, E>, E>> + Send + 'static,
    {
        let messages = match details.retry_kind {
            RetryKind::None => pass_through(continuation, details, request),
            RetryKind::Single => self.retrier.retry(continuation, details, request),
            RetryKind::Continuation => {
                return Err(RetryError::NotImplemented {
                    kind: RetryKind::Continuation,
                    shape: CallShape::ServerStreaming,
                })
            }
        };
        Ok(StreamCallProxy::new(messages))
    }
}
