//! Stable handle over a retried streaming call.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use foundry_types::Code;
use futures::Stream;
use parking_lot::RwLock;

use super::error::RetryError;
use super::retrier::RetryStream;
use crate::transport::{LiveCall, Metadata};

/// One-slot holder for the attempt currently backing a proxy.
struct CallSlot<C> {
    current: RwLock<Option<Arc<C>>>,
}

impl<C> CallSlot<C> {
    fn get(&self) -> Option<Arc<C>> {
        self.current.read().clone()
    }

    fn replace(&self, call: Arc<C>) {
        let mut current = self.current.write();
        let unchanged = current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &call));
        if !unchanged {
            *current = Some(call);
        }
    }
}

/// Cloneable control surface of a [`StreamCallProxy`].
///
/// Every method reads whichever attempt is current at the time of the call.
/// Before the first item arrives there is no attempt yet and the methods
/// answer with conservative defaults: cancelled and done are `true`,
/// metadata is empty, the code is `Unknown`.
pub struct StreamCallHandle<C> {
    slot: Arc<CallSlot<C>>,
}

impl<C> Clone for StreamCallHandle<C> {
    fn clone(&self) -> Self {
        Self { slot: Arc::clone(&self.slot) }
    }
}

impl<C> fmt::Debug for StreamCallHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCallHandle").field("attached", &self.slot.get().is_some()).finish()
    }
}

impl<C: LiveCall> StreamCallHandle<C> {
    /// The live call of the current attempt, if one has produced an item yet.
    pub fn current(&self) -> Option<Arc<C>> {
        self.slot.get()
    }
}

#[async_trait]
impl<C: LiveCall> LiveCall for StreamCallHandle<C> {
    fn cancel(&self) -> bool {
        self.slot.get().map_or(true, |call| call.cancel())
    }

    fn cancelled(&self) -> bool {
        self.slot.get().map_or(true, |call| call.cancelled())
    }

    fn done(&self) -> bool {
        self.slot.get().map_or(true, |call| call.done())
    }

    fn time_remaining(&self) -> Option<Duration> {
        self.slot.get().and_then(|call| call.time_remaining())
    }

    async fn initial_metadata(&self) -> Metadata {
        match self.slot.get() {
            Some(call) => call.initial_metadata().await,
            None => Metadata::new(),
        }
    }

    async fn trailing_metadata(&self) -> Metadata {
        match self.slot.get() {
            Some(call) => call.trailing_metadata().await,
            None => Metadata::new(),
        }
    }

    async fn code(&self) -> Code {
        match self.slot.get() {
            Some(call) => call.code().await,
            None => Code::Unknown,
        }
    }

    async fn details(&self) -> String {
        match self.slot.get() {
            Some(call) => call.details().await,
            None => String::new(),
        }
    }

    async fn wait_for_connection(&self) {
        if let Some(call) = self.slot.get() {
            call.wait_for_connection().await;
        }
    }
}

/// The object a caller holds for a retried streaming call.
///
/// Its identity never changes across retries; iterating it drives the retry
/// loop and re-points the control surface at each new attempt.
pub struct StreamCallProxy<C, T, E> {
    handle: StreamCallHandle<C>,
    messages: RetryStream<C, T, E>,
}

impl<C: LiveCall, T, E> StreamCallProxy<C, T, E> {
    pub fn new(messages: RetryStream<C, T, E>) -> Self {
        let slot = Arc::new(CallSlot { current: RwLock::new(None) });
        Self { handle: StreamCallHandle { slot }, messages }
    }

    /// A control handle that stays valid while the proxy is being iterated.
    pub fn handle(&self) -> StreamCallHandle<C> {
        self.handle.clone()
    }

    pub fn current_call(&self) -> Option<Arc<C>> {
        self.handle.current()
    }

    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    pub fn cancelled(&self) -> bool {
        self.handle.cancelled()
    }

    pub fn done(&self) -> bool {
        self.handle.done()
    }

    pub fn time_remaining(&self) -> Option<Duration> {
        self.handle.time_remaining()
    }

    pub async fn initial_metadata(&self) -> Metadata {
        self.handle.initial_metadata().await
    }

    pub async fn trailing_metadata(&self) -> Metadata {
        self.handle.trailing_metadata().await
    }

    pub async fn code(&self) -> Code {
        self.handle.code().await
    }

    pub async fn details(&self) -> String {
        self.handle.details().await
    }

    pub async fn wait_for_connection(&self) {
        self.handle.wait_for_connection().await;
    }
}

impl<C, T, E> fmt::Debug for StreamCallProxy<C, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCallProxy").field("handle", &self.handle).finish_non_exhaustive()
    }
}

impl<C: LiveCall, T, E> Stream for StreamCallProxy<C, T, E> {
    type Item = Result<T, RetryError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.messages.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok((call, value)))) => {
                this.handle.slot.replace(call);
                Poll::Ready(Some(Ok(value)))
            }
            Poll::Ready(Some(Err(error))) => Poll::Ready(Some(Err(error))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
