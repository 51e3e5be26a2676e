//! Generic retry loop.

use std::future::Future;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::RetryError;
use super::policy::RetryPolicy;
use crate::transport::{Attempt, AttemptOutput, CallDetails, LiveCall, RpcStatus};

/// Metadata key carrying the idempotency token shared by all attempts.
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// Metadata key carrying the retry counter, absent on the first attempt.
pub const ATTEMPT_KEY: &str = "x-retry-attempt";

/// Values produced by a logical call, each paired with the live call that produced it.
pub type RetryStream<C, T, E> = BoxStream<'static, Result<(Arc<C>, T), RetryError<E>>>;

/// Cancels the attempt's live call if the stream is dropped while it runs.
struct InFlight<C: LiveCall> {
    call: Option<Arc<C>>,
}

impl<C: LiveCall> InFlight<C> {
    fn new(call: &Arc<C>) -> Self {
        Self { call: Some(Arc::clone(call)) }
    }

    fn disarm(&mut self) {
        self.call = None;
    }
}

impl<C: LiveCall> Drop for InFlight<C> {
    fn drop(&mut self) {
        if let Some(call) = self.call.take() {
            if !call.done() {
                debug!("Consumer went away mid-attempt, cancelling live call");
                call.cancel();
            }
        }
    }
}

/// Runs attempts of one logical call until success, a permanent failure or
/// an exhausted budget.
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: Arc<RetryPolicy>,
}

impl Retrier {
    pub fn new(policy: Arc<RetryPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drives `continuation` under the policy.
    ///
    /// Attempts run strictly one after another. Items of a failed streaming
    /// attempt that were already yielded stay delivered; the next attempt
    /// starts the stream from the beginning.
    pub fn retry<C, T, E, Req, F, Fut>(
        &self,
        continuation: F,
        mut details: CallDetails,
        request: Req,
    ) -> RetryStream<C, T, E>
    where
        C: LiveCall,
        T: Send + 'static,
        E: RpcStatus,
        Req: Clone + Send + 'static,
        F: Fn(CallDetails, Req) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Attempt<C, T, E>, E>> + Send + 'static,
    {
        let policy = Arc::clone(&self.policy);
        let deadline = details.timeout.map(|timeout| Instant::now() + timeout);
        let token = Uuid::new_v4().to_string();
        details.metadata.insert(IDEMPOTENCY_KEY, token.clone());

        Box::pin(async_stream::stream! {
            let max_attempts = i64::from(policy.max_attempts);
            let unlimited = max_attempts < 0;
            let mut attempt: i64 = 0;

            while unlimited || attempt < max_attempts {
                let failure = match continuation(attempt_details(&details, attempt, deadline), request.clone()).await {
                    Err(error) => error,
                    Ok(Attempt { call, output }) => {
                        let mut in_flight = InFlight::new(&call);
                        match output {
                            AttemptOutput::Single(response) => {
                                let result = response.await;
                                in_flight.disarm();
                                match result {
                                    Ok(value) => {
                                        yield Ok((call, value));
                                        return;
                                    }
                                    Err(error) => error,
                                }
                            }
                            AttemptOutput::Stream(mut messages) => {
                                let mut failure = None;
                                while let Some(item) = messages.next().await {
                                    match item {
                                        Ok(value) => yield Ok((Arc::clone(&call), value)),
                                        Err(error) => {
                                            failure = Some(error);
                                            break;
                                        }
                                    }
                                }
                                in_flight.disarm();
                                match failure {
                                    None => return,
                                    Some(error) => error,
                                }
                            }
                        }
                    }
                };

                attempt += 1;
                let code = failure.code();
                if attempt == max_attempts {
                    warn!(
                        "[{}] Retries exhausted: method={}, code={}, attempts={}",
                        token, details.method, code, attempt
                    );
                    yield Err(RetryError::Transport(failure));
                    return;
                }
                if !policy.is_retriable(code) {
                    debug!(
                        "[{}] Non-retriable failure {}, stopping: method={}, attempt={}",
                        token, code, details.method, attempt
                    );
                    yield Err(RetryError::Transport(failure));
                    return;
                }

                let retry = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
                let delay = policy.sleep(retry, deadline).await;
                info!(
                    "[{}] Retry after {}: method={}, attempt={}/{}, delay={}ms",
                    token,
                    code,
                    details.method,
                    attempt,
                    if unlimited { "inf".to_string() } else { max_attempts.to_string() },
                    delay.as_millis()
                );
            }

            yield Err(RetryError::LoopExhausted { attempts: attempt });
        })
    }
}

/// Per-attempt call details: retry counter and the remaining time budget.
fn attempt_details(base: &CallDetails, attempt: i64, deadline: Option<Instant>) -> CallDetails {
    let mut details = base.clone();
    if attempt > 0 {
        details.metadata.insert(ATTEMPT_KEY, attempt.to_string());
        if let Some(deadline) = deadline {
            details.timeout = Some(deadline.saturating_duration_since(Instant::now()));
        }
    }
    details
}

/// One attempt, no metadata injected, no retry.
pub fn pass_through<C, T, E, Req, F, Fut>(
    continuation: F,
    details: CallDetails,
    request: Req,
) -> RetryStream<C, T, E>
where
    C: LiveCall,
    T: Send + 'static,
    E: RpcStatus,
    Req: Send + 'static,
    F: FnOnce(CallDetails, Req) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Attempt<C, T, E>, E>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        match continuation(details, request).await {
            Err(error) => yield Err(RetryError::Transport(error)),
            Ok(Attempt { call, output }) => {
                let mut in_flight = InFlight::new(&call);
                match output {
                    AttemptOutput::Single(response) => {
                        let result = response.await;
                        in_flight.disarm();
                        yield result.map(|value| (call, value)).map_err(RetryError::Transport);
                    }
                    AttemptOutput::Stream(mut messages) => {
                        while let Some(item) = messages.next().await {
                            match item {
                                Ok(value) => yield Ok((Arc::clone(&call), value)),
                                Err(error) => {
                                    in_flight.disarm();
                                    yield Err(RetryError::Transport(error));
                                    return;
                                }
                            }
                        }
                        in_flight.disarm();
                    }
                }
            }
        }
    })
}
