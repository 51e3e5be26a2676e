//! `Transport` implementation over reqwest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use foundry_core::retry::ATTEMPT_KEY;
use foundry_core::{Attempt, CallDetails, LiveCall, Metadata, RpcStatus, Transport};
use foundry_types::protocol::{ChatCompletion, ChatCompletionChunk};
use foundry_types::{Code, DecodeError};
use futures::{FutureExt, StreamExt};
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, HttpError};
use crate::sse::{SseFrame, SseLineBuffer};

/// Route of the chat-completions endpoint.
pub const CHAT_COMPLETIONS: &str = "/chat/completions";

/// Live handle of one HTTP attempt.
pub struct HttpCall {
    cancel: watch::Sender<bool>,
    settled: watch::Sender<bool>,
    done: AtomicBool,
    deadline: Option<Instant>,
    headers: RwLock<Metadata>,
    status: RwLock<(Code, String)>,
}

impl HttpCall {
    fn new(timeout: Option<Duration>) -> Self {
        let (cancel, _) = watch::channel(false);
        let (settled, _) = watch::channel(false);
        Self {
            cancel,
            settled,
            done: AtomicBool::new(false),
            deadline: timeout.map(|t| Instant::now() + t),
            headers: RwLock::new(Metadata::new()),
            status: RwLock::new((Code::Unknown, String::new())),
        }
    }

    fn record_headers(&self, response: &Response) {
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
            .collect();
        *self.headers.write() = headers;
        self.settled.send_replace(true);
    }

    fn finish(&self, code: Code, details: String) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.status.write() = (code, details);
        self.settled.send_replace(true);
    }

    fn finish_with<T>(&self, result: &Result<T, HttpError>) {
        match result {
            Ok(_) => self.finish(Code::Ok, String::new()),
            Err(e) => self.finish(e.code(), e.details()),
        }
    }

    /// Resolves once [`LiveCall::cancel`] was called.
    async fn cancelled_signal(&self) {
        let mut rx = self.cancel.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[async_trait]
impl LiveCall for HttpCall {
    fn cancel(&self) -> bool {
        if self.done.load(Ordering::SeqCst) {
            return false;
        }
        let already = self.cancel.send_replace(true);
        self.finish(Code::Cancelled, "Cancelled by caller".to_string());
        !already
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn time_remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    async fn initial_metadata(&self) -> Metadata {
        self.headers.read().clone()
    }

    /// HTTP/1.1 responses carry no trailers.
    async fn trailing_metadata(&self) -> Metadata {
        Metadata::new()
    }

    async fn code(&self) -> Code {
        self.status.read().0
    }

    async fn details(&self) -> String {
        self.status.read().1.clone()
    }

    async fn wait_for_connection(&self) {
        let mut rx = self.settled.subscribe();
        let _ = rx.wait_for(|settled| *settled).await;
    }
}

/// Sends attempts to the chat-completions HTTP API.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder().connect_timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, details: &CallDetails, body: &Value) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, details.method.trim_start_matches('/'));
        let mut builder = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        for (name, value) in details.metadata.iter() {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = details.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

/// Sends the request and checks the status line, honouring cancellation.
async fn send(call: &HttpCall, request: RequestBuilder) -> Result<Response, HttpError> {
    let response = tokio::select! {
        biased;
        () = call.cancelled_signal() => return Err(HttpError::Cancelled),
        response = request.send() => response.map_err(HttpError::Request)?,
    };
    call.record_headers(&response);

    let status = response.status();
    debug!("Response status: {}", status);
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(HttpError::status(status.as_u16(), message));
    }
    Ok(response)
}

fn parse_event(payload: &str) -> Result<ChatCompletionChunk, HttpError> {
    serde_json::from_str(payload).map_err(|e| HttpError::Decode(DecodeError::Json(e)))
}

#[async_trait]
impl Transport for HttpTransport {
    type Request = Value;
    type Response = ChatCompletion;
    type Message = ChatCompletionChunk;
    type Error = HttpError;
    type Call = HttpCall;

    async fn unary(
        &self,
        details: CallDetails,
        body: Value,
    ) -> Result<Attempt<HttpCall, ChatCompletion, HttpError>, HttpError> {
        debug!("POST {} (unary, retry={:?})", details.method, details.metadata.get(ATTEMPT_KEY));
        let call = Arc::new(HttpCall::new(details.timeout));
        let request = self.request(&details, &body);
        let task_call = Arc::clone(&call);

        let response = async move {
            let result = async {
                let response = send(&task_call, request).await?;
                let bytes = tokio::select! {
                    biased;
                    () = task_call.cancelled_signal() => return Err(HttpError::Cancelled),
                    bytes = response.bytes() => bytes.map_err(HttpError::Request)?,
                };
                serde_json::from_slice::<ChatCompletion>(&bytes)
                    .map_err(|e| HttpError::InvalidResponse(e.to_string()))
            }
            .await;
            task_call.finish_with(&result);
            result
        };
        Ok(Attempt::single(call, response.boxed()))
    }

    async fn server_streaming(
        &self,
        details: CallDetails,
        body: Value,
    ) -> Result<Attempt<HttpCall, ChatCompletionChunk, HttpError>, HttpError> {
        debug!("POST {} (stream, retry={:?})", details.method, details.metadata.get(ATTEMPT_KEY));
        let call = Arc::new(HttpCall::new(details.timeout));
        let request = self.request(&details, &body);
        let task_call = Arc::clone(&call);

        let messages = async_stream::stream! {
            let response = match send(&task_call, request).await {
                Ok(response) => response,
                Err(error) => {
                    task_call.finish(error.code(), error.details());
                    yield Err(error);
                    return;
                }
            };

            let mut body = Box::pin(response.bytes_stream());
            let mut cancelled = Box::pin(task_call.cancelled_signal());
            let mut lines = SseLineBuffer::new();
            loop {
                let next = tokio::select! {
                    biased;
                    () = &mut cancelled => None,
                    chunk = body.next() => Some(chunk),
                };
                let (frames, ended): (Vec<Result<SseFrame, HttpError>>, bool) = match next {
                    None => {
                        task_call.finish(Code::Cancelled, "Cancelled by caller".to_string());
                        yield Err(HttpError::Cancelled);
                        return;
                    }
                    Some(None) => (lines.finish().into_iter().collect(), true),
                    Some(Some(Err(e))) => (vec![Err(HttpError::Request(e))], true),
                    Some(Some(Ok(bytes))) => {
                        debug!("SSE chunk: {} bytes", bytes.len());
                        (lines.push(&bytes), false)
                    }
                };

                for frame in frames {
                    let parsed = match frame {
                        Ok(SseFrame::Done) => {
                            task_call.finish(Code::Ok, String::new());
                            return;
                        }
                        Ok(SseFrame::Data(payload)) => parse_event(&payload),
                        Err(error) => Err(error),
                    };
                    match parsed {
                        Ok(event) => yield Ok(event),
                        Err(error) => {
                            task_call.finish(error.code(), error.details());
                            yield Err(error);
                            return;
                        }
                    }
                }
                if ended {
                    task_call.finish(Code::Ok, String::new());
                    return;
                }
            }
        };
        Ok(Attempt::stream(call, messages.boxed()))
    }
}
