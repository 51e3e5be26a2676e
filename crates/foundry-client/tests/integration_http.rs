#![allow(unused_crate_dependencies)]
#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::expect_used, reason = "integration test, panics are the assertion mechanism")]

use std::time::Duration;

use foundry_client::{
    ChatMessage, ClientConfig, ClientError, Code, FinishReason, FoundryClient, RetryPolicy,
};
use foundry_core::LiveCall;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gpt://folder/yandexgpt/latest";

fn completion_body() -> serde_json::Value {
    serde_json::json!({
        "id": "cmpl-1",
        "model": MODEL,
        "created": 1_700_000_000,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello from mock!"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
    })
}

fn sse_body() -> String {
    [
        r#"{"id":"c1","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"}}]}"#,
        r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"lo"}}]}"#,
        r#"{"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        r#"{"id":"c1","choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
    ]
    .iter()
    .map(|event| format!("data: {event}\n\n"))
    .chain(std::iter::once("data: [DONE]\n\n".to_string()))
    .collect()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(50), 1.0)
        .with_jitter(Duration::ZERO)
}

fn client(server: &MockServer, retry: RetryPolicy) -> FoundryClient {
    client_at(&server.uri(), retry)
}

fn client_at(base_url: &str, retry: RetryPolicy) -> FoundryClient {
    let config = ClientConfig::default()
        .with_base_url(base_url)
        .with_api_key("test-key")
        .with_timeout(Duration::from_secs(10))
        .with_retry(retry);
    FoundryClient::new(config).expect("valid config")
}

#[tokio::test]
async fn unavailable_is_retried_with_a_stable_idempotency_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let model = client(&server, fast_policy()).chat_model(MODEL);
    let result = model.run(&[ChatMessage::user("Hi")], None).await.expect("third attempt succeeds");
    assert_eq!(result.text(), "Hello from mock!");
    assert_eq!(result.usage.map(|u| u.total_tokens), Some(7));

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 3);
    let keys: Vec<_> = requests
        .iter()
        .map(|r| r.headers.get("idempotency-key").and_then(|v| v.to_str().ok()).map(String::from))
        .collect();
    assert!(keys[0].is_some(), "first attempt must carry an idempotency key");
    assert!(keys.iter().all(|k| k == &keys[0]), "keys differ across attempts: {keys:?}");
    assert!(requests[0].headers.get("x-retry-attempt").is_none());
    assert_eq!(
        requests[2].headers.get("x-retry-attempt").and_then(|v| v.to_str().ok()),
        Some("2")
    );

    let body: serde_json::Value = requests[0].body_json().expect("json body");
    assert_eq!(body["model"], MODEL);
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn invalid_argument_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad temperature"))
        .expect(1)
        .mount(&server)
        .await;

    let model = client(&server, fast_policy()).chat_model(MODEL);
    let err = model.run(&[ChatMessage::user("Hi")], None).await.expect_err("400 is fatal");
    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(
        matches!(err, ClientError::Http { status: 400, ref message, .. } if message == "bad temperature")
    );
}

#[tokio::test]
async fn exhausted_budget_surfaces_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .expect(3)
        .mount(&server)
        .await;

    let model = client(&server, fast_policy()).chat_model(MODEL);
    let err = model.run(&[ChatMessage::user("Hi")], None).await.expect_err("all attempts fail");
    assert_eq!(err.code(), Code::ResourceExhausted);
}

#[tokio::test]
async fn no_retry_policy_sends_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let model = client(&server, RetryPolicy::no_retry()).chat_model(MODEL);
    let err = model.run(&[ChatMessage::user("Hi")], None).await.expect_err("single attempt");
    assert_eq!(err.code(), Code::Unavailable);

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].headers.get("idempotency-key").is_none());
}

#[tokio::test]
async fn sse_stream_is_decoded_into_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body().into_bytes(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let model = client(&server, fast_policy()).chat_model(MODEL);
    let stream = model.run_stream(&[ChatMessage::user("Hi")], None).expect("request builds");
    let chunks: Vec<_> = stream.collect::<Vec<_>>().await.into_iter().collect::<Result<_, _>>()
        .expect("stream decodes");

    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0].delta, "Hel");
    assert_eq!(chunks[0].role.as_deref(), Some("assistant"));
    assert_eq!(chunks[1].delta, "lo");
    assert_eq!(chunks[1].text, "Hello");
    assert_eq!(chunks[2].finish_reason, FinishReason::Stop);
    assert_eq!(chunks[2].text, "Hello");
    assert_eq!(chunks[3].finish_reason, FinishReason::Usage);
    assert_eq!(chunks[3].usage.as_ref().map(|u| u.total_tokens), Some(3));

    let requests = server.received_requests().await.expect("recording enabled");
    let body: serde_json::Value = requests[0].body_json().expect("json body");
    assert_eq!(body["stream"], true);
}

#[tokio::test]
async fn stream_open_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body().into_bytes(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let model = client(&server, fast_policy()).chat_model(MODEL);
    let mut stream = model.run_stream(&[ChatMessage::user("Hi")], None).expect("request builds");
    let mut last_text = String::new();
    while let Some(chunk) = stream.next().await {
        last_text = chunk.expect("retried stream decodes").text;
    }
    assert_eq!(last_text, "Hello");
}

#[tokio::test]
async fn malformed_event_ends_the_stream_with_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: {not json\n\n".to_vec(),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let model = client(&server, RetryPolicy::no_retry()).chat_model(MODEL);
    let results: Vec<_> =
        model.run_stream(&[ChatMessage::user("Hi")], None).expect("request builds").collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().map(|c| c.text.as_str()).ok(), Some("ok"));
    assert!(results[1].as_ref().is_err_and(|e| e.code() == Code::Internal));
}

#[tokio::test]
async fn non_utf8_data_line_fails_the_stream() {
    let server = MockServer::start().await;
    let mut body = b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n".to_vec();
    body.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\xffb\"}}]}\n\n");
    body.extend_from_slice(b"data: [DONE]\n\n");
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let model = client(&server, fast_policy()).chat_model(MODEL);
    let mut stream = model.run_stream(&[ChatMessage::user("Hi")], None).expect("request builds");
    let first = stream.next().await.expect("first chunk").expect("valid chunk");
    assert_eq!(first.text, "ok");

    let err = stream.next().await.expect("error item").expect_err("invalid UTF-8 is fatal");
    assert!(matches!(err, ClientError::Stream(_)), "unexpected error: {err:?}");
    assert_eq!(err.code(), Code::Internal);
    assert!(stream.next().await.is_none());
    assert!(stream.handle().done());
    assert_eq!(stream.handle().code().await, Code::Internal);
}

/// Reads one HTTP/1.1 request and returns its head.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.expect("read request");
        assert!(n > 0, "client closed before sending a request");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let n = socket.read(&mut chunk).await.expect("read body");
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }
    head
}

fn sse_event(event: &serde_json::Value) -> String {
    format!("data: {event}\n\n")
}

/// First connection streams one event and hangs up mid-body; the second
/// streams a complete answer.
async fn serve_truncated_then_complete(listener: TcpListener) -> (String, String) {
    let (mut first, _) = listener.accept().await.expect("first connection");
    let first_head = read_request(&mut first).await;
    let partial = sse_event(&serde_json::json!({
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hel"}}]
    }));
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
        partial.len(),
        partial
    );
    first.write_all(response.as_bytes()).await.expect("write partial");
    first.flush().await.expect("flush partial");
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(first);

    let (mut second, _) = listener.accept().await.expect("second connection");
    let second_head = read_request(&mut second).await;
    let body: String = [
        serde_json::json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": "Wor"}}]}),
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": "ld"}}]}),
        serde_json::json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
    ]
    .iter()
    .map(sse_event)
    .chain(std::iter::once("data: [DONE]\n\n".to_string()))
    .collect();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    second.write_all(response.as_bytes()).await.expect("write complete");
    second.shutdown().await.expect("shutdown");
    (first_head, second_head)
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| line.strip_prefix(name)?.strip_prefix(':')).map(str::trim)
}

#[tokio::test]
async fn retried_stream_restarts_accumulated_text() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
    let server = tokio::spawn(serve_truncated_then_complete(listener));

    let model = client_at(&base_url, fast_policy()).chat_model(MODEL);
    let chunks: Vec<_> = model
        .run_stream(&[ChatMessage::user("Hi")], None)
        .expect("request builds")
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("retry recovers the stream");

    let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["Hel", "Wor", "World", "World"]);
    assert_eq!(chunks[1].delta, "Wor");
    assert_eq!(chunks[3].finish_reason, FinishReason::Stop);

    let (first_head, second_head) = server.await.expect("server task");
    let key = header_value(&first_head, "idempotency-key").expect("idempotency key");
    assert_eq!(header_value(&second_head, "idempotency-key"), Some(key));
    assert_eq!(header_value(&first_head, "x-retry-attempt"), None);
    assert_eq!(header_value(&second_head, "x-retry-attempt"), Some("1"));
}
