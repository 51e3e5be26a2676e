use super::*;
use foundry_types::AlternativeStatus;
use futures::StreamExt;
use serde_json::{json, Value};

fn event(value: Value) -> ChatCompletionChunk {
    serde_json::from_value(value).unwrap()
}

fn delta(delta: Value) -> ChatCompletionChunk {
    event(json!({"choices": [{"index": 0, "delta": delta}]}))
}

fn decode_all(
    decoder: &mut StreamingCompletionDecoder,
    events: impl IntoIterator<Item = ChatCompletionChunk>,
) -> Vec<ChatChunk> {
    events.into_iter().filter_map(|e| decoder.decode(e).unwrap()).collect()
}

#[test]
fn empty_delta_is_suppressed() {
    let mut decoder = StreamingCompletionDecoder::new();
    assert!(decoder.decode(delta(json!({}))).unwrap().is_none());
    assert!(decoder.decode(delta(json!({"content": ""}))).unwrap().is_none());
    assert!(decoder.decode(event(json!({"choices": [{"index": 0}]}))).unwrap().is_none());
}

#[test]
fn end_to_end_text_stream() {
    let mut decoder = StreamingCompletionDecoder::new();
    let chunks = decode_all(
        &mut decoder,
        [
            delta(json!({"role": "assistant"})),
            delta(json!({"content": "Hi"})),
            event(json!({
                "choices": [{"index": 0, "delta": {"content": " there"}, "finish_reason": "stop"}]
            })),
            event(json!({
                "choices": [],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
            })),
        ],
    );

    assert_eq!(chunks.len(), 3);

    assert_eq!(chunks[0].text, "Hi");
    assert_eq!(chunks[0].delta, "Hi");
    assert_eq!(chunks[0].role.as_deref(), Some("assistant"));
    assert_eq!(chunks[0].status, AlternativeStatus::Partial);

    assert_eq!(chunks[1].text, "Hi there");
    assert_eq!(chunks[1].delta, " there");
    assert_eq!(chunks[1].finish_reason, FinishReason::Stop);
    assert_eq!(chunks[1].status, AlternativeStatus::Final);

    assert_eq!(chunks[2].finish_reason, FinishReason::Usage);
    assert_eq!(chunks[2].status, AlternativeStatus::Usage);
    assert_eq!(chunks[2].delta, "");
    assert_eq!(chunks[2].role.as_deref(), Some("assistant"));
    assert_eq!(chunks[2].usage.map(|u| u.total_tokens), Some(5));
}

#[test]
fn tool_call_arguments_are_reassembled() {
    let mut decoder = StreamingCompletionDecoder::new();
    let fragment = |id: Option<&str>, args: &str| {
        let mut call = json!({"index": 0, "function": {"arguments": args}});
        if let Some(id) = id {
            call["id"] = json!(id);
            call["type"] = json!("function");
            call["function"]["name"] = json!("lookup");
        }
        delta(json!({"tool_calls": [call]}))
    };

    let chunks = decode_all(
        &mut decoder,
        [
            fragment(Some("call_1"), "{\"a\":"),
            fragment(None, "1"),
            fragment(None, "}"),
            event(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]})),
        ],
    );

    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.status, AlternativeStatus::ToolCalls);
    assert_eq!(chunk.text, "");
    let calls = chunk.tool_calls.as_deref().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_1");
    assert_eq!(calls[0].function.name, "lookup");
    assert_eq!(calls[0].function.arguments, "{\"a\":1}");
    assert_eq!(calls[0].arguments_json().unwrap(), json!({"a": 1}));
}

#[test]
fn tool_call_buffers_are_cleared_after_flush() {
    let mut decoder = StreamingCompletionDecoder::new();
    let finish = || event(json!({"choices": [{"index": 0, "finish_reason": "tool_calls"}]}));
    decoder
        .decode(delta(json!({"tool_calls": [
            {"index": 0, "id": "c", "type": "function", "function": {"name": "f", "arguments": "{}"}}
        ]})))
        .unwrap();

    assert!(decoder.decode(finish()).unwrap().is_some());
    assert!(decoder.decode(finish()).unwrap().is_none());
}

#[test]
fn content_filter_carries_raw_content() {
    let mut decoder = StreamingCompletionDecoder::new();
    decode_all(&mut decoder, [delta(json!({"content": "hello "})), delta(json!({"content": "world"}))]);
    assert_eq!(decoder.text(), "hello world");

    let chunk = decoder
        .decode(event(json!({
            "choices": [{"index": 0, "delta": {"content": "blocked"}, "finish_reason": "content_filter"}]
        })))
        .unwrap()
        .unwrap();

    assert_eq!(chunk.text, "blocked");
    assert_eq!(chunk.status, AlternativeStatus::ContentFilter);
}

#[test]
fn reasoning_accumulates_separately() {
    let mut decoder = StreamingCompletionDecoder::new();
    let chunks = decode_all(
        &mut decoder,
        [
            delta(json!({"role": "assistant", "reasoning_content": "Let me "})),
            delta(json!({"reasoning_content": "think."})),
            delta(json!({"content": "42"})),
        ],
    );

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text, "");
    assert_eq!(chunks[1].reasoning_delta.as_deref(), Some("think."));
    assert_eq!(chunks[1].reasoning_text.as_deref(), Some("Let me think."));
    assert_eq!(chunks[2].reasoning_delta, None);
    assert_eq!(chunks[2].reasoning_content(), Some("Let me think."));
    assert_eq!(chunks[2].content(), "42");
}

#[test]
fn finish_reason_is_case_insensitive() {
    let mut decoder = StreamingCompletionDecoder::new();
    let chunk = decoder
        .decode(event(json!({"choices": [{"index": 0, "delta": {"content": "x"}, "finish_reason": "LENGTH"}]})))
        .unwrap()
        .unwrap();
    assert_eq!(chunk.finish_reason, FinishReason::Length);
    assert_eq!(chunk.status, AlternativeStatus::TruncatedFinal);
}

#[test]
fn malformed_tool_calls_are_fatal() {
    let mut decoder = StreamingCompletionDecoder::new();
    let missing_index = decoder.decode(delta(json!({"tool_calls": [{"id": "c", "function": {}}]})));
    assert!(matches!(missing_index, Err(DecodeError::MissingToolCallIndex)));

    let wrong_type = decoder.decode(delta(json!({"tool_calls": [{"index": 0, "type": "retrieval"}]})));
    assert!(matches!(wrong_type, Err(DecodeError::UnsupportedToolCallType { .. })));
}

#[test]
fn unknown_finish_reason_is_fatal() {
    let mut decoder = StreamingCompletionDecoder::new();
    let result = decoder.decode(event(json!({"choices": [{"index": 0, "finish_reason": "exploded"}]})));
    assert!(matches!(result, Err(DecodeError::UnknownFinishReason { .. })));
}

#[test]
fn reset_forgets_accumulated_state() {
    let mut decoder = StreamingCompletionDecoder::new();
    decode_all(&mut decoder, [delta(json!({"role": "assistant", "content": "stale"}))]);
    decoder.reset();

    let chunk = decoder.decode(delta(json!({"content": "fresh"}))).unwrap().unwrap();
    assert_eq!(chunk.text, "fresh");
    assert_eq!(chunk.role, None);
}

#[test]
fn decode_json_rejects_garbage() {
    let mut decoder = StreamingCompletionDecoder::new();
    assert!(matches!(decoder.decode_json("{not json"), Err(DecodeError::Json(_))));
    let chunk = decoder.decode_json(r#"{"choices":[{"delta":{"content":"ok"}}]}"#).unwrap();
    assert_eq!(chunk.map(|c| c.text).as_deref(), Some("ok"));
}

#[tokio::test]
async fn decode_stream_stops_at_first_failure() {
    let events: Vec<Result<ChatCompletionChunk, DecodeError>> = vec![
        Ok(delta(json!({"content": "a"}))),
        Ok(delta(json!({}))),
        Ok(delta(json!({"tool_calls": [{"type": "function"}]}))),
        Ok(delta(json!({"content": "never"}))),
    ];

    let chunks: Vec<_> = decode_stream(futures::stream::iter(events)).collect().await;

    assert_eq!(chunks.len(), 2);
    assert!(matches!(&chunks[0], Ok(c) if c.text == "a"));
    assert!(matches!(chunks[1], Err(DecodeError::MissingToolCallIndex)));
}
