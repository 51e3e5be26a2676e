//! Protocol definitions for the completion endpoint.
//!
//! Only the OpenAI-compatible ChatCompletions shape is spoken; both the
//! request/response bodies and the streamed delta events live here.

pub mod openai;

pub use openai::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, ChunkChoice, ChunkDelta, CompletionChoice,
    FunctionCall, FunctionCallDelta, OpenAIRole, ResponseMessage, ToolCall, ToolCallDelta, Usage,
};
