//! Reassembly of tool calls split across many delta events.

use std::collections::BTreeMap;

use foundry_types::protocol::{FunctionCall, ToolCallDelta};
use foundry_types::{DecodeError, ToolCall};

const FUNCTION: &str = "function";

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    kind: Option<String>,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    /// `id` and `type` replace, `name` and `arguments` append.
    fn merge(&mut self, fragment: ToolCallDelta) {
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            self.id = Some(id);
        }
        if let Some(kind) = fragment.kind.filter(|kind| !kind.is_empty()) {
            self.kind = Some(kind);
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                self.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                self.arguments.push_str(&arguments);
            }
        }
    }

    fn finish(self, index: u32) -> Result<ToolCall, DecodeError> {
        let id = self.id.ok_or(DecodeError::MissingToolCallId { index })?;
        Ok(ToolCall {
            id,
            kind: self.kind.unwrap_or_else(|| FUNCTION.to_string()),
            index: Some(index),
            function: FunctionCall { name: self.name, arguments: self.arguments },
        })
    }
}

/// Per-index tool-call buffers of one streamed response.
#[derive(Debug, Default)]
pub struct ToolCallsBuffer {
    calls: BTreeMap<u32, PartialToolCall>,
}

impl ToolCallsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Routes fragments into their buffers.
    ///
    /// Fails on a fragment without an index or with a non-function type.
    pub fn update(
        &mut self,
        fragments: impl IntoIterator<Item = ToolCallDelta>,
    ) -> Result<(), DecodeError> {
        for fragment in fragments {
            let index = fragment.index.ok_or(DecodeError::MissingToolCallIndex)?;
            if let Some(kind) = fragment.kind.as_deref().filter(|kind| !kind.is_empty()) {
                if kind != FUNCTION {
                    return Err(DecodeError::UnsupportedToolCallType { kind: kind.to_string() });
                }
            }
            self.calls.entry(index).or_default().merge(fragment);
        }
        Ok(())
    }

    /// Completed tool calls ordered by index; the buffer is left empty.
    pub fn drain(&mut self) -> Result<Vec<ToolCall>, DecodeError> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, partial)| partial.finish(index))
            .collect()
    }
}
