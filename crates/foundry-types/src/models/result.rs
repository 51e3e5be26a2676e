//! Result of a non-streamed completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finish::{AlternativeStatus, FinishReason};
use crate::error::DecodeError;
use crate::protocol::{ChatCompletion, CompletionChoice, ToolCall, Usage};

/// One generated alternative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatChoice {
    pub role: String,
    pub text: String,
    pub reasoning_text: Option<String>,
    pub finish_reason: FinishReason,
    pub status: AlternativeStatus,
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatChoice {
    pub fn content(&self) -> &str {
        &self.text
    }

    pub fn reasoning_content(&self) -> Option<&str> {
        self.reasoning_text.as_deref()
    }
}

impl TryFrom<CompletionChoice> for ChatChoice {
    type Error = DecodeError;

    fn try_from(choice: CompletionChoice) -> Result<Self, Self::Error> {
        let finish_reason = FinishReason::coerce(choice.finish_reason.as_deref())?;
        let tool_calls = choice.message.tool_calls.filter(|calls| !calls.is_empty());
        if let Some(calls) = &tool_calls {
            if let Some(call) = calls.iter().find(|c| c.kind != "function") {
                return Err(DecodeError::UnsupportedToolCallType { kind: call.kind.clone() });
            }
        }
        Ok(Self {
            role: choice.message.role,
            text: choice.message.content.unwrap_or_default(),
            reasoning_text: choice.message.reasoning_content,
            finish_reason,
            status: finish_reason.status(),
            tool_calls,
        })
    }
}

/// Full result of a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatModelResult {
    pub id: String,
    pub model: String,
    pub created: DateTime<Utc>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<Usage>,
}

impl ChatModelResult {
    pub fn first_choice(&self) -> Option<&ChatChoice> {
        self.choices.first()
    }

    /// Shortcut for the first choice's text; empty when there are no choices.
    pub fn text(&self) -> &str {
        self.first_choice().map(ChatChoice::content).unwrap_or_default()
    }

    pub fn role(&self) -> Option<&str> {
        self.first_choice().map(|c| c.role.as_str())
    }

    pub fn reasoning_text(&self) -> Option<&str> {
        self.first_choice().and_then(ChatChoice::reasoning_content)
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.first_choice().map(|c| c.finish_reason)
    }

    pub fn status(&self) -> Option<AlternativeStatus> {
        self.first_choice().map(|c| c.status)
    }

    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        self.first_choice().and_then(|c| c.tool_calls.as_deref())
    }
}

impl TryFrom<ChatCompletion> for ChatModelResult {
    type Error = DecodeError;

    fn try_from(raw: ChatCompletion) -> Result<Self, Self::Error> {
        let choices =
            raw.choices.into_iter().map(ChatChoice::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: raw.id,
            model: raw.model,
            created: DateTime::from_timestamp(raw.created, 0).unwrap_or_default(),
            choices,
            usage: raw.usage,
        })
    }
}
