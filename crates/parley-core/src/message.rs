//! Chat message types.
//!
//! This module contains the message model owned by the chat orchestrator:
//! roles, tool call state, pending confirmation requests and the message
//! itself. Content parts live in [`crate::content`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::content::ContentPart;
use crate::stream::{ActionRequiredEvent, ToolResult};

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
}

/// Lifecycle of a single tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Completed,
    Failed,
}

/// State of one tool invocation, created on `tool_start` and finished on `tool_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Unix milliseconds.
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl ToolCallState {
    /// Creates a running tool call stamped with the current time.
    pub fn started(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            status: ToolCallStatus::Running,
            result: None,
            start_time: now_millis(),
            end_time: None,
        }
    }
}

/// Partial update applied to a [`ToolCallState`].
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallPatch {
    pub status: Option<ToolCallStatus>,
    pub result: Option<Value>,
    pub end_time: Option<i64>,
}

impl ToolCallPatch {
    /// Builds the patch for a `tool_end` event.
    pub fn finished(result: &ToolResult) -> Self {
        let status = if result.success {
            ToolCallStatus::Completed
        } else {
            ToolCallStatus::Failed
        };
        Self {
            status: Some(status),
            result: Some(result.to_value()),
            end_time: Some(now_millis()),
        }
    }

    /// Returns a copy of `call` with this patch applied.
    pub fn apply(&self, call: &ToolCallState) -> ToolCallState {
        ToolCallState {
            status: self.status.unwrap_or(call.status),
            result: self.result.clone().or_else(|| call.result.clone()),
            end_time: self.end_time.or(call.end_time),
            ..call.clone()
        }
    }
}

/// A confirmation the backend is waiting on before it continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequired {
    pub request_id: String,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_schema: Option<Value>,
}

impl From<ActionRequiredEvent> for ActionRequired {
    fn from(event: ActionRequiredEvent) -> Self {
        Self {
            request_id: event.request_id,
            action_type: event.action_type,
            tool_name: event.tool_name,
            arguments: event.arguments,
            prompt: event.prompt,
            questions: event.questions,
            requested_schema: event.requested_schema,
        }
    }
}

/// A single message in the active conversation.
///
/// Messages are replaced wholesale on every update (copy-on-write keyed by
/// `id`); nothing holds a mutable reference into the message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    /// Accumulated visible text.
    pub content: String,
    #[serde(default)]
    pub content_parts: Vec<ContentPart>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallState>,
    #[serde(default)]
    pub action_requests: Vec<ActionRequired>,
    #[serde(default)]
    pub is_thinking: bool,
    /// Unix milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    /// Creates a user message.
    pub fn user(text: impl Into<String>, images: Vec<String>) -> Self {
        let text = text.into();
        Self {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::User,
            content_parts: vec![ContentPart::Text { text: text.clone() }],
            content: text,
            tool_calls: Vec::new(),
            action_requests: Vec::new(),
            is_thinking: false,
            timestamp: now_millis(),
            images,
        }
    }

    /// Creates the empty assistant message a stream is assembled into.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::Assistant,
            content: String::new(),
            content_parts: Vec::new(),
            tool_calls: Vec::new(),
            action_requests: Vec::new(),
            is_thinking: true,
            timestamp: now_millis(),
            images: Vec::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// Current time in unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
