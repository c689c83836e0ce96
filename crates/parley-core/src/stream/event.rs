use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One discrete unit pushed by the backend over a message-scoped channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Append to visible content.
    TextDelta { text: String },
    /// Append to reasoning content.
    ThinkingDelta { text: String },
    /// A tool invocation begins.
    ToolStart {
        tool_id: String,
        tool_name: String,
        #[serde(default)]
        arguments: Value,
    },
    /// A tool invocation concludes.
    ToolEnd { tool_id: String, result: ToolResult },
    /// The backend needs a user confirmation before continuing.
    ActionRequired(ActionRequiredEvent),
    /// One backend round finished; a tool-use loop may still continue.
    Done,
    /// The conversation turn is complete.
    FinalDone,
    /// The stream failed.
    Error { message: String },
}

impl StreamEvent {
    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ThinkingDelta { .. } => "thinking_delta",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::ActionRequired(_) => "action_required",
            Self::Done => "done",
            Self::FinalDone => "final_done",
            Self::Error { .. } => "error",
        }
    }

    /// `final_done` and `error` end a stream; `done` does not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalDone | Self::Error { .. })
    }
}

/// Payload of an `action_required` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequiredEvent {
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

/// Result payload of a `tool_end` event: `{success, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub success: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolResult {
    /// The full result object, `success` included.
    pub fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        object.insert("success".to_string(), Value::Bool(self.success));
        Value::Object(object)
    }
}
