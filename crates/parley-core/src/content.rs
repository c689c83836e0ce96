//! Content assembly.
//!
//! An assistant message is rendered as an ordered sequence of [`ContentPart`]s.
//! The functions here are pure: they take the current parts and return the
//! next parts, and the caller writes the result back onto the owning message.
//! Order is insertion order and is the rendering order.

use serde::{Deserialize, Serialize};

use crate::message::{ActionRequired, ToolCallPatch, ToolCallState};

/// One ordered unit of an assistant message's interleaved output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Thinking {
        text: String,
    },
    ToolUse {
        #[serde(rename = "toolCall")]
        tool_call: ToolCallState,
    },
    ActionRequired {
        #[serde(rename = "actionRequired")]
        action_required: ActionRequired,
    },
}

impl ContentPart {
    /// Returns the tool call id if this is a `tool_use` part.
    pub fn tool_id(&self) -> Option<&str> {
        match self {
            Self::ToolUse { tool_call } => Some(&tool_call.id),
            _ => None,
        }
    }
}

/// Appends a text delta, merging into a trailing `text` part.
pub fn append_text(parts: &[ContentPart], text: &str) -> Vec<ContentPart> {
    let mut next = parts.to_vec();
    match next.last_mut() {
        Some(ContentPart::Text { text: existing }) => existing.push_str(text),
        _ => next.push(ContentPart::Text {
            text: text.to_string(),
        }),
    }
    next
}

/// Appends a thinking delta, merging into a trailing `thinking` part.
pub fn append_thinking(parts: &[ContentPart], text: &str) -> Vec<ContentPart> {
    let mut next = parts.to_vec();
    match next.last_mut() {
        Some(ContentPart::Thinking { text: existing }) => existing.push_str(text),
        _ => next.push(ContentPart::Thinking {
            text: text.to_string(),
        }),
    }
    next
}

/// Appends a confirmation request. Never merged.
pub fn add_action_required(
    parts: &[ContentPart],
    action_required: ActionRequired,
) -> Vec<ContentPart> {
    let mut next = parts.to_vec();
    next.push(ContentPart::ActionRequired { action_required });
    next
}

/// Appends a `tool_use` part unless one already references `tool_call.id`.
pub fn add_tool_use(parts: &[ContentPart], tool_call: ToolCallState) -> Vec<ContentPart> {
    if parts.iter().any(|p| p.tool_id() == Some(tool_call.id.as_str())) {
        return parts.to_vec();
    }
    let mut next = parts.to_vec();
    next.push(ContentPart::ToolUse { tool_call });
    next
}

/// Applies `patch` to the `tool_use` part whose tool call id is `tool_id`.
pub fn update_tool_use(
    parts: &[ContentPart],
    tool_id: &str,
    patch: &ToolCallPatch,
) -> Vec<ContentPart> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::ToolUse { tool_call } if tool_call.id == tool_id => {
                ContentPart::ToolUse {
                    tool_call: patch.apply(tool_call),
                }
            }
            other => other.clone(),
        })
        .collect()
}

/// Drops the `action_required` part answering `request_id`.
pub fn remove_action_required(parts: &[ContentPart], request_id: &str) -> Vec<ContentPart> {
    parts
        .iter()
        .filter(|part| {
            !matches!(
                part,
                ContentPart::ActionRequired { action_required }
                    if action_required.request_id == request_id
            )
        })
        .cloned()
        .collect()
}

/// Concatenation of every `text` part in order.
pub fn visible_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
