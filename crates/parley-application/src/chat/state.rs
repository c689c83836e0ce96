//! Chat state and the stream reducer.
//!
//! Every update produces a new [`Message`]; the orchestrator swaps it into
//! the message list by id.

use parley_core::content::{
    add_action_required, add_tool_use, append_text, append_thinking, update_tool_use,
};
use parley_core::message::{ActionRequired, Message, ToolCallPatch, ToolCallState};
use parley_core::session::Topic;
use parley_core::stream::StreamEvent;
use serde::Serialize;

/// Content of an errored message that received no text.
pub const ERROR_PREFIX: &str = "错误: ";
/// Content of a stopped message that received no text.
pub const STOPPED_PLACEHOLDER: &str = "(已停止生成)";

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Completed,
    Failed(String),
    Cancelled,
}

/// The assistant message currently being streamed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InFlight {
    pub message_id: String,
    /// Session the exchange runs on, once known.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ChatState {
    pub workspace_id: Option<String>,
    pub session_id: Option<String>,
    pub topics: Vec<Topic>,
    pub messages: Vec<Message>,
    pub in_flight: Option<InFlight>,
}

impl ChatState {
    /// Index of `message_id` if it is still receiving events.
    pub fn streaming_index(&self, message_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.id == message_id && m.is_thinking)
    }

    pub fn is_in_flight(&self, message_id: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.message_id == message_id)
    }

    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    /// Clears the active conversation, keeping workspace and topics.
    pub fn reset_conversation(&mut self) {
        self.session_id = None;
        self.messages.clear();
        self.in_flight = None;
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            workspace_id: self.workspace_id.clone(),
            session_id: self.session_id.clone(),
            topics: self.topics.clone(),
            messages: self.messages.clone(),
            is_sending: self.in_flight.is_some(),
        }
    }
}

/// Read model published to the rendering layer after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub workspace_id: Option<String>,
    pub session_id: Option<String>,
    pub topics: Vec<Topic>,
    pub messages: Vec<Message>,
    pub is_sending: bool,
}

impl ChatSnapshot {
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn topic(&self, topic_id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == topic_id)
    }
}

/// Applies a non-terminal stream event to `message`.
///
/// `done`, `final_done` and `error` leave the content untouched; ending the
/// stream is [`finish`]'s job.
pub fn apply_stream_event(message: &Message, event: &StreamEvent) -> Message {
    let mut next = message.clone();
    match event {
        StreamEvent::TextDelta { text } => {
            next.content.push_str(text);
            next.content_parts = append_text(&message.content_parts, text);
        }
        StreamEvent::ThinkingDelta { text } => {
            next.content_parts = append_thinking(&message.content_parts, text);
        }
        StreamEvent::ToolStart {
            tool_id,
            tool_name,
            arguments,
        } => {
            let call = ToolCallState::started(tool_id.clone(), tool_name.clone(), arguments.clone());
            if !next.tool_calls.iter().any(|c| c.id == *tool_id) {
                next.tool_calls.push(call.clone());
            }
            next.content_parts = add_tool_use(&message.content_parts, call);
        }
        StreamEvent::ToolEnd { tool_id, result } => {
            let patch = ToolCallPatch::finished(result);
            next.tool_calls = message
                .tool_calls
                .iter()
                .map(|c| if c.id == *tool_id { patch.apply(c) } else { c.clone() })
                .collect();
            next.content_parts = update_tool_use(&message.content_parts, tool_id, &patch);
        }
        StreamEvent::ActionRequired(request) => {
            let action = ActionRequired::from(request.clone());
            next.action_requests.push(action.clone());
            next.content_parts = add_action_required(&message.content_parts, action);
        }
        StreamEvent::Done | StreamEvent::FinalDone | StreamEvent::Error { .. } => {}
    }
    next
}

/// Freezes `message`, substituting a placeholder if no text arrived.
pub fn finish(message: &Message, termination: &Termination) -> Message {
    let mut next = message.clone();
    next.is_thinking = false;
    if next.content.is_empty() {
        let fallback = match termination {
            Termination::Completed => None,
            Termination::Failed(reason) => Some(format!("{}{}", ERROR_PREFIX, reason)),
            Termination::Cancelled => Some(STOPPED_PLACEHOLDER.to_string()),
        };
        if let Some(text) = fallback {
            next.content_parts = append_text(&next.content_parts, &text);
            next.content = text;
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::content::ContentPart;
    use parley_core::message::ToolCallStatus;
    use parley_core::stream::{ActionRequiredEvent, ToolResult};
    use serde_json::{Map, json};

    fn stream(events: &[StreamEvent]) -> Message {
        events
            .iter()
            .fold(Message::assistant_placeholder(), |m, e| apply_stream_event(&m, e))
    }

    fn text(s: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            text: s.to_string(),
        }
    }

    #[test]
    fn test_content_is_concatenation_of_text_deltas() {
        let message = stream(&[text("Hel"), text("lo"), text(" world")]);
        assert_eq!(message.content, "Hello world");
        assert_eq!(message.content_parts.len(), 1);
        assert!(message.is_thinking);
    }

    #[test]
    fn test_interleaved_thinking_splits_parts() {
        let message = stream(&[
            text("a"),
            StreamEvent::ThinkingDelta {
                text: "hmm".to_string(),
            },
            text("b"),
        ]);
        assert_eq!(message.content_parts.len(), 3);
        assert_eq!(message.content, "ab");
    }

    #[test]
    fn test_tool_lifecycle_updates_list_and_part() {
        let start = StreamEvent::ToolStart {
            tool_id: "t1".to_string(),
            tool_name: "read_file".to_string(),
            arguments: json!({"path": "a.rs"}),
        };
        let end = StreamEvent::ToolEnd {
            tool_id: "t1".to_string(),
            result: ToolResult {
                success: false,
                extra: Map::new(),
            },
        };

        let running = stream(&[start.clone(), start.clone()]);
        assert_eq!(running.tool_calls.len(), 1);
        assert_eq!(running.content_parts.len(), 1);
        assert_eq!(running.tool_calls[0].status, ToolCallStatus::Running);

        let ended = apply_stream_event(&running, &end);
        assert_eq!(ended.tool_calls[0].status, ToolCallStatus::Failed);
        match &ended.content_parts[0] {
            ContentPart::ToolUse { tool_call } => {
                assert_eq!(tool_call.status, ToolCallStatus::Failed);
                assert!(tool_call.end_time.is_some());
            }
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[test]
    fn test_action_required_is_recorded_twice() {
        let message = stream(&[StreamEvent::ActionRequired(ActionRequiredEvent {
            request_id: "r1".to_string(),
            action_type: "confirm".to_string(),
            tool_name: Some("bash".to_string()),
            arguments: None,
            prompt: Some("Run it?".to_string()),
            questions: None,
            requested_schema: None,
        })]);
        assert_eq!(message.action_requests.len(), 1);
        assert!(matches!(
            message.content_parts[0],
            ContentPart::ActionRequired { .. }
        ));
    }

    #[test]
    fn test_terminal_events_do_not_change_content() {
        let message = stream(&[text("x")]);
        for event in [
            StreamEvent::Done,
            StreamEvent::FinalDone,
            StreamEvent::Error {
                message: "boom".to_string(),
            },
        ] {
            assert_eq!(apply_stream_event(&message, &event), message);
        }
    }

    #[test]
    fn test_finish_keeps_accumulated_text() {
        let message = stream(&[text("Hel")]);
        for termination in [
            Termination::Completed,
            Termination::Cancelled,
            Termination::Failed("boom".to_string()),
        ] {
            let done = finish(&message, &termination);
            assert_eq!(done.content, "Hel");
            assert!(!done.is_thinking);
        }
    }

    #[test]
    fn test_finish_substitutes_placeholders_when_empty() {
        let empty = Message::assistant_placeholder();
        assert_eq!(finish(&empty, &Termination::Cancelled).content, STOPPED_PLACEHOLDER);

        let failed = finish(&empty, &Termination::Failed("rate limited".to_string()));
        assert_eq!(failed.content, "错误: rate limited");
        assert_eq!(failed.content_parts.len(), 1);

        assert_eq!(finish(&empty, &Termination::Completed).content, "");
    }

    #[test]
    fn test_snapshot_reports_sending() {
        let mut state = ChatState::default();
        assert!(!state.snapshot().is_sending);
        state.in_flight = Some(InFlight {
            message_id: "m1".to_string(),
            session_id: None,
        });
        assert!(state.snapshot().is_sending);
        assert!(state.is_in_flight("m1"));
        state.reset_conversation();
        assert!(!state.snapshot().is_sending);
    }
}
