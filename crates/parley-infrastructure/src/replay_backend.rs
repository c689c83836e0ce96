//! Replay backend.
//!
//! An [`AgentBackend`] that answers every `send_stream` by emitting a recorded
//! event script onto the hub. It keeps its own session table so that session
//! creation, topic listing, history and workspace-binding failures behave like
//! the real agent process. Used by the CLI and by tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use parley_core::backend::{
    AgentBackend, CreateSessionRequest, CreatedSession, PermissionResponse, SendStreamRequest,
};
use parley_core::content::{append_text, append_thinking, visible_text};
use parley_core::message::Message;
use parley_core::session::Topic;
use parley_core::stream::{EventHub, StreamEvent};
use parley_core::{ParleyError, Result};
use uuid::Uuid;

/// Longest generated title, in characters.
const TITLE_MAX_CHARS: usize = 30;

struct ReplaySession {
    workspace_id: String,
    topic: Topic,
    history: Vec<Message>,
}

pub struct ReplayBackend {
    hub: Arc<EventHub>,
    script: Vec<StreamEvent>,
    sessions: Mutex<HashMap<String, ReplaySession>>,
    permission_responses: Mutex<Vec<PermissionResponse>>,
}

impl ReplayBackend {
    pub fn new(hub: Arc<EventHub>, script: Vec<StreamEvent>) -> Self {
        Self {
            hub,
            script,
            sessions: Mutex::new(HashMap::new()),
            permission_responses: Mutex::new(Vec::new()),
        }
    }

    /// Loads the script from a JSON-lines file.
    pub fn from_jsonl(hub: Arc<EventHub>, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(hub, parse_script(&text)?))
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, ReplaySession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an existing session, as if left over from an earlier run.
    pub fn seed_session(&self, session_id: &str, workspace_id: &str, title: &str) {
        self.sessions().insert(
            session_id.to_string(),
            ReplaySession {
                workspace_id: workspace_id.to_string(),
                topic: Topic::new(session_id, title),
                history: Vec::new(),
            },
        );
    }

    /// Moves a session to another workspace; sends from the old one then fail.
    pub fn rebind_session(&self, session_id: &str, workspace_id: &str) -> Result<()> {
        let mut sessions = self.sessions();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ParleyError::not_found("Session", session_id))?;
        session.workspace_id = workspace_id.to_string();
        Ok(())
    }

    /// Answers received through `send_permission_response`, oldest first.
    pub fn permission_responses(&self) -> Vec<PermissionResponse> {
        self.permission_responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Builds the stored assistant message the script amounts to.
    fn scripted_reply(&self) -> Message {
        let mut reply = Message::assistant_placeholder();
        for event in &self.script {
            match event {
                StreamEvent::TextDelta { text } => {
                    reply.content_parts = append_text(&reply.content_parts, text);
                }
                StreamEvent::ThinkingDelta { text } => {
                    reply.content_parts = append_thinking(&reply.content_parts, text);
                }
                _ => {}
            }
        }
        reply.content = visible_text(&reply.content_parts);
        reply.is_thinking = false;
        reply
    }
}

/// Parses a JSON-lines event script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<StreamEvent>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| serde_json::from_str(line).map_err(ParleyError::from))
        .collect()
}

#[async_trait]
impl AgentBackend for ReplayBackend {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreatedSession> {
        let session_id = Uuid::new_v4().to_string();
        tracing::info!(
            "[ReplayBackend] Created session {} (provider={}, workspace={})",
            session_id,
            request.provider,
            request.workspace_id
        );
        self.seed_session(&session_id, &request.workspace_id, "New Chat");
        Ok(CreatedSession { session_id })
    }

    async fn send_stream(&self, request: SendStreamRequest) -> Result<()> {
        {
            let mut sessions = self.sessions();
            let session = sessions
                .get_mut(&request.session_id)
                .ok_or_else(|| ParleyError::backend(format!("session not found: {}", request.session_id)))?;
            if session.workspace_id != request.workspace_id {
                tracing::debug!(
                    "[ReplayBackend] Session {} is bound to {}",
                    request.session_id,
                    session.workspace_id
                );
                return Err(ParleyError::workspace_mismatch(
                    &request.session_id,
                    &request.workspace_id,
                ));
            }
            session
                .history
                .push(Message::user(request.message.clone(), request.images.clone()));
            session.history.push(self.scripted_reply());
            session.topic.messages_count = session.history.len();
        }

        tracing::debug!(
            "[ReplayBackend] Replaying {} events on {}",
            self.script.len(),
            request.channel
        );
        for event in self.script.iter().cloned() {
            self.hub.emit(&request.channel, event);
        }
        Ok(())
    }

    async fn send_permission_response(&self, response: PermissionResponse) -> Result<()> {
        tracing::debug!(
            "[ReplayBackend] Permission response {} confirmed={}",
            response.request_id,
            response.confirmed
        );
        self.permission_responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(response);
        Ok(())
    }

    async fn stop_session(&self, session_id: &str) -> Result<()> {
        tracing::debug!("[ReplayBackend] Stop requested for {}", session_id);
        Ok(())
    }

    async fn list_topics(&self, workspace_id: &str) -> Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = self
            .sessions()
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .map(|s| s.topic.clone())
            .collect();
        topics.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(topics)
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<Message>> {
        self.sessions()
            .get(session_id)
            .map(|s| s.history.clone())
            .ok_or_else(|| ParleyError::not_found("Session", session_id))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions().remove(session_id);
        Ok(())
    }

    async fn generate_title(&self, session_id: &str) -> Result<String> {
        let mut sessions = self.sessions();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ParleyError::not_found("Session", session_id))?;
        let first_user = session
            .history
            .iter()
            .find(|m| m.is_user())
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        let title: String = first_user.chars().take(TITLE_MAX_CHARS).collect();
        session.topic.title = title.clone();
        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    const SCRIPT: &str = r#"
# greeting
{"type": "thinking_delta", "text": "user says hi"}
{"type": "text_delta", "text": "Hello"}
{"type": "text_delta", "text": " world"}
{"type": "final_done"}
"#;

    fn request(session_id: &str, workspace_id: &str) -> SendStreamRequest {
        SendStreamRequest {
            message: "hi".to_string(),
            channel: "agent_stream_m1".to_string(),
            workspace_id: workspace_id.to_string(),
            session_id: session_id.to_string(),
            provider: "claude".to_string(),
            model: None,
            images: Vec::new(),
            web_search: false,
            thinking: false,
            project_id: None,
        }
    }

    #[test]
    fn test_parse_script_skips_comments() {
        let events = parse_script(SCRIPT).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[3], StreamEvent::FinalDone);
    }

    #[test]
    fn test_parse_script_reports_bad_line() {
        assert!(parse_script("{\"type\": \"nope\"}").is_err());
    }

    #[tokio::test]
    async fn test_send_emits_script_on_channel() {
        let hub = Arc::new(EventHub::new());
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        hub.listen(
            "agent_stream_m1",
            Arc::new(move |event: StreamEvent| sink.lock().unwrap().push(event)),
        );

        let backend = ReplayBackend::new(hub, parse_script(SCRIPT).unwrap());
        let created = backend
            .create_session(CreateSessionRequest {
                provider: "claude".to_string(),
                workspace_id: "ws".to_string(),
                model: None,
                system_prompt: None,
            })
            .await
            .unwrap();

        backend
            .send_stream(request(&created.session_id, "ws"))
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 4);

        let history = backend.load_history(&created.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hello world");

        let topics = backend.list_topics("ws").await.unwrap();
        assert_eq!(topics[0].messages_count, 2);
        assert!(backend.list_topics("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_rebound_session_reports_mismatch() {
        let backend = ReplayBackend::new(Arc::new(EventHub::new()), Vec::new());
        backend.seed_session("s1", "ws", "old");
        backend.rebind_session("s1", "elsewhere").unwrap();

        let err = backend.send_stream(request("s1", "ws")).await.unwrap_err();
        assert!(err.is_workspace_mismatch());
        assert!(matches!(
            err,
            ParleyError::WorkspaceMismatch { ref session_id, ref workspace_id }
                if session_id == "s1" && workspace_id == "ws"
        ));
    }

    #[tokio::test]
    async fn test_generate_title_uses_first_user_message() {
        let backend = ReplayBackend::new(Arc::new(EventHub::new()), Vec::new());
        backend.seed_session("s1", "ws", "New Chat");
        let mut req = request("s1", "ws");
        req.message = "Explain ownership and borrowing in Rust, please".to_string();
        backend.send_stream(req).await.unwrap();

        let title = backend.generate_title("s1").await.unwrap();
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
        assert_eq!(backend.list_topics("ws").await.unwrap()[0].title, title);
    }
}
