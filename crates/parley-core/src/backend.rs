//! Backend agent interface.
//!
//! The backend agent process is opaque to the engine. It is reached through
//! [`AgentBackend`] for request/response calls and pushes stream events onto
//! the [`crate::stream::EventHub`] channel named in each [`SendStreamRequest`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::session::Topic;

/// Arguments of `create_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub provider: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Result of `create_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
}

/// Arguments of `send_stream`.
///
/// Events for this exchange are emitted on `channel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendStreamRequest {
    pub message: String,
    pub channel: String,
    pub workspace_id: String,
    pub session_id: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// The user's answer to an `action_required` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    pub request_id: String,
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

/// Session API of the backend agent process.
///
/// Errors are reported as text; a send against a session bound to another
/// workspace fails with text starting `workspace_mismatch|`.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Creates a session bound to `request.workspace_id`.
    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreatedSession>;

    /// Starts one exchange. Returns once the backend accepted the request;
    /// events may arrive before and after it returns.
    async fn send_stream(&self, request: SendStreamRequest) -> Result<()>;

    /// Forwards a confirmation answer.
    async fn send_permission_response(&self, response: PermissionResponse) -> Result<()>;

    /// Asks the backend to cancel whatever the session is generating.
    async fn stop_session(&self, session_id: &str) -> Result<()>;

    /// Lists the topics of a workspace, most recent first.
    async fn list_topics(&self, workspace_id: &str) -> Result<Vec<Topic>>;

    /// Loads the stored messages of a session.
    async fn load_history(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Deletes a session and its history.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Produces a short title for a session from its conversation so far.
    async fn generate_title(&self, session_id: &str) -> Result<String>;
}
