//! Error types for the Parley engine.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Machine-readable prefix the backend puts in front of a stale-binding error.
pub const WORKSPACE_MISMATCH_SENTINEL: &str = "workspace_mismatch|";

static WORKSPACE_MISMATCH_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)workspace[\s_-]*mismatch|does not belong to (the )?workspace")
        .expect("static regex is valid")
});

/// A shared error type for the entire engine.
///
/// The variants mirror the failure taxonomy of a streamed exchange: a session
/// that could not be initialized, a stale session/workspace binding, a failed
/// recovery, an `error` stream event, and a transport failure before any event
/// arrived. The remaining variants cover storage and configuration.
#[derive(Error, Debug, Clone)]
pub enum ParleyError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No workspace selected, or the backend refused to create a session.
    #[error("Session initialization failed: {0}")]
    SessionInit(String),

    /// The session is bound to a different workspace than the one in use.
    #[error("Session '{session_id}' does not belong to workspace '{workspace_id}'")]
    WorkspaceMismatch {
        session_id: String,
        workspace_id: String,
    },

    /// Raw error text reported by the backend agent process.
    #[error("{0}")]
    Backend(String),

    /// Sending failed and automatic recovery could not repair it.
    #[error("Send failed: {0}")]
    SendFailure(String),

    /// The backend ended the stream with an `error` event.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The send call failed before any event arrived.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a SessionInit error
    pub fn session_init(message: impl Into<String>) -> Self {
        Self::SessionInit(message.into())
    }

    /// Creates a WorkspaceMismatch error
    pub fn workspace_mismatch(session_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self::WorkspaceMismatch {
            session_id: session_id.into(),
            workspace_id: workspace_id.into(),
        }
    }

    /// Creates a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates a SendFailure error
    pub fn send_failure(message: impl Into<String>) -> Self {
        Self::SendFailure(message.into())
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a session initialization error
    pub fn is_session_init(&self) -> bool {
        matches!(self, Self::SessionInit(_))
    }

    /// Check if this error reports a stale session/workspace binding.
    ///
    /// Returns true for:
    /// - `WorkspaceMismatch` errors
    /// - any error whose text carries the `workspace_mismatch|` sentinel
    /// - any error whose text says so in words ("Workspace mismatch",
    ///   "does not belong to workspace")
    pub fn is_workspace_mismatch(&self) -> bool {
        match self {
            Self::WorkspaceMismatch { .. } => true,
            other => is_workspace_mismatch_text(&other.to_string()),
        }
    }
}

/// Returns true if the error text reports a stale session/workspace binding.
pub fn is_workspace_mismatch_text(text: &str) -> bool {
    text.contains(WORKSPACE_MISMATCH_SENTINEL) || WORKSPACE_MISMATCH_TEXT.is_match(text)
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ParleyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ParleyError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from String (for error messages)
impl From<String> for ParleyError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, ParleyError>`.
pub type Result<T> = std::result::Result<T, ParleyError>;
