//! Recovery from stale session/workspace bindings.
//!
//! A session id can outlive the workspace binding it was created under, for
//! example when the backend re-homed it or local storage restored an id from
//! another workspace. The backend then refuses the send with a
//! `workspace_mismatch|` error. `RecoveryCoordinator` turns that one failure
//! into a fresh session and a single retry.

use std::sync::Arc;

use parley_core::backend::{AgentBackend, CreateSessionRequest, SendStreamRequest};
use parley_core::session::ResetVersion;
use parley_core::{ParleyError, Result};

use crate::session::SessionIdentityStore;

/// Result of a send that went through the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// The session the exchange finally ran on.
    pub session_id: String,
    /// True if the original session was replaced.
    pub recovered: bool,
    /// False if the exchange was abandoned before the retry was sent.
    pub streaming: bool,
}

pub struct RecoveryCoordinator {
    /// Backend the send and the replacement session go through
    backend: Arc<dyn AgentBackend>,
    /// Where the stale id is invalidated and the new one remembered
    identity: SessionIdentityStore,
    /// Bumped on repair so in-flight continuations on the old session drop their results
    reset_version: ResetVersion,
    /// System prompt for replacement sessions
    system_prompt: Option<String>,
}

impl RecoveryCoordinator {
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        identity: SessionIdentityStore,
        reset_version: ResetVersion,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            backend,
            identity,
            reset_version,
            system_prompt,
        }
    }

    /// Sends `request`, repairing a stale session binding at most once.
    ///
    /// Errors other than a workspace mismatch are returned unchanged and
    /// leave no trace. On a mismatch the stale session is forgotten for its
    /// workspace and marked invalid, a new session is created for the same
    /// workspace, provider and model, `on_new_session` is told its id, and
    /// the send is retried on it exactly once. If `on_new_session` returns
    /// false the retry is skipped and the outcome is not streaming. A failed
    /// repair or retry is reported as [`ParleyError::SendFailure`].
    pub async fn send_with_recovery<F>(
        &self,
        request: SendStreamRequest,
        on_new_session: F,
    ) -> Result<SendOutcome>
    where
        F: FnOnce(&str) -> bool + Send,
    {
        let err = match self.backend.send_stream(request.clone()).await {
            Ok(()) => {
                return Ok(SendOutcome {
                    session_id: request.session_id,
                    recovered: false,
                    streaming: true,
                });
            }
            Err(err) => err,
        };
        if !err.is_workspace_mismatch() {
            return Err(err);
        }

        tracing::warn!(
            "[RecoveryCoordinator] Session {} is not bound to workspace {}: {}",
            request.session_id,
            request.workspace_id,
            err
        );
        let session_id = self
            .repair(&request)
            .await
            .map_err(|e| ParleyError::send_failure(format!("session repair failed: {}", e)))?;
        if !on_new_session(&session_id) {
            tracing::info!(
                "[RecoveryCoordinator] Exchange abandoned before retry on {}",
                session_id
            );
            return Ok(SendOutcome {
                session_id,
                recovered: true,
                streaming: false,
            });
        }

        let retry = SendStreamRequest {
            session_id: session_id.clone(),
            ..request
        };
        match self.backend.send_stream(retry).await {
            Ok(()) => {
                tracing::info!(
                    "[RecoveryCoordinator] Retried on replacement session {}",
                    session_id
                );
                Ok(SendOutcome {
                    session_id,
                    recovered: true,
                    streaming: true,
                })
            }
            Err(e) => {
                tracing::error!(
                    "[RecoveryCoordinator] Retry on session {} failed: {}",
                    session_id,
                    e
                );
                Err(ParleyError::send_failure(format!(
                    "retry after session repair failed: {}",
                    e
                )))
            }
        }
    }

    /// Drops the stale binding and creates the replacement session.
    async fn repair(&self, request: &SendStreamRequest) -> Result<String> {
        let version = self.reset_version.bump();
        tracing::debug!("[RecoveryCoordinator] Reset version is now {}", version);

        self.identity.clear_scoped(&request.workspace_id).await?;
        self.identity.invalidate(&request.session_id).await?;

        let created = self
            .backend
            .create_session(CreateSessionRequest {
                provider: request.provider.clone(),
                workspace_id: request.workspace_id.clone(),
                model: request.model.clone(),
                system_prompt: self.system_prompt.clone(),
            })
            .await?;
        self.identity
            .remember(&request.workspace_id, &created.session_id)
            .await?;
        Ok(created.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::backend::{CreatedSession, PermissionResponse};
    use parley_core::error::WORKSPACE_MISMATCH_SENTINEL;
    use parley_core::message::Message;
    use parley_core::session::Topic;
    use parley_infrastructure::InMemoryKeyValueStore;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Backend whose sends fail according to a per-session table.
    #[derive(Default)]
    struct MockBackend {
        mismatched: Mutex<HashSet<String>>,
        broken: Mutex<HashSet<String>>,
        fail_create: bool,
        sends: Mutex<Vec<String>>,
        created: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn mismatched(session_ids: &[&str]) -> Self {
            Self {
                mismatched: Mutex::new(session_ids.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AgentBackend for MockBackend {
        async fn create_session(&self, _request: CreateSessionRequest) -> Result<CreatedSession> {
            if self.fail_create {
                return Err(ParleyError::backend("provider unavailable"));
            }
            let mut created = self.created.lock().unwrap();
            let session_id = format!("fresh-{}", created.len() + 1);
            created.push(session_id.clone());
            Ok(CreatedSession { session_id })
        }

        async fn send_stream(&self, request: SendStreamRequest) -> Result<()> {
            self.sends.lock().unwrap().push(request.session_id.clone());
            if self.mismatched.lock().unwrap().contains(&request.session_id) {
                return Err(ParleyError::backend(format!(
                    "{}{}",
                    WORKSPACE_MISMATCH_SENTINEL, request.session_id
                )));
            }
            if self.broken.lock().unwrap().contains(&request.session_id) {
                return Err(ParleyError::backend("connection reset"));
            }
            Ok(())
        }

        async fn send_permission_response(&self, _response: PermissionResponse) -> Result<()> {
            Ok(())
        }

        async fn stop_session(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }

        async fn list_topics(&self, _workspace_id: &str) -> Result<Vec<Topic>> {
            Ok(Vec::new())
        }

        async fn load_history(&self, _session_id: &str) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn delete_session(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }

        async fn generate_title(&self, _session_id: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    fn identity() -> SessionIdentityStore {
        SessionIdentityStore::new(
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(InMemoryKeyValueStore::new()),
        )
    }

    fn request(session_id: &str) -> SendStreamRequest {
        SendStreamRequest {
            message: "hi".to_string(),
            channel: "agent_stream_m1".to_string(),
            workspace_id: "ws".to_string(),
            session_id: session_id.to_string(),
            provider: "claude".to_string(),
            model: None,
            images: Vec::new(),
            web_search: false,
            thinking: false,
            project_id: None,
        }
    }

    fn coordinator(
        backend: Arc<MockBackend>,
        identity: SessionIdentityStore,
        version: ResetVersion,
    ) -> RecoveryCoordinator {
        RecoveryCoordinator::new(backend, identity, version, None)
    }

    #[tokio::test]
    async fn test_successful_send_is_untouched() {
        let backend = Arc::new(MockBackend::default());
        let version = ResetVersion::new();
        let coordinator = coordinator(backend.clone(), identity(), version.clone());

        let outcome = coordinator
            .send_with_recovery(request("s1"), |_| panic!("no new session expected"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SendOutcome {
                session_id: "s1".to_string(),
                recovered: false,
                streaming: true,
            }
        );
        assert_eq!(version.current(), 0);
        assert_eq!(*backend.sends.lock().unwrap(), vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_other_errors_are_rethrown_without_side_effects() {
        let backend = Arc::new(MockBackend::default());
        backend.broken.lock().unwrap().insert("s1".to_string());
        let identity = identity();
        identity.remember("ws", "s1").await.unwrap();
        let version = ResetVersion::new();
        let coordinator = coordinator(backend.clone(), identity.clone(), version.clone());

        let err = coordinator
            .send_with_recovery(request("s1"), |_| true)
            .await
            .unwrap_err();

        assert!(matches!(err, ParleyError::Backend(ref text) if text == "connection reset"));
        assert_eq!(version.current(), 0);
        assert!(backend.created.lock().unwrap().is_empty());
        assert_eq!(identity.workspace_of("s1").await.unwrap().as_deref(), Some("ws"));
    }

    #[tokio::test]
    async fn test_mismatch_retries_once_on_fresh_session() {
        let backend = Arc::new(MockBackend::mismatched(&["stale"]));
        let identity = identity();
        identity.remember("ws", "stale").await.unwrap();
        let version = ResetVersion::new();
        let coordinator = coordinator(backend.clone(), identity.clone(), version.clone());

        let mut announced = None;
        let outcome = coordinator
            .send_with_recovery(request("stale"), |id| {
                announced = Some(id.to_string());
                true
            })
            .await
            .unwrap();

        assert_eq!(outcome.session_id, "fresh-1");
        assert!(outcome.recovered);
        assert!(outcome.streaming);
        assert_eq!(announced.as_deref(), Some("fresh-1"));
        assert_eq!(
            *backend.sends.lock().unwrap(),
            vec!["stale".to_string(), "fresh-1".to_string()]
        );
        assert_eq!(version.current(), 1);
        assert!(identity.is_invalidated("stale").await.unwrap());
        let candidates = identity.candidates("ws").await.unwrap();
        assert_eq!(candidates.scoped_transient.as_deref(), Some("fresh-1"));
        assert_eq!(candidates.scoped_persisted.as_deref(), Some("fresh-1"));
    }

    #[tokio::test]
    async fn test_declined_retry_is_not_sent() {
        let backend = Arc::new(MockBackend::mismatched(&["stale"]));
        let identity = identity();
        let coordinator = coordinator(backend.clone(), identity.clone(), ResetVersion::new());

        let outcome = coordinator
            .send_with_recovery(request("stale"), |_| false)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SendOutcome {
                session_id: "fresh-1".to_string(),
                recovered: true,
                streaming: false,
            }
        );
        assert_eq!(*backend.sends.lock().unwrap(), vec!["stale".to_string()]);
        assert_eq!(
            identity.candidates("ws").await.unwrap().scoped_persisted.as_deref(),
            Some("fresh-1")
        );
    }

    #[tokio::test]
    async fn test_human_readable_mismatch_is_recovered() {
        let backend = Arc::new(MockBackend::default());
        let coordinator = RecoveryCoordinator::new(
            Arc::new(HumanReadableMismatch(backend.clone())),
            identity(),
            ResetVersion::new(),
            None,
        );

        let outcome = coordinator
            .send_with_recovery(request("stale"), |_| true)
            .await
            .unwrap();
        assert!(outcome.recovered);
    }

    #[tokio::test]
    async fn test_failed_retry_escalates_without_looping() {
        let backend = Arc::new(MockBackend::mismatched(&["stale", "fresh-1", "fresh-2"]));
        let coordinator = coordinator(backend.clone(), identity(), ResetVersion::new());

        let err = coordinator
            .send_with_recovery(request("stale"), |_| true)
            .await
            .unwrap_err();

        assert!(matches!(err, ParleyError::SendFailure(_)));
        assert_eq!(backend.sends.lock().unwrap().len(), 2);
        assert_eq!(backend.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_session_creation_escalates() {
        let backend = Arc::new(MockBackend {
            fail_create: true,
            ..MockBackend::mismatched(&["stale"])
        });
        let identity = identity();
        let coordinator = coordinator(backend.clone(), identity.clone(), ResetVersion::new());

        let err = coordinator
            .send_with_recovery(request("stale"), |_| true)
            .await
            .unwrap_err();

        assert!(matches!(err, ParleyError::SendFailure(_)));
        assert_eq!(backend.sends.lock().unwrap().len(), 1);
        assert!(identity.is_invalidated("stale").await.unwrap());
    }

    /// Wraps a backend and reports the first send as a worded mismatch.
    struct HumanReadableMismatch(Arc<MockBackend>);

    #[async_trait]
    impl AgentBackend for HumanReadableMismatch {
        async fn create_session(&self, request: CreateSessionRequest) -> Result<CreatedSession> {
            self.0.create_session(request).await
        }

        async fn send_stream(&self, request: SendStreamRequest) -> Result<()> {
            if request.session_id == "stale" {
                return Err(ParleyError::backend(
                    "Session stale does not belong to workspace ws",
                ));
            }
            self.0.send_stream(request).await
        }

        async fn send_permission_response(&self, response: PermissionResponse) -> Result<()> {
            self.0.send_permission_response(response).await
        }

        async fn stop_session(&self, session_id: &str) -> Result<()> {
            self.0.stop_session(session_id).await
        }

        async fn list_topics(&self, workspace_id: &str) -> Result<Vec<Topic>> {
            self.0.list_topics(workspace_id).await
        }

        async fn load_history(&self, session_id: &str) -> Result<Vec<Message>> {
            self.0.load_history(session_id).await
        }

        async fn delete_session(&self, session_id: &str) -> Result<()> {
            self.0.delete_session(session_id).await
        }

        async fn generate_title(&self, session_id: &str) -> Result<String> {
            self.0.generate_title(session_id).await
        }
    }
}
