//! Chat orchestrator.
//!
//! Owns the active conversation of one window: the current workspace and
//! session, the topic list and the message list. It drives each exchange from
//! the optimistic user message through the backend send, the stream events
//! and the end of the turn, and publishes a [`ChatSnapshot`] after every
//! change.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use parley_core::backend::{AgentBackend, CreateSessionRequest, PermissionResponse, SendStreamRequest};
use parley_core::config::EngineConfig;
use parley_core::content::remove_action_required;
use parley_core::message::Message;
use parley_core::notification::{Notification, Notifier};
use parley_core::session::{ResetVersion, Topic};
use parley_core::sound::{SoundCue, SoundCueService};
use parley_core::stream::{EventHub, StreamEvent};
use parley_core::{ParleyError, Result};
use tokio::sync::watch;

use super::state::{ChatSnapshot, ChatState, InFlight, Termination, apply_stream_event, finish};
use crate::recovery::RecoveryCoordinator;
use crate::session::SessionIdentityStore;
use crate::stream::StreamSubscriber;

/// A message the user submits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    /// Image attachments, passed through to the backend.
    pub images: Vec<String>,
    pub web_search: bool,
    pub thinking: bool,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.images.is_empty()
    }
}

/// Result of [`ChatOrchestrator::switch_topic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The topic is now the active session.
    Switched,
    /// The topic belongs to another workspace; nothing changed.
    Rejected,
    /// A newer reset happened while history was loading; the result was dropped.
    Stale,
}

/// What applying one event did to the in-flight message.
enum EventEffect {
    Applied,
    Finished {
        termination: Termination,
        session_id: Option<String>,
        user_turns: usize,
    },
}

pub struct ChatOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    /// Backend agent process
    backend: Arc<dyn AgentBackend>,
    /// Persisted session identity (active session per workspace, bindings)
    identity: SessionIdentityStore,
    /// Stale-binding repair around every send
    recovery: RecoveryCoordinator,
    /// One event channel per in-flight assistant message
    subscriber: StreamSubscriber,
    notifier: Arc<dyn Notifier>,
    sound: Arc<dyn SoundCueService>,
    config: EngineConfig,
    /// Guards async continuations against resets that happened meanwhile
    reset_version: ResetVersion,
    state: Mutex<ChatState>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
}

impl ChatOrchestrator {
    /// Creates an orchestrator with no workspace selected.
    ///
    /// Initializes `sound`; [`ChatOrchestrator::shutdown`] disposes it.
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        hub: Arc<EventHub>,
        identity: SessionIdentityStore,
        notifier: Arc<dyn Notifier>,
        sound: Arc<dyn SoundCueService>,
        config: EngineConfig,
    ) -> Self {
        let reset_version = ResetVersion::new();
        let recovery = RecoveryCoordinator::new(
            backend.clone(),
            identity.clone(),
            reset_version.clone(),
            config.system_prompt.clone(),
        );
        sound.init();
        let (snapshot_tx, _) = watch::channel(ChatSnapshot::default());

        Self {
            inner: Arc::new(Inner {
                backend,
                identity,
                recovery,
                subscriber: StreamSubscriber::new(hub),
                notifier,
                sound,
                config,
                reset_version,
                state: Mutex::new(ChatState::default()),
                snapshot_tx,
            }),
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.state().snapshot()
    }

    /// Receives a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Shared reset-version counter.
    pub fn reset_version(&self) -> &ResetVersion {
        &self.inner.reset_version
    }

    /// Selects `workspace_id` and restores its last session.
    ///
    /// Any in-flight stream is stopped. Returns the restored session id, or
    /// `None` if the workspace has no restorable session or a newer reset
    /// overtook this one.
    pub async fn switch_workspace(&self, workspace_id: &str) -> Result<Option<String>> {
        self.stop_sending();
        let version = self.inner.reset_version.bump();
        tracing::info!(
            "[ChatOrchestrator] Switching to workspace {} (version {})",
            workspace_id,
            version
        );
        self.inner.update(|state| {
            state.workspace_id = Some(workspace_id.to_string());
            state.topics.clear();
            state.reset_conversation();
        });

        let topics = self.inner.load_topics(workspace_id).await?;
        if !self.inner.reset_version.is_current(version) {
            return Ok(None);
        }
        self.inner.update(|state| state.topics = topics.clone());

        let Some(session_id) = self.inner.identity.resolve(workspace_id, &topics).await? else {
            tracing::debug!(
                "[ChatOrchestrator] No restorable session for workspace {}",
                workspace_id
            );
            return Ok(None);
        };
        let history = match self.inner.backend.load_history(&session_id).await {
            Ok(history) => history,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "[ChatOrchestrator] Restorable session {} no longer exists: {}",
                    session_id,
                    e
                );
                self.inner.identity.clear_scoped(workspace_id).await?;
                self.inner.notifier.notify(Notification::warning(format!(
                    "Previous session {} is gone; starting a new conversation",
                    session_id
                )));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !self.inner.reset_version.is_current(version) {
            tracing::debug!(
                "[ChatOrchestrator] Dropping stale restore of {} for {}",
                session_id,
                workspace_id
            );
            return Ok(None);
        }

        self.inner.identity.remember(workspace_id, &session_id).await?;
        self.inner.update(|state| {
            state.session_id = Some(session_id.clone());
            state.messages = history;
        });
        tracing::info!("[ChatOrchestrator] Restored session {}", session_id);
        Ok(Some(session_id))
    }

    /// Reloads the topic list of the current workspace.
    ///
    /// Topics without a workspace binding are bound to the current workspace.
    pub async fn refresh_topics(&self) -> Result<Vec<Topic>> {
        let workspace_id = self.inner.require_workspace()?;
        let version = self.inner.reset_version.current();
        let topics = self.inner.load_topics(&workspace_id).await?;
        if self.inner.reset_version.is_current(version) {
            self.inner.update(|state| state.topics = topics.clone());
        }
        Ok(topics)
    }

    /// Starts a fresh conversation; the next send creates a session.
    pub fn new_topic(&self) {
        self.stop_sending();
        self.inner.reset_version.bump();
        self.inner.update(ChatState::reset_conversation);
    }

    /// Returns the active session id, creating a session if there is none.
    pub async fn ensure_session(&self) -> Result<String> {
        self.inner.ensure_session().await
    }

    /// Sends one user message and streams the reply into a new assistant
    /// message.
    ///
    /// Returns the assistant message id, or `None` if the message was blank,
    /// another exchange is still in flight, or the exchange was stopped
    /// before its stream started. A failure before the stream
    /// started removes the assistant placeholder and is reported through the
    /// notifier as well as returned.
    pub async fn send_message(&self, outgoing: OutgoingMessage) -> Result<Option<String>> {
        if outgoing.is_blank() {
            tracing::debug!("[ChatOrchestrator] Ignoring blank message");
            return Ok(None);
        }
        let Some(workspace_id) = self.inner.state().workspace_id.clone() else {
            let err = ParleyError::session_init("No workspace selected");
            self.inner.notifier.notify(Notification::error(err.to_string()));
            return Err(err);
        };

        let user = Message::user(outgoing.text.clone(), outgoing.images.clone());
        let assistant = Message::assistant_placeholder();
        let message_id = assistant.id.clone();
        let accepted = self.inner.update(|state| {
            if let Some(in_flight) = &state.in_flight {
                tracing::warn!(
                    "[ChatOrchestrator] Message {} still in flight; ignoring send",
                    in_flight.message_id
                );
                return false;
            }
            state.in_flight = Some(InFlight {
                message_id: message_id.clone(),
                session_id: state.session_id.clone(),
            });
            state.messages.push(user);
            state.messages.push(assistant);
            true
        });
        if !accepted {
            return Ok(None);
        }

        match self.inner.start_exchange(&workspace_id, &message_id, outgoing).await {
            Ok(true) => Ok(Some(message_id)),
            Ok(false) => Ok(None),
            Err(err) => {
                self.inner.subscriber.unsubscribe(&message_id);
                self.inner.roll_back(&message_id);
                tracing::error!("[ChatOrchestrator] Send failed: {}", err);
                self.inner.notifier.notify(Notification::error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Stops the in-flight exchange. Does nothing if there is none.
    ///
    /// The channel is closed before anything else, so no later event touches
    /// the message. The backend is asked to stop in the background.
    pub fn stop_sending(&self) {
        let Some(in_flight) = self.inner.state().in_flight.clone() else {
            return;
        };
        self.inner.subscriber.unsubscribe(&in_flight.message_id);
        self.inner
            .finish_message(&in_flight.message_id, &Termination::Cancelled);
        tracing::info!(
            "[ChatOrchestrator] Stopped message {}",
            in_flight.message_id
        );

        let session_id = in_flight
            .session_id
            .or_else(|| self.inner.state().session_id.clone());
        if let Some(session_id) = session_id {
            self.inner.stop_backend_session(session_id);
        }
    }

    /// Makes `topic_id` the active session and loads its history.
    pub async fn switch_topic(&self, topic_id: &str) -> Result<SwitchOutcome> {
        let workspace_id = self.inner.require_workspace()?;
        let owner = self.inner.identity.workspace_of(topic_id).await?;
        if let Some(owner) = owner.filter(|o| *o != workspace_id) {
            tracing::warn!(
                "[ChatOrchestrator] Topic {} belongs to {}, not {}",
                topic_id,
                owner,
                workspace_id
            );
            self.inner.notifier.notify(Notification::error(format!(
                "Topic {} belongs to another workspace",
                topic_id
            )));
            return Ok(SwitchOutcome::Rejected);
        }

        self.stop_sending();
        let version = self.inner.reset_version.current();
        let history = match self.inner.backend.load_history(topic_id).await {
            Ok(history) => history,
            Err(e) => {
                self.inner.notifier.notify(Notification::error(format!(
                    "Failed to load topic: {}",
                    e
                )));
                return Err(e);
            }
        };
        if !self.inner.reset_version.is_current(version) {
            tracing::debug!("[ChatOrchestrator] Dropping stale switch to {}", topic_id);
            return Ok(SwitchOutcome::Stale);
        }

        self.inner.update(|state| {
            state.session_id = Some(topic_id.to_string());
            state.messages = history;
        });
        self.inner.identity.remember(&workspace_id, topic_id).await?;
        Ok(SwitchOutcome::Switched)
    }

    /// Deletes a topic. Deleting the active topic clears the conversation.
    pub async fn delete_topic(&self, topic_id: &str) -> Result<()> {
        let is_active = self.inner.state().session_id.as_deref() == Some(topic_id);
        if is_active {
            self.stop_sending();
        }

        if let Err(e) = self.inner.backend.delete_session(topic_id).await {
            self.inner.notifier.notify(Notification::error(format!(
                "Failed to delete topic: {}",
                e
            )));
            return Err(e);
        }
        self.inner.identity.forget(topic_id).await?;

        let cleared_workspace = self.inner.update(|state| {
            state.topics.retain(|t| t.id != topic_id);
            if state.session_id.as_deref() == Some(topic_id) {
                state.reset_conversation();
                state.workspace_id.clone()
            } else {
                None
            }
        });
        if let Some(workspace_id) = cleared_workspace {
            self.inner.reset_version.bump();
            self.inner.identity.clear_scoped(&workspace_id).await?;
        }
        tracing::info!("[ChatOrchestrator] Deleted topic {}", topic_id);
        Ok(())
    }

    /// Forwards a confirmation answer and drops the answered request.
    pub async fn handle_permission_response(&self, response: PermissionResponse) -> Result<()> {
        let request_id = response.request_id.clone();
        if let Err(e) = self.inner.backend.send_permission_response(response).await {
            self.inner.notifier.notify(Notification::error(format!(
                "Failed to send permission response: {}",
                e
            )));
            return Err(e);
        }

        self.inner.update(|state| {
            for message in state.messages.iter_mut() {
                message.action_requests.retain(|a| a.request_id != request_id);
                message.content_parts = remove_action_required(&message.content_parts, &request_id);
            }
        });
        Ok(())
    }

    /// Closes every stream channel and releases the sound cues.
    pub fn shutdown(&self) {
        self.inner.subscriber.unsubscribe_all();
        self.inner.sound.dispose();
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutates the state and publishes the new snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut state = self.state();
        let result = f(&mut state);
        self.snapshot_tx.send_replace(state.snapshot());
        result
    }

    fn require_workspace(&self) -> Result<String> {
        self.state()
            .workspace_id
            .clone()
            .ok_or_else(|| ParleyError::session_init("No workspace selected"))
    }

    /// Lists topics and binds the unbound ones to `workspace_id`.
    async fn load_topics(&self, workspace_id: &str) -> Result<Vec<Topic>> {
        let topics = self.backend.list_topics(workspace_id).await?;
        for topic in &topics {
            self.identity.bind_if_unbound(&topic.id, workspace_id).await?;
        }
        Ok(topics)
    }

    async fn ensure_session(&self) -> Result<String> {
        let (workspace_id, existing) = {
            let state = self.state();
            (state.workspace_id.clone(), state.session_id.clone())
        };
        let workspace_id =
            workspace_id.ok_or_else(|| ParleyError::session_init("No workspace selected"))?;
        if let Some(session_id) = existing {
            return Ok(session_id);
        }

        let version = self.reset_version.current();
        let created = self
            .backend
            .create_session(CreateSessionRequest {
                provider: self.config.provider.clone(),
                workspace_id: workspace_id.clone(),
                model: self.config.model.clone(),
                system_prompt: self.config.system_prompt.clone(),
            })
            .await
            .map_err(|e| ParleyError::session_init(e.to_string()))?;
        let session_id = created.session_id;
        if !self.reset_version.is_current(version) {
            return Err(ParleyError::session_init(
                "Session reset while a new session was being created",
            ));
        }

        self.identity.remember(&workspace_id, &session_id).await?;
        self.update(|state| {
            state.session_id = Some(session_id.clone());
            if !state.topics.iter().any(|t| t.id == session_id) {
                state
                    .topics
                    .insert(0, Topic::new(&session_id, &self.config.default_topic_title));
            }
            if let Some(in_flight) = state.in_flight.as_mut() {
                in_flight.session_id.get_or_insert_with(|| session_id.clone());
            }
        });
        tracing::info!(
            "[ChatOrchestrator] Created session {} in workspace {}",
            session_id,
            workspace_id
        );
        Ok(session_id)
    }

    /// Everything between the optimistic append and the first event.
    ///
    /// Returns false if the message was stopped while a session was being
    /// created; the session is then stopped instead of sent to.
    async fn start_exchange(
        self: &Arc<Self>,
        workspace_id: &str,
        message_id: &str,
        outgoing: OutgoingMessage,
    ) -> Result<bool> {
        let session_id = self.ensure_session().await?;
        if !self.state().is_in_flight(message_id) {
            tracing::info!(
                "[ChatOrchestrator] Message {} stopped before sending",
                message_id
            );
            self.stop_backend_session(session_id);
            return Ok(false);
        }

        let weak = Arc::downgrade(self);
        let handler_message_id = message_id.to_string();
        let channel = self.subscriber.subscribe(message_id, move |event| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.handle_event(&handler_message_id, event);
            }
        });

        let request = SendStreamRequest {
            message: outgoing.text,
            channel,
            workspace_id: workspace_id.to_string(),
            session_id,
            provider: self.config.provider.clone(),
            model: self.config.model.clone(),
            images: outgoing.images,
            web_search: outgoing.web_search,
            thinking: outgoing.thinking,
            project_id: self.config.project_id.clone(),
        };

        let this = self.clone();
        let replaced_workspace = workspace_id.to_string();
        let adopting_message_id = message_id.to_string();
        let outcome = self
            .recovery
            .send_with_recovery(request, move |new_session_id| {
                this.adopt_session(&replaced_workspace, &adopting_message_id, new_session_id)
            })
            .await
            .map_err(|e| match e {
                ParleyError::SendFailure(_) | ParleyError::SessionInit(_) => e,
                other => ParleyError::transport(other.to_string()),
            })?;
        if !outcome.streaming {
            self.subscriber.unsubscribe(message_id);
            self.stop_backend_session(outcome.session_id);
            return Ok(false);
        }
        if outcome.recovered {
            self.notifier.notify(Notification::info(format!(
                "Session moved to another workspace; continued in session {}",
                outcome.session_id
            )));
        }
        tracing::debug!(
            "[ChatOrchestrator] Message {} streaming on session {} (recovered={})",
            message_id,
            outcome.session_id,
            outcome.recovered
        );
        Ok(true)
    }

    /// Switches the active session after recovery replaced it.
    ///
    /// Returns whether `message_id` is still in flight and should be retried.
    fn adopt_session(&self, workspace_id: &str, message_id: &str, session_id: &str) -> bool {
        let in_flight = self.update(|state| {
            if state.workspace_id.as_deref() != Some(workspace_id) {
                return false;
            }
            if let Some(stale) = state.session_id.take() {
                state.topics.retain(|t| t.id != stale);
            }
            state.session_id = Some(session_id.to_string());
            state
                .topics
                .insert(0, Topic::new(session_id, &self.config.default_topic_title));
            match state.in_flight.as_mut() {
                Some(in_flight) if in_flight.message_id == message_id => {
                    in_flight.session_id = Some(session_id.to_string());
                    true
                }
                _ => false,
            }
        });
        tracing::info!("[ChatOrchestrator] Now using session {}", session_id);
        in_flight
    }

    /// Asks the backend to stop generating on `session_id` in the background.
    fn stop_backend_session(&self, session_id: String) {
        let backend = self.backend.clone();
        spawn_detached("stop_session", async move {
            if let Err(e) = backend.stop_session(&session_id).await {
                tracing::warn!(
                    "[ChatOrchestrator] Failed to stop session {}: {}",
                    session_id,
                    e
                );
            }
        });
    }

    /// Removes the placeholder of a send that never started streaming.
    fn roll_back(&self, message_id: &str) {
        self.update(|state| {
            if !state.is_in_flight(message_id) {
                return;
            }
            state.in_flight = None;
            state.messages.retain(|m| m.id != message_id);
        });
    }

    fn handle_event(self: &Arc<Self>, message_id: &str, event: StreamEvent) {
        if let StreamEvent::Done = event {
            tracing::debug!(
                "[ChatOrchestrator] Round finished for {}; waiting for final_done",
                message_id
            );
            return;
        }

        let kind = event.kind();
        let effect = self.update(|state| {
            let index = state.streaming_index(message_id)?;
            let termination = match &event {
                StreamEvent::FinalDone => Termination::Completed,
                StreamEvent::Error { message } => Termination::Failed(message.clone()),
                _ => {
                    state.messages[index] = apply_stream_event(&state.messages[index], &event);
                    return Some(EventEffect::Applied);
                }
            };

            state.messages[index] = finish(&state.messages[index], &termination);
            let in_flight = state.in_flight.take_if(|f| f.message_id == message_id);
            let session_id = in_flight
                .and_then(|f| f.session_id)
                .or_else(|| state.session_id.clone());
            if let Some(session_id) = &session_id {
                let count = state.messages.len();
                if let Some(topic) = state.topics.iter_mut().find(|t| t.id == *session_id) {
                    topic.messages_count = count;
                }
            }
            Some(EventEffect::Finished {
                termination,
                session_id,
                user_turns: state.user_turns(),
            })
        });

        match effect {
            None => {
                tracing::debug!(
                    "[ChatOrchestrator] Dropped late {} for {}",
                    kind,
                    message_id
                );
            }
            Some(EventEffect::Applied) => {}
            Some(EventEffect::Finished {
                termination,
                session_id,
                user_turns,
            }) => {
                self.subscriber.unsubscribe(message_id);
                match termination {
                    Termination::Failed(reason) => {
                        tracing::error!(
                            "[ChatOrchestrator] Stream for {} failed: {}",
                            message_id,
                            reason
                        );
                        let err = ParleyError::Stream(reason);
                        self.notifier.notify(Notification::error(err.to_string()));
                        self.sound.play(SoundCue::Error);
                    }
                    _ => {
                        tracing::info!("[ChatOrchestrator] Message {} complete", message_id);
                        self.sound.play(SoundCue::Complete);
                        let title_turn = user_turns == self.config.title_generation_turn;
                        if let Some(session_id) = session_id.filter(|_| title_turn) {
                            self.generate_title(session_id);
                        }
                    }
                }
            }
        }
    }

    /// Asks the backend for a topic title in the background.
    fn generate_title(self: &Arc<Self>, session_id: String) {
        let weak = Arc::downgrade(self);
        let backend = self.backend.clone();
        spawn_detached("generate_title", async move {
            match backend.generate_title(&session_id).await {
                Ok(title) if !title.trim().is_empty() => {
                    if let Some(inner) = weak.upgrade() {
                        inner.update(|state| {
                            if let Some(topic) = state.topics.iter_mut().find(|t| t.id == session_id) {
                                topic.title = title.clone();
                            }
                        });
                        tracing::info!(
                            "[ChatOrchestrator] Titled session {}: {}",
                            session_id,
                            title
                        );
                    }
                }
                Ok(_) => {
                    tracing::debug!("[ChatOrchestrator] Empty title for {}", session_id);
                }
                Err(e) => {
                    tracing::warn!(
                        "[ChatOrchestrator] Title generation failed for {}: {}",
                        session_id,
                        e
                    );
                }
            }
        });
    }

    fn finish_message(&self, message_id: &str, termination: &Termination) {
        self.update(|state| {
            if let Some(index) = state.streaming_index(message_id) {
                state.messages[index] = finish(&state.messages[index], termination);
            }
            if state.is_in_flight(message_id) {
                state.in_flight = None;
            }
        });
    }
}

impl Drop for ChatOrchestrator {
    fn drop(&mut self) {
        self.inner.subscriber.unsubscribe_all();
    }
}

/// Runs `future` on the current tokio runtime without waiting for it.
fn spawn_detached<F>(label: &str, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => {
            tracing::warn!("[ChatOrchestrator] No async runtime; skipped {}", label);
        }
    }
}
