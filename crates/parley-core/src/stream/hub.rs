use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::StreamEvent;

/// Callback invoked synchronously for every event emitted on a channel.
pub type StreamHandler = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Identifies one registration on an [`EventHub`] channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Named-channel event transport between the backend and the engine.
///
/// The backend emits onto a channel name; whoever listens on that name
/// receives the events synchronously, in emission order. A channel has at
/// most one listener. Events emitted on a channel nobody listens on are
/// dropped.
#[derive(Default)]
pub struct EventHub {
    listeners: Mutex<HashMap<String, (ListenerId, StreamHandler)>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, (ListenerId, StreamHandler)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` on `channel`, replacing any previous listener.
    pub fn listen(&self, channel: impl Into<String>, handler: StreamHandler) -> ListenerId {
        let channel = channel.into();
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if self.listeners().insert(channel.clone(), (id, handler)).is_some() {
            tracing::warn!("[EventHub] Replaced existing listener on channel {}", channel);
        }
        id
    }

    /// Removes the listener `id` from `channel`.
    ///
    /// Returns false if the channel is now owned by a different listener or
    /// has none.
    pub fn unlisten(&self, channel: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        match listeners.get(channel) {
            Some((current, _)) if *current == id => {
                listeners.remove(channel);
                true
            }
            _ => false,
        }
    }

    /// Delivers `event` to the listener on `channel`.
    ///
    /// The handler runs after the registry lock is released, so it may
    /// itself listen or unlisten. Returns false if the event was dropped.
    pub fn emit(&self, channel: &str, event: StreamEvent) -> bool {
        let handler = self.listeners().get(channel).map(|(_, h)| h.clone());
        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => {
                tracing::debug!(
                    "[EventHub] Dropped {} event on channel {} (no listener)",
                    event.kind(),
                    channel
                );
                false
            }
        }
    }

    pub fn has_listener(&self, channel: &str) -> bool {
        self.listeners().contains_key(channel)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}
