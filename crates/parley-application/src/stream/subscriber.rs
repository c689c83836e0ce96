use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use parley_core::stream::{EventHub, ListenerId, StreamEvent, channel_name};

struct Subscription {
    channel: String,
    listener: ListenerId,
}

/// Owns the event channel of every in-flight assistant message.
///
/// There is at most one subscription per message id: subscribing again
/// replaces the previous one, and unsubscribing removes the hub listener so
/// that late events on the channel are dropped.
pub struct StreamSubscriber {
    hub: Arc<EventHub>,
    active: Mutex<HashMap<String, Subscription>>,
}

impl StreamSubscriber {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self {
            hub,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, Subscription>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the channel of `message_id` and routes its events to `handler`.
    ///
    /// Returns the channel name to hand to the backend.
    pub fn subscribe<F>(&self, message_id: &str, handler: F) -> String
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        let channel = channel_name(message_id);
        let mut active = self.active();
        if let Some(previous) = active.remove(message_id) {
            tracing::warn!(
                "[StreamSubscriber] Replacing existing subscription for message {}",
                message_id
            );
            self.hub.unlisten(&previous.channel, previous.listener);
        }

        let listener = self.hub.listen(channel.clone(), Arc::new(handler));
        active.insert(
            message_id.to_string(),
            Subscription {
                channel: channel.clone(),
                listener,
            },
        );
        tracing::debug!("[StreamSubscriber] Subscribed to {}", channel);
        channel
    }

    /// Closes the channel of `message_id`. Returns false if it was not open.
    pub fn unsubscribe(&self, message_id: &str) -> bool {
        let removed = self.active().remove(message_id);
        match removed {
            Some(subscription) => {
                self.hub
                    .unlisten(&subscription.channel, subscription.listener);
                tracing::debug!("[StreamSubscriber] Unsubscribed from {}", subscription.channel);
                true
            }
            None => false,
        }
    }

    /// Closes every open channel.
    pub fn unsubscribe_all(&self) {
        let drained: Vec<Subscription> = self.active().drain().map(|(_, s)| s).collect();
        for subscription in drained {
            self.hub
                .unlisten(&subscription.channel, subscription.listener);
        }
    }

    pub fn is_subscribed(&self, message_id: &str) -> bool {
        self.active().contains_key(message_id)
    }

    pub fn active_count(&self) -> usize {
        self.active().len()
    }
}
