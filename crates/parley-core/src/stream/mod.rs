//! Stream protocol.
//!
//! - `event`: the wire contract of the events a backend pushes for one exchange
//! - `hub`: the named-channel transport those events travel over

mod event;
mod hub;

pub use event::{ActionRequiredEvent, StreamEvent, ToolResult};
pub use hub::{EventHub, ListenerId, StreamHandler};

/// Prefix of every per-message event channel.
pub const CHANNEL_PREFIX: &str = "agent_stream_";

/// Name of the event channel bound to one assistant message.
pub fn channel_name(message_id: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, message_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_name("abc"), "agent_stream_abc");
    }
}
