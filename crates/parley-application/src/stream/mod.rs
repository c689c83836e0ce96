//! Stream subscription management.

mod subscriber;

pub use subscriber::StreamSubscriber;
