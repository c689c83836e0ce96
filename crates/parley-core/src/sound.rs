//! Audio cue service interface.
//!
//! Playback is an injected side effect. The service is constructed once,
//! initialized, shared by reference, and disposed when the engine shuts down.

use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SoundCue {
    /// A turn finished successfully.
    Complete,
    /// A turn ended with an error.
    Error,
}

pub trait SoundCueService: Send + Sync {
    /// Loads whatever the cues need. Called once before the first `play`.
    fn init(&self);

    fn play(&self, cue: SoundCue);

    /// Releases resources. `play` after `dispose` is a no-op.
    fn dispose(&self);
}

/// Cue service that plays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSoundCues;

impl SoundCueService for SilentSoundCues {
    fn init(&self) {}

    fn play(&self, cue: SoundCue) {
        tracing::trace!("[SoundCues] {} (silent)", cue);
    }

    fn dispose(&self) {}
}
