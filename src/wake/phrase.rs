//! Sustained voice phrase recognition
//!
//! Any sufficiently loud, sufficiently long vocalization qualifies. Content
//! is never checked; false positives are held back by the threshold and the
//! shared cooldown.

use super::arbiter::RecognizerResult;
use super::energy::FrameEnergy;
use crate::config::DetectorConfig;

/// Fires after a run of consecutive loud frames
#[derive(Debug)]
pub struct VoicePhraseRecognizer {
    threshold: f32,
    min_frames: u32,
    consecutive: u32,
}

impl VoicePhraseRecognizer {
    /// Create a recognizer with an empty counter
    #[must_use]
    pub const fn new(config: &DetectorConfig) -> Self {
        Self {
            threshold: config.voice_energy_threshold,
            min_frames: config.min_sustained_frames,
            consecutive: 0,
        }
    }

    /// Evaluate one frame
    ///
    /// The counter resets after firing, so one continuous utterance needs a
    /// second full run to fire again.
    pub fn process(&mut self, energy: &FrameEnergy) -> RecognizerResult {
        if energy.rms <= self.threshold {
            self.consecutive = 0;
            return RecognizerResult::NoMatch;
        }

        self.consecutive += 1;
        if self.consecutive < self.min_frames {
            return RecognizerResult::NoMatch;
        }

        tracing::info!(frames = self.consecutive, rms = energy.rms, "sustained voice phrase");
        self.consecutive = 0;
        RecognizerResult::VoicePhrase
    }

    /// Consecutive loud frames seen so far
    #[must_use]
    pub const fn consecutive_frames(&self) -> u32 {
        self.consecutive
    }

    /// Whether a run is in progress
    #[must_use]
    pub const fn is_accumulating(&self) -> bool {
        self.consecutive > 0
    }
}
