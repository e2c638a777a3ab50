//! Fallback speech recognition
//!
//! Last-resort activation path for sustained speech the phrase recognizer
//! doesn't track. Every frame above a lower energy bar counts, whatever the
//! phrase recognizer makes of it. Only the firing is held back while a
//! phrase run is in progress, so loud speech activates as a voice phrase and
//! speech wavering around the phrase threshold still activates here once the
//! phrase run breaks.

use super::arbiter::RecognizerResult;
use super::energy::FrameEnergy;
use crate::config::DetectorConfig;

/// Permissive sustained-speech detector
#[derive(Debug)]
pub struct FallbackVadRecognizer {
    enabled: bool,
    threshold: f32,
    min_frames: u32,
    consecutive: u32,
}

impl FallbackVadRecognizer {
    /// Create a recognizer with an empty counter
    #[must_use]
    pub const fn new(config: &DetectorConfig) -> Self {
        Self {
            enabled: config.fallback_enabled,
            threshold: config.fallback_energy_threshold,
            min_frames: config.fallback_min_frames,
            consecutive: 0,
        }
    }

    /// Evaluate one frame
    ///
    /// `hold` is set when another recognizer matched this frame or the
    /// phrase recognizer is mid-run after seeing it. A held frame still
    /// counts; the fallback fires on the first unheld frame once the count
    /// is reached.
    pub fn process(&mut self, energy: &FrameEnergy, hold: bool) -> RecognizerResult {
        if !self.enabled || energy.rms <= self.threshold {
            self.consecutive = 0;
            return RecognizerResult::NoMatch;
        }

        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive < self.min_frames || hold {
            return RecognizerResult::NoMatch;
        }

        tracing::info!(frames = self.consecutive, rms = energy.rms, "fallback speech detected");
        self.consecutive = 0;
        RecognizerResult::FallbackVad
    }

    /// Consecutive qualifying frames seen so far
    #[must_use]
    pub const fn consecutive_frames(&self) -> u32 {
        self.consecutive
    }
}
