//! Activation arbitration and the shared cooldown window
//!
//! Every recognizer success passes through one serialized check-and-set here.
//! The cooldown timestamp is the only state shared between the capture
//! thread and callers of the controller.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;

/// What produced an activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationSource {
    /// Two hand claps
    Clap,
    /// Sustained loud vocalization
    VoicePhrase,
    /// Permissive sustained-speech path
    FallbackVad,
    /// Explicit trigger from the application
    Manual,
}

impl fmt::Display for ActivationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clap => "clap",
            Self::VoicePhrase => "voice_phrase",
            Self::FallbackVad => "fallback_vad",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Outcome of one recognizer for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerResult {
    NoMatch,
    Clap,
    VoicePhrase,
    FallbackVad,
}

impl RecognizerResult {
    /// Source this result would activate as, if any
    #[must_use]
    pub const fn source(self) -> Option<ActivationSource> {
        match self {
            Self::NoMatch => None,
            Self::Clap => Some(ActivationSource::Clap),
            Self::VoicePhrase => Some(ActivationSource::VoicePhrase),
            Self::FallbackVad => Some(ActivationSource::FallbackVad),
        }
    }

    /// Whether a recognizer signalled on this frame
    #[must_use]
    pub const fn is_match(self) -> bool {
        !matches!(self, Self::NoMatch)
    }
}

/// A delivered wake activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivationEvent {
    /// Which recognizer won arbitration
    pub source: ActivationSource,
    /// Monotonic frame timestamp the activation was decided on
    pub timestamp: Duration,
    /// Wall-clock time of the decision
    pub detected_at: DateTime<Utc>,
}

/// Merges recognizer signals and enforces the global cooldown
#[derive(Debug)]
pub struct ActivationArbiter {
    cooldown: Duration,
    priority: Vec<ActivationSource>,
    last_activation_at: Mutex<Option<Duration>>,
}

impl ActivationArbiter {
    /// Create an arbiter from detector configuration
    #[must_use]
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            cooldown: config.cooldown,
            priority: config.priority.clone(),
            last_activation_at: Mutex::new(None),
        }
    }

    /// Decide the frame's outcome from every recognizer's result
    ///
    /// At most one event is emitted. All signals are rejected inside the
    /// cooldown window; otherwise the highest-priority signal wins.
    pub fn on_frame_result(
        &self,
        results: &[RecognizerResult],
        now: Duration,
    ) -> Option<ActivationEvent> {
        let winner = self
            .priority
            .iter()
            .copied()
            .find(|p| results.iter().any(|r| r.source() == Some(*p)))?;

        self.admit(winner, now)
    }

    /// Admit a single signal if the cooldown has elapsed
    ///
    /// Manual triggers come through here directly and skip priority.
    pub fn admit(&self, source: ActivationSource, now: Duration) -> Option<ActivationEvent> {
        let Ok(mut last) = self.last_activation_at.lock() else {
            tracing::error!("cooldown lock poisoned, dropping activation");
            return None;
        };

        if let Some(prev) = *last {
            // Frames before the last activation (clock skew between a manual
            // trigger and capture) are inside the window too
            let elapsed = now.saturating_sub(prev);
            if now < prev || elapsed < self.cooldown {
                tracing::debug!(
                    %source,
                    remaining_ms = (self.cooldown - elapsed.min(self.cooldown)).as_millis(),
                    "activation suppressed by cooldown"
                );
                return None;
            }
        }

        *last = Some(now);
        drop(last);

        Some(ActivationEvent {
            source,
            timestamp: now,
            detected_at: Utc::now(),
        })
    }

    /// Whether `now` falls inside the cooldown window
    #[must_use]
    pub fn in_cooldown(&self, now: Duration) -> bool {
        self.last_activation_at
            .lock()
            .ok()
            .and_then(|last| *last)
            .is_some_and(|prev| now < prev || now - prev < self.cooldown)
    }

    /// Timestamp of the last admitted activation
    #[must_use]
    pub fn last_activation_at(&self) -> Option<Duration> {
        self.last_activation_at.lock().ok().and_then(|last| *last)
    }

    /// Forget the last activation
    pub fn reset(&self) {
        if let Ok(mut last) = self.last_activation_at.lock() {
            *last = None;
        }
    }
}
