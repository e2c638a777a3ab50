//! Multi-mode wake detection
//!
//! Detects two claps, a sustained voice phrase, or generic sustained speech
//! from frame energy alone, and delivers at most one activation per cooldown
//! window.

mod arbiter;
mod clap;
mod controller;
mod detector;
mod energy;
mod fallback;
mod phrase;

pub use arbiter::{ActivationArbiter, ActivationEvent, ActivationSource, RecognizerResult};
pub use clap::{ClapEvent, ClapRecognizer, ClapState};
pub use controller::{ActivationCallback, DetectorController, DetectorStats};
pub use detector::WakeDetector;
pub use energy::{EnergyAnalyzer, FrameEnergy};
pub use fallback::FallbackVadRecognizer;
pub use phrase::VoicePhraseRecognizer;
