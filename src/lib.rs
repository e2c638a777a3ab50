//! Beacon Wake - Multi-mode wake detection for voice assistants
//!
//! This library decides, from frame energy alone, when the assistant should
//! start listening:
//! - Two claps within a bounded gap
//! - A sustained voice phrase
//! - Generic sustained speech as a fallback
//! - A manual trigger from the host application
//!
//! At most one activation is delivered per cooldown window.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Frame Sources                       │
//! │      AudioCapture (cpal)  │  WavFrameSource          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ capture thread
//! ┌────────────────────▼────────────────────────────────┐
//! │                  WakeDetector                        │
//! │   Energy  │  Clap  │  VoicePhrase  │  FallbackVad   │
//! │                 ActivationArbiter                    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ bounded queue
//! ┌────────────────────▼────────────────────────────────┐
//! │          DetectorController dispatch worker          │
//! │        on_activate callback  │  ConfirmationTone     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod voice;
pub mod wake;

pub use config::{CaptureConfig, Config, DetectorConfig, FeedbackConfig};
pub use error::{Error, Result};
pub use wake::{
    ActivationArbiter, ActivationEvent, ActivationSource, DetectorController, DetectorStats,
    WakeDetector,
};
