//! Per-frame wake pipeline
//!
//! Runs the energy analyzer and all recognizers on one frame, then lets the
//! arbiter decide. Pure computation apart from the arbiter's short lock, so
//! it is safe to run on the capture thread.

use std::sync::Arc;

use super::arbiter::{ActivationArbiter, ActivationEvent};
use super::clap::{ClapRecognizer, ClapState};
use super::energy::{EnergyAnalyzer, FrameEnergy};
use super::fallback::FallbackVadRecognizer;
use super::phrase::VoicePhraseRecognizer;
use crate::Result;
use crate::config::DetectorConfig;
use crate::voice::AudioFrame;

/// Multi-mode wake detector over a frame stream
#[derive(Debug)]
pub struct WakeDetector {
    config: DetectorConfig,
    clap: ClapRecognizer,
    phrase: VoicePhraseRecognizer,
    fallback: FallbackVadRecognizer,
    arbiter: Arc<ActivationArbiter>,
}

impl WakeDetector {
    /// Create a detector sharing an existing arbiter
    ///
    /// The configuration is assumed to be validated.
    #[must_use]
    pub fn new(config: DetectorConfig, arbiter: Arc<ActivationArbiter>) -> Self {
        Self {
            clap: ClapRecognizer::new(&config),
            phrase: VoicePhraseRecognizer::new(&config),
            fallback: FallbackVadRecognizer::new(&config),
            arbiter,
            config,
        }
    }

    /// Create a detector with its own arbiter
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid
    pub fn from_config(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let arbiter = Arc::new(ActivationArbiter::new(&config));
        Ok(Self::new(config, arbiter))
    }

    /// Evaluate one audio frame
    pub fn process_frame(&mut self, frame: &AudioFrame) -> Option<ActivationEvent> {
        let energy = EnergyAnalyzer::analyze(frame);
        self.process_energy(&energy)
    }

    /// Evaluate one frame's energy
    ///
    /// Produces at most one activation. Every recognizer sees every frame;
    /// the fallback may only fire when neither clap nor voice phrase matched
    /// and no phrase run is in progress.
    pub fn process_energy(&mut self, energy: &FrameEnergy) -> Option<ActivationEvent> {
        let clap = self.clap.process(energy);
        let phrase = self.phrase.process(energy);
        let hold = clap.is_match() || phrase.is_match() || self.phrase.is_accumulating();
        let fallback = self.fallback.process(energy, hold);

        let event = self
            .arbiter
            .on_frame_result(&[clap, phrase, fallback], energy.timestamp)?;

        tracing::info!(
            source = %event.source,
            timestamp_ms = event.timestamp.as_millis(),
            "wake activation"
        );
        self.reset_recognizers();
        Some(event)
    }

    /// Shared arbiter
    #[must_use]
    pub const fn arbiter(&self) -> &Arc<ActivationArbiter> {
        &self.arbiter
    }

    /// Current clap recognizer state
    #[must_use]
    pub const fn clap_state(&self) -> ClapState {
        self.clap.state()
    }

    /// Configuration the detector runs with
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Drop partial matches after an admitted activation
    fn reset_recognizers(&mut self) {
        self.clap = ClapRecognizer::new(&self.config);
        self.phrase = VoicePhraseRecognizer::new(&self.config);
        self.fallback = FallbackVadRecognizer::new(&self.config);
    }
}
