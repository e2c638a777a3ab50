//! Confirmation tone playback
//!
//! After an activation the application plays a short beep at reduced volume
//! and waits a settle delay before opening the microphone, so the tone does
//! not re-trigger the detector.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::config::FeedbackConfig;
use crate::{Error, Result};

/// Sample rate for playback
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Fade in/out length, avoids clicks at the tone edges
const FADE: Duration = Duration::from_millis(10);

/// A short sine beep
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationTone {
    /// Frequency in Hz
    pub frequency_hz: f32,
    /// Tone length
    pub duration: Duration,
    /// Amplitude (0.0 to 1.0)
    pub volume: f32,
}

impl ConfirmationTone {
    /// Tone described by the feedback configuration
    #[must_use]
    pub const fn from_config(config: &FeedbackConfig) -> Self {
        Self {
            frequency_hz: config.frequency_hz,
            duration: config.duration,
            volume: config.volume,
        }
    }

    /// Render the tone as mono samples
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn samples(&self, sample_rate: u32) -> Vec<f32> {
        let rate = sample_rate as f32;
        let count = (self.duration.as_secs_f32() * rate) as usize;
        let fade = ((FADE.as_secs_f32() * rate) as usize).min(count / 2).max(1);

        (0..count)
            .map(|i| {
                let t = i as f32 / rate;
                let envelope = (i.min(count - 1 - i) as f32 / fade as f32).min(1.0);
                (2.0 * std::f32::consts::PI * self.frequency_hz * t).sin() * self.volume * envelope
            })
            .collect()
    }
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == 1 && supports_rate(c))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| c.channels() == 2 && supports_rate(c))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Play the confirmation tone, blocking until it has finished
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub fn play_tone(&self, tone: &ConfirmationTone) -> Result<()> {
        self.play_samples_blocking(tone.samples(PLAYBACK_SAMPLE_RATE))
    }

    /// Play samples in a blocking manner
    fn play_samples_blocking(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });
                            frame.fill(sample);
                            pos = (pos + 1).min(samples.len());
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Poll for completion with timeout
        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                tracing::warn!("playback timed out");
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}
