//! Configuration management for Beacon wake detection
//!
//! Values resolve as env > toml > default and are validated once. Nothing
//! here changes after a detector has started.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::voice::{FRAME_SAMPLES, SAMPLE_RATE, frame_duration};
use crate::wake::ActivationSource;
use crate::{Error, Result};

use self::file::WakeConfigFile;

/// Shortest settle delay that avoids the tone re-triggering the detector
pub const MIN_SETTLE: Duration = Duration::from_millis(200);

/// Beacon wake configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Recognizer thresholds and timing
    pub detector: DetectorConfig,

    /// Microphone capture settings
    pub capture: CaptureConfig,

    /// Confirmation tone and settle delay
    pub feedback: FeedbackConfig,
}

/// Thresholds for the wake recognizers and arbiter
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Minimum peak amplitude for a clap transient
    pub clap_threshold: f32,

    /// Shortest spike that counts as a clap
    pub min_clap_duration: Duration,

    /// Longest spike that counts as a clap
    pub max_clap_duration: Duration,

    /// Shortest valid gap between two claps
    pub min_clap_gap: Duration,

    /// Longest valid gap between two claps
    pub max_clap_gap: Duration,

    /// Minimum RMS for a sustained-speech frame
    pub voice_energy_threshold: f32,

    /// Consecutive speech frames for a voice phrase activation
    pub min_sustained_frames: u32,

    /// Enable the fallback speech recognizer
    pub fallback_enabled: bool,

    /// Minimum RMS for a fallback speech frame
    pub fallback_energy_threshold: f32,

    /// Consecutive frames for a fallback activation
    pub fallback_min_frames: u32,

    /// Minimum time between any two activations
    pub cooldown: Duration,

    /// Duration of one frame, set from the frame source at start
    pub frame_duration: Duration,

    /// Arbitration order, highest priority first
    ///
    /// Sources missing from the list are never admitted.
    pub priority: Vec<ActivationSource>,

    /// Depth of the activation dispatch queue
    pub dispatch_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            clap_threshold: 0.25,
            min_clap_duration: Duration::from_millis(50),
            max_clap_duration: Duration::from_millis(300),
            min_clap_gap: Duration::from_millis(50),
            max_clap_gap: Duration::from_secs(1),
            voice_energy_threshold: 0.04,
            min_sustained_frames: 20,
            fallback_enabled: true,
            fallback_energy_threshold: 0.02,
            fallback_min_frames: 10,
            cooldown: Duration::from_secs(3),
            frame_duration: frame_duration(FRAME_SAMPLES, SAMPLE_RATE),
            priority: vec![
                ActivationSource::Clap,
                ActivationSource::VoicePhrase,
                ActivationSource::FallbackVad,
            ],
            dispatch_capacity: 1,
        }
    }
}

impl DetectorConfig {
    /// Check every threshold is in range
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending value
    pub fn validate(&self) -> Result<()> {
        check_level("clap_threshold", self.clap_threshold)?;
        check_level("voice_energy_threshold", self.voice_energy_threshold)?;
        check_level("fallback_energy_threshold", self.fallback_energy_threshold)?;

        if self.min_clap_duration > self.max_clap_duration {
            return Err(Error::Config(format!(
                "min_clap_duration ({:?}) exceeds max_clap_duration ({:?})",
                self.min_clap_duration, self.max_clap_duration
            )));
        }
        if self.min_clap_gap > self.max_clap_gap {
            return Err(Error::Config(format!(
                "min_clap_gap ({:?}) exceeds max_clap_gap ({:?})",
                self.min_clap_gap, self.max_clap_gap
            )));
        }
        if self.min_sustained_frames == 0 {
            return Err(Error::Config("min_sustained_frames must be at least 1".to_string()));
        }
        if self.fallback_min_frames == 0 {
            return Err(Error::Config("fallback_min_frames must be at least 1".to_string()));
        }
        if self.frame_duration.is_zero() {
            return Err(Error::Config("frame_duration must be non-zero".to_string()));
        }
        if self.dispatch_capacity == 0 {
            return Err(Error::Config("dispatch_capacity must be at least 1".to_string()));
        }

        if self.priority.is_empty() {
            return Err(Error::Config("priority must name at least one source".to_string()));
        }
        for (i, source) in self.priority.iter().enumerate() {
            if *source == ActivationSource::Manual {
                return Err(Error::Config(
                    "manual triggers bypass priority and cannot be listed".to_string(),
                ));
            }
            if self.priority[..i].contains(source) {
                return Err(Error::Config(format!("priority lists {source} twice")));
            }
        }

        Ok(())
    }

    /// Copy with the frame duration of a particular source
    #[must_use]
    pub fn with_frame_duration(mut self, frame_duration: Duration) -> Self {
        self.frame_duration = frame_duration;
        self
    }
}

fn check_level(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be within 0.0..=1.0, got {value}")))
    }
}

/// Audio capture configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Input device name (defaults to the host's default input)
    pub device: Option<String>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Samples per frame
    pub frame_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: SAMPLE_RATE,
            frame_samples: FRAME_SAMPLES,
        }
    }
}

impl CaptureConfig {
    /// Duration of one captured frame
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        frame_duration(self.frame_samples, self.sample_rate)
    }
}

/// Confirmation feedback played after activation
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackConfig {
    /// Play a tone on activation
    pub enabled: bool,

    /// Tone frequency in Hz
    pub frequency_hz: f32,

    /// Tone length
    pub duration: Duration,

    /// Tone volume (0.0 to 1.0)
    pub volume: f32,

    /// Delay after the tone before a command may be captured
    pub settle: Duration,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency_hz: 880.0,
            duration: Duration::from_millis(150),
            volume: 0.3,
            settle: Duration::from_millis(300),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// With `path`, that file must exist and parse. Without it the standard
    /// location is tried and a broken file is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file cannot be read or any value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(p) => file::read_config_file(p)?,
            None => file::load_config_file(),
        };

        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge defaults, a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if an environment value doesn't parse or the result is invalid
    pub fn from_sources<F>(fc: WakeConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DetectorConfig::default();
        let d = fc.detector;

        let capture_defaults = CaptureConfig::default();
        let capture = CaptureConfig {
            device: env("BEACON_WAKE_DEVICE").or(fc.capture.device),
            sample_rate: env_parse(&env, "BEACON_WAKE_SAMPLE_RATE")?
                .or(fc.capture.sample_rate)
                .unwrap_or(capture_defaults.sample_rate),
            frame_samples: fc
                .capture
                .frame_samples
                .unwrap_or(capture_defaults.frame_samples),
        };
        if capture.sample_rate == 0 || capture.frame_samples == 0 {
            return Err(Error::Config(
                "capture sample_rate and frame_samples must be non-zero".to_string(),
            ));
        }

        let detector = DetectorConfig {
            clap_threshold: env_parse(&env, "BEACON_WAKE_CLAP_THRESHOLD")?
                .or(d.clap_threshold)
                .unwrap_or(defaults.clap_threshold),
            min_clap_duration: secs(d.min_clap_duration, "min_clap_duration")?
                .unwrap_or(defaults.min_clap_duration),
            max_clap_duration: secs(d.max_clap_duration, "max_clap_duration")?
                .unwrap_or(defaults.max_clap_duration),
            min_clap_gap: secs(d.min_clap_gap, "min_clap_gap")?.unwrap_or(defaults.min_clap_gap),
            max_clap_gap: secs(d.max_clap_gap, "max_clap_gap")?.unwrap_or(defaults.max_clap_gap),
            voice_energy_threshold: env_parse(&env, "BEACON_WAKE_VOICE_THRESHOLD")?
                .or(d.voice_energy_threshold)
                .unwrap_or(defaults.voice_energy_threshold),
            min_sustained_frames: env_parse(&env, "BEACON_WAKE_MIN_SUSTAINED_FRAMES")?
                .or(d.min_sustained_frames)
                .unwrap_or(defaults.min_sustained_frames),
            fallback_enabled: env_flag(&env, "BEACON_WAKE_FALLBACK_ENABLED")
                .or(d.fallback_enabled)
                .unwrap_or(defaults.fallback_enabled),
            fallback_energy_threshold: d
                .fallback_energy_threshold
                .unwrap_or(defaults.fallback_energy_threshold),
            fallback_min_frames: env_parse(&env, "BEACON_WAKE_FALLBACK_MIN_FRAMES")?
                .or(d.fallback_min_frames)
                .unwrap_or(defaults.fallback_min_frames),
            cooldown: secs(env_parse(&env, "BEACON_WAKE_COOLDOWN_SECS")?.or(d.cooldown), "cooldown")?
                .unwrap_or(defaults.cooldown),
            frame_duration: capture.frame_duration(),
            priority: d.priority.unwrap_or(defaults.priority),
            dispatch_capacity: d.dispatch_capacity.unwrap_or(defaults.dispatch_capacity),
        };
        detector.validate()?;

        let feedback_defaults = FeedbackConfig::default();
        let f = fc.feedback;
        let feedback = FeedbackConfig {
            enabled: env_flag(&env, "BEACON_WAKE_FEEDBACK_ENABLED")
                .or(f.enabled)
                .unwrap_or(feedback_defaults.enabled),
            frequency_hz: f.frequency_hz.unwrap_or(feedback_defaults.frequency_hz),
            duration: secs(f.duration, "feedback.duration")?.unwrap_or(feedback_defaults.duration),
            volume: f.volume.unwrap_or(feedback_defaults.volume),
            settle: secs(f.settle, "feedback.settle")?.unwrap_or(feedback_defaults.settle),
        };
        check_level("feedback.volume", feedback.volume)?;
        if !(feedback.frequency_hz.is_finite() && feedback.frequency_hz > 0.0) {
            return Err(Error::Config(format!(
                "feedback.frequency_hz must be positive, got {}",
                feedback.frequency_hz
            )));
        }
        if feedback.enabled && feedback.settle < MIN_SETTLE {
            tracing::warn!(
                settle_ms = feedback.settle.as_millis(),
                "settle delay below 200ms, the tone may re-trigger the detector"
            );
        }

        Ok(Self {
            detector,
            capture,
            feedback,
        })
    }
}

/// Parse an optional environment value, failing on garbage
fn env_parse<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key}: cannot parse {raw:?}")))
        })
        .transpose()
}

fn env_flag<F>(env: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Convert optional seconds into a duration
fn secs(value: Option<f64>, name: &str) -> Result<Option<Duration>> {
    value
        .map(|s| {
            Duration::try_from_secs_f64(s)
                .map_err(|_| Error::Config(format!("{name} must be a non-negative number of seconds, got {s}")))
        })
        .transpose()
}
