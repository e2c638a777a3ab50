//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon/wake.toml` as a persistent config source.
//! All fields are optional and durations are given in seconds; the file is a
//! partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;
use crate::wake::ActivationSource;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct WakeConfigFile {
    /// Recognizer thresholds and timing
    #[serde(default)]
    pub detector: DetectorFileConfig,

    /// Microphone capture settings
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Confirmation tone played on activation
    #[serde(default)]
    pub feedback: FeedbackFileConfig,
}

/// Detector thresholds
#[derive(Debug, Default, Deserialize)]
pub struct DetectorFileConfig {
    pub clap_threshold: Option<f32>,
    pub min_clap_duration: Option<f64>,
    pub max_clap_duration: Option<f64>,
    pub min_clap_gap: Option<f64>,
    pub max_clap_gap: Option<f64>,
    pub voice_energy_threshold: Option<f32>,
    pub min_sustained_frames: Option<u32>,
    pub fallback_enabled: Option<bool>,
    pub fallback_energy_threshold: Option<f32>,
    pub fallback_min_frames: Option<u32>,
    /// Minimum seconds between two activations
    pub cooldown: Option<f64>,
    /// Arbitration order, highest first (e.g. `["clap", "voice_phrase"]`)
    pub priority: Option<Vec<ActivationSource>>,
    /// Depth of the activation dispatch queue
    pub dispatch_capacity: Option<usize>,
}

/// Capture device settings
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Input device name (defaults to the host's default input)
    pub device: Option<String>,

    /// Sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Samples per frame
    pub frame_samples: Option<usize>,
}

/// Activation feedback settings
#[derive(Debug, Default, Deserialize)]
pub struct FeedbackFileConfig {
    pub enabled: Option<bool>,
    pub frequency_hz: Option<f32>,
    /// Tone length in seconds
    pub duration: Option<f64>,
    /// Tone volume (0.0 to 1.0)
    pub volume: Option<f32>,
    /// Seconds to wait after the tone before capturing a command
    pub settle: Option<f64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `WakeConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> WakeConfigFile {
    let Some(path) = config_file_path() else {
        return WakeConfigFile::default();
    };

    if !path.exists() {
        return WakeConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            WakeConfigFile::default()
        }
    }
}

/// Read and parse a config file at an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<WakeConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/omni/beacon/wake.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon")
            .join("wake.toml")
    })
}
