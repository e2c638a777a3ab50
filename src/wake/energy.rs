//! Frame energy analysis

use std::time::Duration;

use crate::voice::AudioFrame;

/// Full-scale magnitude of a signed 16-bit sample
const FULL_SCALE: f32 = 32768.0;

/// Loudness of a single frame, normalized to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEnergy {
    /// Root-mean-square amplitude
    pub rms: f32,
    /// Peak absolute amplitude
    pub peak: f32,
    /// Timestamp of the originating frame
    pub timestamp: Duration,
}

impl FrameEnergy {
    /// Energy with identical RMS and peak, for synthetic input
    #[must_use]
    pub const fn uniform(level: f32, timestamp: Duration) -> Self {
        Self {
            rms: level,
            peak: level,
            timestamp,
        }
    }
}

/// Converts frames into [`FrameEnergy`]
///
/// Stateless: the same samples always yield the same energy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyAnalyzer;

impl EnergyAnalyzer {
    /// Measure RMS and peak amplitude of a frame
    #[must_use]
    pub fn analyze(frame: &AudioFrame) -> FrameEnergy {
        let (rms, peak) = measure(&frame.samples);
        FrameEnergy {
            rms,
            peak,
            timestamp: frame.timestamp,
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn measure(samples: &[i16]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let mut sum_squares = 0.0f64;
    let mut peak = 0u16;
    for &s in samples {
        let v = f64::from(s);
        sum_squares += v * v;
        peak = peak.max(s.unsigned_abs());
    }

    let rms = (sum_squares / samples.len() as f64).sqrt() as f32 / FULL_SCALE;
    let peak = f32::from(peak) / FULL_SCALE;
    (rms.clamp(0.0, 1.0), peak.clamp(0.0, 1.0))
}
