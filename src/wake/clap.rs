//! Double-clap recognition
//!
//! A clap is a short run of frames whose peak amplitude crosses the clap
//! threshold. The run is judged when it ends, on the first frame back below
//! the threshold, so a pair fires one frame after the second clap. Runs that
//! outlast the maximum duration are loud noise, not claps, and cancel any
//! pending arm as soon as they get too long.

use std::time::Duration;

use super::arbiter::RecognizerResult;
use super::energy::FrameEnergy;
use crate::config::DetectorConfig;

/// A detected transient spike
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClapEvent {
    /// Onset of the spike
    pub timestamp: Duration,
    /// Highest peak seen during the spike
    pub peak: f32,
}

/// State of the clap recognizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClapState {
    /// Waiting for a first clap
    Idle,
    /// One clap seen, waiting for its pair
    ArmedAfterFirstClap(ClapEvent),
}

/// Consecutive above-threshold frames
#[derive(Debug, Clone, Copy)]
struct SpikeRun {
    onset: Duration,
    frames: u32,
    peak: f32,
    too_long: bool,
}

/// Detects two claps within a bounded gap
#[derive(Debug)]
pub struct ClapRecognizer {
    threshold: f32,
    frame_duration: Duration,
    min_duration: Duration,
    max_duration: Duration,
    min_gap: Duration,
    max_gap: Duration,
    state: ClapState,
    run: Option<SpikeRun>,
}

impl ClapRecognizer {
    /// Create a recognizer in the idle state
    #[must_use]
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            threshold: config.clap_threshold,
            frame_duration: config.frame_duration,
            min_duration: config.min_clap_duration,
            max_duration: config.max_clap_duration,
            min_gap: config.min_clap_gap,
            max_gap: config.max_clap_gap,
            state: ClapState::Idle,
            run: None,
        }
    }

    /// Evaluate one frame
    pub fn process(&mut self, energy: &FrameEnergy) -> RecognizerResult {
        let now = energy.timestamp;

        if energy.peak <= self.threshold {
            return match self.run.take() {
                Some(run) => self.end_run(run),
                None => {
                    self.expire(now);
                    RecognizerResult::NoMatch
                }
            };
        }

        let run = self.run.get_or_insert(SpikeRun {
            onset: now,
            frames: 0,
            peak: 0.0,
            too_long: false,
        });
        run.frames = run.frames.saturating_add(1);
        run.peak = run.peak.max(energy.peak);

        let duration = self.frame_duration.saturating_mul(run.frames);
        if duration > self.max_duration && !run.too_long {
            run.too_long = true;
            if matches!(self.state, ClapState::ArmedAfterFirstClap(_)) {
                tracing::debug!(
                    duration_ms = duration.as_millis(),
                    "spike too long for a clap, disarming"
                );
                self.state = ClapState::Idle;
            }
        }

        RecognizerResult::NoMatch
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ClapState {
        self.state
    }

    /// Judge a finished spike
    fn end_run(&mut self, run: SpikeRun) -> RecognizerResult {
        if run.too_long {
            return RecognizerResult::NoMatch;
        }

        let duration = self.frame_duration.saturating_mul(run.frames);
        if duration < self.min_duration {
            tracing::trace!(duration_ms = duration.as_millis(), "spike too short for a clap");
            return RecognizerResult::NoMatch;
        }

        self.on_clap(ClapEvent {
            timestamp: run.onset,
            peak: run.peak,
        })
    }

    /// Drop an arm that has waited longer than the maximum gap
    ///
    /// Only checked on quiet frames; a spike already under way is judged by
    /// its onset instead.
    fn expire(&mut self, now: Duration) {
        if let ClapState::ArmedAfterFirstClap(first) = self.state
            && now.saturating_sub(first.timestamp) > self.max_gap
        {
            tracing::trace!("clap arm expired");
            self.state = ClapState::Idle;
        }
    }

    fn on_clap(&mut self, clap: ClapEvent) -> RecognizerResult {
        match self.state {
            ClapState::Idle => {
                tracing::debug!(peak = clap.peak, "first clap");
                self.state = ClapState::ArmedAfterFirstClap(clap);
                RecognizerResult::NoMatch
            }
            ClapState::ArmedAfterFirstClap(first) => {
                let gap = clap.timestamp.saturating_sub(first.timestamp);
                if gap < self.min_gap {
                    tracing::debug!(gap_ms = gap.as_millis(), "claps too close, resetting");
                    self.state = ClapState::Idle;
                    RecognizerResult::NoMatch
                } else if gap > self.max_gap {
                    tracing::debug!(gap_ms = gap.as_millis(), "claps too far apart, re-arming");
                    self.state = ClapState::ArmedAfterFirstClap(clap);
                    RecognizerResult::NoMatch
                } else {
                    tracing::info!(gap_ms = gap.as_millis(), "two claps detected");
                    self.state = ClapState::Idle;
                    RecognizerResult::Clap
                }
            }
        }
    }
}
