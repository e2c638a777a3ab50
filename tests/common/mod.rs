//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon_wake::voice::{AudioFrame, FRAME_SAMPLES, FrameSink, FrameSource, SAMPLE_RATE};
use beacon_wake::{Error, Result};

/// Duration of one default frame
pub const FRAME: Duration = Duration::from_millis(64);

/// Frame whose samples all sit at `level` of full scale
///
/// RMS and peak of the frame both equal `level`.
pub fn level_frame(level: f32, index: u32) -> AudioFrame {
    #[allow(clippy::cast_possible_truncation)]
    let value = (level * 32767.0) as i16;
    AudioFrame::new(vec![value; FRAME_SAMPLES], SAMPLE_RATE, FRAME * index)
}

/// Frames for a sequence of levels, one per 64ms
pub fn level_frames(levels: &[f32]) -> Vec<AudioFrame> {
    levels
        .iter()
        .zip(0u32..)
        .map(|(&level, i)| level_frame(level, i))
        .collect()
}

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn generate_sine_samples(frequency: f32, num_samples: usize, amplitude: f32) -> Vec<i16> {
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin() * 32767.0) as i16
        })
        .collect()
}

/// Generate silence
pub fn generate_silence(num_samples: usize) -> Vec<i16> {
    vec![0; num_samples]
}

type SinkSlot = Arc<Mutex<Option<FrameSink>>>;

/// Frame source driven by the test thread
///
/// Frames pushed through the [`PushHandle`] run the sink synchronously, so
/// a test knows every frame was evaluated once `push` returns.
pub struct PushSource {
    slot: SinkSlot,
    frame_duration: Duration,
}

/// Pushes frames into a started [`PushSource`]
#[derive(Clone)]
pub struct PushHandle {
    slot: SinkSlot,
    next_index: Arc<AtomicU32>,
}

impl PushSource {
    pub fn new() -> (Self, PushHandle) {
        Self::with_frame_duration(FRAME)
    }

    pub fn with_frame_duration(frame_duration: Duration) -> (Self, PushHandle) {
        let slot: SinkSlot = Arc::new(Mutex::new(None));
        let handle = PushHandle {
            slot: Arc::clone(&slot),
            next_index: Arc::new(AtomicU32::new(0)),
        };
        (
            Self {
                slot,
                frame_duration,
            },
            handle,
        )
    }
}

impl FrameSource for PushSource {
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        *self.slot.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.slot.lock().unwrap().take();
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn frame_duration(&self) -> Duration {
        self.frame_duration
    }
}

impl PushHandle {
    /// Deliver a frame; false if the source is not started
    pub fn push(&self, frame: AudioFrame) -> bool {
        let mut slot = self.slot.lock().unwrap();
        match slot.as_mut() {
            Some(sink) => {
                sink(frame);
                true
            }
            None => false,
        }
    }

    /// Deliver frames for a sequence of levels
    ///
    /// Timestamps continue from the previous call.
    pub fn push_levels(&self, levels: &[f32]) {
        for &level in levels {
            let index = self.next_index.fetch_add(1, Ordering::Relaxed);
            self.push(level_frame(level, index));
        }
    }

    /// Whether a sink is attached
    pub fn is_attached(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

/// Frame source whose device never opens
pub struct FailingSource;

impl FrameSource for FailingSource {
    fn start(&mut self, _sink: FrameSink) -> Result<()> {
        Err(Error::Audio("device busy".to_string()))
    }

    fn stop(&mut self) {}

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn frame_duration(&self) -> Duration {
        FRAME
    }
}
