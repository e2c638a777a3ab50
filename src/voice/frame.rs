//! Audio frames and the frame source abstraction

use std::time::Duration;

use crate::Result;

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per frame (64ms at 16kHz)
pub const FRAME_SAMPLES: usize = 1024;

/// A fixed-duration chunk of mono audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Signed 16-bit PCM samples
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Capture time, monotonic since the source started
    pub timestamp: Duration,
}

impl AudioFrame {
    /// Create a frame from PCM samples
    #[must_use]
    pub const fn new(samples: Vec<i16>, sample_rate: u32, timestamp: Duration) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp,
        }
    }

    /// Create a frame from normalized `f32` samples in `[-1.0, 1.0]`
    #[must_use]
    pub fn from_f32(samples: &[f32], sample_rate: u32, timestamp: Duration) -> Self {
        Self::new(
            samples.iter().map(|&s| f32_to_i16(s)).collect(),
            sample_rate,
            timestamp,
        )
    }

    /// Duration covered by this frame's samples
    #[must_use]
    pub fn duration(&self) -> Duration {
        frame_duration(self.samples.len(), self.sample_rate)
    }
}

/// Duration of `samples` samples at `sample_rate`
#[must_use]
pub fn frame_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    // Integer nanoseconds keep timestamps exact for whole-millisecond frames
    let nanos = samples as u128 * 1_000_000_000 / u128::from(sample_rate);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Convert f32 [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Re-chunks arbitrary device buffers into fixed-size mono frames
///
/// Timestamps count delivered samples, so they are monotonic and exact
/// regardless of device buffer sizes.
#[derive(Debug)]
pub struct FrameChunker {
    frame_samples: usize,
    sample_rate: u32,
    pending: Vec<i16>,
    emitted: usize,
}

impl FrameChunker {
    /// Create a chunker producing frames of `frame_samples` samples
    #[must_use]
    pub fn new(frame_samples: usize, sample_rate: u32) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            sample_rate,
            pending: Vec::with_capacity(frame_samples),
            emitted: 0,
        }
    }

    /// Push interleaved `f32` samples, downmixing to mono
    pub fn push_f32<F>(&mut self, data: &[f32], channels: usize, emit: &mut F)
    where
        F: FnMut(AudioFrame),
    {
        let channels = channels.max(1);
        for chunk in data.chunks(channels) {
            #[allow(clippy::cast_precision_loss)]
            let mono = chunk.iter().sum::<f32>() / chunk.len() as f32;
            self.push_sample(f32_to_i16(mono), emit);
        }
    }

    /// Push interleaved `i16` samples, downmixing to mono
    pub fn push_i16<F>(&mut self, data: &[i16], channels: usize, emit: &mut F)
    where
        F: FnMut(AudioFrame),
    {
        let channels = channels.max(1);
        for chunk in data.chunks(channels) {
            let sum: i32 = chunk.iter().map(|&s| i32::from(s)).sum();
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let mono = (sum / chunk.len() as i32) as i16;
            self.push_sample(mono, emit);
        }
    }

    fn push_sample<F>(&mut self, sample: i16, emit: &mut F)
    where
        F: FnMut(AudioFrame),
    {
        self.pending.push(sample);
        if self.pending.len() < self.frame_samples {
            return;
        }

        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_samples));
        let timestamp = frame_duration(self.emitted, self.sample_rate);
        self.emitted += samples.len();
        emit(AudioFrame::new(samples, self.sample_rate, timestamp));
    }

    /// Samples waiting for a full frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Callback receiving frames on the source's capture thread
pub type FrameSink = Box<dyn FnMut(AudioFrame) + Send + 'static>;

/// Produces fixed-duration mono frames with monotonic timestamps
///
/// Sources own their capture thread and call the sink from it. Gaps or
/// dropped device buffers are the source's to report; the detector only sees
/// timestamps.
pub trait FrameSource: Send {
    /// Begin delivering frames to `sink`
    ///
    /// # Errors
    ///
    /// Returns error if the underlying device or file cannot be opened
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop delivering frames
    ///
    /// Must not return while the sink may still be running, and must drop
    /// the sink.
    fn stop(&mut self);

    /// Sample rate of delivered frames
    fn sample_rate(&self) -> u32;

    /// Fixed duration of each delivered frame
    fn frame_duration(&self) -> Duration;
}
