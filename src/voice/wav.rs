//! WAV file frame source and encoding
//!
//! Replays recordings through the detector, optionally at real-time pace,
//! and records captured audio for offline threshold tuning.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::frame::{AudioFrame, FrameChunker, FrameSink, FrameSource, frame_duration};
use crate::{Error, Result};

/// Decode a WAV file into fixed-size mono frames
///
/// A trailing partial frame is discarded.
///
/// # Errors
///
/// Returns error if the file cannot be opened or decoded
pub fn read_wav_frames(path: &Path, frame_samples: usize) -> Result<(u32, Vec<AudioFrame>)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| Error::Audio(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);

    let mut chunker = FrameChunker::new(frame_samples, spec.sample_rate);
    let mut frames = Vec::new();
    let mut emit = |frame: AudioFrame| frames.push(frame);

    match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => {
            let samples = reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?;
            chunker.push_i16(&samples, channels, &mut emit);
        }
        (hound::SampleFormat::Int, bits) => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1i64 << (bits - 1)) as f32;
            #[allow(clippy::cast_precision_loss)]
            let samples = reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?;
            chunker.push_f32(&samples, channels, &mut emit);
        }
        (hound::SampleFormat::Float, _) => {
            let samples = reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?;
            chunker.push_f32(&samples, channels, &mut emit);
        }
    }

    tracing::debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels,
        frames = frames.len(),
        "decoded wav file"
    );

    Ok((spec.sample_rate, frames))
}

/// Encode mono i16 samples as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Replay thread and its stop flag
struct Replay {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Frame source replaying a WAV file
pub struct WavFrameSource {
    path: PathBuf,
    sample_rate: u32,
    frame_samples: usize,
    frames: Arc<Vec<AudioFrame>>,
    realtime: bool,
    finished: Arc<AtomicBool>,
    replay: Option<Replay>,
}

impl WavFrameSource {
    /// Load a WAV file as frames of `frame_samples` samples
    ///
    /// With `realtime`, frames are delivered at their timestamps rather than
    /// as fast as possible.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be decoded
    pub fn open(path: &Path, frame_samples: usize, realtime: bool) -> Result<Self> {
        let (sample_rate, frames) = read_wav_frames(path, frame_samples)?;

        Ok(Self {
            path: path.to_path_buf(),
            sample_rate,
            frame_samples,
            frames: Arc::new(frames),
            realtime,
            finished: Arc::new(AtomicBool::new(false)),
            replay: None,
        })
    }

    /// Whether the last replay delivered every frame
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Shared flag set once every frame was delivered
    #[must_use]
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }

    /// Number of frames in the file
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the file held less than one frame
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for WavFrameSource {
    fn start(&mut self, mut sink: FrameSink) -> Result<()> {
        if self.replay.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let frames = Arc::clone(&self.frames);
        let finished = Arc::clone(&self.finished);
        let realtime = self.realtime;
        let stop_flag = Arc::clone(&stop);
        finished.store(false, Ordering::Release);

        let handle = thread::Builder::new()
            .name("wake-wav".to_string())
            .spawn(move || {
                let epoch = Instant::now();
                for frame in frames.iter() {
                    if stop_flag.load(Ordering::Acquire) {
                        return;
                    }
                    if realtime {
                        let due = epoch + frame.timestamp;
                        thread::sleep(due.saturating_duration_since(Instant::now()));
                    }
                    sink(frame.clone());
                }
                finished.store(true, Ordering::Release);
                tracing::debug!(frames = frames.len(), "wav replay finished");
            })
            .map_err(|e| Error::SourceUnavailable(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), realtime, "wav replay started");
        self.replay = Some(Replay { stop, handle });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(replay) = self.replay.take() {
            replay.stop.store(true, Ordering::Release);
            if replay.handle.join().is_err() {
                tracing::error!("wav replay thread panicked");
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_duration(&self) -> Duration {
        frame_duration(self.frame_samples, self.sample_rate)
    }
}

impl Drop for WavFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}
