//! Voice I/O module
//!
//! Handles frame capture from microphones and WAV files, and the
//! confirmation tone played after an activation.

mod capture;
mod frame;
mod playback;
mod wav;

pub use capture::AudioCapture;
pub use frame::{
    AudioFrame, FRAME_SAMPLES, FrameChunker, FrameSink, FrameSource, SAMPLE_RATE, frame_duration,
};
pub use playback::{AudioPlayback, ConfirmationTone};
pub use wav::{WavFrameSource, read_wav_frames, samples_to_wav};
