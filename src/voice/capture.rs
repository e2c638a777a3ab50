//! Frame capture from a microphone

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream};

use super::frame::{FrameChunker, FrameSink, FrameSource, frame_duration};
use crate::config::CaptureConfig;
use crate::{Error, Result};

/// Running capture thread and its stop signal
struct CaptureThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Captures fixed-size frames from an input device
///
/// The `cpal` stream is not `Send`, so it lives on a dedicated thread for
/// its whole life and is torn down there on `stop()`.
pub struct AudioCapture {
    device: Option<String>,
    sample_rate: u32,
    frame_samples: usize,
    thread: Option<CaptureThread>,
}

impl AudioCapture {
    /// Create a capture source; the device is opened on `start()`
    #[must_use]
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            device: config.device.clone(),
            sample_rate: config.sample_rate,
            frame_samples: config.frame_samples,
            thread: None,
        }
    }

    /// Names of available input devices
    ///
    /// # Errors
    ///
    /// Returns error if the host cannot enumerate devices
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?;

        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }
}

impl FrameSource for AudioCapture {
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let device = self.device.clone();
        let sample_rate = self.sample_rate;
        let frame_samples = self.frame_samples;

        let handle = thread::Builder::new()
            .name("wake-capture".to_string())
            .spawn(move || {
                match open_stream(device.as_deref(), sample_rate, frame_samples, sink) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Park until stop() signals or drops the sender
                        let _ = stop_rx.recv();
                        drop(stream);
                        tracing::debug!("audio capture stopped");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.thread = Some(CaptureThread { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(Error::SourceUnavailable(e.to_string()))
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::SourceUnavailable("capture thread exited".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.stop_tx.send(());
            if thread.handle.join().is_err() {
                tracing::error!("audio capture thread panicked");
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

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Find the requested input device, or the default one
fn find_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Audio(format!("input device not found: {name}"))),
        None => host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string())),
    }
}

/// Open and play an input stream feeding `sink`
fn open_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    frame_samples: usize,
    mut sink: FrameSink,
) -> Result<Stream> {
    let device = find_device(device_name)?;

    // Prefer mono, fall back to any channel count and downmix
    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| {
            c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        frame_samples,
        "audio capture initialized"
    );

    let mut chunker = FrameChunker::new(frame_samples, sample_rate);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                chunker.push_f32(data, channels, &mut sink);
            },
            |err| {
                // Overruns and device loss surface here; frames are not backfilled
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    tracing::debug!("audio capture started");

    Ok(stream)
}
