//! Detector lifecycle and activation dispatch
//!
//! Frames are evaluated directly on the source's capture thread. Activations
//! are handed to a bounded queue and a single worker thread invokes the
//! registered callback, so slow callbacks never stall capture. When the
//! queue is full the new activation is dropped and counted.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::arbiter::{ActivationArbiter, ActivationEvent, ActivationSource};
use super::detector::WakeDetector;
use crate::config::DetectorConfig;
use crate::voice::{FrameSink, FrameSource};
use crate::{Error, Result};

/// Callback invoked on the dispatch worker for each activation
pub type ActivationCallback = Arc<dyn Fn(ActivationEvent) + Send + Sync>;

type SenderSlot = Arc<Mutex<Option<mpsc::Sender<ActivationEvent>>>>;

/// Counters for the current run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    /// Frames evaluated
    pub frames: u64,
    /// Activations queued for the callback
    pub activations: u64,
    /// Activations dropped because the queue was full
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    activations: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.frames.store(0, Ordering::Relaxed);
        self.activations.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }
}

/// State that exists only while running
struct Session {
    running: Arc<AtomicBool>,
    sender: SenderSlot,
    arbiter: Arc<ActivationArbiter>,
    epoch: Instant,
    worker: JoinHandle<()>,
}

/// Owns the frame source, the detector and the dispatch worker
pub struct DetectorController {
    config: DetectorConfig,
    source: Mutex<Box<dyn FrameSource>>,
    callback: Arc<Mutex<Option<ActivationCallback>>>,
    session: Mutex<Option<Session>>,
    counters: Arc<Counters>,
}

impl DetectorController {
    /// Create a stopped controller
    ///
    /// The frame duration is taken from the source.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any threshold is out of range
    pub fn new(config: DetectorConfig, source: Box<dyn FrameSource>) -> Result<Self> {
        let config = config.with_frame_duration(source.frame_duration());
        config.validate()?;

        tracing::debug!(
            sample_rate = source.sample_rate(),
            frame_ms = config.frame_duration.as_millis(),
            cooldown_ms = config.cooldown.as_millis(),
            "wake detector configured"
        );

        Ok(Self {
            config,
            source: Mutex::new(source),
            callback: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Register the activation callback, replacing any previous one
    ///
    /// The callback runs on the dispatch worker thread and may block.
    pub fn register_on_activate<F>(&self, callback: F)
    where
        F: Fn(ActivationEvent) + Send + Sync + 'static,
    {
        *lock(&self.callback) = Some(Arc::new(callback));
    }

    /// Start consuming frames
    ///
    /// Calling this while running is a no-op. Detector state is always
    /// created fresh.
    ///
    /// # Errors
    ///
    /// Returns `Error::SourceUnavailable` if the frame source fails to start
    pub fn start(&self) -> Result<()> {
        let mut session = lock(&self.session);
        if session.is_some() {
            tracing::warn!("wake detector already running");
            return Ok(());
        }

        self.counters.reset();

        let arbiter = Arc::new(ActivationArbiter::new(&self.config));
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(self.config.dispatch_capacity);
        let sender: SenderSlot = Arc::new(Mutex::new(Some(tx)));

        let worker = spawn_worker(rx, Arc::clone(&running), Arc::clone(&self.callback))?;

        let sink = frame_sink(
            WakeDetector::new(self.config.clone(), Arc::clone(&arbiter)),
            Arc::clone(&running),
            Arc::clone(&sender),
            Arc::clone(&self.counters),
        );

        let epoch = Instant::now();
        if let Err(e) = lock(&self.source).start(sink) {
            running.store(false, Ordering::Release);
            lock(&sender).take();
            if worker.join().is_err() {
                tracing::error!("dispatch worker panicked");
            }
            tracing::error!(error = %e, "failed to start frame source");
            return Err(match e {
                Error::SourceUnavailable(_) => e,
                other => Error::SourceUnavailable(other.to_string()),
            });
        }

        *session = Some(Session {
            running,
            sender,
            arbiter,
            epoch,
            worker,
        });
        drop(session);

        tracing::info!("wake detector started");
        Ok(())
    }

    /// Stop consuming frames
    ///
    /// Idempotent. When this returns the source is stopped and no callback is
    /// running or will run.
    pub fn stop(&self) {
        let Some(session) = lock(&self.session).take() else {
            tracing::debug!("wake detector not running");
            return;
        };

        session.running.store(false, Ordering::Release);
        lock(&self.source).stop();
        // Dropping the last sender lets the worker drain and exit
        lock(&session.sender).take();

        if session.worker.thread().id() == thread::current().id() {
            tracing::debug!("stop called from activation callback");
        } else if session.worker.join().is_err() {
            tracing::error!("dispatch worker panicked");
        }

        let stats = self.stats();
        tracing::info!(
            frames = stats.frames,
            activations = stats.activations,
            dropped = stats.dropped,
            "wake detector stopped"
        );
    }

    /// Activate as if a recognizer had fired, honouring the cooldown
    ///
    /// Returns true if the activation was queued.
    pub fn trigger_manual(&self) -> bool {
        let session = lock(&self.session);
        let Some(session) = session.as_ref() else {
            tracing::debug!("manual trigger ignored, detector not running");
            return false;
        };

        let now = session.epoch.elapsed();
        session
            .arbiter
            .admit(ActivationSource::Manual, now)
            .is_some_and(|event| dispatch(&session.sender, &self.counters, event))
    }

    /// Clear the cooldown window so the next signal is admitted
    pub fn reset_cooldown(&self) {
        if let Some(session) = lock(&self.session).as_ref() {
            session.arbiter.reset();
        }
    }

    /// Whether frames are being consumed
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// Counters for the current or last run
    #[must_use]
    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            activations: self.counters.activations.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Validated configuration, with the source's frame duration
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

impl Drop for DetectorController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lock ignoring poison; every guarded value stays consistent on panic
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build the closure run on the capture thread for every frame
fn frame_sink(
    mut detector: WakeDetector,
    running: Arc<AtomicBool>,
    sender: SenderSlot,
    counters: Arc<Counters>,
) -> FrameSink {
    Box::new(move |frame| {
        if !running.load(Ordering::Acquire) {
            return;
        }

        counters.frames.fetch_add(1, Ordering::Relaxed);
        if let Some(event) = detector.process_frame(&frame) {
            dispatch(&sender, &counters, event);
        }
    })
}

/// Queue an activation without blocking
fn dispatch(sender: &SenderSlot, counters: &Counters, event: ActivationEvent) -> bool {
    let slot = lock(sender);
    let Some(tx) = slot.as_ref() else {
        return false;
    };

    match tx.try_send(event) {
        Ok(()) => {
            counters.activations.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(TrySendError::Full(event)) => {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                source = %event.source,
                "activation callback still busy, dropping activation"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("dispatch worker gone, dropping activation");
            false
        }
    }
}

fn spawn_worker(
    mut rx: mpsc::Receiver<ActivationEvent>,
    running: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<ActivationCallback>>>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("wake-dispatch".to_string())
        .spawn(move || {
            while let Some(event) = rx.blocking_recv() {
                if !running.load(Ordering::Acquire) {
                    continue;
                }

                let Some(callback) = lock(&callback).clone() else {
                    tracing::debug!(source = %event.source, "no activation callback registered");
                    continue;
                };

                if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                    tracing::error!(source = %event.source, "activation callback panicked");
                }
            }
            tracing::debug!("dispatch worker exiting");
        })?;

    Ok(handle)
}
