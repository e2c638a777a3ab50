//! Detector controller integration tests
//!
//! Uses a test-driven frame source; the dispatch worker is a real thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use beacon_wake::voice::{FRAME_SAMPLES, SAMPLE_RATE, WavFrameSource, samples_to_wav};
use beacon_wake::{ActivationEvent, ActivationSource, DetectorConfig, DetectorController, Error};

mod common;

use common::{FailingSource, PushSource, generate_silence, generate_sine_samples};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Two claps and the quiet frame that ends the second
const CLAP_PAIR: [f32; 5] = [0.3, 0.0, 0.0, 0.3, 0.0];

/// Controller over a push source, forwarding activations to a channel
fn controller_with_channel(
    config: DetectorConfig,
) -> (
    DetectorController,
    common::PushHandle,
    mpsc::Receiver<ActivationEvent>,
) {
    let (source, handle) = PushSource::new();
    let controller = DetectorController::new(config, Box::new(source)).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    controller.register_on_activate(move |event| {
        let _ = tx.lock().unwrap().send(event);
    });

    (controller, handle, rx)
}

#[test]
fn test_clap_pair_reaches_callback() {
    let (controller, handle, rx) = controller_with_channel(DetectorConfig::default());
    controller.start().unwrap();

    handle.push_levels(&CLAP_PAIR);

    let event = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(event.source, ActivationSource::Clap);
    assert_eq!(event.timestamp, common::FRAME * 4);

    controller.stop();
    let stats = controller.stats();
    assert_eq!(stats.frames, 5);
    assert_eq!(stats.activations, 1);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let (controller, handle, _rx) = controller_with_channel(DetectorConfig::default());
    assert!(!controller.is_running());

    controller.start().unwrap();
    controller.start().unwrap();
    assert!(controller.is_running());
    assert!(handle.is_attached());

    controller.stop();
    controller.stop();
    assert!(!controller.is_running());
    assert!(!handle.is_attached());
}

#[test]
fn test_no_callback_after_stop() {
    let (source, handle) = PushSource::new();
    let controller = DetectorController::new(DetectorConfig::default(), Box::new(source)).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    controller.register_on_activate(move |_| {
        std::thread::sleep(Duration::from_millis(50));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    controller.start().unwrap();
    handle.push_levels(&CLAP_PAIR);
    controller.stop();

    let after_stop = calls.load(Ordering::SeqCst);
    assert!(!handle.push(common::level_frame(0.3, 100)));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);
}

#[test]
fn test_restart_uses_fresh_state() {
    let (controller, handle, rx) = controller_with_channel(DetectorConfig::default());

    controller.start().unwrap();
    handle.push_levels(&[0.3, 0.0]); // arm a first clap
    controller.stop();

    controller.start().unwrap();
    assert_eq!(controller.stats().frames, 0);
    handle.push_levels(&[0.0, 0.3, 0.0]); // would complete the pair if state leaked
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    controller.stop();
}

#[test]
fn test_failing_source_is_unavailable() {
    let controller =
        DetectorController::new(DetectorConfig::default(), Box::new(FailingSource)).unwrap();

    let result = controller.start();
    assert!(matches!(result, Err(Error::SourceUnavailable(_))));
    assert!(!controller.is_running());

    // Stop after a failed start is a no-op
    controller.stop();
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let (source, _handle) = PushSource::new();
    let config = DetectorConfig {
        min_clap_gap: Duration::from_secs(2),
        max_clap_gap: Duration::from_secs(1),
        ..Default::default()
    };

    let result = DetectorController::new(config, Box::new(source));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_frame_duration_taken_from_source() {
    let (source, _handle) = PushSource::with_frame_duration(Duration::from_millis(32));
    let controller = DetectorController::new(DetectorConfig::default(), Box::new(source)).unwrap();

    assert_eq!(controller.config().frame_duration, Duration::from_millis(32));
}

#[test]
fn test_manual_trigger_honours_cooldown() {
    let config = DetectorConfig {
        dispatch_capacity: 4,
        ..Default::default()
    };
    let (controller, _handle, rx) = controller_with_channel(config);

    assert!(!controller.trigger_manual(), "not running yet");

    controller.start().unwrap();
    assert!(controller.trigger_manual());
    assert!(!controller.trigger_manual());

    controller.reset_cooldown();
    assert!(controller.trigger_manual());

    let first = rx.recv_timeout(TIMEOUT).unwrap();
    let second = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(first.source, ActivationSource::Manual);
    assert_eq!(second.source, ActivationSource::Manual);

    controller.stop();
}

#[test]
fn test_manual_trigger_suppresses_clap() {
    let (controller, handle, rx) = controller_with_channel(DetectorConfig::default());
    controller.start().unwrap();

    assert!(controller.trigger_manual());
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().source, ActivationSource::Manual);

    // Frame clock starts at zero, well inside the manual cooldown
    handle.push_levels(&CLAP_PAIR);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    controller.stop();
}

#[test]
fn test_busy_callback_drops_activations() {
    let config = DetectorConfig {
        cooldown: Duration::ZERO,
        ..Default::default()
    };
    let (source, _handle) = PushSource::new();
    let controller = DetectorController::new(config, Box::new(source)).unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let release_rx = Mutex::new(release_rx);
    controller.register_on_activate(move |_| {
        let _ = entered_tx.lock().unwrap().send(());
        let _ = release_rx.lock().unwrap().recv_timeout(TIMEOUT);
    });

    controller.start().unwrap();

    // First activation occupies the callback
    assert!(controller.trigger_manual());
    entered_rx.recv_timeout(TIMEOUT).unwrap();

    // Second waits in the queue, third finds it full
    assert!(controller.trigger_manual());
    assert!(!controller.trigger_manual());

    let stats = controller.stats();
    assert_eq!(stats.activations, 2);
    assert_eq!(stats.dropped, 1);

    release_tx.send(()).unwrap();
    release_tx.send(()).unwrap();
    controller.stop();
}

#[test]
fn test_stop_from_callback() {
    let (source, handle) = PushSource::new();
    let controller = Arc::new(
        DetectorController::new(DetectorConfig::default(), Box::new(source)).unwrap(),
    );

    let (done_tx, done_rx) = mpsc::channel();
    let done_tx = Mutex::new(done_tx);
    let weak: Weak<DetectorController> = Arc::downgrade(&controller);
    controller.register_on_activate(move |_| {
        if let Some(controller) = weak.upgrade() {
            controller.stop();
        }
        let _ = done_tx.lock().unwrap().send(());
    });

    controller.start().unwrap();
    handle.push_levels(&CLAP_PAIR);

    done_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(!controller.is_running());
    assert!(!handle.is_attached());
}

#[test]
fn test_wav_source_drives_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("claps.wav");

    let clap = generate_sine_samples(1000.0, FRAME_SAMPLES, 0.6);
    let mut samples = clap.clone();
    samples.extend(generate_silence(FRAME_SAMPLES * 3));
    samples.extend(&clap);
    samples.extend(generate_silence(FRAME_SAMPLES * 4));
    std::fs::write(&path, samples_to_wav(&samples, SAMPLE_RATE).unwrap()).unwrap();

    let source = WavFrameSource::open(&path, FRAME_SAMPLES, false).unwrap();
    let controller = DetectorController::new(DetectorConfig::default(), Box::new(source)).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    controller.register_on_activate(move |event| {
        let _ = tx.lock().unwrap().send(event);
    });

    controller.start().unwrap();
    let event = rx.recv_timeout(TIMEOUT).unwrap();
    controller.stop();

    assert_eq!(event.source, ActivationSource::Clap);
    assert_eq!(event.timestamp, common::FRAME * 5);
}
