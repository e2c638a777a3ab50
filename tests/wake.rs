//! Wake detection integration tests
//!
//! Drives the detector with synthetic frames, without audio hardware

use std::time::Duration;

use beacon_wake::voice::{FRAME_SAMPLES, SAMPLE_RATE, read_wav_frames, samples_to_wav};
use beacon_wake::wake::FrameEnergy;
use beacon_wake::{ActivationEvent, ActivationSource, DetectorConfig, WakeDetector};

mod common;

use common::{FRAME, generate_silence, generate_sine_samples, level_frames};

fn detector() -> WakeDetector {
    WakeDetector::from_config(DetectorConfig::default()).unwrap()
}

/// Run level frames through a detector, returning (frame index, event)
fn detect(detector: &mut WakeDetector, levels: &[f32]) -> Vec<(usize, ActivationEvent)> {
    level_frames(levels)
        .iter()
        .enumerate()
        .filter_map(|(i, frame)| detector.process_frame(frame).map(|e| (i, e)))
        .collect()
}

fn sources(events: &[(usize, ActivationEvent)]) -> Vec<(usize, ActivationSource)> {
    events.iter().map(|(i, e)| (*i, e.source)).collect()
}

#[test]
fn test_clap_pair_activates_once() {
    let mut d = detector();
    let events = detect(&mut d, &[0.3, 0.0, 0.0, 0.3, 0.0, 0.0, 0.0, 0.0]);

    // Judged on the first quiet frame after the second clap
    assert_eq!(sources(&events), vec![(4, ActivationSource::Clap)]);
    assert_eq!(events[0].1.timestamp, FRAME * 4);
}

/// Feed levels at a fixed frame period, returning (frame index, source)
fn detect_with_period(
    config: DetectorConfig,
    period: Duration,
    levels: &[f32],
) -> Vec<(u32, ActivationSource)> {
    let mut d = WakeDetector::from_config(config.with_frame_duration(period)).unwrap();
    levels
        .iter()
        .zip(0u32..)
        .filter_map(|(&level, i)| {
            d.process_energy(&FrameEnergy::uniform(level, period * i))
                .map(|e| (i, e.source))
        })
        .collect()
}

#[test]
fn test_clap_pair_100ms_apart() {
    // Three frames per 100ms; one-frame claps need a matching minimum duration
    let config = DetectorConfig {
        min_clap_duration: Duration::from_millis(30),
        ..Default::default()
    };
    let fired = detect_with_period(
        config,
        Duration::from_millis(100) / 3,
        &[0.3, 0.0, 0.0, 0.3, 0.0],
    );
    assert_eq!(fired, vec![(4, ActivationSource::Clap)]);
}

#[test]
fn test_one_frame_spikes_shorter_than_min_clap_duration() {
    // 33ms frames under the default 50ms minimum are not claps
    let fired = detect_with_period(
        DetectorConfig::default(),
        Duration::from_millis(100) / 3,
        &[0.3, 0.0, 0.0, 0.3, 0.0],
    );
    assert!(fired.is_empty());

    // Two-frame claps 100ms apart still pair
    let fired = detect_with_period(
        DetectorConfig::default(),
        Duration::from_millis(25),
        &[0.3, 0.3, 0.0, 0.0, 0.3, 0.3, 0.0],
    );
    assert_eq!(fired, vec![(6, ActivationSource::Clap)]);
}

#[test]
fn test_clap_followed_by_long_spike_does_not_activate() {
    let mut d = detector();
    let mut levels = vec![0.3, 0.0, 0.0];
    levels.extend([0.6; 10]);
    levels.extend([0.0; 3]);

    assert!(detect(&mut d, &levels).is_empty());
}

#[test]
fn test_claps_too_close_do_not_activate() {
    // Short frames so two onsets can land inside the minimum gap
    let config = DetectorConfig {
        min_clap_duration: Duration::from_millis(10),
        ..Default::default()
    }
    .with_frame_duration(Duration::from_millis(10));
    let mut d = WakeDetector::from_config(config).unwrap();

    let step = Duration::from_millis(10);
    let levels = [0.5, 0.0, 0.5, 0.0, 0.0, 0.0];
    let fired = levels
        .iter()
        .zip(0u32..)
        .filter_map(|(&level, i)| d.process_energy(&FrameEnergy::uniform(level, step * i)))
        .count();

    assert_eq!(fired, 0);
}

#[test]
fn test_claps_too_far_apart_do_not_activate() {
    let mut d = detector();
    // Second onset 17 frames (1.088s) after the first
    let mut levels = vec![0.3];
    levels.extend([0.0; 16]);
    levels.push(0.3);
    levels.extend([0.0; 4]);

    assert!(detect(&mut d, &levels).is_empty());
}

#[test]
fn test_sustained_voice_activates_at_threshold_frame() {
    let mut d = detector();
    let events = detect(&mut d, &[0.05; 25]);

    assert_eq!(sources(&events), vec![(19, ActivationSource::VoicePhrase)]);
    assert_eq!(events[0].1.timestamp, FRAME * 19);
}

#[test]
fn test_short_voice_does_not_activate() {
    let mut d = detector();
    let mut levels = vec![0.05; 19];
    levels.extend([0.0; 10]);
    levels.extend([0.05; 19]);

    assert!(detect(&mut d, &levels).is_empty());
}

#[test]
fn test_quiet_sustained_speech_uses_fallback() {
    let mut d = detector();
    let events = detect(&mut d, &[0.03; 15]);
    assert_eq!(sources(&events), vec![(9, ActivationSource::FallbackVad)]);
}

#[test]
fn test_speech_wavering_across_voice_threshold_uses_fallback() {
    let config = DetectorConfig::default();
    let cooldown = config.cooldown;
    let mut d = WakeDetector::from_config(config).unwrap();

    let levels: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.05 } else { 0.03 }).collect();
    let events = detect(&mut d, &levels);

    assert!(!events.is_empty());
    assert_eq!(events[0].0, 9);
    assert!(events.iter().all(|(_, e)| e.source == ActivationSource::FallbackVad));
    for pair in events.windows(2) {
        assert!(pair[1].1.timestamp - pair[0].1.timestamp >= cooldown);
    }
}

#[test]
fn test_fallback_disabled() {
    let config = DetectorConfig {
        fallback_enabled: false,
        ..Default::default()
    };
    let mut d = WakeDetector::from_config(config).unwrap();
    assert!(detect(&mut d, &[0.03; 40]).is_empty());
}

#[test]
fn test_silence_never_activates() {
    let mut d = detector();
    assert!(detect(&mut d, &[0.0; 500]).is_empty());
    assert!(detect(&mut d, &[0.01; 500]).is_empty());
}

#[test]
fn test_second_pair_inside_cooldown_suppressed() {
    let mut d = detector();
    // Pair at frames 0/3, second pair starting ~0.45s after the first activation
    let mut levels = vec![0.3, 0.0, 0.0, 0.3];
    levels.extend([0.0; 7]);
    levels.extend([0.3, 0.0, 0.0, 0.3]);
    levels.extend([0.0; 5]);

    let events = detect(&mut d, &levels);
    assert_eq!(sources(&events), vec![(4, ActivationSource::Clap)]);
}

#[test]
fn test_second_pair_after_cooldown_activates() {
    let mut d = detector();
    let mut levels = vec![0.3, 0.0, 0.0, 0.3];
    levels.extend([0.0; 56]);
    levels.extend([0.3, 0.0, 0.0, 0.3, 0.0]);

    let events = detect(&mut d, &levels);
    assert_eq!(
        sources(&events),
        vec![(4, ActivationSource::Clap), (64, ActivationSource::Clap)]
    );
}

#[test]
fn test_activations_respect_cooldown_spacing() {
    let config = DetectorConfig::default();
    let cooldown = config.cooldown;
    let mut d = WakeDetector::from_config(config).unwrap();

    // Claps, loud speech, quiet speech and silence, repeated
    let mut block = vec![0.3, 0.0, 0.3, 0.0];
    block.extend([0.05; 25]);
    block.extend([0.0; 3]);
    block.extend([0.03; 12]);
    block.extend([0.0; 6]);
    let levels: Vec<f32> = block.iter().copied().cycle().take(block.len() * 40).collect();

    let events = detect(&mut d, &levels);
    assert!(events.len() > 10);
    for pair in events.windows(2) {
        let gap = pair[1].1.timestamp - pair[0].1.timestamp;
        assert!(gap >= cooldown, "activations {gap:?} apart");
    }
}

#[test]
fn test_priority_order_is_configurable() {
    // Frame 19 completes a voice phrase and ends the second clap at once
    let mut energies: Vec<FrameEnergy> = (0..20u32)
        .map(|i| FrameEnergy {
            rms: 0.05,
            peak: 0.05,
            timestamp: FRAME * i,
        })
        .collect();
    energies[15].peak = 0.3;
    energies[18].peak = 0.3;

    let run = |config: DetectorConfig| {
        let mut d = WakeDetector::from_config(config).unwrap();
        energies
            .iter()
            .filter_map(|e| d.process_energy(e))
            .map(|e| e.source)
            .collect::<Vec<_>>()
    };

    assert_eq!(run(DetectorConfig::default()), vec![ActivationSource::Clap]);

    let voice_first = DetectorConfig {
        priority: vec![ActivationSource::VoicePhrase, ActivationSource::Clap],
        ..Default::default()
    };
    assert_eq!(run(voice_first), vec![ActivationSource::VoicePhrase]);
}

#[test]
fn test_source_missing_from_priority_never_activates() {
    let config = DetectorConfig {
        priority: vec![ActivationSource::Clap],
        ..Default::default()
    };
    let mut d = WakeDetector::from_config(config).unwrap();

    assert!(detect(&mut d, &[0.05; 60]).is_empty());
}

#[test]
fn test_wav_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("claps.wav");

    let clap = generate_sine_samples(1000.0, FRAME_SAMPLES, 0.6);
    let mut samples = clap.clone();
    samples.extend(generate_silence(FRAME_SAMPLES * 2));
    samples.extend(&clap);
    samples.extend(generate_silence(FRAME_SAMPLES * 10));
    std::fs::write(&path, samples_to_wav(&samples, SAMPLE_RATE).unwrap()).unwrap();

    let (rate, frames) = read_wav_frames(&path, FRAME_SAMPLES).unwrap();
    assert_eq!(rate, SAMPLE_RATE);
    assert_eq!(frames.len(), 14);

    let mut d = detector();
    let events: Vec<ActivationEvent> = frames.iter().filter_map(|f| d.process_frame(f)).collect();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, ActivationSource::Clap);
    assert_eq!(events[0].timestamp, FRAME * 4);
}

#[test]
fn test_activation_event_json() {
    let mut d = detector();
    let events = detect(&mut d, &[0.3, 0.0, 0.3, 0.0]);
    let json = serde_json::to_value(events[0].1).unwrap();

    assert_eq!(json["source"], "clap");
    assert!(json["detected_at"].is_string());
}
