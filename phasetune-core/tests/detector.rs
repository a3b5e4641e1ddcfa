//! End-to-end tests driving the public API with synthetic signals.

use phasetune_core::hold::HOLD_FRAMES;
use phasetune_core::reeds::reed_config;
use phasetune_core::{
    DetectorConfig, NoteClusterer, NoteFilter, NoteHold, PitchDetector, PitchResult,
    ReedDetector, Temperament, TemperamentSetting, TunerError,
};
use std::f64::consts::PI;

/// One hop of a sum of sines, continuing from `frame`.
fn block(partials: &[(f64, f64)], config: &DetectorConfig, frame: usize) -> Vec<f32> {
    let step = config.step();
    let rate = config.sample_rate as f64;
    (frame * step..(frame + 1) * step)
        .map(|n| {
            let t = n as f64 / rate;
            partials
                .iter()
                .map(|&(f, a)| a * (2.0 * PI * f * t).sin())
                .sum::<f64>() as f32
        })
        .collect()
}

fn feed(detector: &mut PitchDetector, partials: &[(f64, f64)], frames: usize) -> PitchResult {
    let config = detector.config().clone();
    let mut result = PitchResult::default();
    for frame in 0..frames {
        result = detector.process_buffer(&block(partials, &config, frame));
    }
    result
}

#[test]
fn test_default_config_tracks_a_sine() {
    let mut detector = PitchDetector::new(DetectorConfig::default()).unwrap();
    let bin_width = detector.config().bin_width();
    let freq = 446.0; // 23.4 cents sharp of A4

    let result = feed(&mut detector, &[(freq, 0.5)], 20);

    assert!(result.valid);
    assert_eq!(result.note, 57);
    assert!((result.frequency - freq).abs() < bin_width, "{}", result.frequency);
    assert!((result.cents - 23.45).abs() < 5.0, "{}", result.cents);
    assert_eq!(result.reference_frequency, 440.0);
}

#[test]
fn test_integer_samples() {
    let config = DetectorConfig {
        fft_size: 4096,
        ..Default::default()
    };
    let mut detector = PitchDetector::new(config.clone()).unwrap();
    let mut result = PitchResult::default();
    for frame in 0..24 {
        let samples: Vec<i16> = block(&[(196.0, 0.5)], &config, frame)
            .into_iter()
            .map(|s| (s * 32767.0) as i16)
            .collect();
        result = detector.process_buffer(&samples);
    }
    assert!(result.valid);
    assert_eq!(result.label(0), "G3");
}

#[test]
fn test_hps_finds_harmonic_fundamental() {
    // An unrelated 97 Hz tone under a five-partial 440 Hz series
    let mut partials = vec![(97.0, 0.2)];
    partials.extend((1..=5).map(|k| (440.0 * k as f64, 0.2)));

    let mut plain = PitchDetector::new(DetectorConfig::default()).unwrap();
    let without = feed(&mut plain, &partials, 20);
    assert!(without.valid);
    assert_eq!(without.note, 31); // G2, the low tone
    assert!((without.frequency - 97.0).abs() < 1.0);

    let config = DetectorConfig {
        hps: true,
        ..Default::default()
    };
    let mut hps = PitchDetector::new(config).unwrap();
    let with = feed(&mut hps, &partials, 20);
    assert!(with.valid);
    assert_eq!(with.note, 57);
    assert!((with.frequency - 440.0).abs() < 1.0);
}

#[test]
fn test_hps_prefers_fundamental_over_octave() {
    // Fundamental and octave of comparable amplitude
    for (f, note) in [(110.0, 33), (220.0, 45), (440.0, 57)] {
        let config = DetectorConfig {
            hps: true,
            ..Default::default()
        };
        let mut detector = PitchDetector::new(config).unwrap();
        let result = feed(&mut detector, &[(f, 0.3), (2.0 * f, 0.3)], 20);
        assert!(result.valid, "{} Hz", f);
        assert_eq!(result.note, note, "{} Hz", f);
        assert!((result.frequency - f).abs() < 1.0, "{}", result.frequency);
    }
}

#[test]
fn test_pre_filter_still_tracks_a_sine() {
    let config = DetectorConfig {
        fft_size: 4096,
        pre_filter: true,
        ..Default::default()
    };
    let mut detector = PitchDetector::new(config).unwrap();
    let bin_width = detector.config().bin_width();
    let result = feed(&mut detector, &[(440.0, 0.5)], 24);

    assert!(result.valid);
    assert_eq!(result.note, 57);
    assert!((result.frequency - 440.0).abs() < bin_width);
}

#[test]
fn test_fundamental_filter_drops_other_pitch_classes() {
    // A3, E4 and A4
    let partials = [(220.0, 0.3), (330.0, 0.3), (440.0, 0.3)];
    let config = DetectorConfig {
        octave_limit: false,
        ..Default::default()
    };

    let mut open = PitchDetector::new(config.clone()).unwrap();
    feed(&mut open, &partials, 20);
    let open_notes: Vec<i32> = open.maxima().iter().map(|m| m.note).collect();
    assert_eq!(open_notes, vec![45, 52, 57]);

    let mut filtered = PitchDetector::new(config).unwrap();
    filtered.set_fundamental_filter(true);
    let result = feed(&mut filtered, &partials, 20);
    let notes: Vec<i32> = filtered.maxima().iter().map(|m| m.note).collect();
    assert_eq!(notes, vec![45, 57]);
    assert!(result.valid);
    assert_eq!(result.note, 45);
}

#[test]
fn test_note_filter_skips_disabled_notes() {
    let mut filters = NoteFilter::default();
    filters.notes[9] = false; // A
    let mut detector = PitchDetector::new(DetectorConfig::default()).unwrap();
    detector.set_note_filter(true, filters);

    let result = feed(&mut detector, &[(220.0, 0.3), (329.63, 0.3)], 20);

    assert!(result.valid);
    assert_eq!(result.note, 52); // E4
    assert!(!detector.maxima().is_empty());
    assert!(detector.maxima().iter().all(|m| m.note % 12 != 9));
}

#[test]
fn test_two_reeds_beat() {
    let config = reed_config(DetectorConfig {
        fft_size: 32768,
        ..Default::default()
    });
    let mut detector = PitchDetector::new(config).unwrap();
    let result = feed(&mut detector, &[(440.0, 0.3), (442.0, 0.3)], 20);

    let report = ReedDetector::default().analyze(&result, detector.maxima());
    assert!(report.valid);
    assert_eq!(report.name, "A");
    assert_eq!(report.octave, 4);
    assert_eq!(report.reed_count(), 2);
    assert!((report.reeds[0].frequency - 440.0).abs() < 0.1, "{:?}", report.reeds);
    assert!((report.reeds[1].cents - 7.85).abs() < 0.5, "{:?}", report.reeds);
    assert_eq!(report.beat_frequencies.len(), 1);
    assert!((report.beat_frequencies[0] - 2.0).abs() < 0.1, "{:?}", report.beat_frequencies);
}

#[test]
fn test_key_does_not_move_equal_temperament() {
    let mut results = Vec::new();
    for key in [0, 5, 11] {
        let config = DetectorConfig {
            fft_size: 4096,
            key,
            ..Default::default()
        };
        let mut detector = PitchDetector::new(config).unwrap();
        results.push(feed(&mut detector, &[(261.63, 0.5)], 24));
    }
    assert!(results.iter().all(|r| r.valid && r.note == 48));
    assert!(results.iter().all(|r| r.reference_frequency == results[0].reference_frequency));
    assert!(results.iter().all(|r| r.cents == results[0].cents));
}

#[test]
fn test_silence_clears_hold() {
    let config = DetectorConfig {
        fft_size: 4096,
        ..Default::default()
    };
    let mut detector = PitchDetector::new(config.clone()).unwrap();
    let mut hold = NoteHold::new();

    for frame in 0..24 {
        let result = detector.process_buffer(&block(&[(330.0, 0.5)], &config, frame));
        hold.update(&result);
    }
    assert!(hold.current().valid);

    // The old tone takes a full buffer to leave the window
    let silence = vec![0.0f32; config.step()];
    let mut cleared_after = None;
    for frame in 1..=64 {
        let result = detector.process_buffer(&silence);
        if !hold.update(&result).valid {
            cleared_after = Some(frame);
            break;
        }
    }
    let cleared_after = cleared_after.unwrap();
    assert!(cleared_after > HOLD_FRAMES as usize);
    assert!(!detector.result().valid);
}

#[test]
fn test_chord_is_clustered() {
    let config = DetectorConfig::default();
    let chord = [(220.0, 0.3), (277.18, 0.3), (329.63, 0.3)];
    let mut detector = PitchDetector::new(config.clone()).unwrap();
    let mut clusterer = NoteClusterer::new(config.max_peaks);

    for frame in 0..32 {
        detector.process_buffer(&block(&chord, &config, frame));
        if frame >= 16 {
            let report = detector.snapshot();
            clusterer.add_frame(&report.result, &report.maxima);
        }
    }

    let report = clusterer.finish(config.reference);
    let names: Vec<String> = report
        .notes
        .iter()
        .map(|n| format!("{}{}", n.name, n.octave))
        .collect();
    assert_eq!(names, vec!["A3", "C#4", "E4"]);
    assert_eq!(report.valid_frames, 16);
    assert!(report.notes.iter().all(|n| n.cents.abs() < 5.0));
}

#[test]
fn test_temperament_setting_from_json() {
    let config: DetectorConfig =
        serde_json::from_str(r#"{ "temperament": { "built_in": "werckmeister_iii" }, "key": 2 }"#)
            .unwrap();
    assert_eq!(
        config.temperament,
        TemperamentSetting::BuiltIn(Temperament::WerckmeisterIii)
    );
    assert!(PitchDetector::new(config).is_ok());
}

#[test]
fn test_invalid_configs_fail_at_construction() {
    let cases = [
        DetectorConfig { fft_size: 10000, ..Default::default() },
        DetectorConfig { oversample: 3, ..Default::default() },
        DetectorConfig { key: 12, ..Default::default() },
        DetectorConfig { reference: 20.0, ..Default::default() },
        DetectorConfig { min_amplitude: -0.5, ..Default::default() },
    ];
    for config in cases {
        let err = PitchDetector::new(config).unwrap_err();
        assert!(matches!(err, TunerError::InvalidInput(_) | TunerError::InvalidConfig(_)));
    }
}
