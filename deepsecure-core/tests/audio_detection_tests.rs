use deepsecure_core::audio::ANALYZER_WEIGHTS;
use deepsecure_core::{CoreConfigBuilder, CoreError, DetectionEngine, DetectionMethod};
use std::path::Path;

fn write_tone(path: &Path, rate: u32, seconds: f32, freq: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let n = (rate as f32 * seconds) as usize;
    for i in 0..n {
        let t = i as f32 / rate as f32;
        // Tone with a slow vibrato so pitch tracking has something to follow.
        let f = freq * (1.0 + 0.02 * (2.0 * std::f32::consts::PI * 3.0 * t).sin());
        let v = (2.0 * std::f32::consts::PI * f * t).sin() * 0.5;
        writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn engine(scratch: &Path) -> DetectionEngine {
    let config = CoreConfigBuilder::new()
        .checkpoint_dir(scratch.join("checkpoints"))
        .enable_classifiers(false)
        .build();
    DetectionEngine::new(config).unwrap()
}

#[test]
fn test_wav_gets_full_heuristic_breakdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone(&path, 44_100, 2.0, 330.0);

    let result = engine(dir.path()).detect_audio(&path).unwrap();

    assert_eq!(result.detection_method, DetectionMethod::AudioHeuristic);
    assert!((0.0..=1.0).contains(&result.fake_probability));
    assert_eq!(result.is_fake, result.fake_probability > 0.6);
    assert!(result.verdict().starts_with("The audio is"));

    let analysis = result.analysis.unwrap();
    assert_eq!(analysis.len(), ANALYZER_WEIGHTS.len());
    let recombined: f64 = ANALYZER_WEIGHTS
        .iter()
        .map(|(name, w)| w * analysis.get(name).unwrap())
        .sum();
    assert!((recombined.min(1.0) - result.fake_probability).abs() < 1e-9);
}

#[test]
fn test_audio_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone(&path, 22_050, 1.0, 220.0);

    let engine = engine(dir.path());
    let a = engine.detect_audio(&path).unwrap();
    let b = engine.detect_audio(&path).unwrap();
    assert_eq!(a.fake_probability, b.fake_probability);
}

#[test]
fn test_missing_audio_is_media_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let result = engine(dir.path()).detect_audio(&dir.path().join("absent.wav"));
    assert!(matches!(result, Err(CoreError::MediaUnreadable { .. })));
}
