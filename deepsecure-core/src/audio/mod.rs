//! Heuristic audio analysis.
//!
//! Six analyzers each map one family of acoustic statistics into [0, 1]
//! and a fixed weighting fuses them. An analyzer that cannot run scores 0.5,
//! so a clip always gets a decision once it decodes.

pub mod features;
pub mod loader;

pub use loader::{AudioSource, SymphoniaSource, Waveform};

use crate::config::HEURISTIC_THRESHOLD;
use crate::error::{CoreResult, analyzer_degraded};
use crate::types::{AnalysisBreakdown, DetectionMethod, FusedResult};

use features::{Spectrogram, mean, range, std_dev, variance, zero_crossing_rate};

/// Score substituted for an analyzer that fails.
pub const DEGRADED_SCORE: f64 = 0.5;

/// Voiced frames needed before pitch statistics mean anything.
pub const MIN_VOICED_FRAMES: usize = 10;

/// Analyzer names and fusion weights, in reporting order.
pub const ANALYZER_WEIGHTS: [(&str, f64); 6] = [
    ("spectral", 0.25),
    ("temporal", 0.20),
    ("voice_quality", 0.20),
    ("prosodic", 0.15),
    ("cepstral", 0.10),
    ("harmonic", 0.10),
];

/// Runs all analyzers on `wave` and fuses them into a heuristic result.
pub fn analyze_waveform(wave: &Waveform) -> FusedResult {
    let spectrogram = Spectrogram::compute(&wave.samples, wave.sample_rate);

    let scores: Vec<(&str, CoreResult<f64>)> = vec![
        ("spectral", with_spectrogram("spectral", &spectrogram, spectral_score)),
        ("temporal", with_spectrogram("temporal", &spectrogram, |s| temporal_score(s, wave))),
        ("voice_quality", with_spectrogram("voice_quality", &spectrogram, voice_quality_score)),
        ("prosodic", with_spectrogram("prosodic", &spectrogram, prosodic_score)),
        ("cepstral", with_spectrogram("cepstral", &spectrogram, cepstral_score)),
        ("harmonic", with_spectrogram("harmonic", &spectrogram, harmonic_score)),
    ];

    fuse_scores(scores)
}

/// Weighted combination of analyzer scores; failures count as 0.5.
pub fn fuse_scores(scores: Vec<(&str, CoreResult<f64>)>) -> FusedResult {
    let mut breakdown = AnalysisBreakdown::new();
    let mut combined = 0.0;

    for (name, score) in scores {
        let value = match score {
            Ok(v) if v.is_finite() => v.clamp(0.0, 1.0),
            Ok(v) => {
                log::warn!("Audio analyzer '{name}' returned {v}; using {DEGRADED_SCORE}");
                DEGRADED_SCORE
            }
            Err(e) => {
                log::warn!("{e}; using {DEGRADED_SCORE}");
                DEGRADED_SCORE
            }
        };
        combined += weight_of(name) * value;
        breakdown.insert(name, value);
    }

    let mut result = FusedResult::from_probability(
        combined.min(1.0),
        HEURISTIC_THRESHOLD,
        DetectionMethod::AudioHeuristic,
    );
    result.analysis = Some(breakdown);
    result
}

fn weight_of(name: &str) -> f64 {
    ANALYZER_WEIGHTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

fn with_spectrogram(
    name: &str,
    spectrogram: &CoreResult<Spectrogram>,
    analyzer: impl FnOnce(&Spectrogram) -> CoreResult<f64>,
) -> CoreResult<f64> {
    match spectrogram {
        Ok(s) => analyzer(s).map_err(|e| analyzer_degraded(name, e)),
        Err(e) => Err(analyzer_degraded(name, e)),
    }
}

/// Mean of the centroid, bandwidth and rolloff variances, over 1e6.
pub fn spectral_score(spec: &Spectrogram) -> CoreResult<f64> {
    let combined =
        (variance(&spec.centroid()) + variance(&spec.bandwidth()) + variance(&spec.rolloff())) / 3.0;
    Ok((combined / 1e6).min(1.0))
}

/// Zero-crossing-rate variance plus beat-interval spread, over 100.
pub fn temporal_score(spec: &Spectrogram, wave: &Waveform) -> CoreResult<f64> {
    let zcr_variance = variance(&zero_crossing_rate(&wave.samples));
    let beats = spec.beat_frames();
    let beat_spread = if beats.len() > 1 {
        let intervals: Vec<f64> = beats.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
        std_dev(&intervals)
    } else {
        0.0
    };
    Ok(((zcr_variance + beat_spread) / 100.0).min(1.0))
}

/// Rolloff and bandwidth variance plus the non-harmonic share, over 1e4.
pub fn voice_quality_score(spec: &Spectrogram) -> CoreResult<f64> {
    let harmonic_ratio = spec.harmonic_ratio();
    let total = variance(&spec.rolloff()) + variance(&spec.bandwidth()) + (1.0 - harmonic_ratio);
    Ok((total / 1e4).min(1.0))
}

/// Pitch variance plus pitch range, over 1e4. Neutral when mostly unvoiced.
pub fn prosodic_score(spec: &Spectrogram) -> CoreResult<f64> {
    let f0: Vec<f64> = spec.pitch_track().into_iter().flatten().collect();
    if f0.len() < MIN_VOICED_FRAMES {
        return Ok(DEGRADED_SCORE);
    }
    Ok(((variance(&f0) + range(&f0)) / 1e4).min(1.0))
}

/// Spread of per-coefficient MFCC variances plus the range of MFCC means, over 100.
pub fn cepstral_score(spec: &Spectrogram) -> CoreResult<f64> {
    let mfcc = spec.mfcc();
    let n_coeffs = mfcc.first().map(Vec::len).unwrap_or(0);
    let columns: Vec<Vec<f64>> = (0..n_coeffs)
        .map(|c| mfcc.iter().map(|row| row[c]).collect())
        .collect();

    let coeff_variances: Vec<f64> = columns.iter().map(|c| variance(c)).collect();
    let coeff_means: Vec<f64> = columns.iter().map(|c| mean(c)).collect();
    Ok(((variance(&coeff_variances) + range(&coeff_means)) / 100.0).min(1.0))
}

/// Penalizes harmonic ratios near either extreme.
pub fn harmonic_score(spec: &Spectrogram) -> CoreResult<f64> {
    Ok(harmonic_ratio_score(spec.harmonic_ratio()))
}

pub fn harmonic_ratio_score(ratio: f64) -> f64 {
    if ratio > 0.9 || ratio < 0.1 {
        ((ratio - 0.5).abs() * 2.0).min(1.0)
    } else {
        0.3
    }
}
