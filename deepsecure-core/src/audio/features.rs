//! Short-time spectral features for the audio analyzers.
//!
//! Everything is derived from one centered STFT (2048-point Hann window,
//! hop 512, reflection padding). Frequencies are in Hz and frame indices
//! count STFT hops.

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::error::{CoreError, CoreResult};

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const ROLLOFF_PERCENT: f64 = 0.85;
pub const N_MELS: usize = 128;
pub const N_MFCC: usize = 13;
pub const HPSS_KERNEL: usize = 31;
pub const PITCH_FMIN: f64 = 150.0;
pub const PITCH_FMAX: f64 = 4000.0;
pub const PITCH_THRESHOLD: f64 = 0.1;

const TOP_DB: f64 = 80.0;
const AMIN: f64 = 1e-10;
/// Minimum distance between beats, about 200 BPM at the default rate.
const MIN_BEAT_SPACING: usize = 7;

/// Magnitude spectrogram, one row per frame.
///
/// The mel spectrum and the harmonic ratio feed several analyzers, so they
/// are computed on first use and cached.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    frames: Vec<Vec<f64>>,
    sample_rate: u32,
    mel_db: OnceLock<Vec<Vec<f64>>>,
    harmonic_ratio: OnceLock<f64>,
}

impl Spectrogram {
    /// Centered STFT magnitudes of `samples`.
    pub fn compute(samples: &[f32], sample_rate: u32) -> CoreResult<Self> {
        let pad = N_FFT / 2;
        if samples.len() <= pad {
            return Err(CoreError::OperationFailed(format!(
                "clip of {} samples is shorter than one analysis window",
                samples.len()
            )));
        }

        let padded = reflect_pad(samples, pad);
        let window = hann_window(N_FFT);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(N_FFT);
        let n_frames = 1 + (padded.len() - N_FFT) / HOP_LENGTH;

        let mut buffer = vec![Complex::new(0.0, 0.0); N_FFT];
        let mut frames = Vec::with_capacity(n_frames);
        for t in 0..n_frames {
            let start = t * HOP_LENGTH;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] as f64 * window[i], 0.0);
            }
            fft.process(&mut buffer);
            frames.push(buffer[..=N_FFT / 2].iter().map(|c| c.norm()).collect());
        }

        Ok(Self {
            frames,
            sample_rate,
            mel_db: OnceLock::new(),
            harmonic_ratio: OnceLock::new(),
        })
    }

    pub fn n_bins(&self) -> usize {
        N_FFT / 2 + 1
    }

    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate as f64 / N_FFT as f64
    }

    /// Magnitude-weighted mean frequency per frame.
    pub fn centroid(&self) -> Vec<f64> {
        self.frames
            .iter()
            .map(|frame| {
                let total: f64 = frame.iter().sum();
                if total <= 0.0 {
                    return 0.0;
                }
                frame
                    .iter()
                    .enumerate()
                    .map(|(k, m)| m * self.bin_frequency(k))
                    .sum::<f64>()
                    / total
            })
            .collect()
    }

    /// Second-order spectral bandwidth per frame.
    pub fn bandwidth(&self) -> Vec<f64> {
        self.frames
            .iter()
            .zip(self.centroid())
            .map(|(frame, centroid)| {
                let total: f64 = frame.iter().sum();
                if total <= 0.0 {
                    return 0.0;
                }
                let spread: f64 = frame
                    .iter()
                    .enumerate()
                    .map(|(k, m)| m * (self.bin_frequency(k) - centroid).powi(2))
                    .sum();
                (spread / total).sqrt()
            })
            .collect()
    }

    /// Frequency below which `ROLLOFF_PERCENT` of each frame's magnitude lies.
    pub fn rolloff(&self) -> Vec<f64> {
        self.frames
            .iter()
            .map(|frame| {
                let threshold = ROLLOFF_PERCENT * frame.iter().sum::<f64>();
                let mut cumulative = 0.0;
                for (k, m) in frame.iter().enumerate() {
                    cumulative += m;
                    if cumulative >= threshold {
                        return self.bin_frequency(k);
                    }
                }
                self.bin_frequency(frame.len().saturating_sub(1))
            })
            .collect()
    }

    /// Log-power mel spectrogram in dB, one row per frame.
    pub fn mel_db(&self) -> &[Vec<f64>] {
        self.mel_db.get_or_init(|| self.compute_mel_db())
    }

    fn compute_mel_db(&self) -> Vec<Vec<f64>> {
        let filters = mel_filterbank(self.sample_rate, N_MELS);
        let mel: Vec<Vec<f64>> = self
            .frames
            .iter()
            .map(|frame| {
                filters
                    .iter()
                    .map(|filter| {
                        filter
                            .iter()
                            .zip(frame)
                            .map(|(w, m)| w * m * m)
                            .sum::<f64>()
                    })
                    .collect()
            })
            .collect();
        power_to_db(mel)
    }

    /// First `N_MFCC` cepstral coefficients per frame.
    pub fn mfcc(&self) -> Vec<Vec<f64>> {
        self.mel_db().iter().map(|row| dct_ortho(row, N_MFCC)).collect()
    }

    /// Share of spectral magnitude assigned to the harmonic component by
    /// median-filtering source separation with soft masks.
    pub fn harmonic_ratio(&self) -> f64 {
        *self.harmonic_ratio.get_or_init(|| self.compute_harmonic_ratio())
    }

    fn compute_harmonic_ratio(&self) -> f64 {
        let bins = self.n_bins();
        let n_frames = self.frames.len();

        let mut scratch = Vec::with_capacity(HPSS_KERNEL);
        let mut across_time = vec![0.0; bins];
        let mut harmonic_energy = 0.0;
        let mut total = 0.0;
        for t in 0..n_frames {
            for (k, slot) in across_time.iter_mut().enumerate() {
                *slot = median_window(&mut scratch, n_frames, t, |i| self.frames[i][k]);
            }
            for k in 0..bins {
                let h = across_time[k];
                let p = median_window(&mut scratch, bins, k, |i| self.frames[t][i]);
                let s = self.frames[t][k];
                harmonic_energy += s * soft_mask(h, p);
                total += s;
            }
        }
        harmonic_energy / (total + 1e-8)
    }

    /// Pitch of the strongest spectral peak in [150, 4000] Hz per frame, or
    /// `None` when no peak rises above the frame's magnitude threshold.
    pub fn pitch_track(&self) -> Vec<Option<f64>> {
        let lo = (PITCH_FMIN * N_FFT as f64 / self.sample_rate as f64).ceil() as usize;
        let hi = ((PITCH_FMAX * N_FFT as f64 / self.sample_rate as f64).floor() as usize)
            .min(self.n_bins() - 2);

        self.frames
            .iter()
            .map(|frame| {
                let peak = frame.iter().cloned().fold(0.0, f64::max);
                if peak <= 0.0 || lo.max(1) > hi {
                    return None;
                }
                let threshold = PITCH_THRESHOLD * peak;
                (lo.max(1)..=hi)
                    .filter(|&k| {
                        frame[k] > threshold && frame[k] > frame[k - 1] && frame[k] >= frame[k + 1]
                    })
                    .max_by(|&a, &b| frame[a].total_cmp(&frame[b]))
                    .map(|k| {
                        let (a, b, c) = (frame[k - 1], frame[k], frame[k + 1]);
                        let denom = a - 2.0 * b + c;
                        let shift = if denom.abs() > f64::EPSILON { 0.5 * (a - c) / denom } else { 0.0 };
                        self.bin_frequency(k) + shift * self.sample_rate as f64 / N_FFT as f64
                    })
            })
            .collect()
    }

    /// Mean positive change of the mel dB spectrum between adjacent frames.
    pub fn onset_strength(&self) -> Vec<f64> {
        let mel = self.mel_db();
        let mut envelope = vec![0.0; mel.len()];
        for t in 1..mel.len() {
            let flux: f64 = mel[t]
                .iter()
                .zip(&mel[t - 1])
                .map(|(cur, prev)| (cur - prev).max(0.0))
                .sum();
            envelope[t] = flux / N_MELS as f64;
        }
        envelope
    }

    /// Frame indices of onset-strength peaks taken as beats.
    pub fn beat_frames(&self) -> Vec<usize> {
        pick_peaks(&self.onset_strength(), MIN_BEAT_SPACING)
    }
}

/// Fraction of sign changes per centered frame of `N_FFT` samples.
pub fn zero_crossing_rate(samples: &[f32]) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let pad = N_FFT / 2;
    let first = samples[0];
    let last = samples[samples.len() - 1];
    let padded: Vec<f32> = std::iter::repeat_n(first, pad)
        .chain(samples.iter().copied())
        .chain(std::iter::repeat_n(last, pad))
        .collect();

    let n_frames = 1 + (padded.len() - N_FFT) / HOP_LENGTH;
    (0..n_frames)
        .map(|t| {
            let frame = &padded[t * HOP_LENGTH..t * HOP_LENGTH + N_FFT];
            let crossings = frame
                .windows(2)
                .filter(|w| w[0].is_sign_negative() != w[1].is_sign_negative())
                .count();
            crossings as f64 / N_FFT as f64
        })
        .collect()
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `max - min`, zero for an empty slice.
pub fn range(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    if values.is_empty() { 0.0 } else { max - min }
}

fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    let mut padded = Vec::with_capacity(n + 2 * pad);
    padded.extend((1..=pad).rev().map(|i| samples[i]));
    padded.extend_from_slice(samples);
    padded.extend((1..=pad).map(|i| samples[n - 1 - i]));
    padded
}

/// Periodic Hann window.
fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Slaney-style triangular mel filters with area normalization.
fn mel_filterbank(sample_rate: u32, n_mels: usize) -> Vec<Vec<f64>> {
    let n_bins = N_FFT / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / N_FFT as f64)
        .collect();
    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, center, upper) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let enorm = 2.0 / (upper - lower);
            fft_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - lower) / (center - lower);
                    let falling = (upper - f) / (upper - center);
                    rising.min(falling).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

fn power_to_db(power: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let db: Vec<Vec<f64>> = power
        .into_iter()
        .map(|row| row.into_iter().map(|p| 10.0 * p.max(AMIN).log10()).collect())
        .collect();
    let peak = db
        .iter()
        .flat_map(|row| row.iter().cloned())
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    db.into_iter()
        .map(|row| row.into_iter().map(|v| v.max(floor)).collect())
        .collect()
}

/// Orthonormal DCT-II, first `n_out` coefficients.
fn dct_ortho(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, x)| x * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// Median of `HPSS_KERNEL` values centered on `center`, shrunk at the edges.
/// `scratch` is reused between calls.
fn median_window(
    scratch: &mut Vec<f64>,
    len: usize,
    center: usize,
    value: impl Fn(usize) -> f64,
) -> f64 {
    let half = HPSS_KERNEL / 2;
    let start = center.saturating_sub(half);
    let end = (center + half + 1).min(len);
    scratch.clear();
    scratch.extend((start..end).map(value));
    let mid = scratch.len() / 2;
    *scratch.select_nth_unstable_by(mid, f64::total_cmp).1
}

/// Wiener-style soft mask for the harmonic component.
fn soft_mask(harmonic: f64, percussive: f64) -> f64 {
    let h2 = harmonic * harmonic;
    let p2 = percussive * percussive;
    if h2 + p2 <= f64::MIN_POSITIVE {
        0.5
    } else {
        h2 / (h2 + p2)
    }
}

/// Local maxima above `mean + std / 2`, at least `min_spacing` apart.
fn pick_peaks(envelope: &[f64], min_spacing: usize) -> Vec<usize> {
    if envelope.len() < 3 {
        return Vec::new();
    }
    let threshold = mean(envelope) + 0.5 * std_dev(envelope);
    let mut peaks: Vec<usize> = Vec::new();
    for t in 1..envelope.len() - 1 {
        let v = envelope[t];
        if v <= threshold || v <= envelope[t - 1] || v < envelope[t + 1] {
            continue;
        }
        match peaks.last() {
            Some(&last) if t - last < min_spacing => {
                if v > envelope[last] {
                    peaks.pop();
                    peaks.push(t);
                }
            }
            _ => peaks.push(t),
        }
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22_050;

    fn sine(freq: f64, seconds: f64) -> Vec<f32> {
        let n = (seconds * SR as f64) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / SR as f64).sin() as f32 * 0.5)
            .collect()
    }

    #[test]
    fn test_frame_count_matches_centered_stft() {
        let samples = sine(440.0, 1.0);
        let spec = Spectrogram::compute(&samples, SR).unwrap();
        assert_eq!(spec.frames.len(), 1 + samples.len() / HOP_LENGTH);
        assert_eq!(spec.frames[0].len(), 1025);
    }

    #[test]
    fn test_too_short_clip_is_rejected() {
        assert!(Spectrogram::compute(&[0.1; 100], SR).is_err());
        assert!(Spectrogram::compute(&[], SR).is_err());
    }

    #[test]
    fn test_sine_centroid_and_pitch() {
        let spec = Spectrogram::compute(&sine(440.0, 1.0), SR).unwrap();
        let mid = spec.frames.len() / 2;

        let centroid = spec.centroid()[mid];
        assert!((centroid - 440.0).abs() < 40.0, "centroid {centroid}");

        let pitches = spec.pitch_track();
        assert!(pitches.iter().flatten().count() > 10);
        let pitch = pitches[mid].unwrap();
        assert!((pitch - 440.0).abs() < 10.0, "pitch {pitch}");
    }

    #[test]
    fn test_pitch_outside_band_is_unvoiced() {
        let spec = Spectrogram::compute(&sine(80.0, 0.5), SR).unwrap();
        let mid = spec.frames.len() / 2;
        assert!(spec.pitch_track()[mid].is_none());
    }

    #[test]
    fn test_stationary_tone_is_harmonic() {
        let spec = Spectrogram::compute(&sine(660.0, 1.0), SR).unwrap();
        assert!(spec.harmonic_ratio() > 0.9);
    }

    #[test]
    fn test_median_window_matches_sorted_median() {
        let values = [9.0, 1.0, 7.0, 3.0, 5.0, 8.0, 2.0, 6.0, 4.0];
        let mut scratch = Vec::new();
        for center in 0..values.len() {
            let start = center.saturating_sub(HPSS_KERNEL / 2);
            let end = (center + HPSS_KERNEL / 2 + 1).min(values.len());
            let mut sorted = values[start..end].to_vec();
            sorted.sort_by(f64::total_cmp);
            let expected = sorted[sorted.len() / 2];
            assert_eq!(median_window(&mut scratch, values.len(), center, |i| values[i]), expected);
        }
    }

    #[test]
    fn test_derived_features_are_cached() {
        let spec = Spectrogram::compute(&sine(440.0, 0.5), SR).unwrap();
        let ratio = spec.harmonic_ratio();
        assert_eq!(spec.harmonic_ratio().to_bits(), ratio.to_bits());
        assert_eq!(ratio.to_bits(), spec.compute_harmonic_ratio().to_bits());

        let first = spec.mel_db().as_ptr();
        assert_eq!(spec.mel_db().as_ptr(), first);
        assert_eq!(spec.mel_db(), spec.compute_mel_db().as_slice());
    }

    #[test]
    fn test_mfcc_shape() {
        let spec = Spectrogram::compute(&sine(300.0, 0.5), SR).unwrap();
        let mfcc = spec.mfcc();
        assert_eq!(mfcc.len(), spec.frames.len());
        assert!(mfcc.iter().all(|row| row.len() == N_MFCC));
    }

    #[test]
    fn test_zero_crossing_rate_of_sine() {
        // 1000 Hz crosses zero 2000 times per second.
        let zcr = zero_crossing_rate(&sine(1000.0, 1.0));
        let middle = zcr[zcr.len() / 2];
        let expected = 2000.0 / SR as f64;
        assert!((middle - expected).abs() < 0.01, "zcr {middle}");
    }

    #[test]
    fn test_pick_peaks_respects_spacing() {
        let mut envelope = vec![0.0; 40];
        envelope[5] = 1.0;
        envelope[8] = 2.0;
        envelope[20] = 1.5;
        envelope[35] = 1.2;
        assert_eq!(pick_peaks(&envelope, MIN_BEAT_SPACING), vec![8, 20, 35]);
    }

    #[test]
    fn test_statistics() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean(&values), 2.5);
        assert_eq!(variance(&values), 1.25);
        assert_eq!(range(&values), 3.0);
        assert_eq!(range(&[]), 0.0);
    }

    #[test]
    fn test_mel_filters_cover_spectrum() {
        let filters = mel_filterbank(SR, N_MELS);
        assert_eq!(filters.len(), N_MELS);
        assert!(filters.iter().all(|f| f.iter().any(|w| *w > 0.0)));
    }
}
