// ============================================================================
// deepsecure-core/src/audio/loader.rs
// ============================================================================
//
// AUDIO LOADER: Decode to Mono PCM at the Analysis Rate
//
// Decodes any container/codec symphonia knows, downmixes to mono by channel
// averaging, and resamples with rubato so every analyzer sees the same rate.

use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{CoreError, CoreResult, media_unreadable};

/// Mono PCM clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples normalized to [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Produces a mono waveform at the requested rate from a media file.
pub trait AudioSource: Send + Sync {
    fn load(&self, path: &Path, target_rate: u32) -> CoreResult<Waveform>;
}

/// Decoder backed by symphonia and rubato.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaSource;

impl AudioSource for SymphoniaSource {
    fn load(&self, path: &Path, target_rate: u32) -> CoreResult<Waveform> {
        let (samples, native_rate) = decode_mono(path)?;
        log::debug!(
            "Decoded {} samples at {} Hz from {}",
            samples.len(),
            native_rate,
            path.display()
        );

        let samples = if native_rate != target_rate {
            resample(samples, native_rate, target_rate).map_err(|e| media_unreadable(path, e))?
        } else {
            samples
        };

        Ok(Waveform {
            samples,
            sample_rate: target_rate,
        })
    }
}

fn decode_mono(path: &Path) -> CoreResult<(Vec<f32>, u32)> {
    let file = File::open(path).map_err(|e| media_unreadable(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| media_unreadable(path, e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| media_unreadable(path, "no audio track"))?;
    let track_id = track.id;
    let native_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| media_unreadable(path, "sample rate not specified"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| media_unreadable(path, e))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(media_unreadable(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet in {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(media_unreadable(path, e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        mono.extend(
            buffer
                .samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if mono.is_empty() {
        return Err(media_unreadable(path, "no audio samples decoded"));
    }
    Ok((mono, native_rate))
}

/// Resamples a mono signal in one pass.
pub fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> CoreResult<Vec<f32>> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;
    let frames = samples.len();

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, 1)
        .map_err(|e| CoreError::OperationFailed(format!("resampler setup: {e}")))?;
    let output = resampler
        .process(&[samples], None)
        .map_err(|e| CoreError::OperationFailed(format!("resampling: {e}")))?;

    let resampled = output.into_iter().next().unwrap_or_default();
    log::debug!(
        "Resampled {} frames ({} Hz) to {} frames ({} Hz)",
        frames,
        from_rate,
        resampled.len(),
        to_rate
    );
    Ok(resampled)
}
