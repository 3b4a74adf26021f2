//! Model-free image analysis used when no classifier can score an image.
//!
//! Three pixel statistics are combined into a fake probability:
//!
//! - noise: variance of the 4-neighbour Laplacian, divided by 500
//! - compression: Canny edge density, multiplied by 10
//! - face consistency: intensity variance inside detected faces
//!
//! A failing signal is replaced by 0.5 and logged; the analysis itself
//! never fails.

mod face;

pub use face::{
    FaceDetector, FaceRegion, NEUTRAL_FACE_SCORE, NoFaceDetector, SkinToneFaceDetector,
    face_consistency,
};

use image::{DynamicImage, GrayImage};
use imageproc::edges::canny;
use imageproc::filter::laplacian_filter;

use crate::config::HEURISTIC_THRESHOLD;
use crate::error::{CoreResult, analyzer_degraded};
use crate::types::{AnalysisBreakdown, DetectionMethod, FusedResult};

pub const NOISE_WEIGHT: f64 = 0.4;
pub const COMPRESSION_WEIGHT: f64 = 0.3;
pub const FACE_WEIGHT: f64 = 0.3;

/// Neutral value substituted for a failed signal.
pub const DEGRADED_SCORE: f64 = 0.5;

const NOISE_VARIANCE_SCALE: f64 = 500.0;
const EDGE_DENSITY_SCALE: f64 = 10.0;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Sub-scores of the heuristic analysis, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicScores {
    pub noise: f64,
    pub compression: f64,
    pub face: f64,
}

impl HeuristicScores {
    pub fn combined(&self) -> f64 {
        (NOISE_WEIGHT * self.noise + COMPRESSION_WEIGHT * self.compression + FACE_WEIGHT * self.face)
            .min(1.0)
    }

    pub fn breakdown(&self) -> AnalysisBreakdown {
        [
            ("noise_analysis", self.noise),
            ("compression_artifacts", self.compression),
            ("face_consistency", self.face),
        ]
        .into_iter()
        .collect()
    }
}

/// Computes the three sub-scores for an image.
pub fn score_image(image: &DynamicImage, detector: &dyn FaceDetector) -> HeuristicScores {
    let gray = image.to_luma8();

    let noise = recover("noise_analysis", noise_score(&gray));
    let compression = recover("compression_artifacts", compression_score(&gray));
    let face = recover(
        "face_consistency",
        detector
            .detect(&image.to_rgb8())
            .map(|faces| face_consistency(&gray, &faces))
            .map_err(|e| analyzer_degraded("face_consistency", e)),
    );

    HeuristicScores { noise, compression, face }
}

/// Runs the heuristic analysis and packages it as a fallback result.
pub fn analyze(image: &DynamicImage, detector: &dyn FaceDetector) -> FusedResult {
    let scores = score_image(image, detector);
    let mut result = FusedResult::from_probability(
        scores.combined(),
        HEURISTIC_THRESHOLD,
        DetectionMethod::ComputerVisionFallback,
    );
    result.analysis = Some(scores.breakdown());
    log::debug!(
        "Heuristic scores: noise={:.3} compression={:.3} face={:.3} -> {:.3}",
        scores.noise,
        scores.compression,
        scores.face,
        result.fake_probability
    );
    result
}

/// Variance of the Laplacian response, scaled into [0, 1].
pub fn noise_score(gray: &GrayImage) -> CoreResult<f64> {
    ensure_non_empty("noise_analysis", gray)?;
    let response = laplacian_filter(gray);
    let n = response.pixels().len() as f64;
    let mean = response.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let variance = response
        .pixels()
        .map(|p| {
            let d = p[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Ok((variance / NOISE_VARIANCE_SCALE).min(1.0))
}

/// Fraction of Canny edge pixels, scaled into [0, 1].
pub fn compression_score(gray: &GrayImage) -> CoreResult<f64> {
    ensure_non_empty("compression_artifacts", gray)?;
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let total = edges.pixels().len() as f64;
    let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count() as f64;
    Ok((edge_pixels / total * EDGE_DENSITY_SCALE).min(1.0))
}

fn ensure_non_empty(analyzer: &str, gray: &GrayImage) -> CoreResult<()> {
    if gray.width() == 0 || gray.height() == 0 {
        return Err(analyzer_degraded(analyzer, "image has no pixels"));
    }
    Ok(())
}

fn recover(analyzer: &str, score: CoreResult<f64>) -> f64 {
    score.unwrap_or_else(|e| {
        log::warn!("{analyzer}: {e}; using {DEGRADED_SCORE}");
        DEGRADED_SCORE
    })
}
