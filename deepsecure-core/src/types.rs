// ============================================================================
// deepsecure-core/src/types.rs
// ============================================================================
//
// RESULT TYPES: Structured Detection Results
//
// Records produced by the detection pipelines. Everything here is plain data
// and serializes to JSON for hosts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::CLASSIFIER_THRESHOLD;
use crate::error::CoreError;

/// Distance of a probability from the undecided point, as `max(p, 1 - p)`.
pub fn confidence(probability: f64) -> f64 {
    probability.max(1.0 - probability)
}

/// Strict comparison against a decision boundary.
pub fn exceeds(probability: f64, threshold: f64) -> bool {
    probability > threshold
}

/// How a result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Ensemble,
    SingleModelFallback,
    ComputerVisionFallback,
    AudioHeuristic,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionMethod::Ensemble => "ensemble",
            DetectionMethod::SingleModelFallback => "single_model_fallback",
            DetectionMethod::ComputerVisionFallback => "computer_vision_fallback",
            DetectionMethod::AudioHeuristic => "audio_heuristic",
        };
        f.write_str(name)
    }
}

/// One classifier's opinion on one input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub source_name: String,
    pub fake_probability: f64,
    /// Present for architectures that emit an explicit two-class softmax.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_probability: Option<f64>,
    pub is_fake: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The failure may clear if the classifier runs again.
    #[serde(skip)]
    pub retryable: bool,
}

impl PredictionRecord {
    /// A successful score. The probability is clamped into [0, 1]; a
    /// non-finite score is recorded as a failure.
    pub fn scored(source_name: impl Into<String>, fake_probability: f64) -> Self {
        if !fake_probability.is_finite() {
            return Self::failed(source_name, "non-finite score");
        }
        let p = fake_probability.clamp(0.0, 1.0);
        Self {
            source_name: source_name.into(),
            fake_probability: p,
            real_probability: None,
            is_fake: exceeds(p, CLASSIFIER_THRESHOLD),
            error: None,
            retryable: false,
        }
    }

    pub fn with_real_probability(mut self, real_probability: f64) -> Self {
        if real_probability.is_finite() {
            self.real_probability = Some(real_probability.clamp(0.0, 1.0));
        }
        self
    }

    /// A classifier that failed on this input.
    pub fn failed(source_name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            source_name: source_name.into(),
            fake_probability: 0.0,
            real_probability: None,
            is_fake: false,
            error: Some(error.to_string()),
            retryable: false,
        }
    }

    /// A classifier that returned `error` on this input.
    pub fn from_error(source_name: impl Into<String>, error: &CoreError) -> Self {
        Self {
            retryable: error.is_transient(),
            ..Self::failed(source_name, error)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.fake_probability.is_finite()
    }
}

/// Named sub-scores behind a heuristic decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnalysisBreakdown(BTreeMap<String, f64>);

impl AnalysisBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, score: f64) {
        self.0.insert(name.into(), score);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for AnalysisBreakdown {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Final decision for an image or audio request.
#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
    pub fake_probability: f64,
    pub is_fake: bool,
    pub confidence: f64,
    pub detection_method: DetectionMethod,
    /// Every classifier consulted, in registry order, including failures.
    pub contributing: Vec<PredictionRecord>,
    /// Classifiers whose scores entered the decision.
    pub models_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisBreakdown>,
    /// Contributing classifiers that ran on freshly initialized weights.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub untrained_models: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl FusedResult {
    /// Builds a result from a probability and a decision boundary.
    pub fn from_probability(
        fake_probability: f64,
        threshold: f64,
        detection_method: DetectionMethod,
    ) -> Self {
        let p = fake_probability.clamp(0.0, 1.0);
        Self {
            fake_probability: p,
            is_fake: exceeds(p, threshold),
            confidence: confidence(p),
            detection_method,
            contributing: Vec::new(),
            models_used: Vec::new(),
            analysis: None,
            untrained_models: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }

    /// Human-readable one-line summary, e.g. `The image is FAKE. Confidence: 0.873`.
    pub fn verdict(&self) -> String {
        let subject = match self.detection_method {
            DetectionMethod::AudioHeuristic => "audio",
            _ => "image",
        };
        format!(
            "The {} is {}. Confidence: {:.3}",
            subject,
            label(self.is_fake),
            self.confidence
        )
    }
}

/// Per-frame outcome inside a video request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    /// Index of the frame in the source video.
    pub frame_index: u64,
    pub fake_probability: f64,
    pub is_fake: bool,
    pub confidence: f64,
    pub detection_method: DetectionMethod,
}

impl FrameRecord {
    pub fn from_result(frame_index: u64, result: &FusedResult) -> Self {
        Self {
            frame_index,
            fake_probability: result.fake_probability,
            is_fake: result.is_fake,
            confidence: result.confidence,
            detection_method: result.detection_method,
        }
    }
}

/// Aggregate decision for a video request.
#[derive(Debug, Clone, Serialize)]
pub struct VideoAggregate {
    pub average_probability: f64,
    pub average_confidence: f64,
    pub is_fake: bool,
    pub fake_frame_count: usize,
    pub real_frame_count: usize,
    pub total_frames_analyzed: usize,
    /// Share of frames agreeing with the majority label.
    pub consistency_score: f64,
    pub frames: Vec<FrameRecord>,
    pub analyzed_at: DateTime<Utc>,
}

impl VideoAggregate {
    /// Aggregates scored frames. Returns `None` when there are none.
    pub fn from_frames(mut frames: Vec<FrameRecord>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        frames.sort_by_key(|f| f.frame_index);

        let total = frames.len();
        let n = total as f64;
        let average_probability = frames.iter().map(|f| f.fake_probability).sum::<f64>() / n;
        let average_confidence = frames.iter().map(|f| f.confidence).sum::<f64>() / n;
        let fake_frame_count = frames.iter().filter(|f| f.is_fake).count();
        let real_frame_count = total - fake_frame_count;

        Some(Self {
            average_probability,
            average_confidence,
            is_fake: exceeds(average_probability, CLASSIFIER_THRESHOLD),
            fake_frame_count,
            real_frame_count,
            total_frames_analyzed: total,
            consistency_score: fake_frame_count.max(real_frame_count) as f64 / n,
            frames,
            analyzed_at: Utc::now(),
        })
    }

    pub fn verdict(&self) -> String {
        format!(
            "The video is {}. Confidence: {:.3}",
            label(self.is_fake),
            self.average_confidence
        )
    }
}

fn label(is_fake: bool) -> &'static str {
    if is_fake { "FAKE" } else { "REAL" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, p: f64) -> FrameRecord {
        FrameRecord {
            frame_index: index,
            fake_probability: p,
            is_fake: p > 0.5,
            confidence: confidence(p),
            detection_method: DetectionMethod::Ensemble,
        }
    }

    #[test]
    fn test_confidence_is_symmetric() {
        assert!((confidence(0.2) - 0.8).abs() < 1e-12);
        assert!((confidence(0.8) - 0.8).abs() < 1e-12);
        assert_eq!(confidence(0.5), 0.5);
    }

    #[test]
    fn test_boundary_is_strict() {
        let at = PredictionRecord::scored("x", 0.5);
        let above = PredictionRecord::scored("x", 0.5000001);
        assert!(!at.is_fake);
        assert!(above.is_fake);
    }

    #[test]
    fn test_scored_clamps_out_of_range() {
        assert_eq!(PredictionRecord::scored("x", 1.7).fake_probability, 1.0);
        assert_eq!(PredictionRecord::scored("x", -0.2).fake_probability, 0.0);
    }

    #[test]
    fn test_non_finite_score_is_a_failure() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let record = PredictionRecord::scored("dfdc", value);
            assert!(!record.is_valid());
            assert_eq!(record.error.as_deref(), Some("non-finite score"));
        }
        let hand_built = PredictionRecord {
            fake_probability: f64::NAN,
            ..PredictionRecord::scored("dfdc", 0.3)
        };
        assert!(!hand_built.is_valid());
    }

    #[test]
    fn test_consistency_for_seven_fake_three_real() {
        let mut frames: Vec<_> = (0..7).map(|i| frame(i, 0.9)).collect();
        frames.extend((7..10).map(|i| frame(i, 0.1)));

        let aggregate = VideoAggregate::from_frames(frames).unwrap();
        assert_eq!(aggregate.fake_frame_count, 7);
        assert_eq!(aggregate.real_frame_count, 3);
        assert!((aggregate.consistency_score - 0.7).abs() < 1e-12);
        assert!(aggregate.is_fake);
        assert_eq!(aggregate.total_frames_analyzed, 10);
    }

    #[test]
    fn test_aggregate_orders_frames_by_index() {
        let aggregate =
            VideoAggregate::from_frames(vec![frame(40, 0.3), frame(0, 0.2), frame(12, 0.4)]).unwrap();
        let order: Vec<u64> = aggregate.frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(order, vec![0, 12, 40]);
        assert!(!aggregate.is_fake);
    }

    #[test]
    fn test_aggregate_of_nothing_is_none() {
        assert!(VideoAggregate::from_frames(Vec::new()).is_none());
    }

    #[test]
    fn test_verdict_format() {
        let result = FusedResult::from_probability(0.873, 0.5, DetectionMethod::Ensemble);
        assert_eq!(result.verdict(), "The image is FAKE. Confidence: 0.873");

        let audio = FusedResult::from_probability(0.2, 0.6, DetectionMethod::AudioHeuristic);
        assert_eq!(audio.verdict(), "The audio is REAL. Confidence: 0.800");
    }

    #[test]
    fn test_detection_method_serializes_snake_case() {
        let json = serde_json::to_string(&DetectionMethod::ComputerVisionFallback).unwrap();
        assert_eq!(json, "\"computer_vision_fallback\"");
    }
}
