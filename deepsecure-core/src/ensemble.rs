//! Ensemble fusion of per-classifier scores.
//!
//! A linear opinion pool: the fused probability is the weighted mean of the
//! error-free predictions. Weights are looked up by classifier name, and
//! classifiers without an entry weigh 1.0.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::config::CLASSIFIER_THRESHOLD;
use crate::error::{CoreError, CoreResult};
use crate::types::{DetectionMethod, FusedResult, PredictionRecord};

/// Weight used for classifiers absent from the map.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Classifier name to non-negative fusion weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnsembleWeights(BTreeMap<String, f64>);

impl Default for EnsembleWeights {
    fn default() -> Self {
        [("faceforensics", 0.4), ("dfdc", 0.4), ("celebdf", 0.2)]
            .into_iter()
            .collect()
    }
}

impl EnsembleWeights {
    /// An empty map: every classifier weighs 1.0.
    pub fn uniform() -> Self {
        Self(BTreeMap::new())
    }

    pub fn weight_for(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn set(&mut self, name: impl Into<String>, weight: f64) {
        self.0.insert(name.into(), weight);
    }

    pub fn validate(&self) -> CoreResult<()> {
        for (name, weight) in &self.0 {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(CoreError::Config(format!(
                    "ensemble weight for '{name}' must be a non-negative number, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for EnsembleWeights {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Parses `name=weight` pairs separated by commas, e.g. `dfdc=0.5,celebdf=0.5`.
impl FromStr for EnsembleWeights {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let mut weights = Self::uniform();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                CoreError::Config(format!("expected name=weight, got '{pair}'"))
            })?;
            let value: f64 = value.trim().parse().map_err(|_| {
                CoreError::Config(format!("invalid weight '{}' for '{}'", value.trim(), name.trim()))
            })?;
            weights.set(name.trim(), value);
        }
        weights.validate()?;
        Ok(weights)
    }
}

/// Fuses per-classifier predictions into one decision.
///
/// Records carrying an error are dropped. If nothing remains the call fails
/// with [`CoreError::NoValidPredictions`]. The result is independent of the
/// order of `predictions`; `contributing` keeps the input order.
pub fn fuse(predictions: Vec<PredictionRecord>, weights: &EnsembleWeights) -> CoreResult<FusedResult> {
    let valid: Vec<&PredictionRecord> = predictions.iter().filter(|p| p.is_valid()).collect();
    if valid.is_empty() {
        return Err(CoreError::NoValidPredictions);
    }

    let weighted_sum: f64 = valid
        .iter()
        .map(|p| p.fake_probability * weights.weight_for(&p.source_name))
        .sum();
    let total_weight: f64 = valid.iter().map(|p| weights.weight_for(&p.source_name)).sum();

    let probability = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        log::debug!("All ensemble weights are zero; using the unweighted mean");
        valid.iter().map(|p| p.fake_probability).sum::<f64>() / valid.len() as f64
    };

    let models_used = valid.iter().map(|p| p.source_name.clone()).collect();

    let mut result =
        FusedResult::from_probability(probability, CLASSIFIER_THRESHOLD, DetectionMethod::Ensemble);
    result.models_used = models_used;
    result.contributing = predictions;
    Ok(result)
}
