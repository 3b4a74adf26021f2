//! Configuration structures and constants for the deepsecure-core library.
//!
//! This module provides the configuration for the detection engine: where
//! classifier weights live, whether the learned backends may run, how the
//! ensemble is weighted, and how many video frames are sampled.

mod builder;
pub mod utils;

use crate::ensemble::EnsembleWeights;
use crate::error::{CoreError, CoreResult};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use builder::CoreConfigBuilder;

// Default constants

/// Directory holding `<name>_model.safetensors` weight files.
pub const DEFAULT_CHECKPOINT_DIR: &str = "checkpoints";

/// Maximum number of frames sampled from a video.
pub const DEFAULT_MAX_VIDEO_FRAMES: usize = 10;

/// Sample rate every audio clip is resampled to before analysis.
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 22_050;

/// Square input resolution shared by all classifiers.
pub const MODEL_INPUT_SIZE: u32 = 224;

/// Decision boundary for classifier-backed paths (strictly greater is fake).
pub const CLASSIFIER_THRESHOLD: f64 = 0.5;

/// Decision boundary for heuristic paths.
pub const HEURISTIC_THRESHOLD: f64 = 0.6;

/// What to do with a classifier whose weight file was missing and which is
/// therefore running on freshly initialized parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UntrainedWeightsPolicy {
    /// Keep the classifier in the registry and flag it as untrained.
    #[default]
    Use,
    /// Register the classifier as not loaded.
    Skip,
}

impl std::str::FromStr for UntrainedWeightsPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "use" => Ok(Self::Use),
            "skip" => Ok(Self::Skip),
            other => Err(CoreError::Config(format!(
                "unknown untrained weights policy '{other}' (expected 'use' or 'skip')"
            ))),
        }
    }
}

/// Main configuration structure for the deepsecure-core library.
///
/// Created once by the host process and handed to
/// [`DetectionEngine::new`](crate::DetectionEngine::new). All fields have
/// defaults, so hosts usually start from [`CoreConfig::default`] or
/// [`CoreConfig::from_env`] and override a few values.
///
/// # Examples
///
/// ```rust
/// use deepsecure_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = CoreConfigBuilder::new()
///     .checkpoint_dir(PathBuf::from("/var/lib/deepsecure/checkpoints"))
///     .max_video_frames(16)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory containing classifier weight files
    pub checkpoint_dir: PathBuf,

    /// Optional directory for per-frame temporary files (defaults to the system temp dir)
    pub temp_dir: Option<PathBuf>,

    /// Allow the learned classifier backends to run. When false the engine is
    /// heuristic-only regardless of what the capability probe finds.
    pub enable_classifiers: bool,

    /// Use a GPU device for the classifiers when one is available
    pub prefer_gpu: bool,

    /// Per-classifier weights for the ensemble
    pub ensemble_weights: EnsembleWeights,

    /// Maximum number of frames sampled per video
    pub max_video_frames: usize,

    /// Analyze sampled video frames in parallel
    pub parallel_frames: bool,

    /// Handling of classifiers without a trained weight file
    pub untrained_weights: UntrainedWeightsPolicy,

    /// Sample rate audio is resampled to before analysis
    pub audio_sample_rate: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            temp_dir: None,
            enable_classifiers: true,
            prefer_gpu: true,
            ensemble_weights: EnsembleWeights::default(),
            max_video_frames: DEFAULT_MAX_VIDEO_FRAMES,
            parallel_frames: true,
            untrained_weights: UntrainedWeightsPolicy::default(),
            audio_sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
        }
    }
}

impl CoreConfig {
    /// Creates a configuration with default values and the given checkpoint directory.
    pub fn new(checkpoint_dir: PathBuf) -> Self {
        Self {
            checkpoint_dir,
            ..Self::default()
        }
    }

    /// Creates a configuration from defaults overridden by `DEEPSECURE_*`
    /// environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `DEEPSECURE_CHECKPOINT_DIR` | `checkpoint_dir` |
    /// | `DEEPSECURE_TEMP_DIR` | `temp_dir` |
    /// | `DEEPSECURE_ENABLE_CLASSIFIERS` | `enable_classifiers` |
    /// | `DEEPSECURE_PREFER_GPU` | `prefer_gpu` |
    /// | `DEEPSECURE_ENSEMBLE_WEIGHTS` | `ensemble_weights` (`name=w,name=w`) |
    /// | `DEEPSECURE_MAX_FRAMES` | `max_video_frames` |
    /// | `DEEPSECURE_PARALLEL_FRAMES` | `parallel_frames` |
    /// | `DEEPSECURE_UNTRAINED_WEIGHTS` | `untrained_weights` (`use` / `skip`) |
    /// | `DEEPSECURE_AUDIO_SAMPLE_RATE` | `audio_sample_rate` |
    ///
    /// Unparseable values keep the default.
    pub fn from_env() -> Self {
        use utils::*;

        let defaults = Self::default();

        let temp_dir = std::env::var("DEEPSECURE_TEMP_DIR").ok().map(PathBuf::from);

        let ensemble_weights = match std::env::var("DEEPSECURE_ENSEMBLE_WEIGHTS") {
            Ok(raw) => match raw.parse::<EnsembleWeights>() {
                Ok(weights) => weights,
                Err(e) => {
                    log::warn!("Ignoring DEEPSECURE_ENSEMBLE_WEIGHTS: {e}");
                    defaults.ensemble_weights.clone()
                }
            },
            Err(_) => defaults.ensemble_weights.clone(),
        };

        let untrained_weights = match std::env::var("DEEPSECURE_UNTRAINED_WEIGHTS") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                log::warn!("Ignoring DEEPSECURE_UNTRAINED_WEIGHTS: {e}");
                defaults.untrained_weights
            }),
            Err(_) => defaults.untrained_weights,
        };

        Self {
            checkpoint_dir: get_env_path("DEEPSECURE_CHECKPOINT_DIR", defaults.checkpoint_dir),
            temp_dir,
            enable_classifiers: get_env_bool(
                "DEEPSECURE_ENABLE_CLASSIFIERS",
                defaults.enable_classifiers,
            ),
            prefer_gpu: get_env_bool("DEEPSECURE_PREFER_GPU", defaults.prefer_gpu),
            ensemble_weights,
            max_video_frames: get_env_usize("DEEPSECURE_MAX_FRAMES", defaults.max_video_frames),
            parallel_frames: get_env_bool("DEEPSECURE_PARALLEL_FRAMES", defaults.parallel_frames),
            untrained_weights,
            audio_sample_rate: get_env_u32(
                "DEEPSECURE_AUDIO_SAMPLE_RATE",
                defaults.audio_sample_rate,
            ),
        }
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_video_frames == 0 {
            return Err(CoreError::Config(
                "max_video_frames must be at least 1".to_string(),
            ));
        }

        if self.audio_sample_rate < 8_000 {
            return Err(CoreError::Config(format!(
                "audio_sample_rate {} is below the 8000 Hz minimum",
                self.audio_sample_rate
            )));
        }

        self.ensemble_weights.validate()
    }
}
