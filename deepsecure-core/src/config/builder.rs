// ============================================================================
// deepsecure-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent construction of CoreConfig. Every field starts at its default, so
// callers only name what they change.

// ---- Standard library imports ----
use std::path::PathBuf;

// ---- Internal crate imports ----
use super::{CoreConfig, UntrainedWeightsPolicy};
use crate::ensemble::EnsembleWeights;

/// Builder for creating CoreConfig instances.
///
/// # Examples
///
/// ```rust
/// use deepsecure_core::config::{CoreConfigBuilder, UntrainedWeightsPolicy};
///
/// let config = CoreConfigBuilder::new()
///     .enable_classifiers(false)
///     .max_video_frames(4)
///     .untrained_weights(UntrainedWeightsPolicy::Skip)
///     .build();
/// assert!(!config.enable_classifiers);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// Creates a new builder starting from `CoreConfig::default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder seeded from an existing configuration.
    pub fn from_config(config: CoreConfig) -> Self {
        Self { config }
    }

    /// Sets the directory containing classifier weight files.
    pub fn checkpoint_dir(mut self, dir: PathBuf) -> Self {
        self.config.checkpoint_dir = dir;
        self
    }

    /// Sets the directory for temporary frame files.
    pub fn temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.temp_dir = Some(dir);
        self
    }

    /// Allows or forbids the learned classifier backends.
    pub fn enable_classifiers(mut self, enable: bool) -> Self {
        self.config.enable_classifiers = enable;
        self
    }

    /// Prefers a GPU device for the classifiers when one is present.
    pub fn prefer_gpu(mut self, prefer: bool) -> Self {
        self.config.prefer_gpu = prefer;
        self
    }

    /// Replaces the ensemble weight map.
    pub fn ensemble_weights(mut self, weights: EnsembleWeights) -> Self {
        self.config.ensemble_weights = weights;
        self
    }

    /// Sets the maximum number of frames sampled per video.
    pub fn max_video_frames(mut self, frames: usize) -> Self {
        self.config.max_video_frames = frames;
        self
    }

    /// Enables or disables parallel frame analysis.
    pub fn parallel_frames(mut self, parallel: bool) -> Self {
        self.config.parallel_frames = parallel;
        self
    }

    /// Sets how classifiers without trained weights are handled.
    pub fn untrained_weights(mut self, policy: UntrainedWeightsPolicy) -> Self {
        self.config.untrained_weights = policy;
        self
    }

    /// Sets the audio analysis sample rate.
    pub fn audio_sample_rate(mut self, rate: u32) -> Self {
        self.config.audio_sample_rate = rate;
        self
    }

    /// Builds the CoreConfig instance.
    pub fn build(self) -> CoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_only_named_fields() {
        let config = CoreConfigBuilder::new()
            .checkpoint_dir(PathBuf::from("/tmp/weights"))
            .parallel_frames(false)
            .build();

        assert_eq!(config.checkpoint_dir, PathBuf::from("/tmp/weights"));
        assert!(!config.parallel_frames);
        assert_eq!(config.max_video_frames, super::super::DEFAULT_MAX_VIDEO_FRAMES);
        assert!(config.enable_classifiers);
    }

    #[test]
    fn test_builder_from_config_keeps_values() {
        let base = CoreConfigBuilder::new().max_video_frames(3).build();
        let config = CoreConfigBuilder::from_config(base).prefer_gpu(false).build();
        assert_eq!(config.max_video_frames, 3);
        assert!(!config.prefer_gpu);
    }
}
