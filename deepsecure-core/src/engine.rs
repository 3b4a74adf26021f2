// ============================================================================
// deepsecure-core/src/engine.rs
// ============================================================================
//
// DETECTION ENGINE: Request Entry Points
//
// The engine is built once by the host and passed by reference. Everything
// it owns is read-only after construction, so requests can run concurrently.

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;

use crate::audio::{self, AudioSource, SymphoniaSource};
use crate::capability::Capability;
use crate::classifiers::ClassifierRegistry;
use crate::config::{CLASSIFIER_THRESHOLD, CoreConfig};
use crate::ensemble;
use crate::error::{CoreError, CoreResult};
use crate::external;
use crate::heuristics::{self, FaceDetector, SkinToneFaceDetector};
use crate::media;
use crate::preprocessing::preprocess;
use crate::status::EngineStatus;
use crate::types::{DetectionMethod, FusedResult, PredictionRecord, VideoAggregate};
use crate::video::{self, FfmpegFrameSource, FrameSource};

/// Detection engine over images, videos and audio clips.
pub struct DetectionEngine {
    config: CoreConfig,
    registry: ClassifierRegistry,
    face_detector: Arc<dyn FaceDetector>,
    frame_source: Arc<dyn FrameSource>,
    audio_source: Arc<dyn AudioSource>,
    video_decoder_available: bool,
}

impl DetectionEngine {
    /// Builds an engine: validates `config`, probes the classifier backend and
    /// loads the classifier catalog from the checkpoint directory.
    ///
    /// An unusable backend or failed classifier loads are logged, not
    /// returned; the engine then answers image requests heuristically.
    pub fn new(config: CoreConfig) -> CoreResult<Self> {
        config.validate()?;

        let capability = Capability::probe(&config);
        if let Some(reason) = capability.reason() {
            log::warn!("Classifier backend unavailable: {reason}");
        }

        let mut registry = ClassifierRegistry::new(capability, config.untrained_weights);
        if registry.capability().is_available() {
            if let Err(e) = registry.load_all(&config.checkpoint_dir) {
                log::error!(
                    "Failed to load classifiers from {}: {e}",
                    config.checkpoint_dir.display()
                );
            }
        }

        let video_decoder_available = external::video_tools_available();
        if !video_decoder_available {
            log::warn!("ffmpeg/ffprobe not found; video detection will fail");
        }

        Ok(Self {
            config,
            registry,
            face_detector: Arc::new(SkinToneFaceDetector::default()),
            frame_source: Arc::new(FfmpegFrameSource),
            audio_source: Arc::new(SymphoniaSource),
            video_decoder_available,
        })
    }

    /// Replaces the classifier registry.
    pub fn with_registry(mut self, registry: ClassifierRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = detector;
        self
    }

    pub fn with_frame_source(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.frame_source = source;
        self.video_decoder_available = true;
        self
    }

    pub fn with_audio_source(mut self, source: Arc<dyn AudioSource>) -> Self {
        self.audio_source = source;
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClassifierRegistry {
        &self.registry
    }

    /// Classifies a still image.
    ///
    /// Fallback chain: weighted ensemble, then the first classifier that
    /// produces a score, then the heuristic analyzer.
    pub fn detect_image(&self, path: &Path) -> CoreResult<FusedResult> {
        log::debug!("Image request: {}", path.display());
        let image = media::load_image(path)?;
        Ok(self.classify(&image))
    }

    /// Classifies a video by sampling frames through the image pipeline.
    pub fn detect_video(&self, path: &Path) -> CoreResult<VideoAggregate> {
        log::debug!("Video request: {}", path.display());
        let aggregate = video::analyze_video(path, self.frame_source.as_ref(), &self.config, |frame| {
            self.detect_image(frame)
        })?;
        log::info!(
            "{}: {}/{} frames fake",
            path.display(),
            aggregate.fake_frame_count,
            aggregate.total_frames_analyzed
        );
        Ok(aggregate)
    }

    /// Scores an audio clip with the heuristic battery.
    pub fn detect_audio(&self, path: &Path) -> CoreResult<FusedResult> {
        log::debug!("Audio request: {}", path.display());
        let wave = self.audio_source.load(path, self.config.audio_sample_rate)?;
        log::debug!("Audio duration {:.2}s", wave.duration_secs());
        Ok(audio::analyze_waveform(&wave))
    }

    pub fn get_status(&self) -> EngineStatus {
        EngineStatus::collect(&self.registry, self.video_decoder_available)
    }

    /// Ensemble, then single classifier, then heuristics.
    ///
    /// The single-model step only reruns classifiers whose first failure was
    /// transient (device or I/O errors). Deterministic failures go straight
    /// to the heuristic analysis, so no input pays for a second full pass.
    fn classify(&self, image: &DynamicImage) -> FusedResult {
        if !self.registry.has_loaded() {
            log::debug!("No classifiers loaded; using heuristic analysis");
            return heuristics::analyze(image, self.face_detector.as_ref());
        }

        let tensor = preprocess(image);
        let predictions = self.registry.predict_all(&tensor);
        let retryable: Vec<String> = predictions
            .iter()
            .filter(|p| p.retryable)
            .map(|p| p.source_name.clone())
            .collect();

        match ensemble::fuse(predictions, &self.config.ensemble_weights) {
            Ok(mut fused) => {
                fused.untrained_models = self.untrained_among(&fused.models_used);
                return fused;
            }
            Err(CoreError::NoValidPredictions) => {
                log::warn!("Ensemble produced no valid predictions");
            }
            Err(e) => log::warn!("Ensemble fusion failed: {e}"),
        }

        if retryable.is_empty() {
            log::warn!("No classifier failure is transient; using heuristic analysis");
            return heuristics::analyze(image, self.face_detector.as_ref());
        }

        log::debug!("Retrying after transient errors: {}", retryable.join(", "));
        let retry = self.registry.predict_named(&tensor, &retryable);
        match retry.iter().find(|p| p.is_valid()) {
            Some(first) => self.single_model_result(first, &retry),
            None => {
                log::warn!("All classifiers failed; using heuristic analysis");
                heuristics::analyze(image, self.face_detector.as_ref())
            }
        }
    }

    fn single_model_result(&self, chosen: &PredictionRecord, all: &[PredictionRecord]) -> FusedResult {
        let mut result = FusedResult::from_probability(
            chosen.fake_probability,
            CLASSIFIER_THRESHOLD,
            DetectionMethod::SingleModelFallback,
        );
        result.models_used = vec![chosen.source_name.clone()];
        result.contributing = all.to_vec();
        result.untrained_models = self.untrained_among(&result.models_used);
        result
    }

    fn untrained_among(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|n| self.registry.is_untrained(n))
            .cloned()
            .collect()
    }
}
