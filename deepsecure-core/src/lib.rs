//! Core library for detecting synthetic (deepfake) images, videos and audio.
//!
//! A [`DetectionEngine`] routes each request through the learned classifier
//! ensemble when it is available and through deterministic heuristic
//! analyzers otherwise. Classifier failures are absorbed by a fallback chain,
//! so a readable input always produces a verdict.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use deepsecure_core::{CoreConfig, DetectionEngine};
//! use std::path::{Path, PathBuf};
//!
//! let config = CoreConfig::new(PathBuf::from("checkpoints"));
//! let engine = DetectionEngine::new(config).unwrap();
//!
//! let result = engine.detect_image(Path::new("portrait.jpg")).unwrap();
//! println!("{} ({})", result.verdict(), result.detection_method);
//!
//! let video = engine.detect_video(Path::new("clip.mp4")).unwrap();
//! println!("{}/{} frames fake", video.fake_frame_count, video.total_frames_analyzed);
//! ```

pub mod audio;
pub mod capability;
pub mod classifiers;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod external;
pub mod heuristics;
pub mod media;
pub mod preprocessing;
pub mod status;
pub mod temp_files;
pub mod types;
pub mod video;

// Re-exports for public API
pub use audio::{AudioSource, SymphoniaSource, Waveform};
pub use capability::Capability;
pub use classifiers::{Architecture, Classifier, ClassifierOutput, ClassifierRegistry};
pub use config::{CoreConfig, CoreConfigBuilder, UntrainedWeightsPolicy};
pub use engine::DetectionEngine;
pub use ensemble::{EnsembleWeights, fuse};
pub use error::{CoreError, CoreResult};
pub use heuristics::{FaceDetector, FaceRegion, NoFaceDetector, SkinToneFaceDetector};
pub use preprocessing::{ImageTensor, preprocess};
pub use status::{ClassifierStatus, EngineStatus};
pub use types::{
    AnalysisBreakdown, DetectionMethod, FrameRecord, FusedResult, PredictionRecord, VideoAggregate,
};
pub use video::{FfmpegFrameSource, FrameSource, sample_indices};
