use deepsecure_core::video::IndexedFrame;
use deepsecure_core::{
    CoreConfigBuilder, CoreError, CoreResult, DetectionEngine, DetectionMethod, FrameSource,
    sample_indices,
};
use image::{Rgb, RgbImage};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// In-memory video: frame `i` is a flat image, or missing when listed in `undecodable`.
struct MemoryVideo {
    total: u64,
    undecodable: Vec<u64>,
    requested: Mutex<Vec<u64>>,
}

impl MemoryVideo {
    fn new(total: u64) -> Self {
        Self {
            total,
            undecodable: Vec::new(),
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl FrameSource for MemoryVideo {
    fn frame_count(&self, _path: &Path) -> CoreResult<u64> {
        Ok(self.total)
    }

    fn extract(&self, _path: &Path, indices: &[u64]) -> CoreResult<Vec<IndexedFrame>> {
        self.requested.lock().unwrap().extend_from_slice(indices);
        Ok(indices
            .iter()
            .filter(|i| !self.undecodable.contains(i))
            .map(|&i| (i, RgbImage::from_pixel(48, 48, Rgb([0, 0, 0]))))
            .collect())
    }
}

fn engine(scratch: &Path, source: Arc<MemoryVideo>, max_frames: usize) -> DetectionEngine {
    let config = CoreConfigBuilder::new()
        .checkpoint_dir(scratch.join("checkpoints"))
        .temp_dir(scratch.join("tmp"))
        .enable_classifiers(false)
        .max_video_frames(max_frames)
        .build();
    DetectionEngine::new(config).unwrap().with_frame_source(source)
}

#[test]
fn test_sampling_properties() {
    assert_eq!(sample_indices(5, 10), vec![0, 1, 2, 3, 4]);

    let long = sample_indices(100, 10);
    assert_eq!(long.len(), 10);
    assert!(long.contains(&0) && long.contains(&99));
}

#[test]
fn test_video_requests_sampled_frames_and_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MemoryVideo::new(250));
    let engine = engine(dir.path(), source.clone(), 10);

    let aggregate = engine.detect_video(Path::new("memory.mp4")).unwrap();

    assert_eq!(*source.requested.lock().unwrap(), sample_indices(250, 10));
    assert_eq!(aggregate.total_frames_analyzed, 10);
    assert_eq!(aggregate.real_frame_count, 10);
    assert!((aggregate.consistency_score - 1.0).abs() < 1e-12);
    assert!(!aggregate.is_fake);
    assert!(
        aggregate
            .frames
            .iter()
            .all(|f| f.detection_method == DetectionMethod::ComputerVisionFallback)
    );
    assert!(aggregate.frames.windows(2).all(|w| w[0].frame_index < w[1].frame_index));
}

#[test]
fn test_undecodable_frames_are_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut video = MemoryVideo::new(5);
    video.undecodable = vec![1, 3];
    let engine = engine(dir.path(), Arc::new(video), 10);

    let aggregate = engine.detect_video(Path::new("memory.mp4")).unwrap();
    let indices: Vec<u64> = aggregate.frames.iter().map(|f| f.frame_index).collect();
    assert_eq!(indices, vec![0, 2, 4]);
}

#[test]
fn test_empty_video_has_no_analyzable_frames() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), Arc::new(MemoryVideo::new(0)), 10);
    assert!(matches!(
        engine.detect_video(Path::new("empty.mp4")),
        Err(CoreError::NoAnalyzableFrames(_))
    ));
}

#[test]
fn test_scratch_directory_is_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), Arc::new(MemoryVideo::new(20)), 4);
    engine.detect_video(Path::new("memory.mp4")).unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("tmp")).unwrap().collect();
    assert!(leftovers.is_empty());
}
