//! Video detection by frame sampling.
//!
//! A video is reduced to at most `max_video_frames` evenly spaced frames.
//! Each frame goes through the image pipeline as a temporary JPEG and the
//! per-frame results are aggregated into a [`VideoAggregate`].

pub mod frames;

pub use frames::{FfmpegFrameSource, FrameSource, IndexedFrame};

use std::path::Path;

use image::{ImageFormat, RgbImage};
use rayon::prelude::*;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::temp_files;
use crate::types::{FrameRecord, FusedResult, VideoAggregate};

/// Evenly spaced frame indices over `[0, total - 1]`.
///
/// Takes `min(max_frames, total)` points, rounds each to the nearest frame
/// and drops duplicates. The result is ascending.
pub fn sample_indices(total: u64, max_frames: usize) -> Vec<u64> {
    let count = (max_frames as u64).min(total);
    if count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0];
    }

    let last = (total - 1) as f64;
    let step = last / (count - 1) as f64;
    let mut indices: Vec<u64> = (0..count)
        .map(|i| ((i as f64 * step).round() as u64).min(total - 1))
        .collect();
    indices.dedup();
    indices
}

/// Samples, scores and aggregates the frames of `path`.
///
/// `score_frame` receives the path of a temporary JPEG holding one frame.
/// Frames that fail to score are logged and left out of the aggregate.
pub fn analyze_video<F>(
    path: &Path,
    source: &dyn FrameSource,
    config: &CoreConfig,
    score_frame: F,
) -> CoreResult<VideoAggregate>
where
    F: Fn(&Path) -> CoreResult<FusedResult> + Sync,
{
    let total = source.frame_count(path)?;
    let indices = sample_indices(total, config.max_video_frames);
    log::debug!(
        "Sampling {} of {} frames from {}",
        indices.len(),
        total,
        path.display()
    );
    if indices.is_empty() {
        return Err(CoreError::NoAnalyzableFrames(path.to_path_buf()));
    }

    let frames = source.extract(path, &indices)?;
    if frames.is_empty() {
        return Err(CoreError::NoAnalyzableFrames(path.to_path_buf()));
    }

    let scratch = temp_files::create_temp_dir(config, "deepsecure_frames_")?;
    let score = |(index, image): &IndexedFrame| -> Option<FrameRecord> {
        match score_frame_image(scratch.path(), *index, image, &score_frame) {
            Ok(result) => {
                log::trace!("Frame {index}: p={:.4}", result.fake_probability);
                Some(FrameRecord::from_result(*index, &result))
            }
            Err(e) => {
                log::warn!("Skipping frame {index} of {}: {e}", path.display());
                None
            }
        }
    };

    let records: Vec<FrameRecord> = if config.parallel_frames {
        frames.par_iter().filter_map(score).collect()
    } else {
        frames.iter().filter_map(score).collect()
    };

    VideoAggregate::from_frames(records).ok_or_else(|| CoreError::NoAnalyzableFrames(path.to_path_buf()))
}

/// Writes one frame to a scoped JPEG and scores it. The file is removed when
/// this returns, whether or not scoring succeeded.
fn score_frame_image<F>(dir: &Path, index: u64, image: &RgbImage, score_frame: &F) -> CoreResult<FusedResult>
where
    F: Fn(&Path) -> CoreResult<FusedResult>,
{
    let frame_file = temp_files::create_temp_file(dir, &format!("frame_{index}"), "jpg")?;
    image
        .save_with_format(frame_file.path(), ImageFormat::Jpeg)
        .map_err(|e| CoreError::OperationFailed(format!("writing frame {index}: {e}")))?;
    score_frame(frame_file.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfigBuilder;
    use crate::types::DetectionMethod;
    use std::sync::Mutex;

    struct SyntheticFrames {
        total: u64,
        fail_extract: bool,
    }

    impl FrameSource for SyntheticFrames {
        fn frame_count(&self, _path: &Path) -> CoreResult<u64> {
            Ok(self.total)
        }

        fn extract(&self, _path: &Path, indices: &[u64]) -> CoreResult<Vec<IndexedFrame>> {
            if self.fail_extract {
                return Ok(Vec::new());
            }
            Ok(indices
                .iter()
                .map(|&i| (i, RgbImage::from_pixel(16, 16, image::Rgb([i as u8, 0, 0]))))
                .collect())
        }
    }

    fn config(scratch: &Path, parallel: bool) -> CoreConfig {
        CoreConfigBuilder::new()
            .temp_dir(scratch.to_path_buf())
            .parallel_frames(parallel)
            .build()
    }

    fn scored(p: f64) -> FusedResult {
        FusedResult::from_probability(p, 0.5, DetectionMethod::Ensemble)
    }

    #[test]
    fn test_sample_short_video_takes_every_frame() {
        assert_eq!(sample_indices(5, 10), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sample_long_video_spans_first_to_last() {
        let indices = sample_indices(100, 10);
        assert_eq!(indices.len(), 10);
        assert_eq!(indices.first(), Some(&0));
        assert_eq!(indices.last(), Some(&99));
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sample_degenerate_inputs() {
        assert!(sample_indices(0, 10).is_empty());
        assert!(sample_indices(50, 0).is_empty());
        assert_eq!(sample_indices(1, 10), vec![0]);
        assert_eq!(sample_indices(50, 1), vec![0]);
    }

    #[test]
    fn test_frames_are_ordered_and_aggregated() {
        let scratch = tempfile::tempdir().unwrap();
        let source = SyntheticFrames {
            total: 10,
            fail_extract: false,
        };
        let aggregate = analyze_video(
            Path::new("clip.mp4"),
            &source,
            &config(scratch.path(), true),
            |_| Ok(scored(0.8)),
        )
        .unwrap();

        assert_eq!(aggregate.total_frames_analyzed, 10);
        assert_eq!(aggregate.fake_frame_count, 10);
        assert!((aggregate.consistency_score - 1.0).abs() < 1e-12);
        let order: Vec<u64> = aggregate.frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_frames_are_skipped() {
        let scratch = tempfile::tempdir().unwrap();
        let source = SyntheticFrames {
            total: 4,
            fail_extract: false,
        };
        let calls = Mutex::new(0usize);
        let aggregate = analyze_video(
            Path::new("clip.mp4"),
            &source,
            &config(scratch.path(), false),
            |_| {
                let mut n = calls.lock().unwrap();
                *n += 1;
                if *n % 2 == 0 {
                    Err(CoreError::OperationFailed("boom".into()))
                } else {
                    Ok(scored(0.2))
                }
            },
        )
        .unwrap();
        assert_eq!(aggregate.total_frames_analyzed, 2);
        assert!(!aggregate.is_fake);
    }

    #[test]
    fn test_temporary_frames_are_cleaned_up() {
        let scratch = tempfile::tempdir().unwrap();
        let source = SyntheticFrames {
            total: 3,
            fail_extract: false,
        };
        let seen = Mutex::new(Vec::new());
        analyze_video(Path::new("clip.mp4"), &source, &config(scratch.path(), false), |p| {
            assert!(p.exists());
            assert_eq!(p.extension().unwrap(), "jpg");
            seen.lock().unwrap().push(p.to_path_buf());
            Ok(scored(0.4))
        })
        .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_no_frames_is_no_analyzable_frames() {
        let scratch = tempfile::tempdir().unwrap();
        let empty = SyntheticFrames {
            total: 0,
            fail_extract: false,
        };
        let result = analyze_video(Path::new("a.mp4"), &empty, &config(scratch.path(), false), |_| {
            Ok(scored(0.9))
        });
        assert!(matches!(result, Err(CoreError::NoAnalyzableFrames(_))));

        let broken = SyntheticFrames {
            total: 30,
            fail_extract: true,
        };
        let result = analyze_video(Path::new("b.mp4"), &broken, &config(scratch.path(), false), |_| {
            Ok(scored(0.9))
        });
        assert!(matches!(result, Err(CoreError::NoAnalyzableFrames(_))));
    }

    #[test]
    fn test_all_frames_failing_is_no_analyzable_frames() {
        let scratch = tempfile::tempdir().unwrap();
        let source = SyntheticFrames {
            total: 5,
            fail_extract: false,
        };
        let result = analyze_video(Path::new("c.mp4"), &source, &config(scratch.path(), true), |_| {
            Err(CoreError::OperationFailed("unreadable".into()))
        });
        assert!(matches!(result, Err(CoreError::NoAnalyzableFrames(_))));
    }
}
