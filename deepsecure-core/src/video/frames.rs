// ============================================================================
// deepsecure-core/src/video/frames.rs
// ============================================================================
//
// FRAME SOURCES: Counting and Decoding Selected Video Frames
//
// The FrameSource trait keeps the sampling pipeline independent of ffmpeg so
// it can be tested with synthetic frames.

use std::path::Path;

use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use image::RgbImage;

use crate::error::{CoreError, CoreResult, media_unreadable};
use crate::external;

/// A decoded frame tagged with its index in the source video.
pub type IndexedFrame = (u64, RgbImage);

/// Reads frame counts and decodes frames at specific indices.
pub trait FrameSource: Send + Sync {
    /// Total frames in the video.
    fn frame_count(&self, path: &Path) -> CoreResult<u64>;

    /// Decodes the frames at `indices` (ascending, unique). Frames that cannot
    /// be decoded are simply absent from the result.
    fn extract(&self, path: &Path, indices: &[u64]) -> CoreResult<Vec<IndexedFrame>>;
}

/// Frame source backed by ffprobe and an ffmpeg `select` filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegFrameSource;

impl FrameSource for FfmpegFrameSource {
    fn frame_count(&self, path: &Path) -> CoreResult<u64> {
        external::get_frame_count(path).map_err(|e| media_unreadable(path, e))
    }

    fn extract(&self, path: &Path, indices: &[u64]) -> CoreResult<Vec<IndexedFrame>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner();
        cmd.input(path.to_string_lossy().into_owned());
        cmd.args(["-vf", &select_filter(indices), "-vsync", "0"]);
        cmd.rawvideo();

        let mut child = cmd
            .spawn()
            .map_err(|e| CoreError::CommandStart("ffmpeg".to_string(), e))?;

        let mut decoded = Vec::with_capacity(indices.len());
        let mut errors = Vec::new();
        let iter = child.iter().map_err(|e| {
            CoreError::CommandFailed(
                "ffmpeg".to_string(),
                std::process::ExitStatus::default(),
                e.to_string(),
            )
        })?;

        for event in iter {
            match event {
                FfmpegEvent::OutputFrame(frame) => {
                    decoded.push(RgbImage::from_raw(frame.width, frame.height, frame.data));
                }
                FfmpegEvent::Error(line) => errors.push(line),
                _ => {}
            }
        }

        let frames = tag_frames(path, indices, decoded);
        if frames.is_empty() && !errors.is_empty() {
            return Err(media_unreadable(path, errors.join("; ")));
        }

        log::debug!(
            "Extracted {} of {} requested frames from {}",
            frames.len(),
            indices.len(),
            path.display()
        );
        Ok(frames)
    }
}

/// Pairs the i-th ffmpeg output with the i-th requested index. A malformed
/// buffer keeps its slot so later frames stay aligned.
fn tag_frames(path: &Path, indices: &[u64], decoded: Vec<Option<RgbImage>>) -> Vec<IndexedFrame> {
    if decoded.len() != indices.len() {
        log::warn!(
            "ffmpeg returned {} of {} selected frames from {}; frame indices may be shifted",
            decoded.len(),
            indices.len(),
            path.display()
        );
    }

    indices
        .iter()
        .zip(decoded)
        .filter_map(|(&index, image)| {
            if image.is_none() {
                log::warn!("Frame {index} had an unexpected buffer size; skipping");
            }
            image.map(|image| (index, image))
        })
        .collect()
}

/// Builds `select='eq(n,a)+eq(n,b)+...'` for the given frame numbers.
pub fn select_filter(indices: &[u64]) -> String {
    let terms: Vec<String> = indices.iter().map(|i| format!("eq(n,{i})")).collect();
    format!("select='{}'", terms.join("+"))
}
