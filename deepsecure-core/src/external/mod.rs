// ============================================================================
// deepsecure-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: ffmpeg and ffprobe
//
// Dependency checks and stream metadata queries for the external media
// tools used by the video pipeline. Frame extraction itself lives in
// video::frames behind the FrameSource trait.

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};

// ---- External crate imports ----
use ffprobe::{FfProbeError, ffprobe};

// ---- Standard library imports ----
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Checks if a required external command is available and executable.
///
/// Runs `<cmd_name> -version` and only looks at whether the process could be
/// started.
///
/// # Returns
///
/// * `Ok(())` - The command was found
/// * `Err(CoreError::DependencyNotFound)` - The command is not on the PATH
/// * `Err(CoreError::CommandStart)` - The command exists but failed to start
pub fn check_dependency(cmd_name: &str) -> CoreResult<()> {
    let result = Command::new(cmd_name)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {cmd_name}");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{cmd_name}' not found.");
            Err(CoreError::DependencyNotFound(cmd_name.to_string()))
        }
        Err(e) => {
            log::error!("Failed to start dependency check command '{cmd_name}': {e}");
            Err(CoreError::CommandStart(cmd_name.to_string(), e))
        }
    }
}

/// True when both ffmpeg and ffprobe can be started.
pub fn video_tools_available() -> bool {
    check_dependency("ffprobe").is_ok() && check_dependency("ffmpeg").is_ok()
}

/// Number of frames in the first video stream of `input_path`.
///
/// Uses the container's `nb_frames` when present, otherwise estimates from
/// duration and average frame rate.
pub fn get_frame_count(input_path: &Path) -> CoreResult<u64> {
    log::debug!("Running ffprobe for frame count on: {}", input_path.display());

    let metadata = ffprobe(input_path).map_err(|err| {
        log::warn!("ffprobe failed on {}: {err:?}", input_path.display());
        map_ffprobe_error(err, "frame count")
    })?;

    let stream = metadata
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            CoreError::FfprobeParse(format!("No video stream found in {}", input_path.display()))
        })?;

    if let Some(frames) = stream.nb_frames.as_deref().and_then(|f| f.parse::<u64>().ok()) {
        if frames > 0 {
            return Ok(frames);
        }
    }

    let duration = stream
        .duration
        .as_deref()
        .or(metadata.format.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    let fps = parse_frame_rate(&stream.avg_frame_rate).or_else(|| parse_frame_rate(&stream.r_frame_rate));

    match (duration, fps) {
        (Some(duration), Some(fps)) if duration > 0.0 => Ok((duration * fps).floor() as u64),
        _ => Err(CoreError::FfprobeParse(format!(
            "Cannot determine frame count for {}",
            input_path.display()
        ))),
    }
}

/// Parses an ffprobe rational such as `30000/1001`. Zero rates are rejected.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value > 0.0 && value.is_finite()).then_some(value)
}

fn map_ffprobe_error(err: FfProbeError, context: &str) -> CoreError {
    match err {
        FfProbeError::Io(io_err) => CoreError::CommandStart(format!("ffprobe ({context})"), io_err),
        FfProbeError::Status(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            CoreError::CommandFailed(format!("ffprobe ({context})"), output.status, stderr)
        }
        FfProbeError::Deserialize(err) => {
            CoreError::FfprobeParse(format!("ffprobe {context} output deserialization: {err}"))
        }
        _ => CoreError::FfprobeParse(format!("Unknown ffprobe error during {context}: {err:?}")),
    }
}
