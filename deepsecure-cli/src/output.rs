//! Console rendering of detection results.
//!
//! Each `render_*` function builds the text so it can be tested; the
//! `print_*` wrappers write it to stdout.

use console::style;
use deepsecure_core::{EngineStatus, FusedResult, VideoAggregate};
use serde::Serialize;
use std::fmt::Write as _;

use crate::error::CliResult;

/// Serializes `value` as pretty JSON.
pub fn to_json<T: Serialize>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        deepsecure_core::CoreError::OperationFailed(format!("Failed to serialize result: {e}"))
    })
}

fn verdict_label(is_fake: bool) -> String {
    if is_fake {
        style("FAKE").red().bold().to_string()
    } else {
        style("REAL").green().bold().to_string()
    }
}

fn line(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "  {:<22} {}", style(label).cyan(), value);
}

pub fn render_result(result: &FusedResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", result.verdict());
    line(&mut out, "Verdict", verdict_label(result.is_fake));
    line(&mut out, "Fake probability", format!("{:.4}", result.fake_probability));
    line(&mut out, "Method", result.detection_method);

    if !result.models_used.is_empty() {
        line(&mut out, "Models used", result.models_used.join(", "));
    }
    for record in result.contributing.iter().filter(|r| !r.is_valid()) {
        line(
            &mut out,
            &format!("{} failed", record.source_name),
            record.error.as_deref().unwrap_or("unknown error"),
        );
    }
    if !result.untrained_models.is_empty() {
        line(
            &mut out,
            "Untrained weights",
            style(result.untrained_models.join(", ")).yellow(),
        );
    }
    if let Some(analysis) = &result.analysis {
        for (name, score) in analysis.iter() {
            line(&mut out, name, format!("{score:.4}"));
        }
    }
    out
}

pub fn render_video(aggregate: &VideoAggregate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", aggregate.verdict());
    line(&mut out, "Verdict", verdict_label(aggregate.is_fake));
    line(&mut out, "Average probability", format!("{:.4}", aggregate.average_probability));
    line(&mut out, "Average confidence", format!("{:.4}", aggregate.average_confidence));
    line(
        &mut out,
        "Frames fake/real",
        format!("{}/{}", aggregate.fake_frame_count, aggregate.real_frame_count),
    );
    line(&mut out, "Consistency", format!("{:.3}", aggregate.consistency_score));
    for frame in &aggregate.frames {
        let _ = writeln!(
            out,
            "    frame {:>6}  p={:.4}  {}",
            frame.frame_index,
            frame.fake_probability,
            frame.detection_method
        );
    }
    out
}

pub fn render_status(status: &EngineStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("DeepSecure engine status").bold());
    line(
        &mut out,
        "Classifier backend",
        if status.capability_available {
            style("available").green().to_string()
        } else {
            style("unavailable").yellow().to_string()
        },
    );
    if let Some(reason) = &status.capability_reason {
        line(&mut out, "Reason", reason);
    }
    line(&mut out, "Device", &status.device);
    line(
        &mut out,
        "Loaded classifiers",
        format!("{}/{}", status.total_loaded, status.available_classifiers.len()),
    );
    for classifier in &status.classifiers {
        let state = match (&classifier.load_error, classifier.weights_initialized) {
            (Some(err), _) => style(format!("not loaded ({err})")).red().to_string(),
            (None, true) => style("loaded (untrained weights)").yellow().to_string(),
            (None, false) => style("loaded").green().to_string(),
        };
        let _ = writeln!(out, "    {:<16} {}", classifier.name, state);
    }
    line(
        &mut out,
        "Video decoder",
        if status.video_decoder_available {
            "ffmpeg/ffprobe found"
        } else {
            "ffmpeg/ffprobe missing"
        },
    );
    out
}

pub fn print_result(result: &FusedResult) {
    print!("{}", render_result(result));
}

pub fn print_video(aggregate: &VideoAggregate) {
    print!("{}", render_video(aggregate));
}

pub fn print_status(status: &EngineStatus) {
    print!("{}", render_status(status));
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepsecure_core::{AnalysisBreakdown, DetectionMethod, FrameRecord, PredictionRecord};

    #[test]
    fn test_render_heuristic_result_lists_sub_scores() {
        console::set_colors_enabled(false);
        let mut result = FusedResult::from_probability(0.15, 0.6, DetectionMethod::ComputerVisionFallback);
        result.analysis = Some(AnalysisBreakdown::from_iter([
            ("noise_analysis", 0.0),
            ("compression_artifacts", 0.0),
            ("face_consistency", 0.5),
        ]));
        let text = render_result(&result);
        assert!(text.starts_with("The image is REAL. Confidence: 0.850"));
        assert!(text.contains("computer_vision_fallback"));
        assert!(text.contains("face_consistency"));
    }

    #[test]
    fn test_render_reports_failed_and_untrained_models() {
        console::set_colors_enabled(false);
        let mut result = FusedResult::from_probability(0.7, 0.5, DetectionMethod::Ensemble);
        result.models_used = vec!["dfdc".into()];
        result.untrained_models = vec!["dfdc".into()];
        result.contributing = vec![
            PredictionRecord::scored("dfdc", 0.7),
            PredictionRecord::failed("celebdf", "bad shape"),
        ];
        let text = render_result(&result);
        assert!(text.contains("celebdf failed"));
        assert!(text.contains("bad shape"));
        assert!(text.contains("Untrained weights"));
    }

    #[test]
    fn test_render_video_lists_frames_in_order() {
        console::set_colors_enabled(false);
        let frames = [3, 0]
            .into_iter()
            .map(|i| {
                FrameRecord::from_result(
                    i,
                    &FusedResult::from_probability(0.9, 0.5, DetectionMethod::Ensemble),
                )
            })
            .collect();
        let aggregate = VideoAggregate::from_frames(frames).unwrap();
        let text = render_video(&aggregate);
        let first = text.find("frame      0").unwrap();
        let second = text.find("frame      3").unwrap();
        assert!(first < second);
        assert!(text.contains("2/0"));
    }

    #[test]
    fn test_json_output_uses_snake_case_methods() {
        let result = FusedResult::from_probability(0.2, 0.5, DetectionMethod::SingleModelFallback);
        let json = to_json(&result).unwrap();
        assert!(json.contains("\"single_model_fallback\""));
    }
}
