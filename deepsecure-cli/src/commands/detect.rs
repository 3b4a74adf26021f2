// ============================================================================
// deepsecure-cli/src/commands/detect.rs
// ============================================================================
//
// DETECT COMMANDS: image, video and audio requests
//
// Builds an engine from the CLI flags, runs a single request and prints the
// result as a console summary or JSON.

use log::{debug, info};
use std::path::Path;
use std::time::Instant;

use crate::cli::{Cli, DetectArgs};
use crate::commands::{build_config, build_engine};
use crate::error::{CliErrorContext, CliResult};
use crate::output;

/// Media kind selected by the subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn name(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

/// Runs one detection request and prints the outcome.
pub fn run_detect(cli: &Cli, kind: MediaKind, args: &DetectArgs) -> CliResult<()> {
    let start = Instant::now();
    check_input(&args.path)?;

    let engine = build_engine(build_config(cli, args.max_frames))?;
    debug!("Running {} detection on {}", kind.name(), args.path.display());

    match kind {
        MediaKind::Image => {
            let result = engine
                .detect_image(&args.path)
                .cli_context("Image detection failed")?;
            emit(cli.json, &result, output::print_result)?;
        }
        MediaKind::Video => {
            let aggregate = engine
                .detect_video(&args.path)
                .cli_context("Video detection failed")?;
            emit(cli.json, &aggregate, output::print_video)?;
        }
        MediaKind::Audio => {
            let result = engine
                .detect_audio(&args.path)
                .cli_context("Audio detection failed")?;
            emit(cli.json, &result, output::print_result)?;
        }
    }

    info!(
        "{} analysis of {} finished in {:.2}s",
        kind.name(),
        args.path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn emit<T: serde::Serialize>(json: bool, value: &T, print_summary: fn(&T)) -> CliResult<()> {
    if json {
        println!("{}", output::to_json(value)?);
    } else {
        print_summary(value);
    }
    Ok(())
}

fn check_input(path: &Path) -> CliResult<()> {
    let metadata = std::fs::metadata(path)
        .cli_with_context(|| format!("Invalid input path '{}'", path.display()))?;
    if !metadata.is_file() {
        return Err(deepsecure_core::CoreError::OperationFailed(format!(
            "Input path '{}' is not a file",
            path.display()
        )));
    }
    Ok(())
}
