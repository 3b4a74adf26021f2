// deepsecure-cli/src/cli.rs
//
// Defines the command-line argument structures using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "DeepSecure: Synthetic media detection",
    long_about = "Classifies images, videos and audio clips as authentic or synthetic using the deepsecure-core engine."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print results as JSON instead of a summary
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Optional: Directory for a timestamped log file
    #[arg(long, global = true, value_name = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Directory holding classifier weight files.
    /// Can also be set via the DEEPSECURE_CHECKPOINT_DIR environment variable.
    #[arg(long, global = true, value_name = "DIR", env = "DEEPSECURE_CHECKPOINT_DIR")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Skip the learned classifiers and use heuristic analysis only
    #[arg(long, global = true, default_value_t = false)]
    pub no_classifiers: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a still image
    Image(DetectArgs),
    /// Classify a video by sampling frames
    Video(DetectArgs),
    /// Score an audio clip with the heuristic analyzers
    Audio(DetectArgs),
    /// Show classifier and decoder availability
    Status,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Media file to analyze
    #[arg(required = true, value_name = "PATH")]
    pub path: PathBuf,

    /// Optional: Override the number of frames sampled from a video
    #[arg(long, value_name = "COUNT", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_frames: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_command() {
        let cli = Cli::parse_from(["deepsecure", "image", "face.jpg"]);
        match cli.command {
            Commands::Image(args) => {
                assert_eq!(args.path, PathBuf::from("face.jpg"));
                assert!(args.max_frames.is_none());
            }
            other => panic!("Expected Image command, got {other:?}"),
        }
        assert!(!cli.json);
        assert!(!cli.no_classifiers);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "deepsecure",
            "video",
            "clip.mp4",
            "--max-frames",
            "4",
            "--json",
            "--no-classifiers",
            "--log-dir",
            "logs",
        ]);
        assert!(cli.json);
        assert!(cli.no_classifiers);
        assert_eq!(cli.log_dir, Some(PathBuf::from("logs")));
        match cli.command {
            Commands::Video(args) => assert_eq!(args.max_frames, Some(4)),
            other => panic!("Expected Video command, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_max_frames_is_rejected() {
        let result = Cli::try_parse_from(["deepsecure", "video", "clip.mp4", "--max-frames", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_status_takes_no_path() {
        let cli = Cli::parse_from(["deepsecure", "status"]);
        assert!(matches!(cli.command, Commands::Status));
    }
}
