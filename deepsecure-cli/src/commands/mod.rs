//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

/// `image`, `video` and `audio`: run one detection request.
pub mod detect;
/// `status`: report classifier and decoder availability.
pub mod status;

use deepsecure_core::{CoreConfig, CoreConfigBuilder, DetectionEngine};

use crate::cli::Cli;
use crate::error::{CliErrorContext, CliResult};

/// Builds the engine configuration: environment first, then CLI flags.
pub fn build_config(cli: &Cli, max_frames: Option<u32>) -> CoreConfig {
    let mut builder = CoreConfigBuilder::from_config(CoreConfig::from_env());

    if let Some(dir) = &cli.checkpoint_dir {
        builder = builder.checkpoint_dir(dir.clone());
    }
    if cli.no_classifiers {
        builder = builder.enable_classifiers(false);
    }
    if let Some(frames) = max_frames {
        builder = builder.max_video_frames(frames as usize);
    }

    builder.build()
}

/// Constructs the detection engine for one invocation.
pub fn build_engine(config: CoreConfig) -> CliResult<DetectionEngine> {
    DetectionEngine::new(config).cli_context("Failed to initialize detection engine")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "deepsecure",
            "--checkpoint-dir",
            "/opt/weights",
            "--no-classifiers",
            "status",
        ]);
        let config = build_config(&cli, Some(3));
        assert_eq!(config.checkpoint_dir, PathBuf::from("/opt/weights"));
        assert!(!config.enable_classifiers);
        assert_eq!(config.max_video_frames, 3);
    }
}
