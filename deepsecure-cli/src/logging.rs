// ============================================================================
// deepsecure-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: Console and Optional File Logging
//
// Without --log-dir the CLI uses env_logger, so RUST_LOG works as usual:
// - RUST_LOG=info (default): Normal operation logs
// - RUST_LOG=debug: Detailed debugging information
// - RUST_LOG=trace: Per-frame and per-analyzer values
//
// With --log-dir, fern sends the same records to stderr and to a
// timestamped file in that directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::LevelFilter;

use crate::error::{CliErrorContext, CliResult};

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
///
/// # Example
/// ```
/// let name = format!("deepsecure_{}.log", deepsecure_cli::logging::get_timestamp());
/// assert!(name.starts_with("deepsecure_"));
/// ```
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Level used when RUST_LOG is not set.
pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Installs the global logger. Returns the log file path when one was created.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> CliResult<Option<PathBuf>> {
    let level = default_level(verbose);

    let Some(dir) = log_dir else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
            .format_timestamp_secs()
            .init();
        return Ok(None);
    };

    fs::create_dir_all(dir)
        .cli_with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let log_path = dir.join(format!("deepsecure_{}.log", get_timestamp()));
    let log_file = fern::log_file(&log_path)
        .cli_with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    // The file always records at debug or finer; the console follows --verbose.
    let file_level = level.max(LevelFilter::Debug);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(file_level)
        .chain(fern::Dispatch::new().level(level).chain(std::io::stderr()))
        .chain(fern::Dispatch::new().level(file_level).chain(log_file))
        .apply()
        .map_err(|e| deepsecure_core::CoreError::OperationFailed(format!("Failed to install logger: {e}")))?;

    log::debug!("Logging to {}", log_path.display());
    Ok(Some(log_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_shape() {
        let ts = get_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "_");
        assert!(ts.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_default_level_follows_verbose() {
        assert_eq!(default_level(true), LevelFilter::Debug);
        assert_eq!(default_level(false), LevelFilter::Warn);
    }
}
