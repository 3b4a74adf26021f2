// deepsecure-cli/src/lib.rs
//
// Library portion of the DeepSecure CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

// Re-export items needed by the binary or integration tests
pub use cli::{Cli, Commands, DetectArgs};
pub use commands::detect::{MediaKind, run_detect};
pub use commands::status::run_status;
pub use error::{CliErrorContext, CliResult};
