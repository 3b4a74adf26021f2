// deepsecure-cli/src/main.rs
//
// Entry point for the `deepsecure` binary: parses arguments, sets up
// logging, dispatches to the command implementations and maps failures to
// exit status 1.

use clap::Parser;
use console::style;
use deepsecure_cli::{Cli, Commands, MediaKind, logging, run_detect, run_status};
use std::process;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose, cli.log_dir.as_deref()) {
        eprintln!("{} {e}", style("Error:").red().bold());
        process::exit(1);
    }

    let result = match &cli.command {
        Commands::Image(args) => run_detect(&cli, MediaKind::Image, args),
        Commands::Video(args) => run_detect(&cli, MediaKind::Video, args),
        Commands::Audio(args) => run_detect(&cli, MediaKind::Audio, args),
        Commands::Status => run_status(&cli),
    };

    if let Err(e) = result {
        eprintln!("{} {e}", style("Error:").red().bold());
        process::exit(1);
    }
}
