//! `status` command.

use crate::cli::Cli;
use crate::commands::{build_config, build_engine};
use crate::error::CliResult;
use crate::output;

pub fn run_status(cli: &Cli) -> CliResult<()> {
    let engine = build_engine(build_config(cli, None))?;
    let status = engine.get_status();

    if cli.json {
        println!("{}", output::to_json(&status)?);
    } else {
        output::print_status(&status);
    }
    Ok(())
}
