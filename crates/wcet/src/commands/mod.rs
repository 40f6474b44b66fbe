//! Command implementations.
//!
//! Each submodule handles a specific CLI command.

mod analyze;
mod trace;

use crate::cli::{Cli, Commands};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Analyze { .. } => handle_analyze(cli),
        Commands::Trace { .. } => handle_trace(cli),
    }
}

fn handle_analyze(cli: &Cli) -> i32 {
    let Commands::Analyze { program, function } = &cli.command else {
        unreachable!("analyze command variant mismatch");
    };

    analyze::cmd_analyze(program, function.as_deref())
}

fn handle_trace(cli: &Cli) -> i32 {
    let Commands::Trace {
        program,
        traces,
        ipg,
    } = &cli.command
    else {
        unreachable!("trace command variant mismatch");
    };

    trace::cmd_trace(program, traces, *ipg)
}
