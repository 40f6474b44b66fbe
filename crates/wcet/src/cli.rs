//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "wcet")]
#[command(about = "WCET analysis toolkit - builds IPGs and super block graphs from program descriptions")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse a program description file
    Analyze {
        /// Input program description
        #[arg(value_name = "PROGRAM")]
        program: PathBuf,

        /// Function to report on (default: every function)
        #[arg(short, long)]
        function: Option<String>,
    },
    /// Replay timing traces against an analysed program
    Trace {
        /// Input program description
        #[arg(value_name = "PROGRAM")]
        program: PathBuf,

        /// Trace file to replay
        #[arg(value_name = "TRACES")]
        traces: PathBuf,

        /// Replay runs over the IPG instead of the super block graph
        #[arg(long)]
        ipg: bool,
    },
}
