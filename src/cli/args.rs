//! Command-line arguments and subcommands for the cmacro CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "cmacro",
    version,
    about = "A pattern-matching macro expander for C-like source files."
)]
pub struct CmacroArgs {
    /// Configuration file. Defaults to `./cmacro.yaml` when it exists.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log more (-v info, -vv debug, -vvv trace). Logs go to stderr.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expand a file, or every .c/.h file under a directory.
    Expand {
        /// The file or directory to expand.
        #[arg(required = true)]
        input: PathBuf,
        /// Where to write the result. For a directory input this is a
        /// directory that mirrors the input tree. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Definition files loaded before each unit.
        #[arg(short, long = "macros")]
        macros: Vec<PathBuf>,
        /// Override the expansion step ceiling.
        #[arg(long)]
        max_steps: Option<usize>,
        /// Normalize layout instead of keeping the original whitespace.
        #[arg(long)]
        plain: bool,
    },
    /// Show a stepwise macro expansion trace with diffs.
    Trace {
        /// The file to trace.
        #[arg(required = true)]
        file: PathBuf,
        /// Definition files loaded before the unit.
        #[arg(short, long = "macros")]
        macros: Vec<PathBuf>,
        /// Print the trace as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Load definition files and run the definition-time checks.
    Check {
        /// The files to check.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the macros defined by files and their imports.
    ListMacros {
        /// The files to read.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print the list as JSON.
        #[arg(long)]
        json: bool,
    },
}
