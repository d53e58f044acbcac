//! The cmacro command-line interface.
//!
//! This module is the entry point for all CLI commands and orchestrates the
//! library: configuration, logging, the engine, and output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, process};

use clap::Parser;
use termcolor::StandardStream;
use tracing::Level;

use crate::cli::args::{CmacroArgs, Command};
use crate::config::ExpansionConfig;
use crate::engine::Engine;
use crate::errors::{CmacroError, Result};
use crate::macros::{read_unit, ImportResolver, MacroTable};
use crate::syntax::printer::render_plain;

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = CmacroArgs::parse();
    init_logging(args.verbose);

    let result = ExpansionConfig::discover(args.config.as_deref()).and_then(|config| {
        match args.command {
            Command::Expand {
                input,
                output,
                macros,
                max_steps,
                plain,
            } => {
                let mut config = config;
                if let Some(max_steps) = max_steps {
                    config.max_steps = max_steps;
                }
                if plain {
                    config.preserve_layout = false;
                }
                handle_expand(config, &input, output.as_deref(), &macros)
            }
            Command::Trace { file, macros, json } => handle_trace(config, &file, &macros, json),
            Command::Check { files } => handle_check(&config, &files),
            Command::ListMacros { files, json } => handle_list_macros(&config, &files, json),
        }
    });

    let success = match result {
        Ok(success) => success,
        Err(e) => {
            output::report_error(e);
            false
        }
    };
    if !success {
        let _ = std::io::stdout().flush();
        process::exit(1);
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    // A second initialization (e.g. when `run` is called from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ============================================================================
// SUBCOMMANDS
// ============================================================================

/// Handles `expand`. Returns `Ok(false)` when some file of a directory run
/// failed; those errors have already been reported.
fn handle_expand(
    config: ExpansionConfig,
    input: &Path,
    destination: Option<&Path>,
    macros: &[PathBuf],
) -> Result<bool> {
    let preserve_layout = config.preserve_layout;
    let engine = Engine::new(config).with_macro_files(macros)?;

    if !input.is_dir() {
        let unit = engine.expand_file(input)?;
        let text = unit.render(preserve_layout);
        match destination {
            Some(path) => write_file(path, &text)?,
            None => print!("{text}"),
        }
        return Ok(true);
    }

    let mut ok = true;
    for (path, result) in engine.expand_tree(input)? {
        let unit = match result {
            Ok(unit) => unit,
            Err(e) => {
                output::report_error(e);
                ok = false;
                continue;
            }
        };
        let text = unit.render(preserve_layout);
        match destination {
            Some(dir) => {
                let relative = path.strip_prefix(input).unwrap_or(&path);
                write_file(&dir.join(relative), &text)?;
            }
            None => print!("// ==> {} <==\n{text}", path.display()),
        }
    }
    Ok(ok)
}

fn handle_trace(config: ExpansionConfig, file: &Path, macros: &[PathBuf], json: bool) -> Result<bool> {
    let engine = Engine::new(config)
        .with_macro_files(macros)?
        .with_trace(true);
    let unit = engine.expand_file(file)?;

    if json {
        let text = output::trace_json(&unit.trace).map_err(|e| {
            CmacroError::io("serialize", file, std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        println!("{text}");
        return Ok(true);
    }

    // The trace diffs plain renderings, so the starting point is the unit's
    // program printed the same way.
    let text = fs::read_to_string(file).map_err(|e| CmacroError::io("read", file, e))?;
    let initial = render_plain(&read_unit(&unit.name, text)?.program);
    let mut stdout = StandardStream::stdout(output::color_choice());
    output::print_trace(&mut stdout, &initial, &unit.trace).map_err(|e| CmacroError::io("write", Path::new("<stdout>"), e))?;
    Ok(true)
}

fn handle_check(config: &ExpansionConfig, files: &[PathBuf]) -> Result<bool> {
    let mut stdout = StandardStream::stdout(output::color_choice());
    let mut ok = true;
    for file in files {
        match load_table(config, std::slice::from_ref(file)) {
            Ok(table) => {
                let message = format!("{}: {} macro(s) OK", file.display(), table.len());
                output::print_success(&mut stdout, &message)
                    .map_err(|e| CmacroError::io("write", Path::new("<stdout>"), e))?;
            }
            Err(e) => {
                output::report_error(e);
                ok = false;
            }
        }
    }
    Ok(ok)
}

fn handle_list_macros(config: &ExpansionConfig, files: &[PathBuf], json: bool) -> Result<bool> {
    let table = load_table(config, files)?;
    if json {
        let summaries = output::summarize(&table);
        let text = serde_json::to_string_pretty(&summaries).map_err(|e| {
            CmacroError::io("serialize", Path::new("<stdout>"), std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        println!("{text}");
        return Ok(true);
    }
    let mut stdout = StandardStream::stdout(output::color_choice());
    output::print_macro_list(&mut stdout, &table)
        .and_then(|_| stdout.flush())
        .map_err(|e| CmacroError::io("write", Path::new("<stdout>"), e))?;
    Ok(true)
}

/// Loads the definitions of `files` and their imports into one table.
fn load_table(config: &ExpansionConfig, files: &[PathBuf]) -> Result<MacroTable> {
    let mut table = MacroTable::new();
    let mut resolver = ImportResolver::new(&config.include_dirs);
    for file in files {
        resolver.load_file(file, &mut table)?;
    }
    Ok(table)
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CmacroError::io("create", parent, e))?;
    }
    fs::write(path, text).map_err(|e| CmacroError::io("write", path, e))
}
