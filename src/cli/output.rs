//! Handles all user-facing output for the CLI.
//!
//! Pretty-printing, colorizing, error reports and JSON all live here so every
//! subcommand presents results the same way. Writers are generic over
//! `WriteColor` so tests can capture output in a `termcolor::Buffer`.

use std::io::{self, Write};

use difference::{Changeset, Difference};
use miette::Report;
use serde::Serialize;
use termcolor::{Color, ColorChoice, ColorSpec, WriteColor};

use crate::errors::CmacroError;
use crate::macros::{ExpansionContext, MacroExpansionStep, MacroTable};

// ============================================================================
// CORE OUTPUT FUNCTIONS
// ============================================================================

/// Colors only when stdout is a terminal.
pub fn color_choice() -> ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// Prints a macro expansion trace with colored diffs.
///
/// `initial` is the unit before the first step; every step shows the
/// invocation, its replacement, and a line diff of the whole unit.
pub fn print_trace<W: WriteColor>(
    out: &mut W,
    initial: &str,
    trace: &[MacroExpansionStep],
) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "--- Input ---")?;
    out.reset()?;
    writeln!(out, "{}", initial.trim_end())?;
    writeln!(out)?;

    let mut last = initial.trim_end().to_string();
    for (i, step) in trace.iter().enumerate() {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
        let context = match step.context {
            ExpansionContext::Toplevel => "toplevel",
            ExpansionContext::Nested => "nested",
        };
        writeln!(
            out,
            "--- Step {}: {} (case {}, {}) ---",
            i + 1,
            step.macro_name,
            step.case_index + 1,
            context
        )?;
        out.reset()?;
        writeln!(out, "  {}", step.input)?;
        writeln!(out, "  => {}", step.output)?;
        if let Some(hoisted) = &step.hoisted {
            writeln!(out, "  hoisted: {}", hoisted)?;
        }

        let current = step.snapshot.trim_end().to_string();
        let changeset = Changeset::new(&last, &current, "\n");
        print_diff(out, &changeset.diffs)?;
        out.reset()?;
        writeln!(out)?;
        last = current;
    }
    Ok(())
}

pub fn trace_json(trace: &[MacroExpansionStep]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(trace)
}

/// One line of `list-macros` output.
#[derive(Debug, Serialize)]
pub struct MacroSummary<'a> {
    pub name: &'a str,
    pub cases: usize,
    /// `template` and/or `toplevel`, over all cases.
    pub forms: Vec<&'static str>,
    pub origin: &'a str,
}

pub fn summarize(table: &MacroTable) -> Vec<MacroSummary<'_>> {
    table
        .definitions()
        .into_iter()
        .map(|def| {
            let mut forms = Vec::new();
            if def.cases.iter().any(|c| c.template.is_some()) {
                forms.push("template");
            }
            if def.cases.iter().any(|c| c.toplevel.is_some()) {
                forms.push("toplevel");
            }
            MacroSummary {
                name: &def.name,
                cases: def.cases.len(),
                forms,
                origin: &def.origin,
            }
        })
        .collect()
}

pub fn print_macro_list<W: WriteColor>(out: &mut W, table: &MacroTable) -> io::Result<()> {
    for summary in summarize(table) {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
        write!(out, "{}", summary.name)?;
        out.reset()?;
        let plural = if summary.cases == 1 { "" } else { "s" };
        writeln!(
            out,
            "  {} case{}, {}  ({})",
            summary.cases,
            plural,
            if summary.forms.is_empty() {
                "no output".to_string()
            } else {
                summary.forms.join(" + ")
            },
            summary.origin
        )?;
    }
    Ok(())
}

/// Renders an error with its source excerpt on stderr.
pub fn report_error(error: CmacroError) {
    eprintln!("{:?}", Report::new(error));
}

/// Prints a green status line.
pub fn print_success<W: WriteColor>(out: &mut W, message: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    writeln!(out, "{message}")?;
    out.reset()
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn print_diff<W: WriteColor>(out: &mut W, diffs: &[Difference]) -> io::Result<()> {
    for diff in diffs {
        match diff {
            Difference::Same(x) => {
                out.reset()?;
                for line in x.lines() {
                    writeln!(out, " {}", line)?;
                }
            }
            Difference::Add(x) => {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                for line in x.lines() {
                    writeln!(out, "+{}", line)?;
                }
            }
            Difference::Rem(x) => {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
                for line in x.lines() {
                    writeln!(out, "-{}", line)?;
                }
            }
        }
    }
    Ok(())
}
