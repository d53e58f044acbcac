//! cmacro error handling.
//!
//! Every failure the engine can report is a variant of [`CmacroError`]. Variants
//! derive `miette::Diagnostic`, so the CLI can render them with the offending
//! source excerpt. Codes follow `cmacro::<phase>::<kind>`:
//!
//! | phase        | raised by                                             |
//! |--------------|-------------------------------------------------------|
//! | `parse`      | the tokenizer                                         |
//! | `definition` | the loader, before any expansion                      |
//! | `import`     | `cmacro_import` resolution                            |
//! | `expand`     | the expansion driver (call-site errors)               |
//! | `template`   | the instantiator (bugs in a macro definition)         |
//! | `config`/`io`| configuration and file access                         |
//!
//! Errors are fatal for the unit being expanded and nothing else; the shared
//! macro table is never touched after a failure.

use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::syntax::Span;

/// Shared, named source text attached to diagnostics.
pub type SourceArc = Arc<NamedSource<String>>;

pub type Result<T, E = CmacroError> = std::result::Result<T, E>;

/// Builds a [`SourceArc`] for `name` and `text`.
pub fn named_source(name: impl AsRef<str>, text: impl Into<String>) -> SourceArc {
    Arc::new(NamedSource::new(name.as_ref(), text.into()))
}

pub fn to_source_span(span: Span) -> SourceSpan {
    (span.start, span.len()).into()
}

/// Where in which source an error points.
#[derive(Debug, Clone)]
pub struct Site {
    pub src: SourceArc,
    pub span: Span,
}

impl Site {
    pub fn new(src: &SourceArc, span: Option<Span>) -> Self {
        Self {
            src: Arc::clone(src),
            span: span.unwrap_or_default(),
        }
    }

    pub fn source_span(&self) -> SourceSpan {
        to_source_span(self.span)
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum CmacroError {
    #[error("Parse error: {message}")]
    #[diagnostic(code(cmacro::parse::syntax))]
    Parse {
        message: String,
        #[source_code]
        src: SourceArc,
        #[label("here")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
    },

    #[error("Malformed definition of macro `{macro_name}`: {reason}")]
    #[diagnostic(code(cmacro::definition::malformed))]
    MalformedDefinition {
        macro_name: String,
        reason: String,
        #[source_code]
        src: SourceArc,
        #[label("in this definition")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
    },

    #[error("Case {case} of macro `{macro_name}` has no `match` section")]
    #[diagnostic(
        code(cmacro::definition::missing_match),
        help("every case needs `match {{ … }}`; `template` and `toplevel` are optional")
    )]
    MissingMatch {
        macro_name: String,
        case: usize,
        #[source_code]
        src: SourceArc,
        #[label("this case")]
        span: SourceSpan,
    },

    #[error("`rest` variable `{var}` in macro `{macro_name}` is not the last element of its sequence")]
    #[diagnostic(
        code(cmacro::definition::misplaced_rest),
        help("a `rest` capture swallows everything after it, so nothing may follow it")
    )]
    MisplacedRest {
        macro_name: String,
        var: String,
        #[source_code]
        src: SourceArc,
        #[label("declared here")]
        span: SourceSpan,
    },

    #[error("Variable `{var}` is bound more than once in case {case} of macro `{macro_name}`")]
    #[diagnostic(code(cmacro::definition::duplicate_variable))]
    DuplicateVariable {
        macro_name: String,
        case: usize,
        var: String,
        #[source_code]
        src: SourceArc,
        #[label("second binding")]
        span: SourceSpan,
    },

    #[error("Unknown capture kind `{kind}` for variable `{var}` in macro `{macro_name}`")]
    #[diagnostic(
        code(cmacro::definition::unknown_kind),
        help("known kinds: ident, int, float, num, string, const, op, list, array, block, group, rest")
    )]
    UnknownCaptureKind {
        macro_name: String,
        var: String,
        kind: String,
        #[source_code]
        src: SourceArc,
        #[label("unknown kind")]
        span: SourceSpan,
    },

    #[error("Case {case} of macro `{macro_name}` uses unbound variable `{var}`")]
    #[diagnostic(
        code(cmacro::template::unbound_variable),
        help("template variables must be declared in the case's `match` pattern")
    )]
    UnboundVariable {
        macro_name: String,
        case: usize,
        var: String,
        #[source_code]
        src: SourceArc,
        #[label("not bound by `match`")]
        span: SourceSpan,
    },

    #[error("Unknown template operator `@{operator}` in macro `{macro_name}`")]
    #[diagnostic(
        code(cmacro::definition::unknown_operator),
        help("known operators: @gensym, @getsym, @conc, @splice")
    )]
    UnknownOperator {
        macro_name: String,
        operator: String,
        #[source_code]
        src: SourceArc,
        #[label("unknown operator")]
        span: SourceSpan,
    },

    #[error("Macro `{name}` is defined more than once")]
    #[diagnostic(code(cmacro::definition::duplicate_macro))]
    DuplicateMacro {
        name: String,
        #[source_code]
        src: SourceArc,
        #[label("redefined here")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
    },

    #[error("Imported file `{path}` not found")]
    #[diagnostic(code(cmacro::import::not_found))]
    ImportNotFound {
        path: String,
        #[source_code]
        src: SourceArc,
        #[label("imported here")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
    },

    #[error("Import cycle: {chain}")]
    #[diagnostic(
        code(cmacro::import::cycle),
        help("definition files may not import each other in a loop")
    )]
    ImportCycle {
        chain: String,
        #[source_code]
        src: SourceArc,
        #[label("this import closes the cycle")]
        span: SourceSpan,
    },

    #[error("No case of macro `{macro_name}` matches this invocation")]
    #[diagnostic(code(cmacro::expand::no_matching_case))]
    NoMatchingCase {
        macro_name: String,
        #[source_code]
        src: SourceArc,
        #[label("invoked here")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
    },

    #[error("Macro expansion exceeded {limit} steps (last macro expanded: `{macro_name}`)")]
    #[diagnostic(
        code(cmacro::expand::depth_exceeded),
        help("a case probably re-invokes its own macro without making progress; raise `max_steps` if the input is just large")
    )]
    ExpansionDepthExceeded {
        limit: usize,
        macro_name: String,
        #[source_code]
        src: SourceArc,
        #[label("expansion started here")]
        span: SourceSpan,
    },

    #[error("`@getsym {label} {ordinal}` in case {case} of macro `{macro_name}` names a symbol that was never generated")]
    #[diagnostic(
        code(cmacro::template::unknown_gensym),
        help("`@getsym` only sees `@gensym` results of the same invocation")
    )]
    UnknownGensym {
        macro_name: String,
        label: String,
        ordinal: usize,
        case: usize,
        #[source_code]
        src: SourceArc,
        #[label("while expanding this invocation")]
        span: SourceSpan,
    },

    #[error("`@{operator}` in case {case} of macro `{macro_name}`: {reason}")]
    #[diagnostic(code(cmacro::template::invalid_operator))]
    InvalidOperator {
        macro_name: String,
        case: usize,
        operator: String,
        reason: String,
        #[source_code]
        src: SourceArc,
        #[label("while expanding this invocation")]
        span: SourceSpan,
    },

    #[error("Expansion of `{unit}` was cancelled")]
    #[diagnostic(code(cmacro::expand::cancelled))]
    Cancelled { unit: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(cmacro::config::invalid))]
    Config {
        message: String,
        #[source]
        source: Option<serde_yaml::Error>,
    },

    #[error("Cannot {operation} `{path}`")]
    #[diagnostic(code(cmacro::io::failed))]
    Io {
        operation: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CmacroError {
    /// True for errors that describe a broken macro definition rather than a
    /// bad call site or an environment problem.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            CmacroError::MalformedDefinition { .. }
                | CmacroError::MissingMatch { .. }
                | CmacroError::MisplacedRest { .. }
                | CmacroError::DuplicateVariable { .. }
                | CmacroError::UnknownCaptureKind { .. }
                | CmacroError::UnboundVariable { .. }
                | CmacroError::UnknownOperator { .. }
                | CmacroError::DuplicateMacro { .. }
        )
    }

    pub(crate) fn io(operation: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        CmacroError::Io {
            operation,
            path: path.display().to_string(),
            source,
        }
    }
}
