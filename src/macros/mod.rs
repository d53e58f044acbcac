//! # cmacro macro system
//!
//! Purely syntactic rewriting of a token tree. Macros never see types or
//! values, only fragments, and expansion is a deterministic function of the
//! unit text and the macro table.
//!
//! ## Pipeline
//!
//! ```text
//! loader ──► registry ──► expander ─┬─► matcher ──► binding
//!                                   └─► template ──► hygiene
//! ```
//!
//! - [`loader`] reads `macro` and `cmacro_import` forms and checks every
//!   definition before anything runs.
//! - [`registry`] holds the [`MacroTable`] and resolves imports.
//! - [`expander`] drives expansion to a fixpoint.
//! - [`matcher`] matches one case pattern and produces a [`Binding`].
//! - [`template`] instantiates `template`/`toplevel` forms.
//! - [`hygiene`] generates fresh identifiers.
//!
//! ## Definition language
//!
//! ```text
//! macro lambda {
//!   case {
//!     match    { $(args) -> $(ret) $(body) }
//!     template { $(@getsym lambda 0) }
//!     toplevel { $(ret) $(@gensym lambda) $(args) $(body) }
//!   }
//! }
//! ```
//!
//! Pattern variables are `$(name)` or `$(name kind)`; see [`CaptureKind`] for
//! the kinds. Template operators are `@gensym`, `@getsym`, `@conc` and
//! `@splice`.
//!
//! ## Known limitation
//!
//! Matching is leftmost-greedy without backtracking. A `rest` capture may
//! only end a sequence, and an untagged capture never gives fragments back to
//! later pattern elements.

pub mod binding;
pub mod expander;
pub mod hygiene;
pub mod loader;
pub mod matcher;
pub mod registry;
pub mod template;
pub mod types;

pub use binding::{Binding, Bound};
pub use expander::{DriverState, ExpansionDriver};
pub use hygiene::{GensymAllocator, GensymScope};
pub use loader::{read_unit, Import, SourceUnit};
pub use matcher::{match_exact, match_prefix, MatchFailure};
pub use registry::{ImportResolver, MacroTable};
pub use template::{instantiate, Instantiation};
pub use types::{
    CaptureKind, ConcOperand, ExpansionContext, MacroCase, MacroDefinition, MacroExpansionStep,
    OutputForm, PatternNode, PatternVar, TemplateNode,
};
