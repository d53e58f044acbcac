//! Core data types of the macro system.
//!
//! This module has no dependencies on other macro modules; everything else is
//! built on top of it.
//!
//! ## Ownership
//!
//! - Definitions own their patterns and templates; the table shares them
//!   through `Arc` so per-unit tables are cheap to derive.
//! - Template literals never carry spans (see [`Fragment::without_spans`]).

use serde::{Deserialize, Serialize};

use crate::syntax::{AtomKind, Delimiter, Fragment, Span};

/// What a pattern variable is allowed to capture.
///
/// `Any` is the untagged, expression-like capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureKind {
    Any,
    Ident,
    Int,
    Float,
    Num,
    Str,
    Const,
    Op,
    List,
    Array,
    Block,
    Group,
    Rest,
}

impl CaptureKind {
    /// Parses the qualifier written after a variable name, as in `$(body block)`.
    pub fn from_qualifier(qualifier: &str) -> Option<Self> {
        Some(match qualifier {
            "ident" => CaptureKind::Ident,
            "int" => CaptureKind::Int,
            "float" => CaptureKind::Float,
            "num" => CaptureKind::Num,
            "string" => CaptureKind::Str,
            "const" => CaptureKind::Const,
            "op" => CaptureKind::Op,
            "list" => CaptureKind::List,
            "array" => CaptureKind::Array,
            "block" => CaptureKind::Block,
            "group" => CaptureKind::Group,
            "rest" => CaptureKind::Rest,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CaptureKind::Any => "any fragment",
            CaptureKind::Ident => "ident",
            CaptureKind::Int => "int",
            CaptureKind::Float => "float",
            CaptureKind::Num => "num",
            CaptureKind::Str => "string",
            CaptureKind::Const => "const",
            CaptureKind::Op => "op",
            CaptureKind::List => "list",
            CaptureKind::Array => "array",
            CaptureKind::Block => "block",
            CaptureKind::Group => "group",
            CaptureKind::Rest => "rest",
        }
    }

    /// Whether a single fragment has this kind. `Any` and `Rest` accept
    /// everything.
    pub fn accepts(self, fragment: &Fragment) -> bool {
        let atom_kind = fragment.as_atom().map(|a| a.kind);
        match self {
            CaptureKind::Any | CaptureKind::Rest => true,
            CaptureKind::Ident => atom_kind == Some(AtomKind::Ident),
            CaptureKind::Op => atom_kind == Some(AtomKind::Punct),
            CaptureKind::Num => atom_kind == Some(AtomKind::Number),
            CaptureKind::Int => fragment
                .as_atom()
                .is_some_and(|a| a.kind == AtomKind::Number && is_integer_literal(&a.text)),
            CaptureKind::Float => fragment
                .as_atom()
                .is_some_and(|a| a.kind == AtomKind::Number && !is_integer_literal(&a.text)),
            CaptureKind::Str => matches!(fragment, Fragment::Str(_)),
            CaptureKind::Const => {
                matches!(fragment, Fragment::Str(_))
                    || matches!(atom_kind, Some(AtomKind::Number | AtomKind::Char))
            }
            CaptureKind::List => fragment.is_group_of(Delimiter::Paren),
            CaptureKind::Array => fragment.is_group_of(Delimiter::Bracket),
            CaptureKind::Block => fragment.is_group_of(Delimiter::Brace),
            CaptureKind::Group => matches!(fragment, Fragment::Group(_)),
        }
    }

    /// Kinds that only ever accept a delimited group.
    pub fn requires_group(self) -> bool {
        matches!(
            self,
            CaptureKind::List | CaptureKind::Array | CaptureKind::Block | CaptureKind::Group
        )
    }
}

fn is_integer_literal(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    if lower.starts_with("0x") {
        return true;
    }
    !lower.contains('.') && !lower.contains('e') && !lower.ends_with('f')
}

/// A `$(name kind)` placeholder in a `match` pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternVar {
    pub name: String,
    pub kind: CaptureKind,
    pub span: Option<Span>,
}

/// One element of a `match` pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternNode {
    /// An atom or string literal the input must repeat exactly.
    Literal(Fragment),
    /// A delimited group whose content must match completely.
    Group(Delimiter, Vec<PatternNode>),
    Var(PatternVar),
}

impl PatternNode {
    /// True when this node can only be satisfied by a delimited group.
    pub fn requires_group(&self) -> bool {
        match self {
            PatternNode::Group(..) => true,
            PatternNode::Var(v) => v.kind.requires_group(),
            PatternNode::Literal(_) => false,
        }
    }
}

/// An operand of `@conc`: a bound variable or literal text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConcOperand {
    Var(String),
    Text(String),
}

/// One element of a `template` or `toplevel` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateNode {
    Literal(Fragment),
    Group(Delimiter, Vec<TemplateNode>),
    Var { name: String, span: Option<Span> },
    /// `$(@gensym label)`
    Gensym { label: String },
    /// `$(@getsym label ordinal)`; the ordinal defaults to 0.
    Getsym { label: String, ordinal: usize },
    /// `$(@conc a b …)`
    Conc(Vec<ConcOperand>),
    /// `$(@splice name)`
    Splice { name: String, span: Option<Span> },
}

/// Which output form of a case is being instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputForm {
    Template,
    Toplevel,
}

/// Syntactic position of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpansionContext {
    /// The invocation starts a top-level declaration or statement.
    Toplevel,
    /// The invocation sits inside an expression, argument, or block.
    Nested,
}

/// One `case { match { … } template { … } toplevel { … } }` alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroCase {
    pub pattern: Vec<PatternNode>,
    pub template: Option<Vec<TemplateNode>>,
    pub toplevel: Option<Vec<TemplateNode>>,
    pub span: Option<Span>,
}

impl MacroCase {
    pub fn form(&self, form: OutputForm) -> Option<&[TemplateNode]> {
        match form {
            OutputForm::Template => self.template.as_deref(),
            OutputForm::Toplevel => self.toplevel.as_deref(),
        }
    }
}

/// A named macro: an ordered list of cases, first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub name: String,
    pub cases: Vec<MacroCase>,
    /// Name of the file the definition was read from.
    pub origin: String,
    pub span: Option<Span>,
}

/// A single macro expansion step, for traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroExpansionStep {
    /// The macro name invoked.
    pub macro_name: String,
    /// Index of the case that matched, starting at 0.
    pub case_index: usize,
    pub context: ExpansionContext,
    /// The invocation as written (head atom plus consumed arguments).
    pub input: String,
    /// What replaced the invocation.
    pub output: String,
    /// What was hoisted to the top level, if anything.
    pub hoisted: Option<String>,
    /// The whole unit after this step.
    pub snapshot: String,
}
