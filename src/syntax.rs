//! Token model for cmacro.
//!
//! Everything the expander touches is a [`Fragment`]: an atom, a delimited
//! group, or a string literal. Fragments remember where they came from
//! (`Option<Span>`, `None` for synthesized output) so the printer can keep the
//! original layout around untouched code. Equality is structural and ignores
//! spans.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod parser;
pub mod printer;

// ============================================================================
// SPANS
// ============================================================================

/// Byte range in the source a fragment was read from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

// ============================================================================
// FRAGMENTS
// ============================================================================

/// Lexical class of an atom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomKind {
    Ident,
    Number,
    Char,
    Punct,
    /// A whole preprocessor line, e.g. `#include <stdio.h>`.
    Directive,
}

/// Delimiter of a group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delimiter {
    Paren,
    Bracket,
    Brace,
}

impl Delimiter {
    pub fn open(self) -> char {
        match self {
            Delimiter::Paren => '(',
            Delimiter::Bracket => '[',
            Delimiter::Brace => '{',
        }
    }

    pub fn close(self) -> char {
        match self {
            Delimiter::Paren => ')',
            Delimiter::Bracket => ']',
            Delimiter::Brace => '}',
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub kind: AtomKind,
    pub text: String,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub delim: Delimiter,
    pub items: Vec<Fragment>,
    pub span: Option<Span>,
}

/// A string literal; `text` keeps the quotes and escapes exactly as written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrLit {
    pub text: String,
    pub span: Option<Span>,
}

/// One node of the token tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Fragment {
    Atom(Atom),
    Group(Group),
    Str(StrLit),
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.delim == other.delim && self.items == other.items
    }
}

impl PartialEq for StrLit {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Fragment::Atom(a), Fragment::Atom(b)) => a == b,
            (Fragment::Group(a), Fragment::Group(b)) => a == b,
            (Fragment::Str(a), Fragment::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Fragment {}

impl Fragment {
    /// A synthesized identifier atom.
    pub fn ident(text: impl Into<String>) -> Self {
        Fragment::Atom(Atom {
            kind: AtomKind::Ident,
            text: text.into(),
            span: None,
        })
    }

    /// A synthesized punctuation atom.
    pub fn punct(text: impl Into<String>) -> Self {
        Fragment::Atom(Atom {
            kind: AtomKind::Punct,
            text: text.into(),
            span: None,
        })
    }

    pub fn group(delim: Delimiter, items: Vec<Fragment>) -> Self {
        Fragment::Group(Group {
            delim,
            items,
            span: None,
        })
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Fragment::Atom(a) => a.span,
            Fragment::Group(g) => g.span,
            Fragment::Str(s) => s.span,
        }
    }

    /// The atom, if this fragment is one.
    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Fragment::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Fragment::Group(g) => Some(g),
            _ => None,
        }
    }

    /// True when this is an atom spelled exactly `text`.
    pub fn is_atom(&self, text: &str) -> bool {
        matches!(self, Fragment::Atom(a) if a.text == text)
    }

    /// Identifier text, if this fragment is an identifier atom.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Fragment::Atom(a) if a.kind == AtomKind::Ident => Some(&a.text),
            _ => None,
        }
    }

    pub fn is_group_of(&self, delim: Delimiter) -> bool {
        matches!(self, Fragment::Group(g) if g.delim == delim)
    }

    pub fn is_directive(&self) -> bool {
        matches!(self, Fragment::Atom(a) if a.kind == AtomKind::Directive)
    }

    /// Short human description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Fragment::Atom(a) => match a.kind {
                AtomKind::Ident => format!("identifier `{}`", a.text),
                AtomKind::Number => format!("number `{}`", a.text),
                AtomKind::Char => format!("character `{}`", a.text),
                AtomKind::Punct => format!("`{}`", a.text),
                AtomKind::Directive => "preprocessor line".to_string(),
            },
            Fragment::Group(g) => format!("`{} … {}` group", g.delim.open(), g.delim.close()),
            Fragment::Str(s) => format!("string {}", s.text),
        }
    }

    /// Copy of this fragment with every span removed, recursively.
    ///
    /// Template text comes from a different file than the program it is
    /// spliced into, so its spans must not leak into the output.
    pub fn without_spans(&self) -> Fragment {
        match self {
            Fragment::Atom(a) => Fragment::Atom(Atom {
                span: None,
                ..a.clone()
            }),
            Fragment::Group(g) => Fragment::Group(Group {
                delim: g.delim,
                items: g.items.iter().map(Fragment::without_spans).collect(),
                span: None,
            }),
            Fragment::Str(s) => Fragment::Str(StrLit {
                text: s.text.clone(),
                span: None,
            }),
        }
    }

    /// Visits every atom in this fragment, depth first.
    pub fn for_each_atom<F: FnMut(&Atom)>(&self, f: &mut F) {
        match self {
            Fragment::Atom(a) => f(a),
            Fragment::Group(g) => g.items.iter().for_each(|item| item.for_each_atom(f)),
            Fragment::Str(_) => {}
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&printer::render_plain(std::slice::from_ref(self)))
    }
}

/// Returns the span covering every spanned fragment in `items`, if any.
pub fn covering_span(items: &[Fragment]) -> Option<Span> {
    items
        .iter()
        .filter_map(Fragment::span)
        .reduce(Span::join)
}
