//! Tokenizer: turns C-like source text into a fragment tree.
//!
//! The tokenizer is purely lexical. It recognizes identifiers, numbers,
//! character and string literals, punctuation (with C's multi-character
//! operators), whole preprocessor lines, and folds `()`, `[]` and `{}` into
//! groups. Comments and whitespace are dropped; the faithful printer recovers
//! them from spans.

use pest::{error::InputLocation, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::errors::{to_source_span, CmacroError, Result, SourceArc};
use crate::syntax::{Atom, AtomKind, Delimiter, Fragment, Group, Span, StrLit};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct CmacroParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Tokenizes `source` into top-level fragments.
///
/// `src` is the named source used for diagnostics; its text must be `source`.
pub fn parse(source: &str, src: &SourceArc) -> Result<Vec<Fragment>> {
    let mut pairs = CmacroParser::parse(Rule::program, source)
        .map_err(|e| convert_parse_error(e, src))?;

    let Some(program) = pairs.next() else {
        return Ok(Vec::new());
    };

    Ok(program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_fragment)
        .collect())
}

/// Tokenizes a snippet that has no file behind it (tests, template text).
pub fn parse_snippet(source: &str) -> Result<Vec<Fragment>> {
    let src = crate::errors::named_source("<snippet>", source);
    parse(source, &src)
}

// ============================================================================
// FRAGMENT BUILDERS
// ============================================================================

fn build_fragment(pair: Pair<Rule>) -> Fragment {
    let span = Some(get_span(&pair));

    match pair.as_rule() {
        Rule::paren => build_group(pair, Delimiter::Paren),
        Rule::bracket => build_group(pair, Delimiter::Bracket),
        Rule::brace => build_group(pair, Delimiter::Brace),
        Rule::string => Fragment::Str(StrLit {
            text: pair.as_str().to_string(),
            span,
        }),
        Rule::char_lit => make_atom(AtomKind::Char, pair.as_str(), span),
        Rule::number => make_atom(AtomKind::Number, pair.as_str(), span),
        Rule::ident => make_atom(AtomKind::Ident, pair.as_str(), span),
        Rule::directive => make_atom(AtomKind::Directive, pair.as_str().trim_end(), span),
        // Everything else the grammar produces at this level is punctuation.
        _ => make_atom(AtomKind::Punct, pair.as_str(), span),
    }
}

fn make_atom(kind: AtomKind, text: &str, span: Option<Span>) -> Fragment {
    Fragment::Atom(Atom {
        kind,
        text: text.to_string(),
        span,
    })
}

fn build_group(pair: Pair<Rule>, delim: Delimiter) -> Fragment {
    let span = Some(get_span(&pair));
    let items = pair.into_inner().map(build_fragment).collect();
    Fragment::Group(Group { delim, items, span })
}

fn get_span(pair: &Pair<Rule>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

fn convert_parse_error(e: pest::error::Error<Rule>, src: &SourceArc) -> CmacroError {
    let span = match e.location {
        InputLocation::Pos(p) => Span::new(p, p),
        InputLocation::Span((start, end)) => Span::new(start, end),
    };
    CmacroError::Parse {
        message: e.variant.message().to_string(),
        src: SourceArc::clone(src),
        span: to_source_span(span),
        help: Some("check that every `(`, `[` and `{` is closed and string literals are terminated".into()),
    }
}
