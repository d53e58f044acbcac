//! Fragment printer.
//!
//! Two modes share one walker:
//! - **plain**: normalized spacing, one statement per line, four-space
//!   indentation inside braces;
//! - **faithful**: given the original source text, whitespace and comments
//!   between two fragments that were adjacent in the source are copied
//!   verbatim, so code that no macro touched comes out byte-identical. Where
//!   expansion changed the neighbourhood the plain rules apply.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::syntax::{AtomKind, Delimiter, Fragment};

/// Matches text made only of whitespace and comments.
static TRIVIA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\s+|//[^\n]*|/\*(?s:.*?)\*/)*$").expect("trivia pattern is valid")
});

/// Keywords that read better with a space before their parenthesis.
const SPACED_KEYWORDS: &[&str] = &["if", "while", "for", "switch", "return", "sizeof", "typeof"];

pub fn render_plain(items: &[Fragment]) -> String {
    let mut printer = Printer::new(None);
    printer.top_level(items);
    printer.out
}

pub fn render_faithful(items: &[Fragment], source: &str) -> String {
    let mut printer = Printer::new(Some(source));
    printer.top_level(items);
    printer.out
}

/// Re-tokenizes and plain-prints `text`, so two renderings can be compared
/// independently of layout.
pub fn normalize(text: &str) -> crate::errors::Result<String> {
    let fragments = super::parser::parse_snippet(text)?;
    Ok(render_plain(&fragments))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Context {
    TopLevel,
    Block,
    Inline,
}

struct Printer<'s> {
    source: Option<&'s str>,
    out: String,
    indent: usize,
}

impl<'s> Printer<'s> {
    fn new(source: Option<&'s str>) -> Self {
        Self {
            source,
            out: String::new(),
            indent: 0,
        }
    }

    fn top_level(&mut self, items: &[Fragment]) {
        let (Some(first), Some(last)) = (items.first(), items.last()) else {
            return;
        };
        if let Some(gap) = first.span().and_then(|s| self.trivia(0, s.start)) {
            self.out.push_str(gap);
        }
        self.sequence(items, Context::TopLevel);
        let tail = match (self.source, last.span()) {
            (Some(source), Some(s)) => self.trivia(s.end, source.len()),
            _ => None,
        };
        match tail {
            Some(gap) => self.out.push_str(gap),
            None => {
                if !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
            }
        }
    }

    fn sequence(&mut self, items: &[Fragment], ctx: Context) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.separator(items, i, ctx);
            }
            self.fragment(item);
        }
    }

    fn fragment(&mut self, fragment: &Fragment) {
        match fragment {
            Fragment::Atom(a) => self.out.push_str(&a.text),
            Fragment::Str(s) => self.out.push_str(&s.text),
            Fragment::Group(g) => {
                self.out.push(g.delim.open());
                let ctx = match g.delim {
                    Delimiter::Brace => Context::Block,
                    _ => Context::Inline,
                };
                if ctx == Context::Block {
                    self.indent += 1;
                }

                let open_end = g.span.map(|s| s.start + 1);
                let close_start = g.span.map(|s| s.end.saturating_sub(1));
                if let (Some(first), Some(last)) = (g.items.first(), g.items.last()) {
                    match self.gap(open_end, first.span().map(|s| s.start)) {
                        Some(gap) => self.out.push_str(gap),
                        None if ctx == Context::Block => self.newline(),
                        None => {}
                    }
                    self.sequence(&g.items, ctx);
                    if ctx == Context::Block {
                        self.indent -= 1;
                    }
                    match self.gap(last.span().map(|s| s.end), close_start) {
                        Some(gap) => self.out.push_str(gap),
                        None if ctx == Context::Block => self.newline(),
                        None => {}
                    }
                } else {
                    if ctx == Context::Block {
                        self.indent -= 1;
                    }
                    if let Some(gap) = self.gap(open_end, close_start) {
                        self.out.push_str(gap);
                    }
                }
                self.out.push(g.delim.close());
            }
        }
    }

    fn separator(&mut self, items: &[Fragment], i: usize, ctx: Context) {
        let prev = &items[i - 1];
        let next = &items[i];

        if let Some(gap) = self.gap(prev.span().map(|s| s.end), next.span().map(|s| s.start)) {
            self.out.push_str(gap);
            return;
        }

        if prev.is_directive() || next.is_directive() {
            self.newline();
            return;
        }

        if ctx != Context::Inline && ends_statement(items, i) {
            self.newline();
            return;
        }

        if is_prefix_operator(items, i - 1) || !needs_space(prev, next) {
            return;
        }
        self.out.push(' ');
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    /// Source text between `start` and `end` when it is only trivia.
    fn gap(&self, start: Option<usize>, end: Option<usize>) -> Option<&'s str> {
        self.trivia(start?, end?)
    }

    fn trivia(&self, start: usize, end: usize) -> Option<&'s str> {
        let source = self.source?;
        if start > end {
            return None;
        }
        let text = source.get(start..end)?;
        TRIVIA.is_match(text).then_some(text)
    }
}

/// Does a new line start before `items[i]`?
fn ends_statement(items: &[Fragment], i: usize) -> bool {
    let prev = &items[i - 1];
    let next = &items[i];
    if next.is_atom(";") || next.is_atom(",") {
        return false;
    }
    if prev.is_atom(";") {
        return true;
    }
    if !prev.is_group_of(Delimiter::Brace) {
        return false;
    }
    if next.is_atom("else") || next.is_atom("while") {
        return false;
    }
    // A brace group closes a statement when it is a body: after `)`,
    // `else`, `do`, or at the start of a statement itself.
    match i.checked_sub(2).map(|j| &items[j]) {
        None => true,
        Some(before) => {
            before.is_group_of(Delimiter::Paren)
                || before.is_atom("else")
                || before.is_atom("do")
                || before.is_atom(";")
                || before.is_group_of(Delimiter::Brace)
        }
    }
}

/// True when `items[i]` is a unary `*` or `&`, as in `(*f)` or `= &x`.
fn is_prefix_operator(items: &[Fragment], i: usize) -> bool {
    if !(items[i].is_atom("*") || items[i].is_atom("&")) {
        return false;
    }
    match i.checked_sub(1).and_then(|j| items[j].as_atom()) {
        None => i == 0,
        Some(a) => a.kind == AtomKind::Punct || a.text == "return",
    }
}

fn needs_space(prev: &Fragment, next: &Fragment) -> bool {
    if next.is_atom(",") || next.is_atom(";") || next.is_atom(".") || next.is_atom("->") {
        return false;
    }
    if prev.is_atom(".") || prev.is_atom("->") {
        return false;
    }
    let call_like = next.is_group_of(Delimiter::Paren) || next.is_group_of(Delimiter::Bracket);
    match prev.as_atom() {
        Some(a) if call_like && a.kind == AtomKind::Ident => {
            SPACED_KEYWORDS.contains(&a.text.as_str())
        }
        _ => !(call_like && prev.is_group_of(Delimiter::Paren) && next.is_group_of(Delimiter::Paren)),
    }
}
