//! Pattern matcher.
//!
//! Walks a pattern and an input sequence in lock step. Matching is
//! leftmost-greedy with no backtracking: once a variable has consumed its
//! fragments nothing is ever given back.
//!
//! At the invocation level the pattern only has to match a prefix of what
//! follows the macro name ([`match_prefix`]); the fragments it covers become
//! the invocation. The content of a nested group pattern must match the whole
//! group ([`match_exact`]).

use thiserror::Error;

use crate::macros::binding::Binding;
use crate::macros::types::{CaptureKind, PatternNode};
use crate::syntax::{Delimiter, Fragment};

/// Why a case did not match. Never surfaces on its own; the driver folds
/// these into the help text of `NoMatchingCase`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchFailure {
    #[error("expected {expected}, found {found}")]
    PatternMismatch { expected: String, found: String },

    #[error("{0}")]
    ArityMismatch(String),
}

/// Matches `pattern` against the start of `input`.
///
/// Returns the binding and how many fragments of `input` were consumed.
pub fn match_prefix(
    pattern: &[PatternNode],
    input: &[Fragment],
) -> Result<(Binding, usize), MatchFailure> {
    let mut binding = Binding::new();
    let consumed = match_sequence(pattern, input, &mut binding, false)?;
    Ok((binding, consumed))
}

/// Matches `pattern` against the whole of `input`.
pub fn match_exact(pattern: &[PatternNode], input: &[Fragment]) -> Result<Binding, MatchFailure> {
    let mut binding = Binding::new();
    match_sequence(pattern, input, &mut binding, true)?;
    Ok(binding)
}

fn match_sequence(
    pattern: &[PatternNode],
    input: &[Fragment],
    binding: &mut Binding,
    exact: bool,
) -> Result<usize, MatchFailure> {
    let mut pos = 0;

    for (i, node) in pattern.iter().enumerate() {
        if let PatternNode::Var(var) = node {
            if var.kind == CaptureKind::Rest {
                binding.bind_seq(var.name.clone(), input[pos..].to_vec());
                pos = input.len();
                continue;
            }
        }

        let Some(fragment) = input.get(pos) else {
            return Err(MatchFailure::ArityMismatch(format!(
                "input ended where {} was expected",
                describe_node(node)
            )));
        };

        pos += match node {
            PatternNode::Literal(expected) => {
                if expected != fragment {
                    return Err(mismatch(describe_node(node), fragment));
                }
                1
            }
            PatternNode::Group(delim, inner) => {
                let group = fragment
                    .as_group()
                    .filter(|g| g.delim == *delim)
                    .ok_or_else(|| mismatch(describe_node(node), fragment))?;
                match_sequence(inner, &group.items, binding, true)?;
                1
            }
            PatternNode::Var(var) => {
                if !var.kind.accepts(fragment) {
                    return Err(mismatch(
                        format!("{} for `{}`", var.kind.name(), var.name),
                        fragment,
                    ));
                }
                let next_wants_group = pattern.get(i + 1).is_some_and(PatternNode::requires_group);
                let len = if var.kind == CaptureKind::Any && !next_wants_group {
                    postfix_chain_len(&input[pos..])
                } else {
                    1
                };
                if len == 1 {
                    binding.bind_one(var.name.clone(), fragment.clone());
                } else {
                    binding.bind_seq(var.name.clone(), input[pos..pos + len].to_vec());
                }
                len
            }
        };
    }

    if exact {
        if let Some(extra) = input.get(pos) {
            return Err(MatchFailure::ArityMismatch(format!(
                "unexpected {} after the end of the pattern",
                extra.describe()
            )));
        }
    }
    Ok(pos)
}

/// Length of the expression-like run starting at `input[0]`: an identifier
/// takes the call and subscript groups that directly follow it.
fn postfix_chain_len(input: &[Fragment]) -> usize {
    if input.first().and_then(Fragment::as_ident).is_none() {
        return 1;
    }
    1 + input[1..]
        .iter()
        .take_while(|f| f.is_group_of(Delimiter::Paren) || f.is_group_of(Delimiter::Bracket))
        .count()
}

fn describe_node(node: &PatternNode) -> String {
    match node {
        PatternNode::Literal(f) => f.describe(),
        PatternNode::Group(delim, _) => format!("`{} … {}` group", delim.open(), delim.close()),
        PatternNode::Var(v) => format!("{} for `{}`", v.kind.name(), v.name),
    }
}

fn mismatch(expected: String, found: &Fragment) -> MatchFailure {
    MatchFailure::PatternMismatch {
        expected,
        found: found.describe(),
    }
}
