//! Reads macro definitions and imports out of a source unit.
//!
//! Two top-level forms belong to the definition language and are removed from
//! the program:
//!
//! ```text
//! macro <name> {
//!   case {
//!     match { … }        // required
//!     template { … }     // optional
//!     toplevel { … }     // optional
//!   }
//!   …
//! }
//! cmacro_import "<path>"
//! ```
//!
//! Every definition is checked here, before anything is expanded: section
//! structure, variable syntax and kinds, `rest` placement, duplicate
//! variables, unknown operators, and template variables that the case's
//! pattern never binds.

use std::collections::HashSet;

use crate::errors::{named_source, to_source_span, CmacroError, Result, SourceArc};
use crate::macros::types::{
    CaptureKind, ConcOperand, MacroCase, MacroDefinition, PatternNode, PatternVar, TemplateNode,
};
use crate::syntax::{covering_span, parser, AtomKind, Delimiter, Fragment, Span};

pub const MACRO_KEYWORD: &str = "macro";
pub const IMPORT_KEYWORD: &str = "cmacro_import";

/// A `cmacro_import "<path>"` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// The path as written, without quotes.
    pub path: String,
    pub span: Option<Span>,
}

/// One tokenized file with its definition-language forms taken out.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub name: String,
    pub text: String,
    pub src: SourceArc,
    /// Everything that is not a definition or an import.
    pub program: Vec<Fragment>,
    pub definitions: Vec<MacroDefinition>,
    pub imports: Vec<Import>,
}

/// Tokenizes `text` and splits it into program, definitions and imports.
pub fn read_unit(name: &str, text: String) -> Result<SourceUnit> {
    let src = named_source(name, text.clone());
    let fragments = parser::parse(&text, &src)?;

    let mut program = Vec::with_capacity(fragments.len());
    let mut definitions = Vec::new();
    let mut imports = Vec::new();

    let mut i = 0;
    while i < fragments.len() {
        let rest = &fragments[i..];
        match rest {
            [head, name_frag, Fragment::Group(body), ..]
                if head.is_atom(MACRO_KEYWORD)
                    && name_frag.as_ident().is_some()
                    && body.delim == Delimiter::Brace =>
            {
                let macro_name = name_frag.as_ident().unwrap_or_default();
                let span = covering_span(&rest[..3]);
                let reader = DefinitionReader {
                    src: &src,
                    macro_name,
                    case: 0,
                };
                definitions.push(reader.definition(&body.items, name, span)?);
                i += 3;
            }
            [head, Fragment::Str(path), ..] if head.as_ident() == Some(IMPORT_KEYWORD) => {
                imports.push(Import {
                    path: unquote(&path.text).to_string(),
                    span: covering_span(&rest[..2]),
                });
                i += 2;
            }
            [head, ..] if head.as_ident() == Some(IMPORT_KEYWORD) => {
                return Err(CmacroError::Parse {
                    message: "`cmacro_import` must be followed by a string literal".into(),
                    src: SourceArc::clone(&src),
                    span: to_source_span(head.span().unwrap_or_default()),
                    help: Some("write `cmacro_import \"file.c\"`".into()),
                });
            }
            _ => {
                program.push(fragments[i].clone());
                i += 1;
                continue;
            }
        }
        if fragments.get(i).is_some_and(|f| f.is_atom(";")) {
            i += 1;
        }
    }

    tracing::debug!(
        unit = name,
        definitions = definitions.len(),
        imports = imports.len(),
        "read source unit"
    );

    Ok(SourceUnit {
        name: name.to_string(),
        text,
        src,
        program,
        definitions,
        imports,
    })
}

fn unquote(text: &str) -> &str {
    match (text.find('"'), text.rfind('"')) {
        (Some(start), Some(end)) if end > start => &text[start + 1..end],
        _ => text,
    }
}

// ============================================================================
// DEFINITIONS
// ============================================================================

struct DefinitionReader<'a> {
    src: &'a SourceArc,
    macro_name: &'a str,
    /// Current case, starting at 1; 0 outside of any case.
    case: usize,
}

impl<'a> DefinitionReader<'a> {
    fn definition(
        mut self,
        body: &[Fragment],
        origin: &str,
        span: Option<Span>,
    ) -> Result<MacroDefinition> {
        let mut cases = Vec::new();
        let mut items = body.iter();
        while let Some(item) = items.next() {
            if !item.is_atom("case") {
                return Err(self.malformed(
                    format!("expected `case`, found {}", item.describe()),
                    item.span(),
                ));
            }
            let case_span = item.span();
            let Some(Fragment::Group(group)) = items.next().filter(|g| g.is_group_of(Delimiter::Brace)) else {
                return Err(self.malformed("`case` must be followed by `{ … }`".into(), case_span));
            };
            self.case = cases.len() + 1;
            let span = case_span.zip(group.span).map(|(a, b)| a.join(b));
            cases.push(self.case_body(&group.items, span)?);
        }

        if cases.is_empty() {
            return Err(CmacroError::MalformedDefinition {
                macro_name: self.macro_name.to_string(),
                reason: "the macro has no cases".into(),
                src: SourceArc::clone(self.src),
                span: to_source_span(span.unwrap_or_default()),
                help: Some("add at least one `case { match { … } template { … } }`".into()),
            });
        }

        Ok(MacroDefinition {
            name: self.macro_name.to_string(),
            cases,
            origin: origin.to_string(),
            span,
        })
    }

    fn case_body(&self, items: &[Fragment], span: Option<Span>) -> Result<MacroCase> {
        let mut pattern = None;
        let mut template = None;
        let mut toplevel = None;

        let mut iter = items.iter();
        while let Some(item) = iter.next() {
            let section = match item.as_ident() {
                Some(s @ ("match" | "template" | "toplevel")) => s,
                _ => {
                    return Err(self.malformed(
                        format!(
                            "expected `match`, `template` or `toplevel`, found {}",
                            item.describe()
                        ),
                        item.span(),
                    ))
                }
            };
            let Some(Fragment::Group(body)) = iter.next().filter(|g| g.is_group_of(Delimiter::Brace)) else {
                return Err(self.malformed(format!("`{section}` must be followed by `{{ … }}`"), item.span()));
            };
            let slot = match section {
                "match" => &mut pattern,
                "template" => &mut template,
                _ => &mut toplevel,
            };
            if slot.is_some() {
                return Err(self.malformed(format!("duplicate `{section}` section"), item.span()));
            }
            *slot = Some(&body.items);
        }

        let Some(match_items) = pattern else {
            return Err(CmacroError::MissingMatch {
                macro_name: self.macro_name.to_string(),
                case: self.case,
                src: SourceArc::clone(self.src),
                span: to_source_span(span.unwrap_or_default()),
            });
        };

        let mut bound = Vec::new();
        let pattern = self.pattern(match_items, &mut bound)?;
        let bound: HashSet<String> = bound.into_iter().collect();
        let template = template.map(|t| self.template(t, &bound)).transpose()?;
        let toplevel = toplevel.map(|t| self.template(t, &bound)).transpose()?;

        Ok(MacroCase {
            pattern,
            template,
            toplevel,
            span,
        })
    }

    fn pattern(&self, items: &[Fragment], bound: &mut Vec<String>) -> Result<Vec<PatternNode>> {
        let mut nodes = Vec::new();
        let mut i = 0;
        while i < items.len() {
            if let Some(placeholder) = self.placeholder(items, i)? {
                i += 2;
                let (name, kind, span) = match placeholder {
                    Placeholder::Var { name, kind, span } => (name, kind, span),
                    Placeholder::Operator { op, span, .. } => {
                        return Err(self.malformed(
                            format!("`@{op}` can only be used in `template` or `toplevel`"),
                            span,
                        ))
                    }
                };
                let kind = match kind {
                    None => CaptureKind::Any,
                    Some(word) => CaptureKind::from_qualifier(&word.text).ok_or_else(|| {
                        CmacroError::UnknownCaptureKind {
                            macro_name: self.macro_name.to_string(),
                            var: name.clone(),
                            kind: word.text.clone(),
                            src: SourceArc::clone(self.src),
                            span: to_source_span(word.span.unwrap_or_default()),
                        }
                    })?,
                };
                if bound.contains(&name) {
                    return Err(CmacroError::DuplicateVariable {
                        macro_name: self.macro_name.to_string(),
                        case: self.case,
                        var: name,
                        src: SourceArc::clone(self.src),
                        span: to_source_span(span.unwrap_or_default()),
                    });
                }
                bound.push(name.clone());
                nodes.push(PatternNode::Var(PatternVar { name, kind, span }));
                continue;
            }

            nodes.push(match &items[i] {
                Fragment::Group(g) => PatternNode::Group(g.delim, self.pattern(&g.items, bound)?),
                other => PatternNode::Literal(other.without_spans()),
            });
            i += 1;
        }

        let last = nodes.len().saturating_sub(1);
        for (idx, node) in nodes.iter().enumerate() {
            if let PatternNode::Var(var) = node {
                if var.kind == CaptureKind::Rest && idx != last {
                    return Err(CmacroError::MisplacedRest {
                        macro_name: self.macro_name.to_string(),
                        var: var.name.clone(),
                        src: SourceArc::clone(self.src),
                        span: to_source_span(var.span.unwrap_or_default()),
                    });
                }
            }
        }
        Ok(nodes)
    }

    fn template(&self, items: &[Fragment], bound: &HashSet<String>) -> Result<Vec<TemplateNode>> {
        let mut nodes = Vec::new();
        let mut i = 0;
        while i < items.len() {
            match self.placeholder(items, i)? {
                Some(Placeholder::Var { name, kind, span }) => {
                    if let Some(word) = kind {
                        return Err(self.malformed(
                            format!("capture kind `{}` belongs in the `match` section", word.text),
                            span,
                        ));
                    }
                    self.require_bound(&name, bound, span)?;
                    nodes.push(TemplateNode::Var { name, span });
                    i += 2;
                }
                Some(Placeholder::Operator { op, args, span }) => {
                    nodes.push(self.operator(&op, args, bound, span)?);
                    i += 2;
                }
                None => {
                    nodes.push(match &items[i] {
                        Fragment::Group(g) => TemplateNode::Group(g.delim, self.template(&g.items, bound)?),
                        other => TemplateNode::Literal(other.without_spans()),
                    });
                    i += 1;
                }
            }
        }
        Ok(nodes)
    }

    fn operator(
        &self,
        op: &str,
        args: Vec<Word>,
        bound: &HashSet<String>,
        span: Option<Span>,
    ) -> Result<TemplateNode> {
        match op {
            "gensym" => match args.as_slice() {
                [label] if label.is_name => Ok(TemplateNode::Gensym {
                    label: label.text.clone(),
                }),
                _ => Err(self.malformed("`@gensym` takes exactly one label".into(), span)),
            },
            "getsym" => match args.as_slice() {
                [label] if label.is_name => Ok(TemplateNode::Getsym {
                    label: label.text.clone(),
                    ordinal: 0,
                }),
                [label, n] if label.is_name => {
                    let ordinal = n.text.parse::<usize>().map_err(|_| {
                        self.malformed(format!("`{}` is not a valid `@getsym` ordinal", n.text), n.span)
                    })?;
                    Ok(TemplateNode::Getsym {
                        label: label.text.clone(),
                        ordinal,
                    })
                }
                _ => Err(self.malformed("`@getsym` takes a label and an optional ordinal".into(), span)),
            },
            "conc" => {
                if args.is_empty() {
                    return Err(self.malformed("`@conc` needs at least one operand".into(), span));
                }
                Ok(TemplateNode::Conc(
                    args.into_iter()
                        .map(|w| {
                            if bound.contains(&w.text) {
                                ConcOperand::Var(w.text)
                            } else {
                                ConcOperand::Text(w.text)
                            }
                        })
                        .collect(),
                ))
            }
            "splice" => match args.as_slice() {
                [name] if name.is_name => {
                    self.require_bound(&name.text, bound, name.span)?;
                    Ok(TemplateNode::Splice {
                        name: name.text.clone(),
                        span: name.span,
                    })
                }
                _ => Err(self.malformed("`@splice` takes exactly one variable".into(), span)),
            },
            other => Err(CmacroError::UnknownOperator {
                macro_name: self.macro_name.to_string(),
                operator: other.to_string(),
                src: SourceArc::clone(self.src),
                span: to_source_span(span.unwrap_or_default()),
            }),
        }
    }

    /// Reads `$( … )` at `items[i]`, if there is one.
    fn placeholder(&self, items: &[Fragment], i: usize) -> Result<Option<Placeholder>> {
        let (Some(dollar), Some(Fragment::Group(group))) = (items.get(i), items.get(i + 1)) else {
            return Ok(None);
        };
        if !dollar.is_atom("$") || group.delim != Delimiter::Paren {
            return Ok(None);
        }
        let span = dollar.span().zip(group.span).map(|(a, b)| a.join(b));

        let words = words(&group.items).ok_or_else(|| {
            self.malformed("variables may only contain names, numbers and `-`".into(), span)
        })?;
        let mut words = words.into_iter();

        match words.next() {
            Some(at) if at.text == "@" => {
                let op = words
                    .next()
                    .filter(|w| w.is_name)
                    .ok_or_else(|| self.malformed("`@` must be followed by an operator name".into(), span))?;
                Ok(Some(Placeholder::Operator {
                    op: op.text,
                    args: words.collect(),
                    span,
                }))
            }
            Some(name) if name.is_name => {
                let kind = words.next();
                if kind.as_ref().is_some_and(|k| !k.is_name) || words.next().is_some() {
                    return Err(self.malformed(
                        format!("malformed variable `$({} …)`; expected `$(name)` or `$(name kind)`", name.text),
                        span,
                    ));
                }
                Ok(Some(Placeholder::Var {
                    name: name.text,
                    kind,
                    span,
                }))
            }
            _ => Err(self.malformed(
                "malformed variable; expected `$(name)`, `$(name kind)` or `$(@operator …)`".into(),
                span,
            )),
        }
    }

    fn require_bound(&self, name: &str, bound: &HashSet<String>, span: Option<Span>) -> Result<()> {
        if bound.contains(name) {
            return Ok(());
        }
        Err(CmacroError::UnboundVariable {
            macro_name: self.macro_name.to_string(),
            case: self.case,
            var: name.to_string(),
            src: SourceArc::clone(self.src),
            span: to_source_span(span.unwrap_or_default()),
        })
    }

    fn malformed(&self, reason: String, span: Option<Span>) -> CmacroError {
        CmacroError::MalformedDefinition {
            macro_name: self.macro_name.to_string(),
            reason,
            src: SourceArc::clone(self.src),
            span: to_source_span(span.unwrap_or_default()),
            help: (self.case > 0).then(|| format!("in case {}", self.case)),
        }
    }
}

enum Placeholder {
    Var {
        name: String,
        kind: Option<Word>,
        span: Option<Span>,
    },
    Operator {
        op: String,
        args: Vec<Word>,
        span: Option<Span>,
    },
}

/// A name, number or punctuation token inside `$( … )`.
#[derive(Debug)]
struct Word {
    text: String,
    span: Option<Span>,
    is_name: bool,
}

/// Splits the inside of `$( … )` into words, joining `a-b` into one name when
/// the pieces touch.
fn words(items: &[Fragment]) -> Option<Vec<Word>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < items.len() {
        let atom = items[i].as_atom()?;
        let mut word = Word {
            text: atom.text.clone(),
            span: atom.span,
            is_name: atom.kind == AtomKind::Ident,
        };
        i += 1;
        while word.is_name
            && i + 1 < items.len()
            && items[i].is_atom("-")
            && items[i + 1].as_ident().is_some()
            && touching(&items[i - 1], &items[i])
            && touching(&items[i], &items[i + 1])
        {
            word.text.push('-');
            word.text.push_str(items[i + 1].as_ident().unwrap_or_default());
            word.span = word.span.zip(items[i + 1].span()).map(|(a, b)| a.join(b));
            i += 2;
        }
        out.push(word);
    }
    Some(out)
}

fn touching(a: &Fragment, b: &Fragment) -> bool {
    match (a.span(), b.span()) {
        (Some(x), Some(y)) => x.end == y.start,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(text: &str) -> Result<SourceUnit> {
        read_unit("test.c", text.to_string())
    }

    fn only_case(text: &str) -> MacroCase {
        unit(text).unwrap().definitions.remove(0).cases.remove(0)
    }

    #[test]
    fn separates_definitions_imports_and_program() {
        let u = unit(
            "cmacro_import \"lambda.c\"\nmacro id { case { match { $(x) } template { $(x) } } }\nint y = id 3;",
        )
        .unwrap();
        assert_eq!(u.imports, vec![Import { path: "lambda.c".into(), span: u.imports[0].span }]);
        assert_eq!(u.definitions.len(), 1);
        assert_eq!(u.definitions[0].origin, "test.c");
        assert_eq!(u.program.len(), 6);
        assert!(u.program[0].is_atom("int"));
    }

    #[test]
    fn reads_hyphenated_names_and_kinds() {
        let case = only_case(
            "macro m { case { match { ($(ptr-name ident), $(type)) $(body block) } template { $(ptr-name) $(body) } } }",
        );
        let PatternNode::Group(Delimiter::Paren, inner) = &case.pattern[0] else {
            panic!("expected a group pattern");
        };
        assert!(matches!(&inner[0], PatternNode::Var(v) if v.name == "ptr-name" && v.kind == CaptureKind::Ident));
        assert!(matches!(&inner[2], PatternNode::Var(v) if v.name == "type" && v.kind == CaptureKind::Any));
        assert!(matches!(&case.pattern[1], PatternNode::Var(v) if v.kind == CaptureKind::Block));
        assert_eq!(case.template.unwrap().len(), 2);
        assert!(case.toplevel.is_none());
    }

    #[test]
    fn reads_operators() {
        let case = only_case(
            "macro m { case { match { $(a) $(b) } template { $(@getsym l) $(@getsym l 2) $(@conc a _ b) $(@splice a) } toplevel { $(@gensym l) } } }",
        );
        let template = case.template.unwrap();
        assert_eq!(template[0], TemplateNode::Getsym { label: "l".into(), ordinal: 0 });
        assert_eq!(template[1], TemplateNode::Getsym { label: "l".into(), ordinal: 2 });
        assert_eq!(
            template[2],
            TemplateNode::Conc(vec![
                ConcOperand::Var("a".into()),
                ConcOperand::Text("_".into()),
                ConcOperand::Var("b".into()),
            ])
        );
        assert!(matches!(&template[3], TemplateNode::Splice { name, .. } if name == "a"));
        assert_eq!(case.toplevel.unwrap()[0], TemplateNode::Gensym { label: "l".into() });
    }

    #[test]
    fn spaced_hyphen_is_not_part_of_a_name() {
        let err = unit("macro m { case { match { $(a - b) } } }").unwrap_err();
        assert!(matches!(err, CmacroError::UnknownCaptureKind { .. } | CmacroError::MalformedDefinition { .. }));
    }

    #[test]
    fn rejects_missing_match() {
        let err = unit("macro m { case { template { x } } }").unwrap_err();
        assert!(matches!(err, CmacroError::MissingMatch { case: 1, .. }));
    }

    #[test]
    fn rejects_duplicate_sections() {
        let err = unit("macro m { case { match { x } match { y } } }").unwrap_err();
        assert!(matches!(err, CmacroError::MalformedDefinition { ref reason, .. } if reason.contains("duplicate")));
    }

    #[test]
    fn rejects_misplaced_rest() {
        let err = unit("macro m { case { match { ($(xs rest) ;) } } }").unwrap_err();
        assert!(matches!(err, CmacroError::MisplacedRest { ref var, .. } if var == "xs"));
        assert!(unit("macro m { case { match { ($(x) ; $(xs rest)) } } }").is_ok());
    }

    #[test]
    fn rejects_duplicate_variables() {
        let err = unit("macro m { case { match { $(x) $(x) } } }").unwrap_err();
        assert!(matches!(err, CmacroError::DuplicateVariable { .. }));
    }

    #[test]
    fn rejects_unknown_kind_and_operator() {
        let err = unit("macro m { case { match { $(x expr) } } }").unwrap_err();
        assert!(matches!(err, CmacroError::UnknownCaptureKind { ref kind, .. } if kind == "expr"));
        let err = unit("macro m { case { match { $(x) } template { $(@quote x) } } }").unwrap_err();
        assert!(matches!(err, CmacroError::UnknownOperator { ref operator, .. } if operator == "quote"));
    }

    #[test]
    fn rejects_unbound_template_variables() {
        let err = unit("macro m { case { match { $(x) } toplevel { $(y) } } }").unwrap_err();
        assert!(matches!(err, CmacroError::UnboundVariable { ref var, case: 1, .. } if var == "y"));
        let err = unit("macro m { case { match { $(x) } template { $(@splice z) } } }").unwrap_err();
        assert!(matches!(err, CmacroError::UnboundVariable { .. }));
    }

    #[test]
    fn rejects_empty_macro() {
        let err = unit("macro m { }").unwrap_err();
        assert!(err.is_definition_error());
    }

    #[test]
    fn macro_word_outside_a_definition_is_program_text() {
        let u = unit("int macro = 1;").unwrap();
        assert!(u.definitions.is_empty());
        assert_eq!(u.program.len(), 5);
    }
}
