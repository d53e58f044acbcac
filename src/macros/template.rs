//! Template instantiation.
//!
//! Turns a `template` or `toplevel` form into fragments by substituting bound
//! variables and evaluating the `@` operators. Macro calls that appear in the
//! output are not expanded here; the driver picks them up on its next scan.

use std::collections::HashMap;

use crate::errors::{CmacroError, Result, Site};
use crate::macros::binding::{Binding, Bound};
use crate::macros::hygiene::{GensymAllocator, GensymScope};
use crate::macros::types::{ConcOperand, TemplateNode};
use crate::syntax::{Fragment, Group};

/// Everything that identifies the invocation being instantiated.
pub struct Instantiation<'a> {
    pub macro_name: &'a str,
    /// Index of the matched case, starting at 0.
    pub case: usize,
    pub binding: &'a Binding,
    /// The invocation, for diagnostics.
    pub site: &'a Site,
}

/// Instantiates one output form.
///
/// `@gensym` ordinals are counted per call, so the `toplevel` and `template`
/// forms of one invocation share names through `scope`.
pub fn instantiate(
    form: &[TemplateNode],
    inst: &Instantiation<'_>,
    scope: &mut GensymScope,
    allocator: &mut GensymAllocator,
) -> Result<Vec<Fragment>> {
    let mut run = Run {
        inst,
        scope,
        allocator,
        ordinals: HashMap::new(),
    };
    let mut out = Vec::new();
    run.sequence(form, &mut out)?;
    Ok(out)
}

struct Run<'i, 'a> {
    inst: &'i Instantiation<'a>,
    scope: &'i mut GensymScope,
    allocator: &'i mut GensymAllocator,
    ordinals: HashMap<String, usize>,
}

impl Run<'_, '_> {
    fn sequence(&mut self, nodes: &[TemplateNode], out: &mut Vec<Fragment>) -> Result<()> {
        for node in nodes {
            self.node(node, out)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &TemplateNode, out: &mut Vec<Fragment>) -> Result<()> {
        match node {
            TemplateNode::Literal(fragment) => out.push(fragment.without_spans()),
            TemplateNode::Group(delim, inner) => {
                let mut items = Vec::new();
                self.sequence(inner, &mut items)?;
                out.push(Fragment::Group(Group {
                    delim: *delim,
                    items,
                    span: None,
                }));
            }
            TemplateNode::Var { name, .. } => {
                out.extend_from_slice(self.lookup(name)?.fragments());
            }
            TemplateNode::Splice { name, .. } => match self.lookup(name)? {
                Bound::One(Fragment::Group(group)) => out.extend_from_slice(&group.items),
                bound => out.extend_from_slice(bound.fragments()),
            },
            TemplateNode::Gensym { label } => {
                let ordinal = self.ordinals.entry(label.clone()).or_insert(0);
                let name = self.scope.gensym(label, *ordinal, self.allocator);
                *ordinal += 1;
                out.push(Fragment::ident(name));
            }
            TemplateNode::Getsym { label, ordinal } => {
                let name = self.scope.getsym(label, *ordinal).ok_or_else(|| {
                    CmacroError::UnknownGensym {
                        macro_name: self.inst.macro_name.to_string(),
                        label: label.clone(),
                        ordinal: *ordinal,
                        case: self.inst.case + 1,
                        src: self.inst.site.src.clone(),
                        span: self.inst.site.source_span(),
                    }
                })?;
                out.push(Fragment::ident(name));
            }
            TemplateNode::Conc(operands) => {
                let mut text = String::new();
                for operand in operands {
                    match operand {
                        ConcOperand::Text(t) => text.push_str(t),
                        ConcOperand::Var(name) => {
                            let piece = self.lookup(name)?.atom_text().ok_or_else(|| {
                                self.invalid("conc", format!("`{name}` is not bound to a single atom"))
                            })?;
                            text.push_str(piece);
                        }
                    }
                }
                out.push(Fragment::ident(text));
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&Bound> {
        self.inst
            .binding
            .get(name)
            .ok_or_else(|| CmacroError::UnboundVariable {
                macro_name: self.inst.macro_name.to_string(),
                case: self.inst.case + 1,
                var: name.to_string(),
                src: self.inst.site.src.clone(),
                span: self.inst.site.source_span(),
            })
    }

    fn invalid(&self, operator: &str, reason: String) -> CmacroError {
        CmacroError::InvalidOperator {
            macro_name: self.inst.macro_name.to_string(),
            case: self.inst.case + 1,
            operator: operator.to_string(),
            reason,
            src: self.inst.site.src.clone(),
            span: self.inst.site.source_span(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::named_source;
    use crate::syntax::parser::parse_snippet;
    use crate::syntax::printer::render_plain;
    use crate::syntax::Delimiter;

    fn binding() -> Binding {
        let mut b = Binding::new();
        b.bind_one("name", Fragment::ident("Circle"));
        b.bind_one("type", Fragment::ident("Shape"));
        b.bind_one("args", parse_snippet("(int x)").unwrap().remove(0));
        b.bind_seq("ret", parse_snippet("typeof(f())").unwrap());
        b
    }

    fn run(form: &[TemplateNode], b: &Binding, scope: &mut GensymScope) -> Result<String> {
        let site = Site::new(&named_source("t.c", ""), None);
        let inst = Instantiation {
            macro_name: "m",
            case: 0,
            binding: b,
            site: &site,
        };
        let mut alloc = GensymAllocator::new("g");
        instantiate(form, &inst, scope, &mut alloc).map(|f| render_plain(&f))
    }

    fn var(name: &str) -> TemplateNode {
        TemplateNode::Var {
            name: name.into(),
            span: None,
        }
    }

    #[test]
    fn substitutes_and_splices_sequences() {
        let form = vec![var("ret"), TemplateNode::Literal(Fragment::ident("h")), var("args")];
        let out = run(&form, &binding(), &mut GensymScope::new()).unwrap();
        assert_eq!(out, "typeof (f()) h(int x)\n");
    }

    #[test]
    fn splice_flattens_a_group() {
        let form = vec![TemplateNode::Splice {
            name: "args".into(),
            span: None,
        }];
        assert_eq!(run(&form, &binding(), &mut GensymScope::new()).unwrap(), "int x\n");
    }

    #[test]
    fn conc_joins_atoms() {
        let form = vec![TemplateNode::Conc(vec![
            ConcOperand::Var("type".into()),
            ConcOperand::Var("name".into()),
            ConcOperand::Text("_tag".into()),
        ])];
        assert_eq!(
            run(&form, &binding(), &mut GensymScope::new()).unwrap(),
            "ShapeCircle_tag\n"
        );
    }

    #[test]
    fn conc_rejects_groups() {
        let form = vec![TemplateNode::Conc(vec![ConcOperand::Var("args".into())])];
        let err = run(&form, &binding(), &mut GensymScope::new()).unwrap_err();
        assert!(matches!(err, CmacroError::InvalidOperator { .. }));
    }

    #[test]
    fn gensym_ordinals_are_per_form_and_shared_through_scope() {
        let mut scope = GensymScope::new();
        let gensym = TemplateNode::Gensym { label: "l".into() };
        let first = run(&[gensym.clone(), gensym.clone()], &binding(), &mut scope).unwrap();
        assert_eq!(first, "g_l_0 g_l_1\n");
        let getsym = TemplateNode::Getsym {
            label: "l".into(),
            ordinal: 1,
        };
        let second = run(&[gensym, getsym], &binding(), &mut scope).unwrap();
        assert_eq!(second, "g_l_0 g_l_1\n");
    }

    #[test]
    fn getsym_without_gensym_fails() {
        let form = vec![TemplateNode::Getsym {
            label: "l".into(),
            ordinal: 0,
        }];
        let err = run(&form, &binding(), &mut GensymScope::new()).unwrap_err();
        assert!(matches!(err, CmacroError::UnknownGensym { ordinal: 0, .. }));
    }

    #[test]
    fn template_literals_lose_their_spans() {
        let lit = parse_snippet("{ x; }").unwrap().remove(0);
        assert!(lit.span().is_some());
        let form = vec![TemplateNode::Group(Delimiter::Paren, vec![TemplateNode::Literal(lit)])];
        let site = Site::new(&named_source("t.c", ""), None);
        let b = Binding::new();
        let inst = Instantiation {
            macro_name: "m",
            case: 0,
            binding: &b,
            site: &site,
        };
        let out = instantiate(&form, &inst, &mut GensymScope::new(), &mut GensymAllocator::new("g")).unwrap();
        assert_eq!(out[0].as_group().unwrap().items[0].span(), None);
    }
}
