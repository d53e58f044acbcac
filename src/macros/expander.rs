//! The expansion driver.
//!
//! Rewrites a unit until no macro invocation is left. Each step:
//!
//! 1. **Scanning**: find the leftmost invocation, depth first, starting at
//!    the top-level form where the previous step made its change. Everything
//!    before that point is known to be macro-free. A macro name right after
//!    a type keyword (`int force = 1;`) is a declarator and is left alone;
//!    any other occurrence is an invocation, so a plain variable named like
//!    a macro (`return force;`) still has to match one of its cases.
//! 2. **Matching**: try the macro's cases in declaration order against the
//!    fragments that follow the macro name; the first case that matches a
//!    prefix wins.
//! 3. **Instantiating**: instantiate the case's `toplevel` form (if any) and
//!    insert it before the enclosing top-level form, then replace the
//!    invocation with the instantiated `template` form (empty if absent).
//!
//! The driver stops at a fixpoint (`Done`) or on the first error (`Failed`).
//! The step ceiling turns runaway recursion into `ExpansionDepthExceeded`,
//! and an optional cancellation flag is checked between steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ExpansionConfig;
use crate::errors::{to_source_span, CmacroError, Result, Site, SourceArc};
use crate::macros::hygiene::{GensymAllocator, GensymScope};
use crate::macros::matcher::match_prefix;
use crate::macros::registry::MacroTable;
use crate::macros::template::{instantiate, Instantiation};
use crate::macros::types::{ExpansionContext, MacroDefinition, MacroExpansionStep, OutputForm};
use crate::syntax::printer::render_plain;
use crate::syntax::{covering_span, AtomKind, Delimiter, Fragment, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Scanning,
    Matching,
    Instantiating,
    Done,
    Failed,
}

pub struct ExpansionDriver<'t> {
    table: &'t MacroTable,
    src: SourceArc,
    unit_name: String,
    max_steps: usize,
    gensyms: GensymAllocator,
    cancel: Option<Arc<AtomicBool>>,
    trace: Option<Vec<MacroExpansionStep>>,
    state: DriverState,
    steps: usize,
    /// Span of the last invocation that came from the unit's own text.
    last_site: Option<Span>,
}

/// What one step did, reported back to the top-level loop.
struct Step {
    macro_name: String,
    hoisted: Vec<Fragment>,
    record: Option<MacroExpansionStep>,
}

impl<'t> ExpansionDriver<'t> {
    pub fn new(table: &'t MacroTable, unit_name: &str, src: &SourceArc, config: &ExpansionConfig) -> Self {
        let gensyms = GensymAllocator::new(config.gensym_prefix.clone());
        let gensyms = if config.unit_tags {
            gensyms.with_unit_tag(unit_name)
        } else {
            gensyms
        };
        Self {
            table,
            src: Arc::clone(src),
            unit_name: unit_name.to_string(),
            max_steps: config.max_steps,
            gensyms,
            cancel: None,
            trace: None,
            state: DriverState::Scanning,
            steps: 0,
            last_site: None,
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Records every step for [`take_trace`](Self::take_trace).
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn take_trace(&mut self) -> Vec<MacroExpansionStep> {
        self.trace.take().unwrap_or_default()
    }

    /// Expands `program` to a fixpoint.
    pub fn expand(&mut self, mut items: Vec<Fragment>) -> Result<Vec<Fragment>> {
        let mut idents = Vec::new();
        for item in &items {
            item.for_each_atom(&mut |a| {
                if a.kind == AtomKind::Ident {
                    idents.push(a.text.clone());
                }
            });
        }
        self.gensyms.reserve(idents);

        match self.run(&mut items) {
            Ok(()) => {
                self.state = DriverState::Done;
                tracing::debug!(unit = %self.unit_name, steps = self.steps, "expansion finished");
                Ok(items)
            }
            Err(e) => {
                self.state = DriverState::Failed;
                Err(e)
            }
        }
    }

    fn run(&mut self, items: &mut Vec<Fragment>) -> Result<()> {
        let mut resume = 0;
        'scan: loop {
            self.check_cancelled()?;
            self.state = DriverState::Scanning;

            for top in resume..items.len() {
                let step = if let Some(def) = self.invocation(items, top) {
                    let context = if is_form_start(items, top) {
                        ExpansionContext::Toplevel
                    } else {
                        ExpansionContext::Nested
                    };
                    Some(self.step(items, top, &def, context)?)
                } else if let Fragment::Group(group) = &mut items[top] {
                    self.scan(&mut group.items)?
                } else {
                    None
                };

                let Some(step) = step else { continue };
                let start = form_start(items, top);
                let hoisted = step.hoisted.len();
                items.splice(start..start, step.hoisted);
                if let Some(mut record) = step.record {
                    record.snapshot = render_plain(items);
                    if let Some(trace) = self.trace.as_mut() {
                        trace.push(record);
                    }
                }
                tracing::debug!(
                    step = self.steps,
                    name = %step.macro_name,
                    hoisted,
                    "expanded invocation"
                );
                resume = start;
                continue 'scan;
            }
            return Ok(());
        }
    }

    /// Expands the first invocation inside `items`, searching depth first.
    fn scan(&mut self, items: &mut Vec<Fragment>) -> Result<Option<Step>> {
        for i in 0..items.len() {
            if let Some(def) = self.invocation(items, i) {
                return self.step(items, i, &def, ExpansionContext::Nested).map(Some);
            }
            if let Fragment::Group(group) = &mut items[i] {
                if let Some(step) = self.scan(&mut group.items)? {
                    return Ok(Some(step));
                }
            }
        }
        Ok(None)
    }

    /// The definition `items[i]` invokes, if it names a macro and is not
    /// being declared.
    fn invocation(&self, items: &[Fragment], i: usize) -> Option<Arc<MacroDefinition>> {
        if is_declared_name(items, i) {
            return None;
        }
        items[i]
            .as_ident()
            .and_then(|name| self.table.get(name))
            .cloned()
    }

    /// Matches and rewrites the invocation of `def` whose head is `seq[at]`.
    fn step(
        &mut self,
        seq: &mut Vec<Fragment>,
        at: usize,
        def: &MacroDefinition,
        context: ExpansionContext,
    ) -> Result<Step> {
        let name = def.name.clone();
        if let Some(span) = seq[at].span() {
            self.last_site = Some(span);
        }
        if self.steps >= self.max_steps {
            return Err(CmacroError::ExpansionDepthExceeded {
                limit: self.max_steps,
                macro_name: name,
                src: Arc::clone(&self.src),
                span: to_source_span(self.last_site.unwrap_or_default()),
            });
        }
        self.steps += 1;

        self.state = DriverState::Matching;
        let args = &seq[at + 1..];
        let mut failures = Vec::new();
        let mut matched = None;
        for (index, case) in def.cases.iter().enumerate() {
            match match_prefix(&case.pattern, args) {
                Ok((binding, consumed)) => {
                    matched = Some((index, case, binding, consumed));
                    break;
                }
                Err(failure) => {
                    tracing::trace!(name = %name, case = index + 1, %failure, "case did not match");
                    failures.push(format!("case {}: {}", index + 1, failure));
                }
            }
        }
        let Some((case_index, case, binding, consumed)) = matched else {
            return Err(CmacroError::NoMatchingCase {
                macro_name: name,
                src: Arc::clone(&self.src),
                span: to_source_span(self.site_span(&seq[at..=at])),
                help: Some(failures.join("\n")),
            });
        };

        self.state = DriverState::Instantiating;
        let invocation = &seq[at..=at + consumed];
        let site = Site::new(&self.src, Some(self.site_span(invocation)));
        let inst = Instantiation {
            macro_name: &name,
            case: case_index,
            binding: &binding,
            site: &site,
        };
        let mut scope = GensymScope::new();
        let mut output_of = |form: OutputForm| match case.form(form) {
            Some(nodes) => instantiate(nodes, &inst, &mut scope, &mut self.gensyms),
            None => Ok(Vec::new()),
        };
        let hoisted = output_of(OutputForm::Toplevel)?;
        let output = output_of(OutputForm::Template)?;

        let record = self.trace.is_some().then(|| MacroExpansionStep {
            macro_name: name.clone(),
            case_index,
            context,
            input: render_plain(invocation).trim_end().to_string(),
            output: render_plain(&output).trim_end().to_string(),
            hoisted: (!hoisted.is_empty()).then(|| render_plain(&hoisted).trim_end().to_string()),
            snapshot: String::new(),
        });

        seq.splice(at..=at + consumed, output);
        Ok(Step {
            macro_name: name,
            hoisted,
            record,
        })
    }

    fn site_span(&self, invocation: &[Fragment]) -> Span {
        covering_span(invocation)
            .or(self.last_site)
            .unwrap_or_default()
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(CmacroError::Cancelled {
                unit: self.unit_name.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Words after which an identifier is being declared, not invoked.
const TYPE_KEYWORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool",
    "struct", "union", "enum", "const", "volatile", "static", "extern", "register", "typedef",
];

/// True when `items[i]` begins a top-level declaration or statement.
fn is_form_start(items: &[Fragment], i: usize) -> bool {
    match i.checked_sub(1) {
        None => true,
        Some(j) => {
            let prev = &items[j];
            prev.is_atom(";") || prev.is_directive() || ends_form(items, j)
        }
    }
}

/// True when the brace group `items[j]` closes a form on its own: a function
/// body, or a block that itself starts a form. The brace of `struct P { .. } p`
/// or `= { .. }` leaves the declaration open.
fn ends_form(items: &[Fragment], j: usize) -> bool {
    if !items[j].is_group_of(Delimiter::Brace) {
        return false;
    }
    match j.checked_sub(1).map(|k| &items[k]) {
        Some(before) if before.is_group_of(Delimiter::Paren) => true,
        Some(before) if before.is_atom("else") || before.is_atom("do") => true,
        _ => is_form_start(items, j),
    }
}

/// True when `items[i]` directly follows a type keyword, as in `int force = 1;`.
fn is_declared_name(items: &[Fragment], i: usize) -> bool {
    i.checked_sub(1)
        .and_then(|j| items[j].as_ident())
        .is_some_and(|prev| TYPE_KEYWORDS.contains(&prev))
}

/// Index of the top-level form that contains `items[i]`.
fn form_start(items: &[Fragment], i: usize) -> usize {
    (0..=i).rev().find(|&j| is_form_start(items, j)).unwrap_or(0)
}
