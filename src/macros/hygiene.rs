//! Fresh identifier generation.
//!
//! [`GensymAllocator`] hands out names of the form `<prefix>_<label>_<n>`, or
//! `<prefix>_<label>_<tag>_<n>` when a unit tag is set. One allocator lives in
//! each expansion driver, so counters never leak between units. Names that
//! already occur as identifiers in the unit are skipped.
//!
//! [`GensymScope`] is the per-invocation table behind `@gensym`/`@getsym`: the
//! k-th `@gensym label` of any form of one invocation maps to the same name.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct GensymAllocator {
    prefix: String,
    tag: Option<String>,
    counter: usize,
    reserved: HashSet<String>,
}

impl GensymAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            tag: None,
            counter: 0,
            reserved: HashSet::new(),
        }
    }

    /// Mixes a hash of `unit_name` into every generated name.
    pub fn with_unit_tag(mut self, unit_name: &str) -> Self {
        self.tag = Some(unit_tag(unit_name));
        self
    }

    /// Marks names as taken.
    pub fn reserve<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(names.into_iter().map(Into::into));
    }

    /// Returns a name no earlier call returned and no reserved name equals.
    pub fn fresh(&mut self, label: &str) -> String {
        let label = sanitize(label);
        loop {
            let name = match &self.tag {
                Some(tag) => format!("{}_{}_{}_{}", self.prefix, label, tag, self.counter),
                None => format!("{}_{}_{}", self.prefix, label, self.counter),
            };
            self.counter += 1;
            if self.reserved.insert(name.clone()) {
                return name;
            }
        }
    }

    /// Number of names generated so far, counting skipped ones.
    pub fn counter(&self) -> usize {
        self.counter
    }
}

/// First eight hex digits of the SHA-256 of `unit_name`.
pub fn unit_tag(unit_name: &str) -> String {
    let digest = Sha256::digest(unit_name.as_bytes());
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Symbols generated while expanding one invocation, keyed by label and
/// ordinal.
#[derive(Debug, Clone, Default)]
pub struct GensymScope {
    symbols: HashMap<(String, usize), String>,
}

impl GensymScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// The name for the `ordinal`-th `@gensym label`, allocating it on first
    /// use.
    pub fn gensym(&mut self, label: &str, ordinal: usize, allocator: &mut GensymAllocator) -> String {
        self.symbols
            .entry((label.to_string(), ordinal))
            .or_insert_with(|| allocator.fresh(label))
            .clone()
    }

    pub fn getsym(&self, label: &str, ordinal: usize) -> Option<&str> {
        self.symbols
            .get(&(label.to_string(), ordinal))
            .map(String::as_str)
    }
}
