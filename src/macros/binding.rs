//! Binding environment: what each pattern variable captured.
//!
//! A binding is an ordered map from variable name to either one fragment or a
//! sequence of fragments. `rest` captures and multi-fragment untagged captures
//! (`f(x)`, `typeof(e)`) are sequences; everything else is a single fragment.

use crate::syntax::Fragment;

/// A captured value.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    One(Fragment),
    Seq(Vec<Fragment>),
}

impl Bound {
    /// The captured fragments, in order.
    pub fn fragments(&self) -> &[Fragment] {
        match self {
            Bound::One(f) => std::slice::from_ref(f),
            Bound::Seq(items) => items,
        }
    }

    /// The single atom text this value consists of, if it is exactly one atom.
    pub fn atom_text(&self) -> Option<&str> {
        match self.fragments() {
            [Fragment::Atom(a)] => Some(&a.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    entries: Vec<(String, Bound)>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_one(&mut self, name: impl Into<String>, fragment: Fragment) {
        self.insert(name.into(), Bound::One(fragment));
    }

    pub fn bind_seq(&mut self, name: impl Into<String>, fragments: Vec<Fragment>) {
        self.insert(name.into(), Bound::Seq(fragments));
    }

    // Pattern variable names are unique per case (checked at load time), so a
    // rebind only happens if a caller reuses a binding.
    fn insert(&mut self, name: String, value: Bound) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Bound> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Delimiter;

    #[test]
    fn keeps_insertion_order() {
        let mut binding = Binding::new();
        binding.bind_one("b", Fragment::ident("x"));
        binding.bind_seq("a", vec![]);
        assert_eq!(binding.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(binding.len(), 2);
    }

    #[test]
    fn lookup_misses_unknown_names() {
        let binding = Binding::new();
        assert!(binding.get("x").is_none());
        assert!(binding.is_empty());
    }

    #[test]
    fn atom_text_requires_exactly_one_atom() {
        assert_eq!(Bound::One(Fragment::ident("x")).atom_text(), Some("x"));
        assert_eq!(Bound::Seq(vec![Fragment::ident("x")]).atom_text(), Some("x"));
        let group = Fragment::group(Delimiter::Paren, vec![]);
        assert_eq!(Bound::One(group).atom_text(), None);
        assert_eq!(
            Bound::Seq(vec![Fragment::ident("a"), Fragment::ident("b")]).atom_text(),
            None
        );
    }
}
