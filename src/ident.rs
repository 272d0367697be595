use crate::span::Span;
use std::cmp::{Ord, Ordering};
use std::hash::{Hash, Hasher};
use unicode_normalization::UnicodeNormalization;

/// The key an identifier occupies a scope under: NFC-normalized and
/// case-folded, so `Counter` and `counter` collide.
pub type IdKey = String;

pub fn id_key(name: &str) -> IdKey {
    name.nfc().collect::<String>().to_lowercase()
}

pub fn path_key(path: &[String]) -> Vec<IdKey> {
    path.iter().map(|part| id_key(part)).collect()
}

pub fn path_to_string(path: &[String]) -> String {
    path.join("::")
}

#[derive(Debug, Clone)]
pub struct Ident {
    pub name: String,
    pub span: Span,
    key: IdKey,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Ident {
        let name = name.into();
        let key = id_key(&name);
        Ident { name, span, key }
    }

    pub fn builtin(name: &str) -> Ident {
        Ident::new(name, Span::builtin())
    }

    pub fn key(&self) -> &IdKey {
        &self.key
    }
}

// Custom implementation of Hash so that namespacing isn't reliant on the span
// itself, which will often be different, and so that lookups go through the
// folded key rather than the raw spelling.
impl Hash for Ident {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Ident {}

impl Ord for Ident {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for Ident {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folding_collides_case_variants() {
        assert_eq!(id_key("Counter"), id_key("counter"));
        // Composed vs decomposed e-acute normalize to the same key.
        assert_eq!(id_key("\u{e9}clair"), id_key("e\u{301}clair"));
    }

    #[test]
    fn idents_compare_by_key() {
        let a = Ident::builtin("Counter");
        let b = Ident::builtin("counter");
        assert_eq!(a, b);
    }
}
