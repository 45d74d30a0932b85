//! Qualified names compared case-insensitively but displayed case-preserved.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use sqlparser::ast::ObjectName;

/// The lowercase, dot-joined form of a [`QualifiedName`], used as every
/// catalog and graph map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalName(String);

impl CanonicalName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CanonicalName {
    fn from(s: &str) -> Self {
        CanonicalName(s.to_lowercase())
    }
}

/// An ordered, case-preserved identifier path (`dataset.table`,
/// `project.dataset.function`, ...). Length is always >= 1.
///
/// Equality, hashing, and ordering all go through the case-insensitive
/// [`CanonicalName`] form, per the data model's "compared case-insensitively
/// when used as a key" invariant; the original casing is retained only for
/// display.
#[derive(Debug, Clone)]
pub struct QualifiedName(Vec<String>);

impl QualifiedName {
    pub fn new(parts: Vec<String>) -> Self {
        assert!(!parts.is_empty(), "qualified name must have at least one part");
        QualifiedName(parts)
    }

    pub fn single(part: impl Into<String>) -> Self {
        QualifiedName(vec![part.into()])
    }

    pub fn from_object_name(name: &ObjectName) -> Self {
        let parts: Vec<String> = name.0.iter().map(|part| part.to_string()).collect();
        QualifiedName::new(parts)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn canonical(&self) -> CanonicalName {
        CanonicalName(
            self.0
                .iter()
                .map(|p| p.to_lowercase())
                .collect::<Vec<_>>()
                .join("."),
        )
    }

    /// The final path segment, case-preserved (e.g. the bare table name).
    pub fn last_part(&self) -> &str {
        self.0.last().expect("non-empty")
    }

    pub fn display(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl PartialEq for QualifiedName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for QualifiedName {}

impl Hash for QualifiedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl PartialOrd for QualifiedName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QualifiedName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_is_lowercase_dot_joined() {
        let q = QualifiedName::new(vec!["Proj".into(), "Dataset".into(), "Table".into()]);
        assert_eq!(q.canonical().as_str(), "proj.dataset.table");
        assert_eq!(q.display(), "Proj.Dataset.Table");
    }

    #[test]
    fn equality_is_case_insensitive() {
        let a = QualifiedName::single("Users");
        let b = QualifiedName::single("users");
        assert_eq!(a, b);

        let mut set = std::collections::BTreeSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn different_names_are_not_equal() {
        assert_ne!(QualifiedName::single("a"), QualifiedName::single("b"));
    }
}
