use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("type name is empty")]
    Empty,
    #[error("type name {name:?} contains invalid character {ch:?}")]
    InvalidChar { name: String, ch: char },
}

/// Case-insensitive join key between manifest entries and module exports.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Validated type identity such as `Jobs.Invoice`.
///
/// Equality, hashing and ordering all use [`normalize`]; the spelling that was
/// parsed is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeKey {
    display: String,
    normalized: String,
}

impl TypeKey {
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let display = raw.trim();
        if display.is_empty() {
            return Err(KeyError::Empty);
        }

        if let Some(ch) = display
            .chars()
            .find(|c| *c == ';' || c.is_whitespace() || c.is_control())
        {
            return Err(KeyError::InvalidChar {
                name: display.to_string(),
                ch,
            });
        }

        Ok(Self {
            display: display.to_string(),
            normalized: normalize(display),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn matches(&self, other: &str) -> bool {
        self.normalized == normalize(other)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl std::str::FromStr for TypeKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TypeKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TypeKey> for String {
    fn from(key: TypeKey) -> String {
        key.display
    }
}

/// Identifier of a category: its normalized `/`-separated path.
///
/// The root category has the empty path. Because the id is derived from the
/// name, a module can compute the id of `"Billing"` without seeing the
/// manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(path: &str) -> Self {
        let segments: Vec<String> = path
            .split('/')
            .map(normalize)
            .filter(|s| !s.is_empty())
            .collect();
        Self(segments.join("/"))
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parent(&self) -> Option<CategoryId> {
        if self.is_root() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some((parent, _)) => Some(Self(parent.to_string())),
            None => Some(Self::root()),
        }
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<String> for CategoryId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<CategoryId> for String {
    fn from(id: CategoryId) -> String {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_type_key_case_insensitive() {
        let a = TypeKey::parse("Jobs.Invoice").unwrap();
        let b = TypeKey::parse("  jobs.INVOICE ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Jobs.Invoice");
        assert_eq!(b.as_str(), "jobs.INVOICE");

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_type_key_matches_raw_names() {
        let key = TypeKey::parse("Repo.Invoice").unwrap();
        assert_eq!(key.normalized(), "repo.invoice");
        assert!(key.matches(" REPO.invoice "));
        assert!(!key.matches("Repo.Invoices"));
        assert_eq!(normalize("  Jobs.X "), "jobs.x");
    }

    #[test]
    fn test_type_key_rejects_bad_names() {
        assert_eq!(TypeKey::parse("   "), Err(KeyError::Empty));
        assert!(matches!(
            TypeKey::parse("Jobs.A;B"),
            Err(KeyError::InvalidChar { ch: ';', .. })
        ));
        assert!(TypeKey::parse("Jobs Invoice").is_err());
    }

    #[test]
    fn test_type_key_serde_keeps_spelling() {
        let key = TypeKey::parse("Repo.Invoice").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"Repo.Invoice\"");
        let back: TypeKey = serde_json::from_str("\"repo.invoice\"").unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<TypeKey>("\"\"").is_err());
    }

    #[test]
    fn test_category_id_paths() {
        let id = CategoryId::new(" Sales / Orders/ ");
        assert_eq!(id.as_str(), "sales/orders");
        assert_eq!(id.parent(), Some(CategoryId::new("sales")));
        assert_eq!(CategoryId::new("Sales").parent(), Some(CategoryId::root()));
        assert_eq!(CategoryId::root().parent(), None);
        assert_eq!(CategoryId::root().to_string(), "/");
        assert!(CategoryId::new("//").is_root());
    }
}
