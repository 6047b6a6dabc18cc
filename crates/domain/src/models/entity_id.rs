//! Loosely-typed identifiers for products, categories and branches.
//!
//! Upstream payloads mix numeric and string identifiers (`7` and `"7"`), so
//! identifiers compare by their canonical text form.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl EntityId {
    /// Canonical text form used for comparison.
    pub fn canonical(&self) -> Cow<'_, str> {
        match self {
            EntityId::Number(n) => Cow::Owned(n.to_string()),
            EntityId::Text(s) => Cow::Borrowed(s.trim()),
        }
    }

    /// True if `self` appears in `ids`.
    pub fn is_in(&self, ids: &[EntityId]) -> bool {
        ids.iter().any(|id| id == self)
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Number(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        EntityId::Number(i64::from(value))
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Text(value)
    }
}
