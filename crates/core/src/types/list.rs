//! Shared shopping list models

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a shopping list, assigned by the remote store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListId(String);

impl ListId {
    /// Creates a new random ListId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a ListId from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the ListId as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ListId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ListId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One shared list, joined by others through its share code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingList {
    pub id: ListId,
    pub name: String,
    /// Short capability token others use to join
    pub share_code: String,
    pub created_at: Timestamp,
}

impl ShoppingList {
    /// Creates a list with a fresh id
    pub fn new(name: impl Into<String>, share_code: impl Into<String>) -> Self {
        Self {
            id: ListId::new(),
            name: name.into(),
            share_code: share_code.into(),
            created_at: Timestamp::now(),
        }
    }

    /// Share codes are compared without regard to case or surrounding space
    pub fn matches_share_code(&self, code: &str) -> bool {
        self.share_code.eq_ignore_ascii_case(code.trim())
    }
}
