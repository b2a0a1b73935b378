//! Request and response types exchanged with callers.

use serde::{Deserialize, Serialize};

/// One child of a listed bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedItem {
    pub name: String,
    pub is_bucket: bool,
    /// Decoded value for pairs; empty for buckets.
    pub value: String,
    /// Immediate child buckets (buckets only).
    pub child_buckets: usize,
    /// Immediate key/value pairs (buckets only).
    pub pairs: usize,
}

impl ListedItem {
    pub fn bucket(name: String, child_buckets: usize, pairs: usize) -> Self {
        Self {
            name,
            is_bucket: true,
            value: String::new(),
            child_buckets,
            pairs,
        }
    }

    pub fn pair(name: String, value: String) -> Self {
        Self {
            name,
            is_bucket: false,
            value,
            child_buckets: 0,
            pairs: 0,
        }
    }
}

/// Outcome of one listing call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    /// The bucket path that was listed.
    pub level: Vec<String>,
    pub search_key: String,
    pub results: Vec<ListedItem>,
    /// More children matched than the listing limit allows.
    pub exceeds_limit: bool,
}

impl ListResult {
    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|item| item.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ListedItem> {
        self.results.iter().find(|item| item.name == name)
    }
}

/// A key and the structured value to store under it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub key: String,
    pub value: serde_json::Value,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}
