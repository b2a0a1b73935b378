//! Error types for the bucket store.

use std::fmt;
use thiserror::Error;

/// Main error type for store and explorer operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No bucket or key found by the name {name:?} under {level}")]
    NotFound { name: String, level: Level },

    #[error("{name:?} already exists under {level}")]
    AlreadyExists { name: String, level: Level },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    pub(crate) fn not_found(name: impl Into<String>, level: &[String]) -> Self {
        StoreError::NotFound {
            name: name.into(),
            level: Level(level.to_vec()),
        }
    }

    pub(crate) fn already_exists(name: impl Into<String>, level: &[String]) -> Self {
        StoreError::AlreadyExists {
            name: name.into(),
            level: Level(level.to_vec()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// The already-resolved breadcrumb carried by `NotFound` and `AlreadyExists`.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Level(pub Vec<String>);

impl Level {
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Level({:?})", self.0)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "root")
        } else {
            write!(f, "/{}", self.0.join("/"))
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
