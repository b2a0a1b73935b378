//! Explorer configuration.

use crate::db::DbOptions;
use std::path::PathBuf;

/// Schema used to decode stored values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaConfig {
    /// Compiled descriptor sets (`protoc --descriptor_set_out`).
    pub descriptor_sets: Vec<PathBuf>,

    /// Fully-qualified message name, e.g. `acme.weather.v1.Units`.
    pub message_type: String,
}

/// Explorer configuration.
#[derive(Clone, Debug)]
pub struct ExplorerConfig {
    /// Location of the store file.
    pub path: PathBuf,

    /// Whether to create the store file if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether every commit is fsynced before it becomes visible.
    pub sync_on_commit: bool,

    /// Descriptor sets for schema decoding.
    pub descriptor_sets: Vec<PathBuf>,

    /// Message type for schema decoding.
    pub message_type: Option<String>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./store.db"),
            create_if_missing: true,
            sync_on_commit: true,
            descriptor_sets: Vec::new(),
            message_type: None,
        }
    }
}

impl ExplorerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Decode values as `message_type` using the given descriptor sets.
    pub fn with_schema(
        mut self,
        descriptor_sets: impl IntoIterator<Item = impl Into<PathBuf>>,
        message_type: impl Into<String>,
    ) -> Self {
        self.descriptor_sets = descriptor_sets.into_iter().map(Into::into).collect();
        self.message_type = Some(message_type.into());
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// The schema, if both descriptor sets and a message type are set.
    pub fn schema(&self) -> Option<SchemaConfig> {
        match &self.message_type {
            Some(message_type) if !message_type.is_empty() && !self.descriptor_sets.is_empty() => {
                Some(SchemaConfig {
                    descriptor_sets: self.descriptor_sets.clone(),
                    message_type: message_type.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            create_if_missing: self.create_if_missing,
            sync_on_commit: self.sync_on_commit,
        }
    }
}
