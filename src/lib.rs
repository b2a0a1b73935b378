//! # bucketview
//!
//! Browse and edit a single-file store of nested buckets.
//!
//! ## Core Concepts
//!
//! - **Buckets**: named containers that nest arbitrarily deep
//! - **Pairs**: key/value leaves inside a bucket, stored as JSON
//! - **Level stack**: the chain of bucket names from the root to a target
//! - **Value codec**: how stored bytes are rendered (text or protobuf)
//!
//! Every operation runs in exactly one transaction. Reads see a consistent
//! snapshot; writes are serialized and all-or-nothing.
//!
//! ## Example
//!
//! ```ignore
//! use bucketview::{Explorer, ExplorerConfig, Pair};
//! use serde_json::json;
//!
//! let explorer = Explorer::open(ExplorerConfig::new("./app.db"))?;
//!
//! explorer.create_buckets(&[], &["users".into()])?;
//! explorer.add_pairs(&["users".into()], &[Pair::new("alice", json!({"age": 30}))])?;
//!
//! let listing = explorer.list(&["users".into()], "ali")?;
//! assert_eq!(listing.results[0].value, r#"{"age":30}"#);
//! ```

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod explorer;
pub mod resolve;
pub mod types;

// Re-exports
pub use codec::{encode_value, DecodeFn, ValueCodec};
pub use config::{ExplorerConfig, SchemaConfig};
pub use db::{
    Bucket, BucketMut, ChildRef, Db, DbOptions, DbStats, ReadTx, WriteTx, MAX_KEY_SIZE,
    MAX_VALUE_SIZE,
};
pub use error::{Level, Result, StoreError};
pub use explorer::{Explorer, LIST_LIMIT};
pub use resolve::{resolve, resolve_mut};
pub use types::{ListResult, ListedItem, Pair};

/// Current crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
