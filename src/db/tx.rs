//! Read and write transactions.
//!
//! A `ReadTx` pins one committed root. A `WriteTx` owns a private working
//! copy of the root plus the list of operations applied to it; the store
//! either publishes both (commit) or drops both (rollback).

use super::bucket::{Bucket, Child};
use super::log::LogOp;
use crate::error::{Result, StoreError};
use std::sync::Arc;

/// Largest accepted key or bucket name.
pub const MAX_KEY_SIZE: usize = 32 * 1024;

/// Largest accepted value.
pub const MAX_VALUE_SIZE: usize = (1 << 31) - 2;

/// A consistent, read-only snapshot of the store.
pub struct ReadTx {
    root: Arc<Bucket>,
    seq: u64,
}

impl ReadTx {
    pub(crate) fn new(root: Arc<Bucket>, seq: u64) -> Self {
        Self { root, seq }
    }

    /// The root scope. It only ever holds buckets.
    pub fn root(&self) -> &Bucket {
        &self.root
    }

    /// Sequence number of the last commit visible to this transaction.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// An exclusive read-write transaction.
pub struct WriteTx {
    root: Arc<Bucket>,
    seq: u64,
    ops: Vec<LogOp>,
}

impl WriteTx {
    pub(crate) fn new(root: Arc<Bucket>, seq: u64) -> Self {
        Self {
            root,
            seq,
            ops: Vec::new(),
        }
    }

    /// The working tree, including changes made so far.
    pub fn root(&self) -> &Bucket {
        &self.root
    }

    /// Sequence number this transaction started from.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Mutable handle on the root scope.
    pub fn root_mut(&mut self) -> BucketMut<'_> {
        BucketMut {
            tx: self,
            path: Vec::new(),
        }
    }

    /// Whether anything has been written.
    pub fn is_dirty(&self) -> bool {
        !self.ops.is_empty()
    }

    /// Handle on a bucket path the caller has already resolved.
    pub(crate) fn handle(&mut self, path: Vec<Vec<u8>>) -> BucketMut<'_> {
        BucketMut { tx: self, path }
    }

    pub(crate) fn into_parts(self) -> (Arc<Bucket>, Vec<LogOp>) {
        (self.root, self.ops)
    }

    /// Re-apply a logged operation (replay on open).
    pub(crate) fn apply(&mut self, op: LogOp) -> Result<()> {
        match op {
            LogOp::CreateBucket { path, name } => self.handle(path).create_bucket(&name),
            LogOp::DeleteBucket { path, name } => self.handle(path).delete_bucket(&name),
            LogOp::Put { path, key, value } => self.handle(path).put(&key, value),
            LogOp::Delete { path, key } => self.handle(path).delete(&key),
        }
    }

    fn node(&self, path: &[Vec<u8>]) -> Result<&Bucket> {
        let mut node = self.root.as_ref();
        for name in path {
            node = node.bucket(name).ok_or_else(|| vanished(name))?;
        }
        Ok(node)
    }

    fn node_mut(&mut self, path: &[Vec<u8>]) -> Result<&mut Bucket> {
        let mut node = Arc::make_mut(&mut self.root);
        for name in path {
            node = node.bucket_mut(name).ok_or_else(|| vanished(name))?;
        }
        Ok(node)
    }
}

fn vanished(name: &[u8]) -> StoreError {
    StoreError::Transaction(format!(
        "bucket {:?} no longer exists in this transaction",
        String::from_utf8_lossy(name)
    ))
}

/// A bucket opened for writing, valid for the life of its transaction.
pub struct BucketMut<'tx> {
    tx: &'tx mut WriteTx,
    path: Vec<Vec<u8>>,
}

impl<'tx> BucketMut<'tx> {
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Read access to the bucket's current contents.
    pub fn view(&self) -> Result<&Bucket> {
        self.tx.node(&self.path)
    }

    /// Copy of the value under `key`. Buckets and absent keys yield `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.view()?.get(key).map(<[u8]>::to_vec))
    }

    /// Open a nested bucket for writing.
    pub fn bucket(&mut self, name: &[u8]) -> Result<BucketMut<'_>> {
        if self.view()?.bucket(name).is_none() {
            return Err(StoreError::not_found(
                String::from_utf8_lossy(name),
                &self.level(),
            ));
        }

        let mut path = self.path.clone();
        path.push(name.to_vec());
        Ok(BucketMut {
            tx: &mut *self.tx,
            path,
        })
    }

    /// Create an empty nested bucket. Fails if any child already uses `name`.
    pub fn create_bucket(&mut self, name: &[u8]) -> Result<()> {
        check_name(name, "bucket name")?;

        let node = self.tx.node_mut(&self.path)?;
        if !node.insert_bucket(name.to_vec()) {
            return Err(StoreError::already_exists(
                String::from_utf8_lossy(name),
                &self.level(),
            ));
        }

        self.record(LogOp::CreateBucket {
            path: self.path.clone(),
            name: name.to_vec(),
        });
        Ok(())
    }

    /// Remove a nested bucket and everything under it.
    pub fn delete_bucket(&mut self, name: &[u8]) -> Result<()> {
        match self.view()?.kind_of(name) {
            Some(true) => {}
            Some(false) => {
                return Err(StoreError::InvalidOperation(format!(
                    "{:?} is a key/value pair, not a bucket",
                    String::from_utf8_lossy(name)
                )))
            }
            None => {
                return Err(StoreError::not_found(
                    String::from_utf8_lossy(name),
                    &self.level(),
                ))
            }
        }

        self.tx.node_mut(&self.path)?.remove(name);
        self.record(LogOp::DeleteBucket {
            path: self.path.clone(),
            name: name.to_vec(),
        });
        Ok(())
    }

    /// Insert or overwrite a pair.
    pub fn put(&mut self, key: &[u8], value: impl Into<Arc<[u8]>>) -> Result<()> {
        let value = value.into();
        if self.is_root() {
            return Err(StoreError::InvalidOperation(
                "key/value pairs cannot be stored at the root".into(),
            ));
        }
        check_name(key, "key")?;
        if value.len() > MAX_VALUE_SIZE {
            return Err(StoreError::InvalidOperation("value too large".into()));
        }
        if self.view()?.bucket(key).is_some() {
            return Err(StoreError::already_exists(
                String::from_utf8_lossy(key),
                &self.level(),
            ));
        }

        self.tx
            .node_mut(&self.path)?
            .insert_value(key.to_vec(), Arc::clone(&value));
        self.record(LogOp::Put {
            path: self.path.clone(),
            key: key.to_vec(),
            value,
        });
        Ok(())
    }

    /// Remove a pair. Removing an absent key is a no-op.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        if self.is_root() {
            return Err(StoreError::InvalidOperation(
                "the root holds only buckets".into(),
            ));
        }

        match self.view()?.kind_of(key) {
            None => return Ok(()),
            Some(true) => {
                return Err(StoreError::InvalidOperation(format!(
                    "{:?} is a bucket, not a key/value pair",
                    String::from_utf8_lossy(key)
                )))
            }
            Some(false) => {}
        }

        let removed = self.tx.node_mut(&self.path)?.remove(key);
        debug_assert!(matches!(removed, Some(Child::Value(_))));
        self.record(LogOp::Delete {
            path: self.path.clone(),
            key: key.to_vec(),
        });
        Ok(())
    }

    /// Path as display strings, for error attribution.
    fn level(&self) -> Vec<String> {
        self.path
            .iter()
            .map(|segment| String::from_utf8_lossy(segment).into_owned())
            .collect()
    }

    fn record(&mut self, op: LogOp) {
        tracing::trace!(?op, "write op");
        self.tx.ops.push(op);
    }
}

impl Bucket {
    /// `Some(true)` for a bucket, `Some(false)` for a pair, `None` if absent.
    fn kind_of(&self, name: &[u8]) -> Option<bool> {
        if !self.contains(name) {
            None
        } else {
            Some(self.bucket(name).is_some())
        }
    }
}

fn check_name(name: &[u8], what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidOperation(format!("{what} required")));
    }
    if name.len() > MAX_KEY_SIZE {
        return Err(StoreError::InvalidOperation(format!("{what} too large")));
    }
    Ok(())
}
