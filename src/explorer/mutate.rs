//! Mutations. Each call is one write transaction: it either applies in
//! full or leaves the store untouched.

use super::Explorer;
use crate::codec::encode_value;
use crate::error::{Result, StoreError};
use crate::resolve::resolve_mut;
use crate::types::Pair;
use tracing::debug;

impl Explorer {
    /// Create buckets under `level` (the root when empty).
    ///
    /// Any name already used by a bucket or pair in that scope, including an
    /// earlier name in the same batch, fails the whole batch.
    pub fn create_buckets(&self, level: &[String], names: &[String]) -> Result<()> {
        self.db()?.update(|tx| {
            let mut bucket = resolve_mut(tx, level)?;
            for name in names {
                bucket.create_bucket(name.as_bytes())?;
            }
            Ok(())
        })?;

        debug!(level = ?level, count = names.len(), "created buckets");
        Ok(())
    }

    /// Store pairs under `level`, overwriting existing values.
    ///
    /// Pairs need a parent bucket, and a key may not name an existing bucket.
    pub fn add_pairs(&self, level: &[String], pairs: &[Pair]) -> Result<()> {
        if level.is_empty() {
            return Err(StoreError::InvalidOperation(
                "cannot create key/value pairs without a parent bucket".into(),
            ));
        }

        self.db()?.update(|tx| {
            let mut bucket = resolve_mut(tx, level)?;
            for pair in pairs {
                let value = encode_value(&pair.value)?;
                bucket.put(pair.key.as_bytes(), value)?;
            }
            Ok(())
        })?;

        debug!(level = ?level, count = pairs.len(), "added pairs");
        Ok(())
    }

    /// Delete `name` under `level`.
    ///
    /// Below the root, a bucket is removed with everything inside it and a
    /// pair is removed on its own; an absent pair is not an error. At the
    /// root, `name` must be an existing top-level bucket.
    pub fn delete(&self, level: &[String], name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StoreError::InvalidOperation("name required".into()));
        }

        self.db()?.update(|tx| {
            let mut bucket = resolve_mut(tx, level)?;
            let target = bucket.view()?.bucket(name.as_bytes()).map(|b| b.totals());

            match target {
                Some((buckets, pairs)) => {
                    debug!(level = ?level, name, buckets, pairs, "deleting bucket");
                    bucket.delete_bucket(name.as_bytes())
                }
                None if bucket.is_root() => Err(StoreError::not_found(name, level)),
                None => bucket.delete(name.as_bytes()),
            }
        })
    }

    /// Rename the pair `old_key` to `new_key` under `level`.
    ///
    /// Buckets cannot be renamed. An existing pair under `new_key` is
    /// overwritten.
    pub fn rename(&self, level: &[String], old_key: &str, new_key: &str) -> Result<()> {
        if level.is_empty() {
            return Err(StoreError::InvalidOperation("path required".into()));
        }

        self.db()?.update(|tx| {
            let mut bucket = resolve_mut(tx, level)?;
            let value = bucket
                .get(old_key.as_bytes())?
                .ok_or_else(|| StoreError::not_found(old_key, level))?;

            if old_key == new_key {
                return Ok(());
            }

            bucket.put(new_key.as_bytes(), value)?;
            bucket.delete(old_key.as_bytes())
        })?;

        debug!(level = ?level, old_key, new_key, "renamed pair");
        Ok(())
    }

    /// Replace the value of the existing pair `key` under `level`.
    pub fn update_value(
        &self,
        level: &[String],
        key: &str,
        new_value: &serde_json::Value,
    ) -> Result<()> {
        if level.is_empty() {
            return Err(StoreError::InvalidOperation("path required".into()));
        }

        self.db()?.update(|tx| {
            let mut bucket = resolve_mut(tx, level)?;
            if bucket.get(key.as_bytes())?.is_none() {
                return Err(StoreError::not_found(key, level));
            }

            let value = encode_value(new_value)?;
            bucket.put(key.as_bytes(), value)
        })?;

        debug!(level = ?level, key, "updated pair value");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplorerConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn level(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn explorer(dir: &TempDir) -> Explorer {
        Explorer::open(ExplorerConfig::new(dir.path().join("store.db"))).unwrap()
    }

    #[test]
    fn test_rename_same_key_keeps_value() {
        let dir = TempDir::new().unwrap();
        let explorer = explorer(&dir);
        explorer.create_buckets(&[], &level(&["b"])).unwrap();
        explorer
            .add_pairs(&level(&["b"]), &[Pair::new("k", json!(1))])
            .unwrap();

        explorer.rename(&level(&["b"]), "k", "k").unwrap();

        let listed = explorer.list(&level(&["b"]), "").unwrap();
        assert_eq!(listed.get("k").unwrap().value, "1");
    }

    #[test]
    fn test_rename_onto_bucket_rejected() {
        let dir = TempDir::new().unwrap();
        let explorer = explorer(&dir);
        explorer.create_buckets(&[], &level(&["b"])).unwrap();
        explorer
            .create_buckets(&level(&["b"]), &level(&["sub"]))
            .unwrap();
        explorer
            .add_pairs(&level(&["b"]), &[Pair::new("k", json!("v"))])
            .unwrap();

        let result = explorer.rename(&level(&["b"]), "k", "sub");
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));

        let listed = explorer.list(&level(&["b"]), "").unwrap();
        assert_eq!(listed.names(), vec!["k", "sub"]);
    }

    #[test]
    fn test_update_value_of_bucket_is_not_found() {
        let dir = TempDir::new().unwrap();
        let explorer = explorer(&dir);
        explorer.create_buckets(&[], &level(&["b"])).unwrap();
        explorer
            .create_buckets(&level(&["b"]), &level(&["sub"]))
            .unwrap();

        let result = explorer.update_value(&level(&["b"]), "sub", &json!(1));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_delete_empty_name() {
        let dir = TempDir::new().unwrap();
        let explorer = explorer(&dir);

        let result = explorer.delete(&[], "");
        assert!(matches!(result, Err(StoreError::InvalidOperation(_))));
    }
}
