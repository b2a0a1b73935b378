//! Path resolution: from a level stack to a bucket inside one transaction.
//!
//! The walk is repeated for every call; bucket references never outlive the
//! transaction that produced them.

use crate::db::{Bucket, BucketMut, WriteTx};
use crate::error::{Result, StoreError};

/// Walk `level` from `root`. An empty level is the root itself.
///
/// A missing segment fails with `NotFound` naming that segment and the
/// segments already resolved before it.
pub fn resolve<'tx>(root: &'tx Bucket, level: &[String]) -> Result<&'tx Bucket> {
    let mut current = root;
    for (depth, name) in level.iter().enumerate() {
        current = current
            .bucket(name.as_bytes())
            .ok_or_else(|| StoreError::not_found(name.as_str(), &level[..depth]))?;
    }
    Ok(current)
}

/// Resolve `level` inside a write transaction and open it for writing.
pub fn resolve_mut<'tx>(tx: &'tx mut WriteTx, level: &[String]) -> Result<BucketMut<'tx>> {
    resolve(tx.root(), level)?;
    let path = level.iter().map(|name| name.as_bytes().to_vec()).collect();
    Ok(tx.handle(path))
}
