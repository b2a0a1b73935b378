//! Listing a bucket's immediate children.

use super::Explorer;
use crate::codec::ValueCodec;
use crate::db::{Bucket, ChildRef};
use crate::error::Result;
use crate::resolve::resolve;
use crate::types::{ListResult, ListedItem};
use tracing::debug;

/// Maximum number of children returned by one listing.
pub const LIST_LIMIT: usize = 10_000;

impl Explorer {
    /// List the children of the bucket at `level`.
    ///
    /// A non-empty `search_key` keeps only children whose name contains it,
    /// ignoring case. At most [`LIST_LIMIT`] children are returned; if more
    /// match, `exceeds_limit` is set.
    pub fn list(&self, level: &[String], search_key: &str) -> Result<ListResult> {
        let (results, exceeds_limit) = self.db()?.view(|tx| {
            let bucket = resolve(tx.root(), level)?;
            Ok(list_children(bucket, search_key, &self.codec))
        })?;

        debug!(
            level = ?level,
            search_key,
            returned = results.len(),
            exceeds_limit,
            "listed bucket"
        );

        Ok(ListResult {
            level: level.to_vec(),
            search_key: search_key.to_string(),
            results,
            exceeds_limit,
        })
    }
}

/// Classify the children of `bucket` that match `search_key`.
///
/// The scan stops at the first match past the limit; nothing after it could
/// change the output.
fn list_children(
    bucket: &Bucket,
    search_key: &str,
    codec: &ValueCodec,
) -> (Vec<ListedItem>, bool) {
    let needle = search_key.to_lowercase();
    let mut results = Vec::new();
    let mut matched = 0usize;

    for (key, child) in bucket.iter() {
        let name = String::from_utf8_lossy(key);
        if !needle.is_empty() && !name.to_lowercase().contains(&needle) {
            continue;
        }

        matched += 1;
        if matched > LIST_LIMIT {
            return (results, true);
        }

        let item = match child {
            ChildRef::Bucket(nested) => {
                let (child_buckets, pairs) = nested.counts();
                ListedItem::bucket(name.into_owned(), child_buckets, pairs)
            }
            ChildRef::Value(value) => ListedItem::pair(name.into_owned(), codec.decode(value)),
        };
        results.push(item);
    }

    (results, false)
}
