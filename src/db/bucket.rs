//! Copy-on-write bucket tree.
//!
//! Every committed snapshot is an `Arc<Bucket>`. Write transactions clone
//! nodes lazily with `Arc::make_mut`, so readers holding an older root keep
//! seeing the tree exactly as it was when they started.

use std::collections::BTreeMap;
use std::sync::Arc;

/// A container node: nested buckets and key/value pairs under unique names.
#[derive(Clone, Debug, Default)]
pub struct Bucket {
    children: BTreeMap<Vec<u8>, Child>,
}

/// An owned child slot. Both kinds are shared, so cloning a bucket copies
/// its names and pointers but never its values.
#[derive(Clone, Debug)]
pub(crate) enum Child {
    Bucket(Arc<Bucket>),
    Value(Arc<[u8]>),
}

/// A borrowed view of one child, as yielded by [`Bucket::iter`].
#[derive(Clone, Copy, Debug)]
pub enum ChildRef<'a> {
    Bucket(&'a Bucket),
    Value(&'a [u8]),
}

impl Bucket {
    /// Nested bucket under `name`, if `name` is a bucket.
    pub fn bucket(&self, name: &[u8]) -> Option<&Bucket> {
        match self.children.get(name) {
            Some(Child::Bucket(bucket)) => Some(bucket),
            _ => None,
        }
    }

    /// Value under `key`, if `key` is a pair. Buckets yield `None`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.children.get(key) {
            Some(Child::Value(value)) => Some(&**value),
            _ => None,
        }
    }

    /// Whether any child of either kind uses `name`.
    pub fn contains(&self, name: &[u8]) -> bool {
        self.children.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Immediate children in ascending byte order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], ChildRef<'_>)> + '_ {
        self.children.iter().map(|(name, child)| {
            let child = match child {
                Child::Bucket(bucket) => ChildRef::Bucket(bucket.as_ref()),
                Child::Value(value) => ChildRef::Value(&**value),
            };
            (name.as_slice(), child)
        })
    }

    /// Shallow count of (child buckets, pairs).
    pub fn counts(&self) -> (usize, usize) {
        self.children
            .values()
            .fold((0, 0), |(buckets, pairs), child| match child {
                Child::Bucket(_) => (buckets + 1, pairs),
                Child::Value(_) => (buckets, pairs + 1),
            })
    }

    /// Recursive count of (buckets, pairs) below this node.
    pub fn totals(&self) -> (usize, usize) {
        let mut buckets = 0;
        let mut pairs = 0;
        let mut stack = vec![self];

        while let Some(node) = stack.pop() {
            for child in node.children.values() {
                match child {
                    Child::Bucket(bucket) => {
                        buckets += 1;
                        stack.push(bucket);
                    }
                    Child::Value(_) => pairs += 1,
                }
            }
        }

        (buckets, pairs)
    }

    // --- Mutation (write transactions only) ---

    pub(crate) fn bucket_mut(&mut self, name: &[u8]) -> Option<&mut Bucket> {
        match self.children.get_mut(name) {
            Some(Child::Bucket(bucket)) => Some(Arc::make_mut(bucket)),
            _ => None,
        }
    }

    /// Insert an empty bucket. Returns false if `name` is taken.
    pub(crate) fn insert_bucket(&mut self, name: Vec<u8>) -> bool {
        if self.children.contains_key(&name) {
            return false;
        }
        self.children
            .insert(name, Child::Bucket(Arc::new(Bucket::default())));
        true
    }

    /// Insert or overwrite a pair. Callers must have checked that `key`
    /// does not name a bucket.
    pub(crate) fn insert_value(&mut self, key: Vec<u8>, value: impl Into<Arc<[u8]>>) {
        self.children.insert(key, Child::Value(value.into()));
    }

    pub(crate) fn remove(&mut self, name: &[u8]) -> Option<Child> {
        self.children.remove(name)
    }
}
