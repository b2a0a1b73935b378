//! Single-file bucket store.
//!
//! Buckets nest arbitrarily deep and hold either further buckets or
//! key/value pairs. Names are unique per bucket and iterate in byte order.
//!
//! ## Concurrency
//!
//! - **Reads** clone the committed root (`Arc`) and never block writers.
//! - **Writes** are serialized by the log mutex. A write transaction works
//!   on a copy-on-write copy of the root; on success its operations are
//!   appended as one checksummed frame and only then is the new root
//!   published. On error the copy is dropped and nothing reaches disk.

mod bucket;
mod log;
mod tx;

pub use bucket::{Bucket, ChildRef};
pub use self::log::{Commit, LogOp};
pub use tx::{BucketMut, ReadTx, WriteTx, MAX_KEY_SIZE, MAX_VALUE_SIZE};

use crate::error::{Result, StoreError};
use self::log::CommitLog;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for opening a store file.
#[derive(Clone, Copy, Debug)]
pub struct DbOptions {
    /// Create the file if it does not exist.
    pub create_if_missing: bool,

    /// fsync after every commit.
    pub sync_on_commit: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct DbStats {
    /// Sequence number of the last commit.
    pub seq: u64,
    /// Store file size in bytes.
    pub file_size: u64,
    /// Buckets at every level.
    pub bucket_count: usize,
    /// Key/value pairs at every level.
    pub pair_count: usize,
}

#[derive(Clone)]
struct Snapshot {
    root: Arc<Bucket>,
    seq: u64,
}

/// An open store file.
pub struct Db {
    path: PathBuf,

    /// Last committed tree.
    committed: RwLock<Snapshot>,

    /// Exclusive file writer; holding it is holding the write transaction.
    log: Mutex<CommitLog>,
}

impl Db {
    /// Open a store file, replaying its commit log.
    pub fn open(path: impl AsRef<Path>, options: DbOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (log, recovered) =
            CommitLog::open(&path, options.create_if_missing, options.sync_on_commit)?;

        if recovered.discarded_bytes > 0 {
            warn!(
                path = %path.display(),
                bytes = recovered.discarded_bytes,
                "discarded torn commit at end of store file"
            );
        }

        let commit_count = recovered.commits.len();
        let mut tx = WriteTx::new(Arc::new(Bucket::default()), 0);
        let mut seq = 0;
        for commit in recovered.commits {
            for op in commit.ops {
                tx.apply(op).map_err(|e| {
                    StoreError::Corruption(format!("commit {} does not replay: {}", commit.seq, e))
                })?;
            }
            seq = commit.seq;
        }
        let (root, _) = tx.into_parts();

        info!(
            path = %path.display(),
            commits = commit_count,
            seq,
            "opened store"
        );

        Ok(Self {
            path,
            committed: RwLock::new(Snapshot { root, seq }),
            log: Mutex::new(log),
        })
    }

    /// Start a read transaction on the latest committed state.
    pub fn begin_read(&self) -> ReadTx {
        let snapshot = self.committed.read().clone();
        ReadTx::new(snapshot.root, snapshot.seq)
    }

    /// Run `f` inside a read transaction.
    pub fn view<T>(&self, f: impl FnOnce(&ReadTx) -> Result<T>) -> Result<T> {
        let tx = self.begin_read();
        f(&tx)
    }

    /// Run `f` inside the write transaction.
    ///
    /// If `f` returns an error nothing it did is kept. Otherwise all of its
    /// changes are committed as one unit before this returns.
    pub fn update<T>(&self, f: impl FnOnce(&mut WriteTx) -> Result<T>) -> Result<T> {
        let mut log = self.log.lock();
        let base = self.committed.read().clone();

        let mut tx = WriteTx::new(base.root, base.seq);
        let value = match f(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "rolled back write transaction");
                return Err(e);
            }
        };

        if !tx.is_dirty() {
            return Ok(value);
        }

        let (root, ops) = tx.into_parts();
        let op_count = ops.len();
        let commit = Commit::new(base.seq + 1, ops);
        log.append(&commit)?;

        *self.committed.write() = Snapshot {
            root,
            seq: commit.seq,
        };
        debug!(seq = commit.seq, ops = op_count, "committed write transaction");

        Ok(value)
    }

    /// Rewrite the store file so it holds only the current tree.
    pub fn compact(&self) -> Result<()> {
        let mut log = self.log.lock();
        let snapshot = self.committed.read().clone();

        let before = log.len();
        let commit = Commit::new(snapshot.seq, rebuild_ops(&snapshot.root));
        log.rewrite(&commit)?;

        info!(
            path = %self.path.display(),
            before,
            after = log.len(),
            "compacted store"
        );
        Ok(())
    }

    pub fn stats(&self) -> Result<DbStats> {
        let file_size = self.log.lock().len();
        let tx = self.begin_read();
        let (bucket_count, pair_count) = tx.root().totals();

        Ok(DbStats {
            seq: tx.seq(),
            file_size,
            bucket_count,
            pair_count,
        })
    }

    /// Flush the store file to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.lock().sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync and release the store file.
    pub fn close(self) -> Result<()> {
        self.sync()?;
        info!(path = %self.path.display(), "closed store");
        Ok(())
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.log.lock().sync();
    }
}

/// Operations that recreate `root` from an empty store, parents first.
fn rebuild_ops(root: &Bucket) -> Vec<LogOp> {
    let mut ops = Vec::new();
    let mut queue: VecDeque<(Vec<Vec<u8>>, &Bucket)> = VecDeque::new();
    queue.push_back((Vec::new(), root));

    while let Some((path, bucket)) = queue.pop_front() {
        for (name, child) in bucket.iter() {
            match child {
                ChildRef::Bucket(nested) => {
                    ops.push(LogOp::CreateBucket {
                        path: path.clone(),
                        name: name.to_vec(),
                    });
                    let mut nested_path = path.clone();
                    nested_path.push(name.to_vec());
                    queue.push_back((nested_path, nested));
                }
                ChildRef::Value(value) => ops.push(LogOp::Put {
                    path: path.clone(),
                    key: name.to_vec(),
                    value: Arc::from(value),
                }),
            }
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Db {
        Db::open(dir.path().join("store.db"), DbOptions::default()).unwrap()
    }

    fn seed(db: &Db) {
        db.update(|tx| {
            let mut root = tx.root_mut();
            root.create_bucket(b"a")?;
            let mut a = root.bucket(b"a")?;
            a.create_bucket(b"b")?;
            a.put(b"k", b"\"v\"".to_vec())?;
            a.bucket(b"b")?.put(b"deep", b"1".to_vec())
        })
        .unwrap();
    }

    #[test]
    fn test_create_store_file() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        assert!(db.path().exists());
        assert_eq!(db.stats().unwrap().seq, 0);
    }

    #[test]
    fn test_update_commits() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        seed(&db);

        let stats = db.stats().unwrap();
        assert_eq!(stats.seq, 1);
        assert_eq!(stats.bucket_count, 2);
        assert_eq!(stats.pair_count, 2);
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        seed(&db);
        let size_before = db.stats().unwrap().file_size;

        let result = db.update(|tx| {
            let mut root = tx.root_mut();
            root.create_bucket(b"fresh")?;
            root.create_bucket(b"a")
        });
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));

        db.view(|tx| {
            assert!(tx.root().bucket(b"fresh").is_none());
            Ok(())
        })
        .unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.seq, 1);
        assert_eq!(stats.file_size, size_before);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();

        {
            let db = open(&dir);
            seed(&db);
            db.update(|tx| tx.root_mut().bucket(b"a")?.delete(b"k"))
                .unwrap();
            db.close().unwrap();
        }

        let db = open(&dir);
        db.view(|tx| {
            let a = tx.root().bucket(b"a").unwrap();
            assert!(a.get(b"k").is_none());
            assert_eq!(a.bucket(b"b").unwrap().get(b"deep"), Some(&b"1"[..]));
            Ok(())
        })
        .unwrap();
        assert_eq!(db.stats().unwrap().seq, 2);
    }

    #[test]
    fn test_unreplayable_commit_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");

        // A well-formed frame whose op targets a bucket that never existed
        {
            let (mut log, _) = CommitLog::open(&path, true, true).unwrap();
            let op = LogOp::Put {
                path: vec![b"ghost".to_vec()],
                key: b"k".to_vec(),
                value: Arc::from(&b"1"[..]),
            };
            log.append(&Commit::new(1, vec![op])).unwrap();
        }

        let result = Db::open(&path, DbOptions::default());
        match result {
            Err(StoreError::Corruption(msg)) => assert!(msg.contains("commit 1")),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("open should fail"),
        }
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let _db = open(&dir);

        let result = Db::open(dir.path().join("store.db"), DbOptions::default());
        assert!(matches!(result, Err(StoreError::Locked)));
    }

    #[test]
    fn test_read_snapshot_isolated_from_writer() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        seed(&db);

        let before = db.begin_read();
        db.update(|tx| tx.root_mut().bucket(b"a")?.put(b"k", b"\"new\"".to_vec()))
            .unwrap();

        let a = before.root().bucket(b"a").unwrap();
        assert_eq!(a.get(b"k"), Some(&b"\"v\""[..]));
        db.view(|tx| {
            assert_eq!(
                tx.root().bucket(b"a").unwrap().get(b"k"),
                Some(&b"\"new\""[..])
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_compact_preserves_tree() {
        let dir = TempDir::new().unwrap();

        {
            let db = open(&dir);
            seed(&db);
            for i in 0..20 {
                db.update(|tx| {
                    tx.root_mut()
                        .bucket(b"a")?
                        .put(b"counter", i.to_string().into_bytes())
                })
                .unwrap();
            }
            let before = db.stats().unwrap();
            db.compact().unwrap();
            let after = db.stats().unwrap();

            assert!(after.file_size < before.file_size);
            assert_eq!(after.seq, before.seq);
            assert_eq!(after.pair_count, before.pair_count);
        }

        let db = open(&dir);
        let stats = db.stats().unwrap();
        assert_eq!(stats.seq, 21);
        assert_eq!(stats.bucket_count, 2);
        db.view(|tx| {
            let a = tx.root().bucket(b"a").unwrap();
            assert_eq!(a.get(b"counter"), Some(&b"19"[..]));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_concurrent_writers_serialize() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(open(&dir));
        db.update(|tx| tx.root_mut().create_bucket(b"counters"))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for i in 0..25 {
                        db.update(|tx| {
                            let mut counters = tx.root_mut();
                            let mut counters = counters.bucket(b"counters")?;
                            let current = counters
                                .get(b"total")?
                                .map(|v| String::from_utf8(v).unwrap().parse::<u64>().unwrap())
                                .unwrap_or(0);
                            counters.put(b"total", (current + 1).to_string().into_bytes())?;
                            counters.put(format!("t{t}-{i}").as_bytes(), vec![1u8])
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        db.view(|tx| {
            let counters = tx.root().bucket(b"counters").unwrap();
            assert_eq!(counters.get(b"total"), Some(&b"200"[..]));
            assert_eq!(counters.len(), 201);
            Ok(())
        })
        .unwrap();
    }
}
