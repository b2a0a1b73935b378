//! Concurrent readers and writers sharing one explorer.

use bucketview::{Explorer, ExplorerConfig, Pair};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn level(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn shared_explorer(dir: &TempDir) -> Arc<Explorer> {
    let config = ExplorerConfig::new(dir.path().join("store.db")).sync_on_commit(false);
    Arc::new(Explorer::open(config).unwrap())
}

#[test]
fn test_parallel_writers_in_separate_buckets() {
    let dir = TempDir::new().unwrap();
    let explorer = shared_explorer(&dir);

    let names: Vec<String> = (0..6).map(|t| format!("worker-{t}")).collect();
    explorer.create_buckets(&[], &names).unwrap();

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let explorer = Arc::clone(&explorer);
            thread::spawn(move || {
                let bucket = vec![format!("worker-{t}")];
                for i in 0..40 {
                    explorer
                        .add_pairs(&bucket, &[Pair::new(format!("job-{i:03}"), json!(i))])
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..6 {
        let listing = explorer.list(&[format!("worker-{t}")], "").unwrap();
        assert_eq!(listing.results.len(), 40);
    }
    assert_eq!(explorer.stats().unwrap().seq, 1 + 6 * 40);
}

#[test]
fn test_racing_bucket_creation_has_one_winner() {
    let dir = TempDir::new().unwrap();
    let explorer = shared_explorer(&dir);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let explorer = Arc::clone(&explorer);
            thread::spawn(move || explorer.create_buckets(&[], &level(&["shared"])).is_ok())
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(explorer.list(&[], "").unwrap().names(), vec!["shared"]);
}

#[test]
fn test_readers_see_whole_batches() {
    let dir = TempDir::new().unwrap();
    let explorer = shared_explorer(&dir);
    explorer.create_buckets(&[], &level(&["batches"])).unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let explorer = Arc::clone(&explorer);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for round in 0..50 {
                let pairs: Vec<Pair> = (0..10)
                    .map(|i| Pair::new(format!("r{round:02}-{i}"), json!(round)))
                    .collect();
                explorer.add_pairs(&level(&["batches"]), &pairs).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let explorer = Arc::clone(&explorer);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let listing = explorer.list(&level(&["batches"]), "").unwrap();
                    // Batches commit all-or-nothing
                    assert_eq!(listing.results.len() % 10, 0);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let listing = explorer.list(&level(&["batches"]), "").unwrap();
    assert_eq!(listing.results.len(), 500);
}

#[test]
fn test_rename_is_atomic_to_readers() {
    let dir = TempDir::new().unwrap();
    let explorer = shared_explorer(&dir);
    explorer.create_buckets(&[], &level(&["b"])).unwrap();
    explorer
        .add_pairs(&level(&["b"]), &[Pair::new("ping", json!("ball"))])
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let explorer = Arc::clone(&explorer);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..100 {
                let (from, to) = if i % 2 == 0 {
                    ("ping", "pong")
                } else {
                    ("pong", "ping")
                };
                explorer.rename(&level(&["b"]), from, to).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let reader = {
        let explorer = Arc::clone(&explorer);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let listing = explorer.list(&level(&["b"]), "").unwrap();
                // Exactly one of the two names is ever visible
                assert_eq!(listing.results.len(), 1);
                assert_eq!(listing.results[0].value, "\"ball\"");
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(explorer.list(&level(&["b"]), "").unwrap().names(), vec!["ping"]);
}
