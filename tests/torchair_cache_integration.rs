//! Integration tests for the torchair cache directory.
//!
//! Threads stand in for the per-rank processes that share one cache root on a
//! node: every rank writes only its own kv-cache-bytes file, any rank may
//! read any file, and deployments delete the whole root between runs.

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use vllm_ascend_core::torchair::{TorchairCache, TorchairCacheError};

const GIB: i64 = 1 << 30;

// ─── Per-rank files under one root ───────────────────────────────────────────

#[test]
fn test_ranks_write_concurrently_to_disjoint_files() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(TorchairCache::with_root(dir.path()));

    let handles: Vec<_> = (0..8)
        .map(|rank| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache
                    .write_kv_cache_bytes(rank, (rank as i64 + 1) * GIB)
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for rank in 0..8 {
        assert_eq!(
            cache.read_kv_cache_bytes(rank).unwrap(),
            (rank as i64 + 1) * GIB
        );
        let file = dir
            .path()
            .join(".kv_cache_bytes")
            .join(format!("{rank}_kv_cache_bytes"));
        assert!(file.is_file(), "missing per-rank file {}", file.display());
    }
}

#[test]
fn test_readers_share_one_file() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(TorchairCache::with_root(dir.path()));
    cache.write_kv_cache_bytes(0, 17 * GIB).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..50 {
                    assert_eq!(cache.read_kv_cache_bytes(0).unwrap(), 17 * GIB);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

// ─── Warm restart flow ───────────────────────────────────────────────────────

#[test]
fn test_warm_restart_reuses_recorded_bytes() {
    let dir = TempDir::new().unwrap();

    // First boot: nothing recorded, so the runner profiles and writes.
    {
        let cache = TorchairCache::with_root(dir.path());
        assert!(!cache.kv_cache_bytes_cache_exists());
        let profiled = 23 * GIB;
        for rank in 0..4 {
            cache.write_kv_cache_bytes(rank, profiled).unwrap();
        }
    }

    // Second boot: a fresh handle over the same root skips profiling.
    {
        let cache = TorchairCache::with_root(dir.path());
        assert!(cache.kv_cache_bytes_cache_exists());
        for rank in 0..4 {
            assert_eq!(cache.read_kv_cache_bytes(rank).unwrap(), 23 * GIB);
        }
    }
}

#[test]
fn test_stale_cache_is_detected_per_rank() {
    let dir = TempDir::new().unwrap();
    let cache = TorchairCache::with_root(dir.path());
    cache.write_kv_cache_bytes(0, 4 * GIB).unwrap();

    // Rank 1 never wrote, so its read fails even though the cache exists.
    assert!(cache.kv_cache_bytes_cache_exists());
    assert!(matches!(
        cache.read_kv_cache_bytes(1),
        Err(TorchairCacheError::Io { .. })
    ));
}

// ─── Deployment cleanup ──────────────────────────────────────────────────────

#[test]
fn test_delete_resets_root_for_next_deployment() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("torchair");
    let cache = TorchairCache::with_root(&root);

    cache.write_kv_cache_bytes(0, 2 * GIB).unwrap();
    assert!(cache.cache_dir_exists());

    cache.delete_cache_dir().unwrap();
    assert!(!root.exists());
    assert!(!cache.cache_dir_exists());
    assert!(!cache.kv_cache_bytes_cache_exists());

    // Deleting an already-clean root stays quiet.
    cache.delete_cache_dir().unwrap();

    // The next deployment starts from an empty slate on the same root.
    cache.write_kv_cache_bytes(0, 9 * GIB).unwrap();
    assert_eq!(cache.read_kv_cache_bytes(0).unwrap(), 9 * GIB);
}
