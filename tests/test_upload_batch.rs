// tests/test_upload_batch.rs
//
// Directory uploads through the worker pool.

mod common;

use std::path::Path;
use std::sync::Arc;

use azstore_tools::{upload_batch, BlobStore, TransferConfig, TransferError, UploadCoordinator};
use common::{patterned_bytes, write_tree, MemoryBlobStore};
use tempfile::TempDir;

const WORKERS: usize = 4;

fn config() -> TransferConfig {
    TransferConfig::default().with_concurrency(WORKERS).with_chunk_size(32)
}

async fn upload_n_files(n: usize) {
    let tmp = TempDir::new().unwrap();
    let files: Vec<(String, Vec<u8>)> = (0..n)
        .map(|i| (format!("dir{}/file{i}.bin", i % 3), patterned_bytes(i * 13, i as u8)))
        .collect();
    let refs: Vec<(&str, Vec<u8>)> = files.iter().map(|(p, d)| (p.as_str(), d.clone())).collect();
    write_tree(tmp.path(), &refs);

    let store = Arc::new(MemoryBlobStore::new().with_container("c"));
    let summary = upload_batch(store.clone(), tmp.path(), "c", &config()).await.unwrap();

    assert_eq!(summary.total, n);
    assert_eq!(summary.succeeded, n, "F={n}");
    assert!(summary.is_success());
    assert_eq!(store.keys("c").len(), n);
    for (rel, data) in &files {
        assert_eq!(store.object("c", rel).unwrap().as_ref(), data.as_slice(), "{rel}");
    }
}

#[tokio::test]
async fn no_file_is_dropped() {
    for n in [0, 1, WORKERS, 2 * WORKERS + 1] {
        upload_n_files(n).await;
    }
}

#[tokio::test]
async fn single_file_root_uses_base_name() {
    let tmp = TempDir::new().unwrap();
    let paths = write_tree(tmp.path(), &[("a/b.txt", b"hello".to_vec())]);

    let store = Arc::new(MemoryBlobStore::new().with_container("c"));
    let summary = upload_batch(store.clone(), &paths[0], "c", &config()).await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(store.keys("c"), vec!["b.txt"]);
}

#[tokio::test]
async fn trailing_separator_on_root_gives_same_keys() {
    let tmp = TempDir::new().unwrap();
    write_tree(tmp.path(), &[("a/b.txt", b"x".to_vec())]);
    let root = format!("{}/", tmp.path().display());

    let store = Arc::new(MemoryBlobStore::new().with_container("c"));
    upload_batch(store.clone(), Path::new(&root), "c", &config()).await.unwrap();
    assert_eq!(store.keys("c"), vec!["a/b.txt"]);
}

#[tokio::test]
async fn missing_container_stages_nothing() {
    let tmp = TempDir::new().unwrap();
    write_tree(tmp.path(), &[("one", b"1".to_vec()), ("two", b"2".to_vec())]);

    let store = Arc::new(MemoryBlobStore::new());
    let err = upload_batch(store.clone(), tmp.path(), "absent", &config()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(store.stage_calls().is_empty());
    assert!(store.commits().is_empty());
}

#[tokio::test]
async fn missing_root_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryBlobStore::new().with_container("c"));
    let err = upload_batch(store, &tmp.path().join("nope"), "c", &config()).await.unwrap_err();
    assert!(matches!(err, TransferError::NotFound(_)));
}

#[tokio::test]
async fn one_failing_file_does_not_stop_the_rest() {
    let tmp = TempDir::new().unwrap();
    write_tree(
        tmp.path(),
        &[
            ("ok1", patterned_bytes(100, 1)),
            ("bad", patterned_bytes(100, 2)),
            ("ok2", patterned_bytes(100, 3)),
        ],
    );

    let store = Arc::new(MemoryBlobStore::new().with_container("c").fail_stage_for("bad"));
    let summary = UploadCoordinator::new(store.clone(), config())
        .upload_batch(tmp.path(), "c")
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed_count(), 1);
    assert_eq!(summary.failed[0].task.remote.key, "bad");
    assert!(!summary.is_success());
    assert!(summary.to_string().starts_with("1 of 3 transfers failed"));
    assert_eq!(store.keys("c"), vec!["ok1", "ok2"]);
}

#[tokio::test]
async fn works_through_trait_object() {
    let tmp = TempDir::new().unwrap();
    write_tree(tmp.path(), &[("x", b"data".to_vec())]);
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new().with_container("c"));
    let summary = upload_batch(store.clone(), tmp.path(), "c", &config()).await.unwrap();
    assert_eq!(summary.bytes, 4);
    assert!(store.container_exists("c").await.unwrap());
}
