// tests/test_file_store.rs
//
// Integration tests for FileSystemBlobStore: block staging and commit, listing,
// streaming reads, deletes, and full upload/download batches on disk.

mod common;

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tempfile::TempDir;

use azstore_tools::{
    download_batch, list_containers, list_objects, store_for_config, upload_batch, BackendConfig, BlobStore,
    BlockId, FileSystemBlobStore, ObjectRef, TransferConfig, TransferError,
};
use common::{patterned_bytes, write_tree};

async fn read_all(store: &dyn BlobStore, object: &ObjectRef) -> Result<Vec<u8>> {
    let mut stream = store.open_read(object).await?;
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

#[tokio::test]
async fn staged_blocks_are_invisible_until_commit() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = FileSystemBlobStore::new(tmp.path())?;
    store.create_container("c").await?;

    let object = ObjectRef::new("c", "dir/obj");
    let a = BlockId::generate();
    let b = BlockId::generate();
    store.stage_block(&object, &a, "hello ".into()).await?;
    store.stage_block(&object, &b, "world".into()).await?;

    assert!(list_objects(&store, "c", "", 10).await?.is_empty());
    assert!(store.open_read(&object).await.is_err());

    store.commit_block_list(&object, &[a, b]).await?;
    assert_eq!(list_objects(&store, "c", "", 10).await?, vec!["dir/obj"]);
    assert_eq!(read_all(&store, &object).await?, b"hello world");
    Ok(())
}

#[tokio::test]
async fn commit_uses_list_order_not_stage_order() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = FileSystemBlobStore::new(tmp.path())?;
    store.create_container("c").await?;

    let object = ObjectRef::new("c", "o");
    let first = BlockId::generate();
    let second = BlockId::generate();
    store.stage_block(&object, &second, "B".into()).await?;
    store.stage_block(&object, &first, "A".into()).await?;
    store.commit_block_list(&object, &[first, second]).await?;

    assert_eq!(read_all(&store, &object).await?, b"AB");
    Ok(())
}

#[tokio::test]
async fn empty_commit_creates_zero_byte_object() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = FileSystemBlobStore::new(tmp.path())?;
    store.create_container("c").await?;

    let object = ObjectRef::new("c", "empty");
    store.commit_block_list(&object, &[]).await?;
    assert_eq!(read_all(&store, &object).await?, Vec::<u8>::new());
    Ok(())
}

#[tokio::test]
async fn commit_with_unknown_block_fails() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = FileSystemBlobStore::new(tmp.path())?;
    store.create_container("c").await?;

    let err = store
        .commit_block_list(&ObjectRef::new("c", "o"), &[BlockId::generate()])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(list_objects(&store, "c", "", 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn containers_exclude_internal_directories() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = FileSystemBlobStore::new(tmp.path())?;
    store.create_container("beta").await?;
    store.create_container("alpha").await?;
    // Staging something creates the hidden staging area.
    store.stage_block(&ObjectRef::new("alpha", "k"), &BlockId::generate(), "x".into()).await?;

    assert_eq!(list_containers(&store, 1).await?, vec!["alpha", "beta"]);
    assert!(store.container_exists("alpha").await?);
    assert!(!store.container_exists("gamma").await?);
    Ok(())
}

#[tokio::test]
async fn paged_listing_with_prefix() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = FileSystemBlobStore::new(tmp.path())?;
    store.create_container("c").await?;
    for key in ["logs/1", "logs/2", "logs/3", "logs/4", "logs/5", "other"] {
        store.commit_block_list(&ObjectRef::new("c", key), &[]).await?;
    }

    let keys = list_objects(&store, "c", "logs/", 2).await?;
    assert_eq!(keys, vec!["logs/1", "logs/2", "logs/3", "logs/4", "logs/5"]);
    Ok(())
}

#[tokio::test]
async fn delete_removes_object_and_empty_dirs() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = FileSystemBlobStore::new(tmp.path())?;
    store.create_container("c").await?;
    let object = ObjectRef::new("c", "a/b/c.txt");
    store.commit_block_list(&object, &[]).await?;

    store.delete(&object).await?;
    assert!(list_objects(&store, "c", "", 10).await?.is_empty());
    assert!(!tmp.path().join("c").join("a").exists());
    assert!(store.container_exists("c").await?);

    let err = store.delete(&object).await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn sas_is_unsupported() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = FileSystemBlobStore::new(tmp.path())?;
    let err = store
        .container_sas_url("c", std::time::Duration::from_secs(60), "r")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Unsupported(_)));
    Ok(())
}

#[tokio::test]
async fn upload_then_download_round_trip() -> Result<()> {
    let src = TempDir::new()?;
    let files = [
        ("top.bin", patterned_bytes(0, 1)),
        ("a/one.bin", patterned_bytes(1, 2)),
        ("a/b/two.bin", patterned_bytes(4096, 3)),
        ("a/b/three.bin", patterned_bytes(4097, 4)),
    ];
    write_tree(src.path(), &files);

    let store_root = TempDir::new()?;
    let backend = BackendConfig::Local { root: store_root.path().to_path_buf() };
    let store = store_for_config(&backend).await?;
    store.create_container("data").await?;

    let config = TransferConfig::default().with_chunk_size(1024).with_concurrency(2);
    let up = upload_batch(Arc::clone(&store), src.path(), "data", &config).await?;
    assert!(up.is_success(), "{up}");
    assert_eq!(up.total, files.len());

    let dest = TempDir::new()?;
    let down = download_batch(Arc::clone(&store), "data", "", dest.path(), &config).await?;
    assert!(down.is_success(), "{down}");
    assert_eq!(down.total, files.len());
    for (rel, data) in &files {
        assert_eq!(&std::fs::read(dest.path().join(rel))?, data, "{rel}");
    }
    Ok(())
}
