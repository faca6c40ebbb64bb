//! Integration tests for the filesystem checkpoint and artifact stores.
//!
//! Each test works inside its own temporary directory, so no state leaks
//! between tests or into the working tree.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use pixels_core::source::{ArtifactSink, CheckpointStore, StoreError};
use pixels_store::{FileCheckpointStore, LocalArtifactStore};
use pixels_types::{BlockNumber, Checkpoint, Day};

fn checkpoint(block: u64, pixels: Vec<u8>) -> Checkpoint {
    Checkpoint {
        block_number: BlockNumber(block),
        pixels,
    }
}

#[tokio::test]
async fn missing_checkpoint_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("cache.json"));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn save_then_load_returns_same_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("public").join("cache.json"));

    let saved = checkpoint(200, vec![0, 2, 0, 15]);
    store.save(&saved).await.unwrap();

    assert_eq!(store.load().await.unwrap(), Some(saved));
}

#[tokio::test]
async fn saved_file_uses_cache_json_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let store = FileCheckpointStore::new(&path);

    store.save(&checkpoint(7, vec![1, 0])).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, r#"{"blockNumber":7,"pixels":[1,0]}"#);
    assert!(!dir.path().join("cache.json.tmp").exists());
}

#[tokio::test]
async fn save_replaces_previous_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("cache.json"));

    store.save(&checkpoint(1, vec![0; 4])).await.unwrap();
    store.save(&checkpoint(2, vec![3; 4])).await.unwrap();

    assert_eq!(store.load().await.unwrap(), Some(checkpoint(2, vec![3; 4])));
}

#[tokio::test]
async fn reads_checkpoint_written_by_another_tool() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, r#"{ "blockNumber": 100, "pixels": [0, 0, 2] }"#).unwrap();

    let store = FileCheckpointStore::new(&path);

    assert_eq!(
        store.load().await.unwrap(),
        Some(checkpoint(100, vec![0, 0, 2]))
    );
}

#[tokio::test]
async fn invalid_json_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = FileCheckpointStore::new(&path);

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
}

#[tokio::test]
async fn artifacts_land_in_day_indexed_files() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = dir.path().join("public").join("canvasNFT");
    let store = LocalArtifactStore::new(&snapshots);

    let image = store.write_image(Day(3), &[0x89, b'P', b'N', b'G']).await.unwrap();
    let metadata = store.write_metadata(Day(3), "{}").await.unwrap();
    let reference = store
        .write_metadata_reference(Day(3), "ipfs://bafymeta")
        .await
        .unwrap();

    assert_eq!(image, snapshots.join("3-image.png"));
    assert_eq!(metadata, snapshots.join("3-metadata.json"));
    assert_eq!(reference, snapshots.join("3-metadata-ipfs.txt"));
    assert_eq!(std::fs::read(&image).unwrap(), vec![0x89, b'P', b'N', b'G']);
    assert_eq!(std::fs::read_to_string(&reference).unwrap(), "ipfs://bafymeta");
}

#[tokio::test]
async fn rewriting_a_day_overwrites_its_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalArtifactStore::new(dir.path());

    store.write_metadata(Day(9), "first").await.unwrap();
    let path = store.write_metadata(Day(9), "second").await.unwrap();

    assert_eq!(std::fs::read_to_string(path).unwrap(), "second");
}
