use std::sync::Arc;

use bytes::Bytes;
use lode::error::Error;
use lode::store::{ObjectStore, ObjectStoreAdapter};
use lode::{DefaultLayout, Reader};

/// Only files at the exact canonical manifest path are commits; stray
/// `manifest.json` files anywhere else are debris.
#[tokio::test]
async fn stray_manifests_are_not_commits() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    for key in [
        "datasets/ds1/snapshots/seg1/manifest.json",
        "datasets/ds2/misc/manifest.json",
        "datasets/ds3/snapshots/manifest.json",
        "datasets/ds4/snapshots/seg/sub/manifest.json",
    ] {
        store.put(key, Bytes::from_static(b"{}")).await.unwrap();
    }

    let reader = Reader::new(store, Arc::new(DefaultLayout));
    assert_eq!(reader.list_datasets().await.unwrap(), vec!["ds1"]);

    let segments = reader.list_segments("ds1").await.unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].snapshot_id, "seg1");

    for dataset in ["ds2", "ds3", "ds4"] {
        assert!(
            reader.list_segments(dataset).await.unwrap().is_empty(),
            "{dataset}"
        );
    }
}

#[tokio::test]
async fn wrong_extension_is_not_a_manifest() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    store
        .put(
            "datasets/ds1/snapshots/seg1/manifest.txt",
            Bytes::from_static(b"{}"),
        )
        .await
        .unwrap();
    let reader = Reader::new(store, Arc::new(DefaultLayout));
    assert!(reader.list_datasets().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_store_lists_nothing() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    let reader = Reader::new(store, Arc::new(DefaultLayout));
    assert!(reader.list_datasets().await.unwrap().is_empty());
    assert!(reader.list_segments("anything").await.unwrap().is_empty());
    let err = reader.head("anything").await.unwrap_err();
    assert!(matches!(err, Error::NoSnapshots(_)), "{err}");
}

#[tokio::test]
async fn datasets_are_deduplicated_and_sorted() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    for key in [
        "datasets/zeta/snapshots/s1/manifest.json",
        "datasets/zeta/snapshots/s2/manifest.json",
        "datasets/alpha/snapshots/s1/manifest.json",
    ] {
        store.put(key, Bytes::from_static(b"{}")).await.unwrap();
    }
    let reader = Reader::new(store, Arc::new(DefaultLayout));
    assert_eq!(reader.list_datasets().await.unwrap(), vec!["alpha", "zeta"]);
}

#[tokio::test]
async fn segments_are_ordered_oldest_first() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    // Lexically monotonic ids, inserted out of order.
    for key in [
        "datasets/ds/snapshots/00000000000000000300-cc/manifest.json",
        "datasets/ds/snapshots/00000000000000000100-aa/manifest.json",
        "datasets/ds/snapshots/00000000000000000200-bb/manifest.json",
    ] {
        store.put(key, Bytes::from_static(b"{}")).await.unwrap();
    }
    let reader = Reader::new(store, Arc::new(DefaultLayout));
    let ids: Vec<String> = reader
        .list_segments("ds")
        .await
        .unwrap()
        .into_iter()
        .map(|segment| segment.snapshot_id)
        .collect();
    assert_eq!(
        ids,
        vec![
            "00000000000000000100-aa",
            "00000000000000000200-bb",
            "00000000000000000300-cc"
        ]
    );
    assert_eq!(
        reader.head("ds").await.unwrap().snapshot_id,
        "00000000000000000300-cc"
    );
}
