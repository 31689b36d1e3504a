use std::sync::Arc;

use lode::codec::JsonlCodec;
use lode::dataset::{Dataset, Metadata};
use lode::error::Error;
use lode::store::{ObjectStore, ObjectStoreAdapter};
use serde_json::json;

async fn dataset_with_snapshot(
    store: Arc<ObjectStoreAdapter>,
) -> (Dataset, String) {
    let dataset = Dataset::builder()
        .id("events")
        .store(store)
        .codec(Arc::new(JsonlCodec))
        .build()
        .unwrap();
    let snapshot = dataset
        .write(
            &[json!({"id": 1}), json!({"id": 2})],
            Some(Metadata::new()),
        )
        .await
        .unwrap();
    let id = snapshot.snapshot_id().to_owned();
    (dataset, id)
}

#[tokio::test]
async fn next_after_close_returns_none() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    let (dataset, segment) = dataset_with_snapshot(store).await;
    let mut iter = dataset
        .reader()
        .open_records("events", &segment)
        .await
        .unwrap();

    assert!(iter.next().await.is_some());
    iter.close();
    assert!(iter.next().await.is_none());
    assert!(iter.err().is_none());
}

#[tokio::test]
async fn close_is_idempotent_and_err_stays_callable() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    let (dataset, segment) = dataset_with_snapshot(store).await;
    let mut iter = dataset
        .reader()
        .open_records("events", &segment)
        .await
        .unwrap();

    while iter.next().await.is_some() {}
    assert!(iter.err().is_none());
    iter.close();
    iter.close();
    assert!(iter.err().is_none());
    assert!(iter.next().await.is_none());
}

/// A mid-iteration failure terminates the stream and stays readable through
/// `err`, before and after close.
#[tokio::test]
async fn errors_end_iteration_and_are_retained() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    let (dataset, segment) = dataset_with_snapshot(store.clone()).await;

    // Pull the data object out from under the iterator.
    let manifest = dataset
        .reader()
        .get_manifest("events", &segment)
        .await
        .unwrap();
    let data_key = manifest.files.as_ref().unwrap()[0].path.clone();
    store.delete(&data_key).await.unwrap();

    let mut iter = dataset
        .reader()
        .open_records("events", &segment)
        .await
        .unwrap();
    assert!(iter.next().await.is_none());
    assert!(matches!(iter.err(), Some(Error::NotFound(_))), "{:?}", iter.err());
    iter.close();
    assert!(matches!(iter.err(), Some(Error::NotFound(_))));
    assert!(iter.next().await.is_none());
}

#[tokio::test]
async fn object_iterator_follows_the_same_laws() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    let dataset = Dataset::builder()
        .id("blobs")
        .store(store)
        .build()
        .unwrap();
    let snapshot = dataset
        .write_blob(bytes::Bytes::from_static(b"payload"), Some(Metadata::new()))
        .await
        .unwrap();

    let mut iter = dataset
        .reader()
        .open_objects("blobs", snapshot.snapshot_id())
        .await
        .unwrap();
    iter.close();
    assert!(iter.next().await.is_none());
    assert!(iter.err().is_none());
    iter.close();
}
