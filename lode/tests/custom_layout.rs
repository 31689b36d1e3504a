use std::sync::Arc;

use bytes::Bytes;
use lode::codec::JsonlCodec;
use lode::dataset::{Dataset, Metadata};
use lode::layout::Layout;
use lode::store::{ObjectStore, ObjectStoreAdapter};
use lode::Reader;
use serde_json::json;

/// `custom/<dataset>/segs/<segment>/meta.json`, data under `.../files/`.
#[derive(Debug, Clone, Copy)]
struct SegLayout;

impl SegLayout {
    fn split(path: &str) -> Option<(&str, &str)> {
        let mut parts = path.split('/');
        let (head, dataset, segs, segment, file) = (
            parts.next()?,
            parts.next()?,
            parts.next()?,
            parts.next()?,
            parts.next()?,
        );
        if parts.next().is_some() {
            return None;
        }
        (head == "custom"
            && !dataset.is_empty()
            && segs == "segs"
            && !segment.is_empty()
            && file == "meta.json")
            .then_some((dataset, segment))
    }
}

impl Layout for SegLayout {
    fn datasets_prefix(&self) -> String {
        "custom".to_owned()
    }

    fn segments_prefix(&self, dataset: &str) -> String {
        format!("custom/{dataset}/segs")
    }

    fn manifest_path(&self, dataset: &str, snapshot: &str) -> String {
        format!("custom/{dataset}/segs/{snapshot}/meta.json")
    }

    fn is_manifest(&self, path: &str) -> bool {
        Self::split(path).is_some()
    }

    fn parse_dataset_id<'a>(&self, path: &'a str) -> Option<&'a str> {
        Self::split(path).map(|(dataset, _)| dataset)
    }

    fn parse_segment_id<'a>(&self, path: &'a str) -> Option<&'a str> {
        Self::split(path).map(|(_, segment)| segment)
    }

    fn data_path(
        &self,
        dataset: &str,
        snapshot: &str,
        partition: &str,
        file_name: &str,
    ) -> String {
        if partition.is_empty() {
            format!("custom/{dataset}/segs/{snapshot}/files/{file_name}")
        } else {
            format!("custom/{dataset}/segs/{snapshot}/files/{partition}/{file_name}")
        }
    }

    fn extract_partition_path<'a>(&self, file_path: &'a str) -> &'a str {
        let Some(start) = file_path.find("/files/").map(|i| i + "/files/".len()) else {
            return "";
        };
        match file_path[start..].rfind('/') {
            Some(last) => &file_path[start..start + last],
            None => "",
        }
    }
}

#[test]
fn layout_round_trip_invariant() {
    let layout = SegLayout;
    let path = layout.manifest_path("ds", "seg");
    assert_eq!(path, "custom/ds/segs/seg/meta.json");
    assert!(layout.is_manifest(&path));
    assert_eq!(layout.parse_dataset_id(&path), Some("ds"));
    assert_eq!(layout.parse_segment_id(&path), Some("seg"));

    for stray in [
        "custom/ds/other/seg/meta.json",
        "custom/ds/segs/meta.json",
        "custom/ds/segs/seg/manifest.json",
        "datasets/ds/snapshots/seg/manifest.json",
    ] {
        assert!(!layout.is_manifest(stray), "{stray}");
        assert_eq!(layout.parse_dataset_id(stray), None, "{stray}");
    }
}

#[tokio::test]
async fn custom_layout_drives_the_whole_read_path() {
    let store = Arc::new(ObjectStoreAdapter::in_memory());
    let dataset = Dataset::builder()
        .id("events")
        .store(store.clone())
        .layout(Arc::new(SegLayout))
        .codec(Arc::new(JsonlCodec))
        .build()
        .unwrap();

    let records = vec![json!({"id": 1}), json!({"id": 2})];
    let snapshot = dataset.write(&records, Some(Metadata::new())).await.unwrap();

    // Everything lives under the custom prefix.
    assert!(store.list("datasets").await.unwrap().is_empty());
    let manifest_key = format!("custom/events/segs/{}/meta.json", snapshot.snapshot_id());
    assert!(store.exists(&manifest_key).await.unwrap());

    // Debris inside and outside the custom shape is ignored.
    store
        .put("custom/events/junk/meta.json", Bytes::from_static(b"{}"))
        .await
        .unwrap();
    store
        .put(
            "datasets/events/snapshots/x/manifest.json",
            Bytes::from_static(b"{}"),
        )
        .await
        .unwrap();

    let reader = Reader::new(store, Arc::new(SegLayout));
    assert_eq!(reader.list_datasets().await.unwrap(), vec!["events"]);
    let segments = reader.list_segments("events").await.unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].snapshot_id, snapshot.snapshot_id());

    let manifest = reader
        .get_manifest("events", snapshot.snapshot_id())
        .await
        .unwrap();
    assert_eq!(manifest.row_count, Some(2));

    let mut iter = reader
        .open_records("events", snapshot.snapshot_id())
        .await
        .unwrap();
    let mut decoded = Vec::new();
    while let Some(record) = iter.next().await {
        decoded.push(record);
    }
    assert_eq!(decoded, records);
}
