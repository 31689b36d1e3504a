/*!
Layouts map identifiers to object-store keys and recognize manifest paths.

A layout is pure: no state, no I/O. Its most load-bearing duty is
[`Layout::is_manifest`] — the reader treats manifest presence as the commit
signal, so a layout that recognized stray files as manifests would turn
debris into phantom snapshots. [`DefaultLayout`] therefore accepts exactly
one shape and nothing else.

Alternative layouts are fine as long as manifests stay discoverable by
listing under a stable prefix, the file paths recorded in manifests stay
resolvable against the same store, and manifest presence keeps meaning
"committed".
*/

/// Pure mapping between (dataset, snapshot, partition, file) and object keys.
pub trait Layout: std::fmt::Debug + Send + Sync {
    /// Prefix under which every dataset's manifests are discoverable.
    fn datasets_prefix(&self) -> String;

    /// Prefix under which one dataset's manifests are discoverable.
    fn segments_prefix(&self, dataset: &str) -> String;

    /// Key of the manifest that commits `snapshot` in `dataset`.
    fn manifest_path(&self, dataset: &str, snapshot: &str) -> String;

    /// Whether `path` is a canonical manifest key. Strict: anything this
    /// rejects is not a commit, wherever it lives and whatever it is named.
    fn is_manifest(&self, path: &str) -> bool;

    /// Dataset id of a canonical manifest key, `None` for any other path.
    fn parse_dataset_id<'a>(&self, path: &'a str) -> Option<&'a str>;

    /// Snapshot id of a canonical manifest key, `None` for any other path.
    fn parse_segment_id<'a>(&self, path: &'a str) -> Option<&'a str>;

    /// Key of a data object. `partition` is the partitioner-produced
    /// fragment, empty when unpartitioned.
    fn data_path(&self, dataset: &str, snapshot: &str, partition: &str, file_name: &str)
        -> String;

    /// Partition fragment of a data-object key, empty when the key carries
    /// no partition.
    fn extract_partition_path<'a>(&self, file_path: &'a str) -> &'a str;
}

/// Canonical layout: `datasets/<dataset>/snapshots/<snapshot>/manifest.json`
/// with data under `datasets/<dataset>/snapshots/<snapshot>/data/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLayout;

const MANIFEST_FILE: &str = "manifest.json";

impl DefaultLayout {
    /// Split `path` into (dataset, snapshot) iff it has the exact canonical
    /// manifest shape: five components, correct literals, non-empty ids.
    fn split_manifest(path: &str) -> Option<(&str, &str)> {
        let mut parts = path.split('/');
        let (head, dataset, snapshots, snapshot, file) = (
            parts.next()?,
            parts.next()?,
            parts.next()?,
            parts.next()?,
            parts.next()?,
        );
        if parts.next().is_some() {
            return None;
        }
        (head == "datasets"
            && !dataset.is_empty()
            && snapshots == "snapshots"
            && !snapshot.is_empty()
            && file == MANIFEST_FILE)
            .then_some((dataset, snapshot))
    }
}

impl Layout for DefaultLayout {
    fn datasets_prefix(&self) -> String {
        "datasets".to_owned()
    }

    fn segments_prefix(&self, dataset: &str) -> String {
        format!("datasets/{dataset}/snapshots")
    }

    fn manifest_path(&self, dataset: &str, snapshot: &str) -> String {
        format!("datasets/{dataset}/snapshots/{snapshot}/{MANIFEST_FILE}")
    }

    fn is_manifest(&self, path: &str) -> bool {
        Self::split_manifest(path).is_some()
    }

    fn parse_dataset_id<'a>(&self, path: &'a str) -> Option<&'a str> {
        Self::split_manifest(path).map(|(dataset, _)| dataset)
    }

    fn parse_segment_id<'a>(&self, path: &'a str) -> Option<&'a str> {
        Self::split_manifest(path).map(|(_, snapshot)| snapshot)
    }

    fn data_path(
        &self,
        dataset: &str,
        snapshot: &str,
        partition: &str,
        file_name: &str,
    ) -> String {
        if partition.is_empty() {
            format!("datasets/{dataset}/snapshots/{snapshot}/data/{file_name}")
        } else {
            format!("datasets/{dataset}/snapshots/{snapshot}/data/{partition}/{file_name}")
        }
    }

    fn extract_partition_path<'a>(&self, file_path: &'a str) -> &'a str {
        // Fragment sits between ".../data/" and the file name.
        let Some(start) = file_path.find("/data/").map(|i| i + "/data/".len()) else {
            return "";
        };
        match file_path[start..].rfind('/') {
            Some(last) => &file_path[start..start + last],
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_path_parses_back() {
        let layout = DefaultLayout;
        for (dataset, snapshot) in [("events", "s1"), ("a.b", "00000000000000000001-abcd1234")] {
            let path = layout.manifest_path(dataset, snapshot);
            assert!(layout.is_manifest(&path), "{path}");
            assert_eq!(layout.parse_dataset_id(&path), Some(dataset));
            assert_eq!(layout.parse_segment_id(&path), Some(snapshot));
        }
    }

    #[test]
    fn stray_manifests_are_rejected() {
        let layout = DefaultLayout;
        for path in [
            "",
            "manifest.json",
            "datasets/x/misc/manifest.json",
            "datasets/x/snapshots/manifest.json",
            "datasets/x/snapshots/y/sub/manifest.json",
            "datasets/x/snapshots/y/manifest.txt",
            "datasets//snapshots/y/manifest.json",
            "datasets/x/snapshots//manifest.json",
            "other/x/snapshots/y/manifest.json",
            "datasets/x/snapshots/y/manifest.json/extra",
        ] {
            assert!(!layout.is_manifest(path), "{path:?}");
            assert_eq!(layout.parse_dataset_id(path), None, "{path:?}");
            assert_eq!(layout.parse_segment_id(path), None, "{path:?}");
        }
    }

    #[test]
    fn data_paths_and_partition_fragments() {
        let layout = DefaultLayout;
        let flat = layout.data_path("events", "s1", "", "part-00000.jsonl");
        assert_eq!(flat, "datasets/events/snapshots/s1/data/part-00000.jsonl");
        assert_eq!(layout.extract_partition_path(&flat), "");

        let nested = layout.data_path("events", "s1", "dt=2024-05-03/region=eu", "part-00000.jsonl");
        assert_eq!(
            nested,
            "datasets/events/snapshots/s1/data/dt=2024-05-03/region=eu/part-00000.jsonl"
        );
        assert_eq!(layout.extract_partition_path(&nested), "dt=2024-05-03/region=eu");

        assert_eq!(layout.extract_partition_path("unrelated/path.bin"), "");
    }
}
