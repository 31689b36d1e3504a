/*!
The read path: discover datasets and segments by scanning for manifests,
load and validate manifests, and stream records back out.

Discovery trusts the layout completely: a listing key is a segment iff
[`Layout::is_manifest`] says so, which keeps stray files from ever
masquerading as commits. Manifest loading keeps its two failure modes
distinct — bytes that are not a manifest document are a decode error, a
decoded manifest that breaks the rules is `ManifestInvalid` with the failing
field attached.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use lode_spec::manifest::Manifest;
use lode_spec::{validate_id, validate_manifest};

use crate::codec::{Codec, JsonlCodec};
use crate::compress::{Compressor, GzipCompressor, NoopCompressor};
use crate::error::Error;
use crate::iter::{ObjectIterator, RecordIterator};
use crate::layout::Layout;
use crate::store::ObjectStore;

/// One discovered segment (snapshot) of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentRef {
    /// Dataset the segment belongs to.
    pub dataset_id: String,
    /// Snapshot id of the segment.
    pub snapshot_id: String,
    /// Key of the manifest that committed it.
    pub manifest_path: String,
}

/// Reads datasets and snapshots from a store through a layout.
///
/// A reader is cheap to clone and safe to share; it holds no mutable state.
/// By default it can decode `jsonl` data and `noop`/`gzip` compression;
/// datasets written with other components need them registered via
/// [`Reader::with_codec`] and [`Reader::with_compressor`].
#[derive(Debug, Clone)]
pub struct Reader {
    store: Arc<dyn ObjectStore>,
    layout: Arc<dyn Layout>,
    codecs: BTreeMap<String, Arc<dyn Codec>>,
    compressors: BTreeMap<String, Arc<dyn Compressor>>,
}

impl Reader {
    /// Reader over `store` using `layout` for discovery, with the default
    /// codec and compressor registries.
    pub fn new(store: Arc<dyn ObjectStore>, layout: Arc<dyn Layout>) -> Self {
        let mut reader = Reader {
            store,
            layout,
            codecs: BTreeMap::new(),
            compressors: BTreeMap::new(),
        };
        reader = reader.with_codec(Arc::new(JsonlCodec));
        reader = reader.with_compressor(Arc::new(NoopCompressor));
        reader.with_compressor(Arc::new(GzipCompressor))
    }

    /// Register a codec under its own name.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codecs.insert(codec.name().to_owned(), codec);
        self
    }

    /// Register a compressor under its own name.
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressors.insert(compressor.name().to_owned(), compressor);
        self
    }

    /// All dataset ids with at least one committed snapshot, sorted.
    pub async fn list_datasets(&self) -> Result<Vec<String>, Error> {
        let keys = self.store.list(&self.layout.datasets_prefix()).await?;
        let mut ids: Vec<String> = keys
            .iter()
            .filter(|key| self.layout.is_manifest(key))
            .filter_map(|key| self.layout.parse_dataset_id(key))
            .map(str::to_owned)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// All segments of `dataset`, ordered oldest first.
    ///
    /// Ordering is lexicographic by snapshot id, which matches the parent
    /// chain for generated ids (they are lexically monotonic). Callers
    /// supplying their own snapshot ids keep ordered listings only if their
    /// ids preserve that property.
    pub async fn list_segments(&self, dataset: &str) -> Result<Vec<SegmentRef>, Error> {
        validate_id("dataset", dataset)?;
        let keys = self.store.list(&self.layout.segments_prefix(dataset)).await?;
        let mut segments: Vec<SegmentRef> = keys
            .iter()
            .filter(|key| self.layout.is_manifest(key))
            .filter(|key| self.layout.parse_dataset_id(key) == Some(dataset))
            .filter_map(|key| {
                self.layout.parse_segment_id(key).map(|segment| SegmentRef {
                    dataset_id: dataset.to_owned(),
                    snapshot_id: segment.to_owned(),
                    manifest_path: key.clone(),
                })
            })
            .collect();
        segments.sort_by(|a, b| a.snapshot_id.cmp(&b.snapshot_id));
        Ok(segments)
    }

    /// The newest segment of `dataset`; `NoSnapshots` when it has none.
    pub async fn head(&self, dataset: &str) -> Result<SegmentRef, Error> {
        self.list_segments(dataset)
            .await?
            .pop()
            .ok_or_else(|| Error::NoSnapshots(dataset.to_owned()))
    }

    /// Load and validate the manifest of one segment.
    pub async fn get_manifest(&self, dataset: &str, segment: &str) -> Result<Manifest, Error> {
        validate_id("dataset", dataset)?;
        validate_id("snapshot", segment)?;
        let key = self.layout.manifest_path(dataset, segment);
        let bytes = self.store.get(&key).await?;
        let manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(Error::ManifestDecode)?;
        validate_manifest(&manifest)?;
        tracing::debug!(dataset = %dataset, segment = %segment, "loaded manifest");
        Ok(manifest)
    }

    /// Stream the records of one segment, files concatenated lazily in
    /// manifest order.
    pub async fn open_records(&self, dataset: &str, segment: &str) -> Result<RecordIterator, Error> {
        let manifest = self.get_manifest(dataset, segment).await?;
        if manifest.codec == "noop" {
            return Err(Error::InvalidFormat(format!(
                "segment {segment} of {dataset} is blob-only and has no records"
            )));
        }
        let codec = self.codecs.get(&manifest.codec).cloned().ok_or_else(|| {
            Error::InvalidFormat(format!("no codec registered for {:?}", manifest.codec))
        })?;
        let compressor = self.compressor_for(&manifest)?;
        Ok(RecordIterator::new(
            self.store.clone(),
            codec,
            compressor,
            manifest.files.unwrap_or_default(),
        ))
    }

    /// Stream the raw (decompressed) data objects of one segment.
    pub async fn open_objects(&self, dataset: &str, segment: &str) -> Result<ObjectIterator, Error> {
        let manifest = self.get_manifest(dataset, segment).await?;
        let compressor = self.compressor_for(&manifest)?;
        Ok(ObjectIterator::new(
            self.store.clone(),
            compressor,
            manifest.files.unwrap_or_default(),
        ))
    }

    fn compressor_for(&self, manifest: &Manifest) -> Result<Arc<dyn Compressor>, Error> {
        self.compressors
            .get(&manifest.compressor)
            .cloned()
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "no compressor registered for {:?}",
                    manifest.compressor
                ))
            })
    }
}
