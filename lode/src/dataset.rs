/*!
Defining the [Dataset] struct that binds storage and pipeline components.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use lode_spec::manifest::Manifest;
use lode_spec::validate_id;

use crate::checksum::Checksum;
use crate::codec::{Codec, Record};
use crate::compress::{Compressor, NoopCompressor};
use crate::error::Error;
use crate::layout::{DefaultLayout, Layout};
use crate::partition::{NoopPartitioner, Partitioner};
use crate::reader::{Reader, SegmentRef};
use crate::store::ObjectStore;
use crate::writer::{self, RecordStreamWriter, StreamWriter};

/// Buffered bytes after which a streaming write switches from a single
/// conditional put to a multipart upload.
pub const DEFAULT_STREAM_BUFFER_LIMIT: usize = 8 * 1024 * 1024;

/// A named container of snapshots.
///
/// A dataset is bound at construction to exactly one optional [`Codec`]
/// (none means blob-only), one [`Compressor`], one [`Partitioner`], one
/// [`Layout`] and zero-or-one [`Checksum`], plus the object store they all
/// operate against. Bindings are immutable for the dataset's lifetime.
///
/// Concurrent readers are safe; concurrent writers to the same dataset must
/// be serialized externally, especially when streaming writes take the
/// multipart path.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", build_fn(validate = "DatasetBuilder::check"))]
pub struct Dataset {
    /// Dataset id, becomes a path component of every object key.
    #[builder(setter(into))]
    id: String,
    /// Object store everything is persisted to.
    store: Arc<dyn ObjectStore>,
    /// Path construction and manifest recognition.
    #[builder(default = "Arc::new(DefaultLayout)")]
    layout: Arc<dyn Layout>,
    /// Record codec; `None` makes the dataset blob-only.
    #[builder(default, setter(strip_option))]
    codec: Option<Arc<dyn Codec>>,
    /// Byte-stream compressor, never absent; noop canonical.
    #[builder(default = "Arc::new(NoopCompressor)")]
    compressor: Arc<dyn Compressor>,
    /// Record partitioner.
    #[builder(default = "Arc::new(NoopPartitioner)")]
    partitioner: Arc<dyn Partitioner>,
    /// Optional checksum over stored object bytes.
    #[builder(default, setter(strip_option))]
    checksum: Option<Arc<dyn Checksum>>,
    /// Streaming-write buffer limit before the multipart path engages.
    #[builder(default = "DEFAULT_STREAM_BUFFER_LIMIT")]
    stream_buffer_limit: usize,
}

impl DatasetBuilder {
    fn check(&self) -> Result<(), String> {
        if let Some(id) = &self.id {
            validate_id("dataset", id).map_err(|err| err.to_string())?;
        }
        if let Some(Some(codec)) = &self.codec {
            if codec.name() == "noop" {
                return Err("codec name \"noop\" is reserved for blob-only datasets".to_owned());
            }
        }
        Ok(())
    }
}

/// Public interface of the dataset.
impl Dataset {
    /// Creates a new dataset builder with noop compressor and partitioner,
    /// the default layout and no codec or checksum bound.
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    #[inline]
    /// Id of this dataset.
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    /// The object store this dataset persists to.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    #[inline]
    /// The layout mapping identifiers to object keys.
    pub fn layout(&self) -> &Arc<dyn Layout> {
        &self.layout
    }

    #[inline]
    /// The bound codec, `None` for blob-only datasets.
    pub fn codec(&self) -> Option<&Arc<dyn Codec>> {
        self.codec.as_ref()
    }

    #[inline]
    /// The bound compressor.
    pub fn compressor(&self) -> &Arc<dyn Compressor> {
        &self.compressor
    }

    #[inline]
    /// The bound partitioner.
    pub fn partitioner(&self) -> &Arc<dyn Partitioner> {
        &self.partitioner
    }

    #[inline]
    /// The bound checksum component, if any.
    pub fn checksum(&self) -> Option<&Arc<dyn Checksum>> {
        self.checksum.as_ref()
    }

    #[inline]
    pub(crate) fn stream_buffer_limit(&self) -> usize {
        self.stream_buffer_limit
    }

    /// A reader over the same store and layout, pre-registered with this
    /// dataset's codec and compressor.
    pub fn reader(&self) -> Reader {
        let mut reader = Reader::new(self.store.clone(), self.layout.clone());
        if let Some(codec) = &self.codec {
            reader = reader.with_codec(codec.clone());
        }
        reader.with_compressor(self.compressor.clone())
    }

    /// The current head segment, `None` when the dataset has no snapshots.
    pub async fn current(&self) -> Result<Option<SegmentRef>, Error> {
        match self.reader().head(&self.id).await {
            Ok(segment) => Ok(Some(segment)),
            Err(Error::NoSnapshots(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Write a batch of records as one new snapshot.
    ///
    /// `metadata` must be provided explicitly — pass
    /// `Some(Metadata::new())` for an empty map; `None` fails with
    /// `InvalidMetadata`. Returns the committed snapshot; the commit is
    /// atomic from any reader's perspective.
    pub async fn write(
        &self,
        records: &[Record],
        metadata: Option<Metadata>,
    ) -> Result<Snapshot, Error> {
        writer::write_batch(self, records, metadata).await
    }

    /// Write one opaque blob as a new snapshot. Only valid on blob-only
    /// datasets (no codec bound).
    pub async fn write_blob(
        &self,
        bytes: Bytes,
        metadata: Option<Metadata>,
    ) -> Result<Snapshot, Error> {
        writer::write_blob(self, bytes, metadata).await
    }

    /// Open a streaming byte write for a blob snapshot. Bytes flow to the
    /// final object path as they arrive; nothing becomes visible unless
    /// [`StreamWriter::commit`] succeeds.
    pub async fn stream_writer(&self, metadata: Option<Metadata>) -> Result<StreamWriter, Error> {
        writer::open_stream_writer(self, metadata).await
    }

    /// Open a streaming record write. Fails with `CodecNotStreamable` when
    /// the bound codec must buffer until close.
    pub async fn stream_records(
        &self,
        metadata: Option<Metadata>,
    ) -> Result<RecordStreamWriter, Error> {
        writer::open_record_stream_writer(self, metadata).await
    }
}

/// Explicit write metadata.
///
/// Presence is deliberate: every write names its metadata, even if empty,
/// so absent metadata is an error rather than an implicit empty map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
    row_count: Option<i64>,
    min_timestamp: Option<DateTime<Utc>>,
    max_timestamp: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one key/value entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Record an explicit row count. Honored on blob writes, where the
    /// engine cannot count records itself; structured writes always record
    /// the encoded record count.
    pub fn with_row_count(mut self, row_count: i64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    /// Record the record-timestamp range covered by this snapshot.
    pub fn with_timestamp_range(mut self, min: DateTime<Utc>, max: DateTime<Utc>) -> Self {
        self.min_timestamp = Some(min);
        self.max_timestamp = Some(max);
        self
    }

    /// The key/value entries.
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<String, String>,
        Option<i64>,
        Option<DateTime<Utc>>,
        Option<DateTime<Utc>>,
    ) {
        (
            self.entries,
            self.row_count,
            self.min_timestamp,
            self.max_timestamp,
        )
    }
}

impl From<BTreeMap<String, String>> for Metadata {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Metadata {
            entries,
            ..Default::default()
        }
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        BTreeMap::from_iter(iter).into()
    }
}

/// Handle to a committed snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    dataset_id: String,
    snapshot_id: String,
    manifest: Manifest,
}

impl Snapshot {
    pub(crate) fn new(dataset_id: String, snapshot_id: String, manifest: Manifest) -> Self {
        Snapshot {
            dataset_id,
            snapshot_id,
            manifest,
        }
    }

    #[inline]
    /// Dataset this snapshot belongs to.
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    #[inline]
    /// Id of this snapshot.
    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    #[inline]
    /// The committed manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[inline]
    /// Parent snapshot id, `None` for the first snapshot of a dataset.
    pub fn parent_snapshot_id(&self) -> Option<&str> {
        self.manifest.parent_snapshot_id.as_deref()
    }

    #[inline]
    /// Consume the handle, keeping the manifest.
    pub fn into_manifest(self) -> Manifest {
        self.manifest
    }
}
