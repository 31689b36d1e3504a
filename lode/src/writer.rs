/*!
The write pipeline: encode → compress → checksum → put → commit.

Every write produces data objects at their final paths first and then makes
the snapshot visible with a single no-overwrite manifest put — manifest
presence is the commit signal. A failed data-object put aborts the commit
and best-effort deletes what was already written, reporting the original
error; a failed manifest put may leave data objects behind at their
deterministic paths, where prefix-based garbage collection can find them.

Streaming writes move through `Open → Writing → {Committed | Aborted |
Failed}`. Bytes flow to the final object path as they arrive, buffered up to
the dataset's stream buffer limit and then spilled into a multipart upload
whose overwrite protection is preflight-only — single-writer per snapshot
path is the caller's obligation on such backends.
*/

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use chrono::Utc;
use futures::{stream, StreamExt};
use lode_spec::manifest::{FileRef, Manifest, ManifestBuilder};
use lode_spec::{generate_snapshot_id, validate_manifest};

use crate::checksum::ChecksumHasher;
use crate::codec::{Record, StreamEncoder};
use crate::compress::FinishWrite;
use crate::dataset::{Dataset, Metadata, Snapshot};
use crate::error::Error;
use crate::partition::validate_fragment;
use crate::store::{MultipartSink, ObjectStore};

/// Name recorded in manifests when a pipeline component is not bound.
const NOOP: &str = "noop";

////////////////////////////////////////// object sink /////////////////////////////////////////

#[derive(Default)]
struct SinkState {
    buf: Vec<u8>,
    total: u64,
    hasher: Option<Box<dyn ChecksumHasher>>,
}

/// The innermost write sink: counts and hashes stored bytes as they leave
/// the compressor, buffering them for the async side to upload.
#[derive(Clone)]
struct SharedSink(Arc<Mutex<SinkState>>);

impl Write for SharedSink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut state = self.0.lock().expect("sink lock poisoned");
        if let Some(hasher) = state.hasher.as_mut() {
            hasher.update(data);
        }
        state.total += data.len() as u64;
        state.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Pull buffered bytes out of the sink. With `full_only`, only hand back
/// complete `limit`-sized parts; otherwise drain whatever remains (capped at
/// `limit` per call), `None` once empty.
fn drain_part(state: &Mutex<SinkState>, limit: usize, full_only: bool) -> Option<Bytes> {
    let mut state = state.lock().expect("sink lock poisoned");
    if state.buf.is_empty() || (full_only && state.buf.len() < limit) {
        return None;
    }
    if state.buf.len() <= limit {
        return Some(Bytes::from(std::mem::take(&mut state.buf)));
    }
    let rest = state.buf.split_off(limit);
    Some(Bytes::from(std::mem::replace(&mut state.buf, rest)))
}

struct WrittenObject {
    size_bytes: u64,
    checksum: Option<String>,
}

/// Writes one data object at its final path.
///
/// Stays a buffered one-shot conditional put while the payload is small;
/// crosses into a multipart upload once the buffer exceeds `buffer_limit`.
struct ObjectWriter {
    store: Arc<dyn ObjectStore>,
    key: String,
    state: Arc<Mutex<SinkState>>,
    upload: Option<Box<dyn MultipartSink>>,
    buffer_limit: usize,
}

impl ObjectWriter {
    fn new(
        store: Arc<dyn ObjectStore>,
        key: String,
        hasher: Option<Box<dyn ChecksumHasher>>,
        buffer_limit: usize,
    ) -> (Self, SharedSink) {
        let state = Arc::new(Mutex::new(SinkState {
            hasher,
            ..Default::default()
        }));
        let sink = SharedSink(state.clone());
        (
            ObjectWriter {
                store,
                key,
                state,
                upload: None,
                buffer_limit: buffer_limit.max(1),
            },
            sink,
        )
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().expect("sink lock poisoned")
    }

    /// Upload full parts once the buffer has crossed the limit.
    async fn spill(&mut self) -> Result<(), Error> {
        if self.upload.is_none() {
            if self.lock().buf.len() <= self.buffer_limit {
                return Ok(());
            }
            self.upload = Some(self.store.put_multipart(&self.key).await?);
        }
        let upload = self.upload.as_mut().expect("upload engaged above");
        while let Some(part) = drain_part(&self.state, self.buffer_limit, true) {
            upload.put_part(part).await?;
        }
        Ok(())
    }

    /// Persist everything buffered and finish the object.
    async fn finish(mut self) -> Result<WrittenObject, Error> {
        // Large buffered batches cross into multipart here even if no
        // streaming spill ever ran.
        self.spill().await?;
        match self.upload.take() {
            Some(mut upload) => {
                while let Some(part) = drain_part(&self.state, self.buffer_limit, false) {
                    upload.put_part(part).await?;
                }
                upload.complete().await?;
            }
            None => {
                let bytes = drain_part(&self.state, self.buffer_limit, false).unwrap_or_default();
                self.store.put(&self.key, bytes).await?;
            }
        }
        let mut state = self.lock();
        Ok(WrittenObject {
            size_bytes: state.total,
            checksum: state.hasher.take().map(|hasher| hasher.finalize()),
        })
    }

    /// Abandon the object; staged multipart parts are cleaned up.
    async fn abort(&mut self) {
        if let Some(upload) = self.upload.as_mut() {
            if let Err(err) = upload.abort().await {
                tracing::warn!(key = %self.key, error = %err, "failed to abort multipart upload");
            }
        }
    }
}

////////////////////////////////////////// batch writes ////////////////////////////////////////

pub(crate) async fn write_batch(
    dataset: &Dataset,
    records: &[Record],
    metadata: Option<Metadata>,
) -> Result<Snapshot, Error> {
    let metadata = metadata.ok_or(Error::InvalidMetadata)?;
    let codec = dataset
        .codec()
        .cloned()
        .ok_or_else(|| Error::InvalidFormat("record write on a blob-only dataset".to_owned()))?;

    let snapshot_id = generate_snapshot_id();
    let parent = current_head(dataset).await?;

    // Group records by partition fragment in first-seen order; one data
    // object per fragment.
    let mut fragments: Vec<(String, Vec<Record>)> = Vec::new();
    for record in records {
        let fragment = dataset.partitioner().partition_path(record)?;
        validate_fragment(&fragment)?;
        match fragments.iter_mut().find(|(frag, _)| *frag == fragment) {
            Some((_, group)) => group.push(record.clone()),
            None => fragments.push((fragment, vec![record.clone()])),
        }
    }
    if fragments.is_empty() {
        fragments.push((String::new(), Vec::new()));
    }

    let mut files = Vec::with_capacity(fragments.len());
    let mut written = Vec::with_capacity(fragments.len());
    for (index, (fragment, group)) in fragments.iter().enumerate() {
        let file_name = data_file_name(
            index,
            codec.file_extension(),
            dataset.compressor().file_extension(),
        );
        let key = dataset
            .layout()
            .data_path(dataset.id(), &snapshot_id, fragment, &file_name);
        let result = write_data_object(dataset, &key, |sink| codec.encode(sink, group)).await;
        match result {
            Ok(object) => {
                files.push(file_ref(key.clone(), &object));
                written.push(key);
            }
            Err(err) => {
                cleanup_objects(dataset.store(), &written).await;
                return Err(err);
            }
        }
    }

    let manifest = build_manifest(
        dataset,
        &snapshot_id,
        parent,
        metadata,
        files,
        Some(records.len() as i64),
    )?;
    commit_manifest(dataset, &manifest).await?;
    Ok(Snapshot::new(
        dataset.id().to_owned(),
        snapshot_id,
        manifest,
    ))
}

pub(crate) async fn write_blob(
    dataset: &Dataset,
    bytes: Bytes,
    metadata: Option<Metadata>,
) -> Result<Snapshot, Error> {
    let metadata = metadata.ok_or(Error::InvalidMetadata)?;
    require_blob_only(dataset)?;

    let snapshot_id = generate_snapshot_id();
    let parent = current_head(dataset).await?;
    let file_name = data_file_name(0, None, dataset.compressor().file_extension());
    let key = dataset
        .layout()
        .data_path(dataset.id(), &snapshot_id, "", &file_name);

    let object = write_data_object(dataset, &key, |sink| {
        sink.write_all(&bytes).map_err(Error::from)
    })
    .await?;

    let manifest = build_manifest(
        dataset,
        &snapshot_id,
        parent,
        metadata,
        vec![file_ref(key, &object)],
        None,
    )?;
    commit_manifest(dataset, &manifest).await?;
    Ok(Snapshot::new(
        dataset.id().to_owned(),
        snapshot_id,
        manifest,
    ))
}

/// Encode one data object through the compressor/checksum pipeline and
/// persist it at `key`.
async fn write_data_object(
    dataset: &Dataset,
    key: &str,
    encode: impl FnOnce(&mut dyn Write) -> Result<(), Error>,
) -> Result<WrittenObject, Error> {
    let hasher = dataset.checksum().map(|checksum| checksum.new_hasher());
    let (mut object, sink) = ObjectWriter::new(
        dataset.store().clone(),
        key.to_owned(),
        hasher,
        dataset.stream_buffer_limit(),
    );
    let mut pipeline = dataset.compressor().wrap(Box::new(sink));
    if let Err(err) = encode(&mut pipeline) {
        object.abort().await;
        return Err(err);
    }
    if let Err(err) = pipeline.finish() {
        object.abort().await;
        return Err(err);
    }
    object.finish().await
}

//////////////////////////////////////// streaming writes //////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Writing,
    Committed,
    Aborted,
    Failed,
}

impl StreamState {
    fn name(self) -> &'static str {
        match self {
            StreamState::Writing => "writing",
            StreamState::Committed => "committed",
            StreamState::Aborted => "aborted",
            StreamState::Failed => "failed",
        }
    }
}

struct StreamCore {
    dataset: Dataset,
    snapshot_id: String,
    parent: Option<String>,
    metadata: Metadata,
    key: String,
    object: Option<ObjectWriter>,
    state: StreamState,
}

impl StreamCore {
    async fn open(dataset: &Dataset, metadata: Option<Metadata>) -> Result<Self, Error> {
        let metadata = metadata.ok_or(Error::InvalidMetadata)?;
        let snapshot_id = generate_snapshot_id();
        let parent = current_head(dataset).await?;
        let file_name = data_file_name(
            0,
            dataset.codec().and_then(|codec| codec.file_extension()),
            dataset.compressor().file_extension(),
        );
        let key = dataset
            .layout()
            .data_path(dataset.id(), &snapshot_id, "", &file_name);
        Ok(StreamCore {
            dataset: dataset.clone(),
            snapshot_id,
            parent,
            metadata,
            key,
            object: None,
            state: StreamState::Writing,
        })
    }

    fn begin(&mut self) -> SharedSink {
        let hasher = self
            .dataset
            .checksum()
            .map(|checksum| checksum.new_hasher());
        let (object, sink) = ObjectWriter::new(
            self.dataset.store().clone(),
            self.key.clone(),
            hasher,
            self.dataset.stream_buffer_limit(),
        );
        self.object = Some(object);
        sink
    }

    fn ensure_writing(&self) -> Result<(), Error> {
        match self.state {
            StreamState::Writing => Ok(()),
            state => Err(Error::StreamClosed(state.name())),
        }
    }

    async fn spill(&mut self) -> Result<(), Error> {
        let object = self.object.as_mut().expect("stream object open");
        match object.spill().await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Move to `Failed`, abandoning the upload, and hand the error back.
    async fn fail(&mut self, err: Error) -> Error {
        self.state = StreamState::Failed;
        if let Some(mut object) = self.object.take() {
            object.abort().await;
        }
        err
    }

    async fn commit(&mut self, files: Vec<FileRef>, row_count: Option<i64>) -> Result<Snapshot, Error> {
        let manifest = build_manifest(
            &self.dataset,
            &self.snapshot_id,
            self.parent.take(),
            std::mem::take(&mut self.metadata),
            files,
            row_count,
        )?;
        match commit_manifest(&self.dataset, &manifest).await {
            Ok(()) => {
                self.state = StreamState::Committed;
                Ok(Snapshot::new(
                    self.dataset.id().to_owned(),
                    self.snapshot_id.clone(),
                    manifest,
                ))
            }
            Err(err) => {
                // The data object is already at its final path; without a
                // manifest it stays invisible and GC-able by prefix.
                self.state = StreamState::Failed;
                Err(err)
            }
        }
    }

    async fn abort(&mut self) -> Result<(), Error> {
        self.ensure_writing()?;
        self.state = StreamState::Aborted;
        if let Some(mut object) = self.object.take() {
            object.abort().await;
        }
        if let Err(err) = self.dataset.store().delete(&self.key).await {
            tracing::warn!(key = %self.key, error = %err, "failed to delete partial object on abort");
        }
        Ok(())
    }
}

impl Drop for StreamCore {
    fn drop(&mut self) {
        if self.state == StreamState::Writing {
            tracing::warn!(
                key = %self.key,
                "streaming write dropped without commit; no snapshot is visible, \
                 staged data may need garbage collection"
            );
        }
    }
}

/// Streaming byte writer for blob snapshots.
///
/// Obtained from [`Dataset::stream_writer`]; dropping the handle without
/// committing is an implicit abort — no manifest is written, so no snapshot
/// ever becomes visible.
pub struct StreamWriter {
    core: StreamCore,
    pipeline: Option<Box<dyn FinishWrite>>,
    written: u64,
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("written", &self.written)
            .finish()
    }
}

impl StreamWriter {
    pub(crate) async fn open(dataset: &Dataset, metadata: Option<Metadata>) -> Result<Self, Error> {
        require_blob_only(dataset)?;
        let mut core = StreamCore::open(dataset, metadata).await?;
        let sink = core.begin();
        let pipeline = dataset.compressor().wrap(Box::new(sink));
        Ok(StreamWriter {
            core,
            pipeline: Some(pipeline),
            written: 0,
        })
    }

    /// Append bytes to the blob.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.core.ensure_writing()?;
        let pipeline = self.pipeline.as_mut().expect("pipeline open while writing");
        if let Err(err) = pipeline.write_all(bytes) {
            return Err(self.core.fail(err.into()).await);
        }
        self.written += bytes.len() as u64;
        self.core.spill().await
    }

    /// Total uncompressed bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Finish the object and publish the manifest.
    pub async fn commit(mut self) -> Result<Snapshot, Error> {
        self.core.ensure_writing()?;
        let pipeline = self.pipeline.take().expect("pipeline open while writing");
        if let Err(err) = pipeline.finish() {
            return Err(self.core.fail(err).await);
        }
        let object = self.core.object.take().expect("stream object open");
        let written = match object.finish().await {
            Ok(written) => written,
            Err(err) => return Err(self.core.fail(err).await),
        };
        let files = vec![file_ref(self.core.key.clone(), &written)];
        // Blob row counts are the caller's choice, recorded via metadata.
        self.core.commit(files, None).await
    }

    /// Abandon the write, best-effort deleting the partial object.
    pub async fn abort(mut self) -> Result<(), Error> {
        self.pipeline = None;
        self.core.abort().await
    }
}

/// Streaming record writer for datasets whose codec can stream.
///
/// Obtained from [`Dataset::stream_records`]; dropping without commit is an
/// implicit abort.
pub struct RecordStreamWriter {
    core: StreamCore,
    encoder: Option<Box<dyn StreamEncoder>>,
    records_written: i64,
}

impl std::fmt::Debug for RecordStreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStreamWriter")
            .field("records_written", &self.records_written)
            .finish()
    }
}

impl RecordStreamWriter {
    pub(crate) async fn open(dataset: &Dataset, metadata: Option<Metadata>) -> Result<Self, Error> {
        let codec = dataset
            .codec()
            .cloned()
            .ok_or_else(|| Error::InvalidFormat("record write on a blob-only dataset".to_owned()))?;
        let mut core = StreamCore::open(dataset, metadata).await?;
        let sink = core.begin();
        let pipeline = dataset.compressor().wrap(Box::new(sink));
        // Surfaces CodecNotStreamable before anything touches the store.
        let encoder = match codec.stream_encoder(pipeline) {
            Ok(encoder) => encoder,
            Err(err) => {
                core.state = StreamState::Failed;
                return Err(err);
            }
        };
        Ok(RecordStreamWriter {
            core,
            encoder: Some(encoder),
            records_written: 0,
        })
    }

    /// Append one record.
    pub async fn write_record(&mut self, record: &Record) -> Result<(), Error> {
        self.core.ensure_writing()?;
        let encoder = self.encoder.as_mut().expect("encoder open while writing");
        if let Err(err) = encoder.write_record(record) {
            return Err(self.core.fail(err).await);
        }
        self.records_written += 1;
        self.core.spill().await
    }

    /// Records accepted so far.
    pub fn records_written(&self) -> i64 {
        self.records_written
    }

    /// Finish the object and publish the manifest.
    pub async fn commit(mut self) -> Result<Snapshot, Error> {
        self.core.ensure_writing()?;
        let encoder = self.encoder.take().expect("encoder open while writing");
        if let Err(err) = encoder.close() {
            return Err(self.core.fail(err).await);
        }
        let object = self.core.object.take().expect("stream object open");
        let written = match object.finish().await {
            Ok(written) => written,
            Err(err) => return Err(self.core.fail(err).await),
        };
        let files = vec![file_ref(self.core.key.clone(), &written)];
        let rows = self.records_written;
        self.core.commit(files, Some(rows)).await
    }

    /// Abandon the write, best-effort deleting the partial object.
    pub async fn abort(mut self) -> Result<(), Error> {
        self.encoder = None;
        self.core.abort().await
    }
}

pub(crate) async fn open_stream_writer(
    dataset: &Dataset,
    metadata: Option<Metadata>,
) -> Result<StreamWriter, Error> {
    StreamWriter::open(dataset, metadata).await
}

pub(crate) async fn open_record_stream_writer(
    dataset: &Dataset,
    metadata: Option<Metadata>,
) -> Result<RecordStreamWriter, Error> {
    RecordStreamWriter::open(dataset, metadata).await
}

///////////////////////////////////////////// commit ///////////////////////////////////////////

fn build_manifest(
    dataset: &Dataset,
    snapshot_id: &str,
    parent: Option<String>,
    metadata: Metadata,
    files: Vec<FileRef>,
    record_count: Option<i64>,
) -> Result<Manifest, Error> {
    let (entries, row_count_override, min_timestamp, max_timestamp) = metadata.into_parts();
    // Structured writes record the encoded record count; blob writes record
    // the caller's choice, defaulting to zero.
    let row_count = record_count.or(row_count_override).unwrap_or(0);
    let mut builder = ManifestBuilder::default();
    builder
        .dataset_id(dataset.id())
        .snapshot_id(snapshot_id)
        .created_at(Utc::now())
        .metadata(entries)
        .files(files)
        .row_count(row_count)
        .codec(
            dataset
                .codec()
                .map(|codec| codec.name().to_owned())
                .unwrap_or_else(|| NOOP.to_owned()),
        )
        .compressor(dataset.compressor().name())
        .partitioner(dataset.partitioner().name());
    if let Some(parent) = parent {
        builder.parent_snapshot_id(parent);
    }
    if let Some(min) = min_timestamp {
        builder.min_timestamp(min);
    }
    if let Some(max) = max_timestamp {
        builder.max_timestamp(max);
    }
    builder
        .build()
        .map_err(lode_spec::Error::from)
        .map_err(Error::from)
}

/// Publish the manifest — the commit point. The no-overwrite put makes a
/// duplicate snapshot id fail with `PathExists` and lets exactly one of two
/// racing commits win.
async fn commit_manifest(dataset: &Dataset, manifest: &Manifest) -> Result<(), Error> {
    validate_manifest(manifest)?;
    let key = dataset
        .layout()
        .manifest_path(&manifest.dataset_id, &manifest.snapshot_id);
    let bytes = serde_json::to_vec_pretty(manifest)?;
    dataset.store().put(&key, Bytes::from(bytes)).await?;
    tracing::info!(
        dataset = %manifest.dataset_id,
        snapshot = %manifest.snapshot_id,
        files = manifest.files.as_ref().map(Vec::len).unwrap_or(0),
        rows = manifest.row_count.unwrap_or(0),
        "committed snapshot"
    );
    Ok(())
}

async fn current_head(dataset: &Dataset) -> Result<Option<String>, Error> {
    Ok(dataset
        .current()
        .await?
        .map(|segment| segment.snapshot_id))
}

fn require_blob_only(dataset: &Dataset) -> Result<(), Error> {
    if dataset.codec().is_some() {
        return Err(Error::InvalidFormat(
            "blob write on a dataset with a codec bound".to_owned(),
        ));
    }
    Ok(())
}

fn file_ref(path: String, object: &WrittenObject) -> FileRef {
    FileRef {
        path,
        size_bytes: object.size_bytes as i64,
        checksum: object.checksum.clone(),
    }
}

fn data_file_name(index: usize, codec_ext: Option<&str>, compressor_ext: Option<&str>) -> String {
    let mut name = format!("part-{index:05}");
    if let Some(ext) = codec_ext {
        name.push('.');
        name.push_str(ext);
    }
    if let Some(ext) = compressor_ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Best-effort removal of partial objects after a failed commit. Runs on
/// its own, regardless of what canceled the write, and reports nothing —
/// the original error is what callers see.
async fn cleanup_objects(store: &Arc<dyn ObjectStore>, keys: &[String]) {
    stream::iter(keys)
        .for_each_concurrent(None, |key| {
            let store = store.clone();
            async move {
                if let Err(err) = store.delete(key).await {
                    tracing::warn!(key = %key, error = %err, "failed to clean up partial object");
                }
            }
        })
        .await;
}
