/*!
Lode persists immutable, manifest-described snapshots of structured records
and opaque blobs onto pluggable object stores.

A [`Dataset`](dataset::Dataset) binds a codec, compressor, partitioner,
layout and optional checksum to an object store. Writes stream records (or
bytes) through that pipeline into data objects at their final paths, then
publish a single manifest whose presence is the atomic commit signal; a
[`Reader`](reader::Reader) discovers datasets and snapshots by scanning for
manifests under the layout's prefixes, validating every manifest it loads.
History is strictly linear — each snapshot records at most one parent — and
nothing reachable from this API deletes snapshot-referenced data.

```
# use std::sync::Arc;
# use lode::dataset::{Dataset, Metadata};
# use lode::codec::JsonlCodec;
# use lode::store::ObjectStoreAdapter;
# async fn example() -> Result<(), lode::error::Error> {
let dataset = Dataset::builder()
    .id("events")
    .store(Arc::new(ObjectStoreAdapter::in_memory()))
    .codec(Arc::new(JsonlCodec))
    .build()
    .expect("valid dataset configuration");

let records = vec![serde_json::json!({"id": 1, "u": "a"})];
let snapshot = dataset
    .write(&records, Some(Metadata::new().with("source", "example")))
    .await?;

let mut reader = dataset.reader().open_records("events", snapshot.snapshot_id()).await?;
while let Some(record) = reader.next().await {
    println!("{record}");
}
# Ok(())
# }
```
*/

pub mod checksum;
pub mod codec;
pub mod compress;
pub mod dataset;
pub mod error;
pub mod iter;
pub mod layout;
pub mod partition;
pub mod reader;
pub mod store;
pub mod writer;

pub use crate::codec::{Codec, JsonlCodec, Record};
pub use crate::compress::{Compressor, GzipCompressor, NoopCompressor};
pub use crate::dataset::{Dataset, DatasetBuilder, Metadata, Snapshot};
pub use crate::error::Error;
pub use crate::layout::{DefaultLayout, Layout};
pub use crate::reader::{Reader, SegmentRef};
pub use crate::store::{ObjectStore, ObjectStoreAdapter};
pub use crate::writer::{RecordStreamWriter, StreamWriter};
