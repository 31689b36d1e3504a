/*!
Backend-agnostic object-store contract.

The engine talks to storage exclusively through [`ObjectStore`]. The provided
[`ObjectStoreAdapter`] covers every backend the `object_store` crate reaches
(in-memory, local filesystem, cloud stores); alternative adapters implement
the trait directly.

The write contract is no-overwrite: `put` must fail with
[`Error::PathExists`](crate::error::Error::PathExists) when the key is
already present. How strongly an adapter can honor that depends on the path
taken: one-shot puts use an atomic conditional create where the backend has
one, while multipart uploads can only preflight an existence check and carry
a time-of-check/time-of-use window. Adapters document their threshold and
their consistency guarantees; callers provide single-writer coordination for
streaming writes on backends without conditional multipart completion.

`delete` is an administrative capability: it is reachable only through the
store handle itself and is never surfaced by dataset or reader APIs, which
keeps snapshot-referenced data undeletable from the public surface.
*/

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Error;

mod adapter;

pub use adapter::{ObjectStoreAdapter, DEFAULT_ONE_SHOT_THRESHOLD};

/// Object store contract the engine writes and reads through.
///
/// Keys are forward-slash separated paths relative to the store root;
/// adapters must not inject backend-specific separators.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    /// Write `bytes` at `key`, failing with `PathExists` if the key is
    /// already present. Payloads at or below the adapter's one-shot
    /// threshold use an atomic conditional create; larger payloads take the
    /// multipart path with best-effort overwrite protection.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), Error>;

    /// Open a chunked upload to `key` for payloads whose size is unknown up
    /// front. Overwrite protection is a preflight existence check only.
    async fn put_multipart(&self, key: &str) -> Result<Box<dyn MultipartSink>, Error>;

    /// Fetch the object at `key`, `NotFound` if absent.
    async fn get(&self, key: &str) -> Result<Bytes, Error>;

    /// Whether `key` exists. Never mutates.
    async fn exists(&self, key: &str) -> Result<bool, Error>;

    /// All keys under `prefix`, unordered. Pagination is the adapter's
    /// concern.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error>;

    /// Delete the object at `key`; succeeds when the key is already absent.
    ///
    /// Administrative capability, see the module docs.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Range-read capability detection. Adapters that can serve true ranged
    /// reads return `Some`; consumers fall back or surface
    /// `RangeReadNotSupported` rather than simulate ranges by downloading
    /// whole objects.
    fn range_read(&self) -> Option<&dyn RangeReadStore> {
        None
    }
}

/// An in-progress chunked upload returned by [`ObjectStore::put_multipart`].
///
/// The object becomes visible at its key only when `complete` succeeds.
#[async_trait]
pub trait MultipartSink: Send {
    /// Upload one part.
    async fn put_part(&mut self, bytes: Bytes) -> Result<(), Error>;
    /// Finish the upload, making the object visible.
    async fn complete(&mut self) -> Result<(), Error>;
    /// Abandon the upload and clean up staged parts.
    async fn abort(&mut self) -> Result<(), Error>;
}

impl std::fmt::Debug for dyn MultipartSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MultipartSink")
    }
}

/// Optional capability for stores that serve true ranged reads.
#[async_trait]
pub trait RangeReadStore: Send + Sync {
    /// Size of the object at `key` in bytes.
    async fn stat(&self, key: &str) -> Result<u64, Error>;

    /// Read `length` bytes starting at `offset`. Returns the available
    /// bytes when the range extends past the end of the object and an empty
    /// buffer when `offset` is at or past the end; `InvalidPath` on
    /// overflowing arguments.
    async fn read_range(&self, key: &str, offset: u64, length: u64) -> Result<Bytes, Error>;

    /// A sized random-access reader over the object at `key`, safe for
    /// concurrent reads at different offsets.
    async fn reader_at(&self, key: &str) -> Result<Box<dyn ReaderAt>, Error>;
}

impl std::fmt::Debug for dyn RangeReadStore + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RangeReadStore")
    }
}

/// Sized random-access reader handed out by [`RangeReadStore::reader_at`].
#[async_trait]
pub trait ReaderAt: Send + Sync {
    /// Total size of the underlying object.
    fn size(&self) -> u64;

    /// Read up to `length` bytes at `offset`, with the same edge semantics
    /// as [`RangeReadStore::read_range`].
    async fn read_at(&self, offset: u64, length: u64) -> Result<Bytes, Error>;
}

/// The store's range-read capability, or `RangeReadNotSupported` for
/// callers that need one.
pub fn range_read_capability(store: &dyn ObjectStore) -> Result<&dyn RangeReadStore, Error> {
    store.range_read().ok_or(Error::RangeReadNotSupported)
}
