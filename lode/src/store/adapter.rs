use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{MultipartUpload, ObjectStore as ObjectStoreTrait, PutMode, PutOptions};

use crate::error::Error;

use super::{MultipartSink, ObjectStore, RangeReadStore, ReaderAt};

/// Default payload size up to which `put` uses a single atomic conditional
/// create.
pub const DEFAULT_ONE_SHOT_THRESHOLD: usize = 8 * 1024 * 1024;

const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// [`ObjectStore`] implementation over any `object_store` crate backend.
///
/// Payloads at or below `one_shot_threshold` are written with
/// `PutMode::Create`, which is atomic on every backend the crate supports.
/// Larger payloads and [`ObjectStore::put_multipart`] preflight an existence
/// check and then upload in `part_size` chunks; between the check and the
/// completion another writer could slip in, so streaming writes need
/// single-writer coordination. `list` and `exists` inherit the backend's
/// consistency. Range reads are true ranged requests, never whole-object
/// downloads. Production deployments should keep `part_size` at or above
/// the backend's minimum part size.
#[derive(Debug, Clone)]
pub struct ObjectStoreAdapter {
    inner: Arc<dyn ObjectStoreTrait>,
    one_shot_threshold: usize,
    part_size: usize,
}

impl ObjectStoreAdapter {
    /// Wrap an `object_store` backend with default thresholds.
    pub fn new(inner: Arc<dyn ObjectStoreTrait>) -> Self {
        ObjectStoreAdapter {
            inner,
            one_shot_threshold: DEFAULT_ONE_SHOT_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Adapter over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Override the one-shot/multipart cutover size.
    pub fn with_one_shot_threshold(mut self, bytes: usize) -> Self {
        self.one_shot_threshold = bytes;
        self
    }

    /// Override the multipart part size.
    pub fn with_part_size(mut self, bytes: usize) -> Self {
        self.part_size = bytes.max(1);
        self
    }

    async fn size_of(&self, key: &str) -> Result<u64, Error> {
        let meta = self.inner.head(&Path::from(key)).await?;
        Ok(meta.size as u64)
    }
}

#[async_trait]
impl ObjectStore for ObjectStoreAdapter {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), Error> {
        if bytes.len() <= self.one_shot_threshold {
            let options = PutOptions {
                mode: PutMode::Create,
                ..Default::default()
            };
            self.inner
                .put_opts(&Path::from(key), bytes.into(), options)
                .await?;
            return Ok(());
        }
        // Multipart path: preflight only, see the adapter docs.
        if self.exists(key).await? {
            return Err(Error::PathExists(key.to_owned()));
        }
        let mut upload = self.inner.put_multipart(&Path::from(key)).await?;
        for part in bytes.chunks(self.part_size) {
            upload.put_part(Bytes::copy_from_slice(part).into()).await?;
        }
        upload.complete().await?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str) -> Result<Box<dyn MultipartSink>, Error> {
        if self.exists(key).await? {
            return Err(Error::PathExists(key.to_owned()));
        }
        let upload = self.inner.put_multipart(&Path::from(key)).await?;
        Ok(Box::new(MultipartUploadSink { upload }))
    }

    async fn get(&self, key: &str) -> Result<Bytes, Error> {
        Ok(self.inner.get(&Path::from(key)).await?.bytes().await?)
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        match self.inner.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let prefix = (!prefix.is_empty()).then(|| Path::from(prefix));
        let mut stream = self.inner.list(prefix.as_ref());
        let mut keys = Vec::new();
        while let Some(meta) = stream.next().await {
            keys.push(meta?.location.to_string());
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        match self.inner.delete(&Path::from(key)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn range_read(&self) -> Option<&dyn RangeReadStore> {
        Some(self)
    }
}

#[async_trait]
impl RangeReadStore for ObjectStoreAdapter {
    async fn stat(&self, key: &str) -> Result<u64, Error> {
        self.size_of(key).await
    }

    async fn read_range(&self, key: &str, offset: u64, length: u64) -> Result<Bytes, Error> {
        let size = self.size_of(key).await?;
        let Some(range) = clamp_range(key, offset, length, size)? else {
            return Ok(Bytes::new());
        };
        Ok(self.inner.get_range(&Path::from(key), range).await?)
    }

    async fn reader_at(&self, key: &str) -> Result<Box<dyn ReaderAt>, Error> {
        let size = self.size_of(key).await?;
        Ok(Box::new(AdapterReaderAt {
            inner: self.inner.clone(),
            key: key.to_owned(),
            size,
        }))
    }
}

/// Clamp a requested range against the object size.
///
/// `None` means the read is empty (offset at or past the end). Overflowing
/// offset+length is an argument error, not a short read.
fn clamp_range(
    key: &str,
    offset: u64,
    length: u64,
    size: u64,
) -> Result<Option<Range<usize>>, Error> {
    let end = offset
        .checked_add(length)
        .ok_or_else(|| Error::InvalidPath(format!("range overflows for {key}")))?;
    if offset >= size || length == 0 {
        return Ok(None);
    }
    let end = end.min(size);
    Ok(Some(offset as usize..end as usize))
}

struct AdapterReaderAt {
    inner: Arc<dyn ObjectStoreTrait>,
    key: String,
    size: u64,
}

#[async_trait]
impl ReaderAt for AdapterReaderAt {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&self, offset: u64, length: u64) -> Result<Bytes, Error> {
        let Some(range) = clamp_range(&self.key, offset, length, self.size)? else {
            return Ok(Bytes::new());
        };
        Ok(self.inner.get_range(&Path::from(self.key.as_str()), range).await?)
    }
}

struct MultipartUploadSink {
    upload: Box<dyn MultipartUpload>,
}

#[async_trait]
impl MultipartSink for MultipartUploadSink {
    async fn put_part(&mut self, bytes: Bytes) -> Result<(), Error> {
        self.upload.put_part(bytes.into()).await?;
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), Error> {
        self.upload.complete().await?;
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), Error> {
        self.upload.abort().await?;
        Ok(())
    }
}
