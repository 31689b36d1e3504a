/*!
Lazy iterators over the contents of a segment.

Both iterators follow the same lifecycle: `next` advances and yields the
current item, returning `None` on exhaustion or after `close`; a terminal
error ends iteration early and stays readable through `err`; `close` is
idempotent and drops every buffer and file reference so the memory is
reclaimable. Iterators are single-owner — they are not meant to be shared
between callers.
*/

use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::sync::Arc;

use bytes::Bytes;
use lode_spec::manifest::FileRef;

use crate::codec::{Codec, Record};
use crate::compress::Compressor;
use crate::error::Error;
use crate::store::ObjectStore;

/// Records of a segment, files fetched lazily and concatenated in manifest
/// order.
pub struct RecordIterator {
    source: Option<RecordSource>,
    files: VecDeque<FileRef>,
    current: std::vec::IntoIter<Record>,
    err: Option<Error>,
    closed: bool,
}

struct RecordSource {
    store: Arc<dyn ObjectStore>,
    codec: Arc<dyn Codec>,
    compressor: Arc<dyn Compressor>,
}

impl RecordIterator {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        codec: Arc<dyn Codec>,
        compressor: Arc<dyn Compressor>,
        files: Vec<FileRef>,
    ) -> Self {
        RecordIterator {
            source: Some(RecordSource {
                store,
                codec,
                compressor,
            }),
            files: files.into(),
            current: Vec::new().into_iter(),
            err: None,
            closed: false,
        }
    }

    /// An iterator that yields nothing.
    pub fn empty() -> Self {
        RecordIterator {
            source: None,
            files: VecDeque::new(),
            current: Vec::new().into_iter(),
            err: None,
            closed: false,
        }
    }

    /// Advance to the next record. `None` means exhausted, closed, or
    /// stopped on an error — check [`RecordIterator::err`] to tell the
    /// last case apart.
    pub async fn next(&mut self) -> Option<Record> {
        if self.closed {
            return None;
        }
        loop {
            if let Some(record) = self.current.next() {
                return Some(record);
            }
            let file = self.files.pop_front()?;
            let source = self.source.as_ref()?;
            match load_records(source, &file).await {
                Ok(records) => self.current = records.into_iter(),
                Err(err) => {
                    self.err = Some(err);
                    self.close();
                    return None;
                }
            }
        }
    }

    /// The error that terminated iteration, if any. Callable at any point,
    /// including after exhaustion or close.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Stop iterating and release buffered records and file references.
    /// Idempotent; `next` returns `None` from here on.
    pub fn close(&mut self) {
        self.closed = true;
        self.files = VecDeque::new();
        self.current = Vec::new().into_iter();
        self.source = None;
    }
}

async fn load_records(source: &RecordSource, file: &FileRef) -> Result<Vec<Record>, Error> {
    let bytes = source.store.get(&file.path).await?;
    let mut reader = source.compressor.unwrap(Box::new(Cursor::new(bytes)));
    source.codec.decode(&mut reader)
}

/// Raw data objects of a segment, decompressed, fetched lazily in manifest
/// order. Each item pairs the manifest entry with the object's payload.
pub struct ObjectIterator {
    source: Option<ObjectSource>,
    files: VecDeque<FileRef>,
    err: Option<Error>,
    closed: bool,
}

struct ObjectSource {
    store: Arc<dyn ObjectStore>,
    compressor: Arc<dyn Compressor>,
}

impl ObjectIterator {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        compressor: Arc<dyn Compressor>,
        files: Vec<FileRef>,
    ) -> Self {
        ObjectIterator {
            source: Some(ObjectSource { store, compressor }),
            files: files.into(),
            err: None,
            closed: false,
        }
    }

    /// An iterator that yields nothing.
    pub fn empty() -> Self {
        ObjectIterator {
            source: None,
            files: VecDeque::new(),
            err: None,
            closed: false,
        }
    }

    /// Advance to the next object. Same contract as
    /// [`RecordIterator::next`].
    pub async fn next(&mut self) -> Option<(FileRef, Bytes)> {
        if self.closed {
            return None;
        }
        let file = self.files.pop_front()?;
        let source = self.source.as_ref()?;
        match load_object(source, &file).await {
            Ok(payload) => Some((file, payload)),
            Err(err) => {
                self.err = Some(err);
                self.close();
                None
            }
        }
    }

    /// The error that terminated iteration, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Stop iterating and release held references. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        self.files = VecDeque::new();
        self.source = None;
    }
}

async fn load_object(source: &ObjectSource, file: &FileRef) -> Result<Bytes, Error> {
    let bytes = source.store.get(&file.path).await?;
    let mut reader = source.compressor.unwrap(Box::new(Cursor::new(bytes)));
    let mut payload = Vec::new();
    reader.read_to_end(&mut payload)?;
    Ok(Bytes::from(payload))
}
