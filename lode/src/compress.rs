/*!
Compressors wrap the byte stream between codec and object store.

Every dataset has a compressor bound; "no compression" is the
[`NoopCompressor`], never an absent binding, so manifests always record a
compressor name. Writers must call [`FinishWrite::finish`] to flush any
trailer before the buffered bytes are final.
*/

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Error;

/// A write sink that needs an explicit finish to flush trailing bytes.
pub trait FinishWrite: Write + Send {
    /// Flush any buffered state and trailer into the underlying writer.
    fn finish(self: Box<Self>) -> Result<(), Error>;
}

/// Byte-stream compressor contract.
pub trait Compressor: std::fmt::Debug + Send + Sync {
    /// Name recorded in manifests, e.g. `"gzip"`; `"noop"` canonical.
    fn name(&self) -> &str;

    /// File-name extension for data objects, `None` for none.
    fn file_extension(&self) -> Option<&str> {
        None
    }

    /// Wrap a write sink so bytes written through the result come out
    /// compressed underneath.
    fn wrap(&self, writer: Box<dyn Write + Send>) -> Box<dyn FinishWrite>;

    /// Wrap a read source so compressed bytes come out decompressed.
    fn unwrap(&self, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send>;
}

/// Canonical pass-through compressor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn name(&self) -> &str {
        "noop"
    }

    fn wrap(&self, writer: Box<dyn Write + Send>) -> Box<dyn FinishWrite> {
        Box::new(PassThrough(writer))
    }

    fn unwrap(&self, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        reader
    }
}

struct PassThrough(Box<dyn Write + Send>);

impl Write for PassThrough {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl FinishWrite for PassThrough {
    fn finish(mut self: Box<Self>) -> Result<(), Error> {
        self.0.flush()?;
        Ok(())
    }
}

/// Gzip compressor backed by flate2.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn name(&self) -> &str {
        "gzip"
    }

    fn file_extension(&self) -> Option<&str> {
        Some("gz")
    }

    fn wrap(&self, writer: Box<dyn Write + Send>) -> Box<dyn FinishWrite> {
        Box::new(GzEncoder::new(writer, Compression::default()))
    }

    fn unwrap(&self, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        Box::new(GzDecoder::new(reader))
    }
}

impl FinishWrite for GzEncoder<Box<dyn Write + Send>> {
    fn finish(self: Box<Self>) -> Result<(), Error> {
        GzEncoder::finish(*self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedVec(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedVec {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn round_trip(compressor: &dyn Compressor, payload: &[u8]) -> Vec<u8> {
        let sink = SharedVec::default();
        let mut wrapped = compressor.wrap(Box::new(sink.clone()));
        wrapped.write_all(payload).unwrap();
        wrapped.finish().unwrap();

        let compressed = sink.0.lock().unwrap().clone();
        let mut decoded = Vec::new();
        compressor
            .unwrap(Box::new(std::io::Cursor::new(compressed)))
            .read_to_end(&mut decoded)
            .unwrap();
        decoded
    }

    #[test]
    fn noop_round_trips_unchanged() {
        let payload = b"hello snapshots".to_vec();
        assert_eq!(round_trip(&NoopCompressor, &payload), payload);
    }

    #[test]
    fn gzip_round_trips() {
        let payload: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        assert_eq!(round_trip(&GzipCompressor, &payload), payload);
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(NoopCompressor.name(), "noop");
        assert_eq!(NoopCompressor.file_extension(), None);
        assert_eq!(GzipCompressor.name(), "gzip");
        assert_eq!(GzipCompressor.file_extension(), Some("gz"));
    }
}
