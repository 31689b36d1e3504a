/*!
Codecs serialize records to bytes and back.

A codec may additionally support streaming encoding, accepting records one
at a time; codecs that must buffer until close (Parquet-class formats write
a footer) keep the default [`Codec::stream_encoder`], which fails with
`CodecNotStreamable`, and their datasets reject streaming record writes.

The codec name `"noop"` is reserved: it never names a real codec and marks
a manifest whose dataset is blob-only.
*/

use std::io::{Read, Write};

use crate::compress::FinishWrite;
use crate::error::Error;

mod jsonl;

pub use jsonl::JsonlCodec;

/// A single record. The engine treats records as opaque JSON values; codec
/// and partitioner agree on their shape out of band.
pub type Record = serde_json::Value;

/// Record serialization contract.
pub trait Codec: std::fmt::Debug + Send + Sync {
    /// Name recorded in manifests, e.g. `"jsonl"`. `"noop"` is reserved.
    fn name(&self) -> &str;

    /// File-name extension for data objects, `None` for none.
    fn file_extension(&self) -> Option<&str> {
        None
    }

    /// Encode `records` in order into `writer`.
    fn encode(&self, writer: &mut dyn Write, records: &[Record]) -> Result<(), Error>;

    /// Decode all records from `reader` in encoding order.
    fn decode(&self, reader: &mut dyn Read) -> Result<Vec<Record>, Error>;

    /// Open a streaming encoder over `writer`, which the encoder owns and
    /// finishes on close. Codecs that cannot stream keep this default.
    fn stream_encoder(
        &self,
        _writer: Box<dyn FinishWrite>,
    ) -> Result<Box<dyn StreamEncoder>, Error> {
        Err(Error::CodecNotStreamable(self.name().to_owned()))
    }
}

/// Record-at-a-time encoder for streaming writes.
pub trait StreamEncoder: Send {
    /// Encode one record.
    fn write_record(&mut self, record: &Record) -> Result<(), Error>;

    /// Flush codec framing and finish the underlying sink.
    fn close(self: Box<Self>) -> Result<(), Error>;
}
