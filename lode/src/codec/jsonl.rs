use std::io::{BufRead, BufReader, Read, Write};

use crate::compress::FinishWrite;
use crate::error::Error;

use super::{Codec, Record, StreamEncoder};

/// Line-delimited JSON codec: one JSON document per `\n`-terminated line.
///
/// Streaming-capable, since each record is self-delimiting. Blank lines are
/// tolerated on decode; anything else that fails to parse is an
/// `InvalidFormat` error naming the line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlCodec;

impl Codec for JsonlCodec {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn file_extension(&self) -> Option<&str> {
        Some("jsonl")
    }

    fn encode(&self, writer: &mut dyn Write, records: &[Record]) -> Result<(), Error> {
        for record in records {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<Vec<Record>, Error> {
        let mut records = Vec::new();
        for (number, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|err| {
                Error::InvalidFormat(format!("jsonl line {}: {err}", number + 1))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn stream_encoder(
        &self,
        writer: Box<dyn FinishWrite>,
    ) -> Result<Box<dyn StreamEncoder>, Error> {
        Ok(Box::new(JsonlStreamEncoder { out: writer }))
    }
}

struct JsonlStreamEncoder {
    out: Box<dyn FinishWrite>,
}

impl StreamEncoder for JsonlStreamEncoder {
    fn write_record(&mut self, record: &Record) -> Result<(), Error> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), Error> {
        self.out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_decode_preserves_order() {
        let records = vec![
            json!({"id": 1, "u": "a"}),
            json!({"id": 2, "u": "b"}),
            json!([1, 2, 3]),
        ];
        let mut buf = Vec::new();
        JsonlCodec.encode(&mut buf, &records).unwrap();
        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 3);
        let decoded = JsonlCodec.decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let input = b"{\"id\":1}\n\n{\"id\":2}\n";
        let decoded = JsonlCodec.decode(&mut input.as_slice()).unwrap();
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn garbage_is_invalid_format() {
        let input = b"{\"id\":1}\nnot json\n";
        let err = JsonlCodec.decode(&mut input.as_slice()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)), "{err}");
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}
