/*!
Streaming checksums over stored object bytes.

The checksum component is optional on a dataset. When bound, every data
object's manifest entry carries `"<algorithm>:<hex>"` computed over the
bytes as stored (after compression); when absent, checksum fields are
omitted entirely.
*/

use crc32fast::Hasher;

/// Checksum algorithm contract.
pub trait Checksum: std::fmt::Debug + Send + Sync {
    /// Algorithm name, the part before the colon in `"<name>:<hex>"`.
    fn name(&self) -> &str;

    /// Fresh streaming hasher for one object.
    fn new_hasher(&self) -> Box<dyn ChecksumHasher>;
}

/// Streaming hasher for a single object.
pub trait ChecksumHasher: Send {
    /// Feed stored bytes in order.
    fn update(&mut self, bytes: &[u8]);

    /// Render the final `"<name>:<hex>"` digest.
    fn finalize(self: Box<Self>) -> String;
}

/// CRC32 (IEEE) checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Checksum;

impl Checksum for Crc32Checksum {
    fn name(&self) -> &str {
        "crc32"
    }

    fn new_hasher(&self) -> Box<dyn ChecksumHasher> {
        Box::new(Crc32Hasher(Hasher::new()))
    }
}

struct Crc32Hasher(Hasher);

impl ChecksumHasher for Crc32Hasher {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self: Box<Self>) -> String {
        format!("crc32:{:08x}", self.0.finalize())
    }
}
