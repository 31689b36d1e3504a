/*!
Partitioners map records to path fragments within a snapshot.

The engine never inspects record contents; the partitioner and the codec
agree on record shape out of band. When a write sees more than one distinct
fragment, it produces one data object per fragment.
*/

use crate::codec::Record;
use crate::error::Error;

/// Record-to-fragment mapping contract.
pub trait Partitioner: std::fmt::Debug + Send + Sync {
    /// Name recorded in manifests; `"noop"` canonical.
    fn name(&self) -> &str;

    /// Path fragment grouping this record, empty for unpartitioned. A
    /// non-empty fragment must be a relative forward-slash path with no
    /// empty components. Partitioners that need a field the record lacks
    /// fail with `SchemaViolation`.
    fn partition_path(&self, record: &Record) -> Result<String, Error>;
}

/// Canonical partitioner: everything in one unpartitioned object.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPartitioner;

impl Partitioner for NoopPartitioner {
    fn name(&self) -> &str {
        "noop"
    }

    fn partition_path(&self, _record: &Record) -> Result<String, Error> {
        Ok(String::new())
    }
}

/// Reject fragments that would corrupt object keys.
pub(crate) fn validate_fragment(fragment: &str) -> Result<(), Error> {
    let ok = fragment.is_empty()
        || (!fragment.starts_with('/')
            && !fragment.ends_with('/')
            && fragment.split('/').all(|part| !part.is_empty() && part != ".."));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidPath(format!(
            "partition fragment {fragment:?} is not a clean relative path"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn noop_yields_empty_fragment() {
        assert_eq!(
            NoopPartitioner.partition_path(&json!({"id": 1})).unwrap(),
            ""
        );
        assert_eq!(NoopPartitioner.name(), "noop");
    }

    #[test]
    fn fragment_validation() {
        for fragment in ["", "dt=2024", "dt=2024/region=eu"] {
            validate_fragment(fragment).unwrap();
        }
        for fragment in ["/abs", "trailing/", "a//b", "../escape"] {
            assert!(validate_fragment(fragment).is_err(), "{fragment:?}");
        }
    }
}
