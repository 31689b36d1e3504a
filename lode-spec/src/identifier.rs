/*!
Identifier rules for datasets and snapshots.

Dataset and snapshot ids are opaque strings that become object-store path
components, so they must never smuggle separators or edge whitespace into a
key.
*/

use chrono::Utc;
use uuid::Uuid;

use crate::error::Error;

/// Validate a dataset or snapshot identifier.
///
/// Ids must be non-empty, free of path separators and free of leading or
/// trailing whitespace. `kind` names the identifier in the error ("dataset"
/// or "snapshot").
pub fn validate_id(kind: &'static str, id: &str) -> Result<(), Error> {
    let reason = if id.is_empty() {
        Some("must not be empty")
    } else if id.contains('/') || id.contains('\\') {
        Some("must not contain path separators")
    } else if id != id.trim() {
        Some("must not have leading or trailing whitespace")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidIdentifier {
            kind,
            id: id.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Generate a new snapshot id.
///
/// The id is `<20-digit microseconds since the Unix epoch>-<8 hex chars of a
/// random uuid>`. The zero-padded time component makes serially generated
/// ids lexically monotonic, which the reader relies on to order segments
/// before parent links are loaded; the uuid suffix makes collisions across
/// writers vanishingly unlikely.
pub fn generate_snapshot_id() -> String {
    let micros = Utc::now().timestamp_micros().max(0);
    let entropy = Uuid::new_v4().simple().to_string();
    format!("{:020}-{}", micros, &entropy[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        validate_id("dataset", "events").unwrap();
        validate_id("snapshot", "00000000000000000001-abcd1234").unwrap();
        validate_id("dataset", "a.b-c_d").unwrap();
    }

    #[test]
    fn rejects_bad_ids() {
        for id in ["", "a/b", "a\\b", " a", "a ", "\ta"] {
            let err = validate_id("dataset", id).unwrap_err();
            assert!(matches!(err, Error::InvalidIdentifier { .. }), "{id:?}");
        }
    }

    #[test]
    fn snapshot_ids_are_lexically_monotonic() {
        let a = generate_snapshot_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = generate_snapshot_id();
        assert!(a < b, "{a} !< {b}");
        validate_id("snapshot", &a).unwrap();
    }
}
