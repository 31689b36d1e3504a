/*!
The persisted manifest document.

A manifest is the single JSON object whose presence at the layout's manifest
path makes a snapshot visible. It names every data object of the snapshot,
carries the caller's metadata, and records which codec, compressor and
partitioner produced the data.

Required-but-validated fields decode leniently: a manifest missing `codec`
still deserializes, and [`validate_manifest`] then rejects it with the field
name attached. This keeps "the producer wrote garbage" (a validation error,
with a machine-readable field) distinct from "this is not JSON" (a decode
error). Unknown fields are ignored on read so newer producers can add fields
without breaking older readers.
*/

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Schema name every Lode manifest carries.
pub const SCHEMA_NAME: &str = "lode-manifest";
/// Current manifest format version.
pub const FORMAT_VERSION: &str = "1.0.0";

/// One data object referenced by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Object-store key of the data object, relative to the store root.
    /// Always forward-slash separated.
    pub path: String,
    /// Size of the stored object in bytes.
    #[serde(default)]
    pub size_bytes: i64,
    /// Checksum of the stored bytes as `"<algorithm>:<hex>"`, present iff
    /// the dataset had a checksum component configured at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// A snapshot manifest.
///
/// `parent_snapshot_id` encodes the strictly linear history: absent for the
/// first snapshot of a dataset, otherwise the id of the snapshot that was
/// the dataset head when this one was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
pub struct Manifest {
    /// Identifies the document schema, always [`SCHEMA_NAME`].
    #[serde(default)]
    #[builder(default = "SCHEMA_NAME.to_owned()")]
    pub schema_name: String,
    /// Format version of this document, gates breaking changes.
    #[serde(default)]
    #[builder(default = "FORMAT_VERSION.to_owned()")]
    pub format_version: String,
    /// Dataset this snapshot belongs to.
    #[serde(default)]
    pub dataset_id: String,
    /// Id of this snapshot.
    #[serde(default)]
    pub snapshot_id: String,
    /// Parent snapshot, absent iff this is the first snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub parent_snapshot_id: Option<String>,
    /// UTC instant the snapshot was committed.
    #[serde(default)]
    #[builder(setter(strip_option))]
    pub created_at: Option<DateTime<Utc>>,
    /// Caller-provided metadata. Must be present, may be empty; an absent
    /// or `null` map fails validation.
    #[serde(default)]
    #[builder(setter(strip_option))]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Data objects of this snapshot in encoding order. Must be present,
    /// may be empty.
    #[serde(default)]
    #[builder(setter(strip_option))]
    pub files: Option<Vec<FileRef>>,
    /// Logical record count encoded into the data files. For blob-only
    /// datasets this is the caller-chosen object count, or zero.
    #[serde(default)]
    #[builder(setter(strip_option))]
    pub row_count: Option<i64>,
    /// Name of the codec that produced the data files, `"noop"` for
    /// blob-only datasets.
    #[serde(default)]
    pub codec: String,
    /// Name of the compressor, `"noop"` when uncompressed.
    #[serde(default)]
    pub compressor: String,
    /// Name of the partitioner, `"noop"` when unpartitioned.
    #[serde(default)]
    pub partitioner: String,
    /// Smallest record timestamp in the snapshot, if the caller tracked one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub min_timestamp: Option<DateTime<Utc>>,
    /// Largest record timestamp in the snapshot, if the caller tracked one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub max_timestamp: Option<DateTime<Utc>>,
}

/// A manifest field that failed validation.
///
/// `field` is the canonical JSON name of the offending field so callers can
/// machine-interpret failures without parsing the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("manifest field {field}: {message}")]
pub struct ValidationError {
    /// Canonical JSON name of the failing field.
    pub field: &'static str,
    /// Human-readable description of the failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError {
            field,
            message: message.into(),
        }
    }
}

/// Validate a decoded manifest.
///
/// Checks run in a deterministic order and the first failure wins. Optional
/// fields are not checked here; they either deserialized or the document
/// never became a [`Manifest`].
pub fn validate_manifest(manifest: &Manifest) -> Result<(), ValidationError> {
    if manifest.schema_name.is_empty() {
        return Err(ValidationError::new("schema_name", "must not be empty"));
    }
    if manifest.format_version.is_empty() {
        return Err(ValidationError::new("format_version", "must not be empty"));
    }
    if manifest.dataset_id.is_empty() {
        return Err(ValidationError::new("dataset_id", "must not be empty"));
    }
    if manifest.snapshot_id.is_empty() {
        return Err(ValidationError::new("snapshot_id", "must not be empty"));
    }
    match manifest.created_at {
        None => {
            return Err(ValidationError::new("created_at", "must be present"));
        }
        Some(ts) if ts.timestamp() == 0 && ts.timestamp_subsec_nanos() == 0 => {
            return Err(ValidationError::new("created_at", "must not be zero"));
        }
        Some(_) => {}
    }
    if manifest.metadata.is_none() {
        return Err(ValidationError::new(
            "metadata",
            "must be a present map, possibly empty",
        ));
    }
    let Some(files) = &manifest.files else {
        return Err(ValidationError::new(
            "files",
            "must be a present list, possibly empty",
        ));
    };
    match manifest.row_count {
        None => {
            return Err(ValidationError::new("row_count", "must be present"));
        }
        Some(n) if n < 0 => {
            return Err(ValidationError::new(
                "row_count",
                format!("must be non-negative, got {n}"),
            ));
        }
        Some(_) => {}
    }
    if manifest.codec.is_empty() {
        return Err(ValidationError::new("codec", "must not be empty"));
    }
    if manifest.compressor.is_empty() {
        return Err(ValidationError::new("compressor", "must not be empty"));
    }
    if manifest.partitioner.is_empty() {
        return Err(ValidationError::new("partitioner", "must not be empty"));
    }
    for (i, file) in files.iter().enumerate() {
        if file.path.is_empty() {
            return Err(ValidationError::new(
                "files.path",
                format!("files[{i}].path must not be empty"),
            ));
        }
        if file.size_bytes < 0 {
            return Err(ValidationError::new(
                "files.size_bytes",
                format!(
                    "files[{i}].size_bytes must be non-negative, got {}",
                    file.size_bytes
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid_manifest() -> Manifest {
        ManifestBuilder::default()
            .dataset_id("events")
            .snapshot_id("00000000000000000001-abcd1234")
            .created_at(Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap())
            .metadata(BTreeMap::from([("source".to_owned(), "test".to_owned())]))
            .files(vec![FileRef {
                path: "datasets/events/snapshots/s1/data/part-00000.jsonl".to_owned(),
                size_bytes: 42,
                checksum: Some("crc32:deadbeef".to_owned()),
            }])
            .row_count(3i64)
            .codec("jsonl")
            .compressor("noop")
            .partitioner("noop")
            .build()
            .unwrap()
    }

    #[test]
    fn valid_manifest_passes() {
        validate_manifest(&valid_manifest()).unwrap();
    }

    #[test]
    fn empty_files_and_metadata_are_legal() {
        let mut manifest = valid_manifest();
        manifest.files = Some(vec![]);
        manifest.metadata = Some(BTreeMap::new());
        manifest.row_count = Some(0);
        validate_manifest(&manifest).unwrap();
    }

    #[test]
    fn each_required_field_is_tagged() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Manifest)>)> = vec![
            ("schema_name", Box::new(|m| m.schema_name.clear())),
            ("format_version", Box::new(|m| m.format_version.clear())),
            ("dataset_id", Box::new(|m| m.dataset_id.clear())),
            ("snapshot_id", Box::new(|m| m.snapshot_id.clear())),
            ("created_at", Box::new(|m| m.created_at = None)),
            ("metadata", Box::new(|m| m.metadata = None)),
            ("files", Box::new(|m| m.files = None)),
            ("row_count", Box::new(|m| m.row_count = None)),
            ("row_count", Box::new(|m| m.row_count = Some(-1))),
            ("codec", Box::new(|m| m.codec.clear())),
            ("compressor", Box::new(|m| m.compressor.clear())),
            ("partitioner", Box::new(|m| m.partitioner.clear())),
        ];
        for (field, mutate) in cases {
            let mut manifest = valid_manifest();
            mutate(&mut manifest);
            let err = validate_manifest(&manifest).unwrap_err();
            assert_eq!(err.field, field, "{err}");
        }
    }

    #[test]
    fn file_entries_are_checked_in_order() {
        let mut manifest = valid_manifest();
        manifest.files.as_mut().unwrap().push(FileRef {
            path: String::new(),
            size_bytes: 1,
            checksum: None,
        });
        let err = validate_manifest(&manifest).unwrap_err();
        assert_eq!(err.field, "files.path");
        assert!(err.message.contains("files[1]"), "{err}");

        let mut manifest = valid_manifest();
        manifest.files.as_mut().unwrap()[0].size_bytes = -5;
        let err = validate_manifest(&manifest).unwrap_err();
        assert_eq!(err.field, "files.size_bytes");
    }

    #[test]
    fn json_round_trip() {
        let manifest = valid_manifest();
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
        // created_at must be RFC 3339 UTC on the wire
        assert!(json.contains("\"2024-05-03T12:00:00Z\""), "{json}");
        // absent optionals are omitted, not null
        assert!(!json.contains("parent_snapshot_id"), "{json}");
        assert!(!json.contains("min_timestamp"), "{json}");
    }

    #[test]
    fn missing_required_fields_decode_then_fail_validation() {
        let json = r#"{
            "schema_name": "lode-manifest",
            "format_version": "1.0.0",
            "dataset_id": "events",
            "snapshot_id": "s1",
            "created_at": "2024-05-03T12:00:00Z",
            "metadata": {},
            "files": [],
            "row_count": 0,
            "compressor": "noop",
            "partitioner": "noop"
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        let err = validate_manifest(&manifest).unwrap_err();
        assert_eq!(err.field, "codec");
    }

    #[test]
    fn null_metadata_fails_validation() {
        let json = r#"{
            "schema_name": "lode-manifest",
            "format_version": "1.0.0",
            "dataset_id": "events",
            "snapshot_id": "s1",
            "created_at": "2024-05-03T12:00:00Z",
            "metadata": null,
            "files": [],
            "row_count": 0,
            "codec": "jsonl",
            "compressor": "noop",
            "partitioner": "noop"
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        let err = validate_manifest(&manifest).unwrap_err();
        assert_eq!(err.field, "metadata");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut value = serde_json::to_value(valid_manifest()).unwrap();
        value["a_future_field"] = serde_json::json!({"nested": true});
        let manifest: Manifest = serde_json::from_value(value).unwrap();
        validate_manifest(&manifest).unwrap();
    }
}
