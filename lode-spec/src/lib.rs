/*!
Format-level types for Lode: the persisted manifest document, the validation
rules that every manifest must pass before it is trusted, and the rules for
dataset and snapshot identifiers.

This crate deliberately contains no I/O. The engine crate (`lode`) decides
where manifests live and how they are fetched; this crate decides what a
manifest *is*.
*/

pub mod error;
pub mod identifier;
pub mod manifest;

pub use error::Error;
pub use identifier::{generate_snapshot_id, validate_id};
pub use manifest::{
    validate_manifest, FileRef, Manifest, ManifestBuilder, ValidationError, FORMAT_VERSION,
    SCHEMA_NAME,
};
