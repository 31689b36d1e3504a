/*!
Error type for the Lode engine
*/

use thiserror::Error;

pub use lode_spec::manifest::ValidationError;

#[derive(Error, Debug)]
/// Lode engine error
pub enum Error {
    /// Object or entity not found
    #[error("{0} not found")]
    NotFound(String),
    /// Write target already exists; commit collisions surface here
    #[error("path {0} already exists")]
    PathExists(String),
    /// Invalid object key, identifier or range argument
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Metadata must be provided explicitly on every write
    #[error("write metadata must be set explicitly, even if empty")]
    InvalidMetadata,
    /// Dataset exists but has no committed snapshots
    #[error("dataset {0} has no snapshots")]
    NoSnapshots(String),
    /// The bound object store has no range-read capability
    #[error("object store does not support range reads")]
    RangeReadNotSupported,
    /// The bound codec cannot encode records one at a time
    #[error("codec {0} does not support streaming encoding")]
    CodecNotStreamable(String),
    /// A record does not have the shape a component expects
    #[error("record violates the expected shape: {0}")]
    SchemaViolation(String),
    /// Invalid format
    #[error("{0} doesn't have the right format")]
    InvalidFormat(String),
    /// A streaming write was used after reaching a terminal state
    #[error("streaming write is already {0}")]
    StreamClosed(&'static str),
    /// Manifest failed validation; carries the failing field
    #[error("invalid manifest")]
    ManifestInvalid(#[from] ValidationError),
    /// Manifest bytes were not a decodable manifest document
    #[error("manifest decode error")]
    ManifestDecode(#[source] serde_json::Error),
    /// Format-level error
    #[error("format error")]
    Spec(lode_spec::Error),
    /// Serde json
    #[error("serde json error")]
    JSONSerde(#[from] serde_json::Error),
    /// Io error
    #[error("io error")]
    IO(#[from] std::io::Error),
    /// Objectstore error
    #[error("object store error")]
    ObjectStore(#[source] object_store::Error),
    /// Dataset builder
    #[error("dataset builder")]
    DatasetBuilder(#[from] crate::dataset::DatasetBuilderError),
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Error::NotFound(path),
            object_store::Error::AlreadyExists { path, .. } => Error::PathExists(path),
            object_store::Error::Precondition { path, .. } => Error::PathExists(path),
            object_store::Error::InvalidPath { source } => Error::InvalidPath(source.to_string()),
            err => Error::ObjectStore(err),
        }
    }
}

impl From<lode_spec::Error> for Error {
    fn from(err: lode_spec::Error) -> Self {
        match err {
            lode_spec::Error::InvalidIdentifier { .. } => Error::InvalidPath(err.to_string()),
            lode_spec::Error::ManifestInvalid(validation) => Error::ManifestInvalid(validation),
            err => Error::Spec(err),
        }
    }
}
