/*!
Error type for the Lode manifest format
*/

use thiserror::Error;

use crate::manifest::ValidationError;

#[derive(Error, Debug)]
/// Format-level error
pub enum Error {
    /// Invalid format
    #[error("{0} doesn't have the right format")]
    InvalidFormat(String),
    /// Invalid dataset or snapshot identifier
    #[error("invalid {kind} identifier {id:?}: {reason}")]
    InvalidIdentifier {
        /// What the identifier names, e.g. "dataset" or "snapshot"
        kind: &'static str,
        /// The offending identifier
        id: String,
        /// Why it was rejected
        reason: &'static str,
    },
    /// Manifest failed validation
    #[error("invalid manifest")]
    ManifestInvalid(#[from] ValidationError),
    /// Serde json
    #[error("serde json error")]
    JSONSerde(#[from] serde_json::Error),
    /// Chrono parse
    #[error("chrono parse error")]
    Chrono(#[from] chrono::ParseError),
    /// Uuid error
    #[error("uuid error")]
    Uuid(#[from] uuid::Error),
    /// Manifest builder
    #[error("manifest builder")]
    ManifestBuilder(#[from] crate::manifest::ManifestBuilderError),
}
