//! Error types for artifact ingestion.

use thiserror::Error;

/// Errors that can occur while ingesting an authored artifact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// The artifact document is not valid JSON or does not match the expected shape.
    #[error("invalid artifact JSON: {0}")]
    InvalidJson(String),

    /// A required field is absent.
    #[error("missing field `{field}` on {context}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
        /// Where the field was expected (node id, section name, ...).
        context: String,
    },

    /// A tree node could not be classified.
    #[error("invalid expression node {unique_id}: {message}")]
    InvalidNode {
        /// Unique id of the offending node.
        unique_id: String,
        /// Description of the problem.
        message: String,
    },

    /// A parameter carries a value its type cannot accept.
    #[error("invalid parameter `{id}`: {message}")]
    InvalidParameter {
        /// Parameter id.
        id: String,
        /// Description of the problem.
        message: String,
    },
}

impl From<serde_json::Error> for ArtifactError {
    fn from(err: serde_json::Error) -> Self {
        ArtifactError::InvalidJson(err.to_string())
    }
}

/// Result type for artifact operations.
pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;
