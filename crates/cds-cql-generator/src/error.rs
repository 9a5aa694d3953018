//! Error types for CQL generation.

use std::path::PathBuf;

use cds_cql::{ArtifactError, ValueSetCategory};
use thiserror::Error;

/// Errors that can occur while compiling and rendering an artifact.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The catalog has no value set group with this id.
    #[error("Unknown {category} value set: {id}")]
    UnknownValueSet {
        /// Category searched.
        category: ValueSetCategory,
        /// Requested id.
        id: String,
    },

    /// A value set group lacks the entries a template needs.
    #[error("Value set {id} is incomplete: {message}")]
    IncompleteValueSet {
        /// Group id.
        id: String,
        /// What is missing.
        message: String,
    },

    /// An element, specific or artifact template does not exist.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// A modifier names a template that does not exist.
    #[error("Modifier template not found: {template} (modifier {modifier})")]
    ModifierTemplateNotFound {
        /// Modifier id.
        modifier: String,
        /// Template requested.
        template: String,
    },

    /// A template file failed to parse.
    #[error("Template {name} failed to parse: {message}")]
    TemplateParse {
        /// Template name.
        name: String,
        /// Parser message.
        message: String,
    },

    /// A template failed to render.
    #[error("Template {template} failed to render: {message}")]
    Render {
        /// Template name.
        template: String,
        /// Renderer message.
        message: String,
    },

    /// I/O error while loading templates or a catalog.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// One or more lookups failed while rendering the body.
    #[error("{} template lookup(s) failed: {}", .0.len(), join_messages(.0))]
    LookupFailures(Vec<GenerationError>),

    /// The artifact document could not be ingested.
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// The value set catalog could not be read.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A value could not be converted into template data.
    #[error("Template data serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl GenerationError {
    /// Creates an I/O error with path context.
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a missing template, value set or modifier template.
    pub fn is_lookup_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownValueSet { .. }
                | Self::TemplateNotFound(_)
                | Self::ModifierTemplateNotFound { .. }
                | Self::LookupFailures(_)
        )
    }
}

fn join_messages(errors: &[GenerationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for generation operations.
pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_value_set() {
        let err = GenerationError::UnknownValueSet {
            category: ValueSetCategory::Observation,
            id: "ldl".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown observation value set: ldl");
        assert!(err.is_lookup_error());
    }

    #[test]
    fn test_error_display_lookup_failures() {
        let err = GenerationError::LookupFailures(vec![
            GenerationError::TemplateNotFound("GenericFoo".to_string()),
            GenerationError::ModifierTemplateNotFound {
                modifier: "LookBack".to_string(),
                template: "LookBackObs".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "2 template lookup(s) failed: Template not found: GenericFoo; \
             Modifier template not found: LookBackObs (modifier LookBack)"
        );
    }

    #[test]
    fn test_error_from_serde_error() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: GenerationError = source.into();
        assert!(matches!(err, GenerationError::Serialize(_)));
        assert!(err.to_string().starts_with("Template data serialization failed: "));
        assert!(!err.is_lookup_error());
    }

    #[test]
    fn test_error_from_artifact_error() {
        let err: GenerationError = ArtifactError::InvalidJson("eof".to_string()).into();
        assert!(matches!(err, GenerationError::Artifact(_)));
        assert!(!err.is_lookup_error());
    }
}
