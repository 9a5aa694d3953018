//! Error types for translation and packaging.

use std::path::PathBuf;

use cds_cql_generator::GenerationError;
use thiserror::Error;

/// Errors that can occur while translating and packaging a library.
///
/// Every variant aborts the whole run; nothing is retried here.
#[derive(Error, Debug)]
pub enum PackagerError {
    /// CQL generation failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The translator could not be reached or the exchange broke off.
    #[error("Translator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The translator answered with a non-success status.
    #[error("Translator returned HTTP {status}: {body}")]
    TranslatorStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },

    /// The translator answered with something other than a multipart body.
    #[error("Translator response is not multipart (content type: {content_type})")]
    NotMultipart {
        /// Content type received.
        content_type: String,
    },

    /// The multipart response could not be split into parts.
    #[error("Malformed multipart response: {0}")]
    Demultiplex(String),

    /// A compiled unit name cannot be used as an archive entry name.
    #[error("Invalid compiled unit name '{name}': {reason}")]
    InvalidUnitName {
        /// Offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The caller's deadline passed before the translator answered.
    #[error("Translator did not answer before the deadline")]
    DeadlineExceeded,

    /// Writing the archive to the sink failed. The sink holds a partial
    /// archive and must be discarded.
    #[error("Archive write failed: {0}")]
    ArchiveWrite(#[from] zip::result::ZipError),

    /// I/O error on a helper library file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A blocking archive task panicked or was cancelled.
    #[error("Archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Invalid packager or translator settings.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PackagerError {
    /// Creates an I/O error for `path`.
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error came from the translator exchange.
    pub fn is_translator_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::TranslatorStatus { .. }
                | Self::NotMultipart { .. }
                | Self::Demultiplex(_)
                | Self::InvalidUnitName { .. }
                | Self::DeadlineExceeded
        )
    }
}

/// Result type for packaging operations.
pub type PackagerResult<T> = std::result::Result<T, PackagerError>;
