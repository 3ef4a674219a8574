//! Error types for override synthesis.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while preparing an override file.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configuration file could not be read or parsed. Fatal.
    #[error("Failed to parse {}:{line}: {message}", path.display())]
    ConfigParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The wrapped tool reported a version we cannot classify. Fatal.
    #[error("Unable to determine Terraform version: {0}")]
    VersionProbe(String),

    /// A credentials source was declared but could not be used.
    /// Callers treat this as "no credentials from this source".
    #[error("Credentials file {}: {message}", path.display())]
    CredentialFile { path: PathBuf, message: String },

    /// An override block cannot be produced safely. The block is skipped.
    #[error("Cannot synthesize override: {0}")]
    Synthesis(String),

    #[error("Invalid setting: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        CoreError::ConfigParse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Whether this error must abort the run before the wrapped tool starts.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CoreError::CredentialFile { .. } | CoreError::Synthesis(_)
        )
    }
}
