//! Error taxonomy for session operations.
//!
//! Every variant is recoverable: the session that produced it can retry
//! the operation (re-enter a credential, upload again, resend a message).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which remote service failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Embedding,
    Completion,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Embedding => write!(f, "embedding"),
            Backend::Completion => write!(f, "completion"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Credential missing or rejected, or backends not bound.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// One document's text could not be extracted.
    #[error("could not extract text from {name}: {reason}")]
    DocumentExtraction { name: String, reason: String },

    /// No active document index.
    #[error("no document index is available")]
    IndexUnavailable,

    /// The embedding or completion call failed.
    #[error("{backend} backend error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    RemoteBackend {
        backend: Backend,
        status: Option<u16>,
        message: String,
    },

    /// The index store could not be read or written.
    #[error("index store error at {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },

    /// The agent used its whole step budget without answering.
    #[error("no answer within {0} reasoning steps")]
    StepBudgetExhausted(u32),

    #[error("message must not be empty")]
    EmptyMessage,
}

impl Error {
    pub(crate) fn remote(backend: Backend, message: impl Into<String>) -> Self {
        Error::RemoteBackend {
            backend,
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Error::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True when the remote service refused the bound credential.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_includes_status() {
        let err = Error::RemoteBackend {
            backend: Backend::Completion,
            status: Some(503),
            message: "unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "completion backend error (HTTP 503): unavailable"
        );
        assert_eq!(
            Error::remote(Backend::Embedding, "timeout").to_string(),
            "embedding backend error: timeout"
        );
    }

    #[test]
    fn persistence_error_names_path() {
        let err = Error::persistence("/tmp/storage", "disk full");
        assert!(err.to_string().contains("/tmp/storage"));
        assert!(err.to_string().contains("disk full"));
    }
}
