//! Typed errors for the session, runtime and scanner layers.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid session name {0:?}: only letters, digits, '_' and '-' are allowed")]
    InvalidSessionName(String),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session {0:?} does not exist")]
    SessionNotFound(String),

    #[error("session {name:?} would share files with existing session {other:?}")]
    SessionConflict { name: String, other: String },

    #[error("interpreter protocol error: {0}")]
    Protocol(String),

    #[error("interpreter exited unexpectedly ({0})")]
    InterpreterExited(String),

    /// The snippet (or a bootstrap helper acting for it) raised.
    #[error("{0}")]
    Raised(String),

    #[error("failed to install {package}: {message}")]
    Install { package: String, message: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
