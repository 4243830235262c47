use thiserror::Error;

use crate::repositories::RepositoryError;

/// Failure taxonomy for the send/generation pipeline.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The chunk stream itself failed before any terminal chunk arrived.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend explicitly reported a failed generation via an `error`
    /// chunk, possibly after partial content.
    #[error("generation failed: {0}")]
    Generation(String),

    /// A mutating operation was invoked with no repository configured.
    #[error("no message repository configured")]
    RepositoryNotConfigured,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
