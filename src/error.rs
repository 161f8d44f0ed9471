use thiserror::Error;

use crate::transcoder::SpawnError;

/// Synchronous failure of a start or serve request.
///
/// An idempotent start is not an error; it is reported through
/// [`crate::registry::StartOutcome`].
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Camera {0} not found")]
    NotFound(String),

    #[error("Camera {0} is disabled")]
    Disabled(String),

    #[error("Failed to start transcoder: {0}")]
    Spawn(#[from] SpawnError),
}

impl StreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StreamError::NotFound(_))
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, StreamError::Disabled(_))
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
