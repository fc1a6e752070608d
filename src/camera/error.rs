use thiserror::Error;

/// Capture pipeline errors.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation not legal in current state: {0}")]
    WrongState(String),

    #[error("buffer allocation failed: {0}")]
    OutOfMemory(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("internal failure: {0}")]
    Internal(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CameraError>;
