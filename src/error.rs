use thiserror::Error;

/// Errors returned by the load controller.
///
/// Both kinds are synchronous and leave prior state untouched; there are no
/// retryable failures inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// A parameter was outside its accepted range (load percent, thread
    /// count, kernel name).
    #[error("{0}")]
    InvalidArgument(String),

    /// A slot index referred past the end of the current pool.
    #[error("{0}")]
    OutOfRange(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;
