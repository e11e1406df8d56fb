//! Pool error types

use thiserror::Error;

/// Errors surfaced at the memory-resource boundary.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("allocation of {requested} bytes exceeds the maximum of {maximum} bytes")]
    SizeExceeded { requested: usize, maximum: usize },
    #[error("device error: {0}")]
    DeviceError(String),
    #[error("internal lock poisoned - this indicates a bug: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for PoolError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        PoolError::LockPoisoned(format!("lock poisoned: {}", err))
    }
}

/// Pool result type
pub type PoolResult<T> = Result<T, PoolError>;
