use thiserror::Error;

/// Error taxonomy for the sync core.
///
/// Mutations abort with no side effects on every variant except `Storage`
/// wrapping a late failure — audit appends and live delivery are the two
/// soft-failure paths and never surface here.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The referenced task or notification does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed input — rejected before any store access.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requester is authenticated but not allowed to perform this
    /// mutation (e.g. non-creator delete).
    #[error("{0}")]
    Forbidden(&'static str),

    /// No verified identity on this connection.
    #[error("not authenticated")]
    Unauthenticated,

    /// Unexpected store failure — propagated to the caller, no retry.
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }
}
