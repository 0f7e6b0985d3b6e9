use thiserror::Error;

/// Terminal states a `PendingItem`'s completion handle can be resolved with.
#[derive(Debug, Error, Clone)]
pub enum BatchError {
    #[error("input failed validation: {0}")]
    Validation(String),

    #[error("batch queue is at capacity")]
    Overloaded,

    #[error("request deadline exceeded or caller cancelled")]
    DeadlineExceeded,

    #[error("executor failed: {0}")]
    InferenceFailed(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}
