use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store backend unavailable: {0}")]
    Unavailable(String),
}
