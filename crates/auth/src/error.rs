use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,

    #[error("unknown or revoked api key")]
    Invalid,
}
