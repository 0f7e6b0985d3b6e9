//! Credential verification: hashing, constant-time comparison, and the
//! static key-to-principal directory.

mod authenticator;
mod directory;
mod error;
mod principal;

pub use authenticator::Authenticator;
pub use directory::{KeyDirectory, StaticKeyDirectory};
pub use error::AuthError;
pub use principal::Principal;
