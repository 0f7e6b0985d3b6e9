use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::principal::Principal;

/// Source of truth for which API key hashes map to which `Principal`. Never
/// exposes raw credentials; callers load the directory once from
/// configuration (a vault, a config file, environment variables) and hand
/// this trait object to the `Authenticator`.
#[async_trait]
pub trait KeyDirectory: Send + Sync + 'static {
    /// All known `(sha256(api_key), Principal)` pairs. Returned as a shared
    /// snapshot rather than recomputed per call; `StaticKeyDirectory` hashes
    /// once at construction.
    async fn hashed_entries(&self) -> Arc<Vec<(Vec<u8>, Principal)>>;
}

/// In-memory directory loaded once at startup from configuration and never
/// mutated afterwards. "Static" refers to the absence of runtime key
/// rotation, not to Rust's `static` keyword.
pub struct StaticKeyDirectory {
    entries: Arc<Vec<(Vec<u8>, Principal)>>,
}

impl StaticKeyDirectory {
    /// `raw_keys` is consumed and its plaintext dropped immediately after
    /// hashing; nothing in this type retains a presentable credential.
    pub fn from_raw_keys(raw_keys: Vec<(String, Principal)>) -> Self {
        let entries = raw_keys
            .into_iter()
            .map(|(key, principal)| {
                let digest = Sha256::digest(key.as_bytes()).to_vec();
                (digest, principal)
            })
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }
}

#[async_trait]
impl KeyDirectory for StaticKeyDirectory {
    async fn hashed_entries(&self) -> Arc<Vec<(Vec<u8>, Principal)>> {
        self.entries.clone()
    }
}
