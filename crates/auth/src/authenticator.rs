use std::sync::Arc;

use metrics::GatewayMetrics;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::directory::KeyDirectory;
use crate::error::AuthError;
use crate::principal::Principal;

/// Resolves a presented API key to a `Principal`. Hashes the key once, then
/// compares it against every entry in the directory with `subtle`'s
/// constant-time equality and without short-circuiting on the first match,
/// so lookup time does not depend on which entry (if any) matched.
pub struct Authenticator {
    directory: Arc<dyn KeyDirectory>,
    metrics: Arc<GatewayMetrics>,
}

impl Authenticator {
    pub fn new(directory: Arc<dyn KeyDirectory>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { directory, metrics }
    }

    pub async fn authenticate(&self, presented_key: Option<&str>) -> Result<Principal, AuthError> {
        let Some(key) = presented_key else {
            self.metrics.auth_outcomes_total.with_label_values(&["missing"]).inc();
            return Err(AuthError::Missing);
        };

        let digest = Sha256::digest(key.as_bytes());
        let entries = self.directory.hashed_entries().await;

        let mut matched: Option<Principal> = None;
        for (hash, principal) in entries.iter() {
            let equal = hash.len() == digest.len() && bool::from(hash.as_slice().ct_eq(&digest[..]));
            if equal {
                matched = Some(principal.clone());
            }
        }

        match matched {
            Some(principal) => {
                self.metrics.auth_outcomes_total.with_label_values(&["success"]).inc();
                Ok(principal)
            }
            None => {
                self.metrics.auth_outcomes_total.with_label_values(&["invalid"]).inc();
                Err(AuthError::Invalid)
            }
        }
    }
}
