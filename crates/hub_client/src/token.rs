//! Registration tokens for the site-to-hub handshake.
//!
//! A token is 32 random bytes, hex-encoded, valid for ten minutes. While a
//! live token is cached in the trust store it is handed out again rather
//! than minting a new one.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::client::HubError;
use crate::clock::Clock;
use crate::store::TrustStore;

/// How long a registration token stays valid.
pub const REGISTRATION_TOKEN_TTL_SECS: i64 = 600;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationToken {
    pub value: String,
    /// Unix seconds
    pub issued_at: i64,
}

impl RegistrationToken {
    pub fn is_live(&self, now: i64, ttl_secs: i64) -> bool {
        now - self.issued_at < ttl_secs
    }
}

pub struct TokenIssuer {
    clock: Arc<dyn Clock>,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, REGISTRATION_TOKEN_TTL_SECS)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl_secs: i64) -> Self {
        Self { clock, ttl_secs }
    }

    /// Return the cached token if it is still live, otherwise mint, persist
    /// and return a new one.
    pub fn get_registration_token(&self, store: &TrustStore) -> Result<String, HubError> {
        let now = self.clock.now();

        let (token, minted) = store.reuse_or_issue_registration_token(
            |cached| cached.is_live(now, self.ttl_secs),
            || Ok(RegistrationToken { value: generate_token()?, issued_at: now }),
        )?;

        if minted {
            log::info!("Issued new hub registration token");
        } else {
            log::debug!("Reusing hub registration token issued at {}", token.issued_at);
        }

        Ok(token.value)
    }
}

fn generate_token() -> Result<String, HubError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| HubError::Configuration(format!("Random source unavailable: {}", e)))?;
    Ok(hex::encode(bytes))
}
