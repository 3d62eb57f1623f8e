//! Bearer tokens for the REST client.
//!
//! Provider tokens are reused until a minute before they expire. Refresh
//! happens under the write lock, so concurrent callers wait for a single
//! provider round-trip. If the provider fails while the old token is still
//! unexpired, the old token is handed out instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// OAuth scope for Firestore access through the REST API.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Bearer token accepted by the Firestore emulator.
pub const EMULATOR_TOKEN: &str = "owner";

pub(crate) struct Cached {
    value: String,
    expires_at: Instant,
}

impl Cached {
    fn from_provider(token: &gcp_auth::Token) -> Self {
        // An expiry in the past maps to zero TTL, forcing a refresh next time.
        let ttl = (token.expires_at() - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        Self {
            value: token.as_str().to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }

    fn unexpired(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub(crate) enum TokenCache {
    /// Emulator mode: never refreshed.
    Fixed(String),
    Refreshing {
        provider: Arc<dyn TokenProvider>,
        slot: RwLock<Option<Cached>>,
    },
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self::Refreshing {
            provider,
            slot: RwLock::new(None),
        }
    }

    pub fn fixed(token: impl Into<String>) -> Self {
        Self::Fixed(token.into())
    }

    /// Drop the cached token so the next call asks the provider.
    pub async fn invalidate(&self) {
        if let Self::Refreshing { slot, .. } = self {
            *slot.write().await = None;
        }
    }

    pub async fn token(&self) -> FirestoreResult<String> {
        let (provider, slot) = match self {
            Self::Fixed(token) => return Ok(token.clone()),
            Self::Refreshing { provider, slot } => (provider, slot),
        };

        if let Some(cached) = slot.read().await.as_ref() {
            if cached.fresh(Instant::now()) {
                return Ok(cached.value.clone());
            }
        }

        let mut slot = slot.write().await;
        if let Some(cached) = slot.as_ref().filter(|c| c.fresh(Instant::now())) {
            return Ok(cached.value.clone());
        }

        match provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let cached = Cached::from_provider(&token);
                let value = cached.value.clone();
                *slot = Some(cached);
                debug!("refreshed Firestore access token");
                Ok(value)
            }
            Err(e) => match slot.as_ref().filter(|c| c.unexpired(Instant::now())) {
                Some(cached) => {
                    warn!(error = %e, "token refresh failed; reusing current token");
                    Ok(cached.value.clone())
                }
                None => Err(FirestoreError::Credentials(format!(
                    "token refresh failed: {}",
                    e
                ))),
            },
        }
    }
}
