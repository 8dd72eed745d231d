//! Lumen token lifecycle library
//!
//! Persists the auth session through an injected storage collaborator and
//! keeps credentials fresh without user-visible interruptions:
//! - `TokenStore`: source of truth for the persisted access/refresh tokens
//!   and user payload
//! - `claims`: narrow expiry-claim decoding, no signature verification
//! - `RefreshScheduler`: arms at most one timer ahead of expiry and
//!   guarantees at most one in-flight refresh across concurrent callers

pub mod claims;
pub mod scheduler;
pub mod storage;
pub mod test_utils;

pub use claims::{decode_expiry, decode_expiry_ms, ClaimError};
pub use scheduler::{RefreshScheduler, TokenRefresher};
pub use storage::{MemoryStorage, StorageBackend};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Storage keys under which the session values are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageKeys {
    pub access: String,
    pub refresh: String,
    pub user: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access: "lumen.auth.access_token".to_string(),
            refresh: "lumen.auth.refresh_token".to_string(),
            user: "lumen.auth.user".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// How far ahead of token expiry the silent refresh fires
    pub refresh_threshold: Duration,
    pub storage_keys: StorageKeys,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(60),
            storage_keys: StorageKeys::default(),
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables,
    /// falling back to defaults for development
    pub fn from_env() -> Self {
        Self {
            refresh_threshold: env::var("AUTH_REFRESH_THRESHOLD_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(60)),
            storage_keys: StorageKeys::default(),
        }
    }
}

/// The authenticated session as seen by the rest of the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: serde_json::Value,
    /// Expiry decoded from the access token; `0` when undecodable.
    pub expires_at_epoch_ms: i64,
}

/// Source of truth for the persisted session values.
///
/// All multi-key reads and writes go through one lock so no reader can
/// observe a partially written or partially cleared session.
pub struct TokenStore {
    storage: Arc<dyn StorageBackend>,
    keys: StorageKeys,
    guard: Mutex<()>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn StorageBackend>, keys: StorageKeys) -> Self {
        Self {
            storage,
            keys,
            guard: Mutex::new(()),
        }
    }

    /// Persist all three session values.
    pub fn store_session(&self, session: &AuthSession) {
        let _guard = self.guard.lock();
        self.storage.set_item(&self.keys.access, &session.access_token);
        self.storage.set_item(&self.keys.refresh, &session.refresh_token);
        let user = serde_json::to_string(&session.user).unwrap_or_else(|_| "null".to_string());
        self.storage.set_item(&self.keys.user, &user);
        debug!("session stored");
    }

    /// Load the persisted session, if an access token is present.
    pub fn session(&self) -> Option<AuthSession> {
        let _guard = self.guard.lock();
        let access_token = self.storage.get_item(&self.keys.access)?;
        let refresh_token = self.storage.get_item(&self.keys.refresh).unwrap_or_default();
        let user = self
            .storage
            .get_item(&self.keys.user)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(serde_json::Value::Null);
        let expires_at_epoch_ms = claims::decode_expiry_ms(&access_token).unwrap_or(0);

        Some(AuthSession {
            access_token,
            refresh_token,
            user,
            expires_at_epoch_ms,
        })
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        let _guard = self.guard.lock();
        self.storage.get_item(&self.keys.access)
    }

    /// Remove all three session values atomically from the caller's
    /// perspective.
    pub fn clear_session(&self) {
        let _guard = self.guard.lock();
        self.storage.remove_item(&self.keys.access);
        self.storage.remove_item(&self.keys.refresh);
        self.storage.remove_item(&self.keys.user);
        debug!("session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::token_with_expiry;
    use serde_json::json;

    fn store() -> TokenStore {
        TokenStore::new(Arc::new(MemoryStorage::new()), StorageKeys::default())
    }

    #[test]
    fn test_store_and_load_session() {
        let store = store();
        let session = AuthSession {
            access_token: token_with_expiry(1900000000),
            refresh_token: "refresh-1".to_string(),
            user: json!({"id": "user-1", "name": "Ada"}),
            expires_at_epoch_ms: 0,
        };
        store.store_session(&session);

        let loaded = store.session().unwrap();
        assert_eq!(loaded.access_token, session.access_token);
        assert_eq!(loaded.refresh_token, "refresh-1");
        assert_eq!(loaded.user["name"], "Ada");
        assert_eq!(loaded.expires_at_epoch_ms, 1900000000000);
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = store();
        store.store_session(&AuthSession {
            access_token: token_with_expiry(1900000000),
            refresh_token: "refresh-1".to_string(),
            user: json!({}),
            expires_at_epoch_ms: 0,
        });

        store.clear_session();
        assert!(store.session().is_none());
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_undecodable_token_yields_zero_expiry() {
        let store = store();
        store.store_session(&AuthSession {
            access_token: "opaque-token".to_string(),
            refresh_token: "refresh-1".to_string(),
            user: json!({}),
            expires_at_epoch_ms: 0,
        });

        let loaded = store.session().unwrap();
        assert_eq!(loaded.expires_at_epoch_ms, 0);
    }
}
