//! Silent token refresh scheduling
//!
//! State machine: `Idle → Scheduled → (Idle | Refreshing → Idle)`.
//! At most one timer is armed at any time, and at most one refresh is in
//! flight even when multiple requests discover an expired token at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::claims::decode_expiry_ms;
use crate::{AuthSession, TokenStore};

/// Backend collaborator that exchanges a refresh token for a new session.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<AuthSession>;
}

/// Arms a single refresh timer ahead of token expiry and serializes
/// concurrent refresh attempts through a single-flight guard.
pub struct RefreshScheduler {
    store: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    threshold: Duration,
    timer: parking_lot::Mutex<Option<JoinHandle<()>>>,
    flight: tokio::sync::Mutex<()>,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        threshold: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            threshold,
            timer: parking_lot::Mutex::new(None),
            flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Arm the refresh timer for `session`, cancelling any previous timer.
    ///
    /// An undecodable expiry claim is logged and skipped; the session stays
    /// valid until the backend itself rejects it.
    pub fn schedule_from_session(self: &Arc<Self>, session: &AuthSession) {
        let expires_at_ms = match decode_expiry_ms(&session.access_token) {
            Some(expires_at_ms) => expires_at_ms,
            None => {
                warn!("access token expiry is undecodable, refresh not scheduled");
                return;
            }
        };

        let refresh_at_ms = expires_at_ms - self.threshold.as_millis() as i64;
        let delay_ms = refresh_at_ms - Utc::now().timestamp_millis();

        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        if delay_ms <= 0 {
            debug!("token already within refresh threshold, timer not armed");
            return;
        }

        let scheduler = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
            // The timer has fired; drop our own handle so the re-arm on a
            // successful refresh does not abort this task.
            scheduler.timer.lock().take();
            if let Err(e) = scheduler.refresh_now().await {
                warn!(error = %e, "scheduled refresh failed");
            }
        }));
        debug!(delay_ms, "refresh timer armed");
    }

    /// Refresh the session now, single-flight across concurrent callers.
    ///
    /// A caller that loses the race returns the already-refreshed session
    /// without a second backend call. On refresh failure there is no
    /// automatic retry: the session is cleared and the failure surfaced.
    pub async fn refresh_now(self: &Arc<Self>) -> anyhow::Result<AuthSession> {
        let _flight = self.flight.lock().await;

        let current = self
            .store
            .session()
            .ok_or_else(|| anyhow::anyhow!("no active session to refresh"))?;

        if !self.needs_refresh(&current) {
            debug!("session already fresh, skipping refresh");
            return Ok(current);
        }

        match self.refresher.refresh(&current.refresh_token).await {
            Ok(session) => {
                self.store.store_session(&session);
                info!("access token refreshed");
                self.schedule_from_session(&session);
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, logging out");
                self.logout();
                Err(e)
            }
        }
    }

    /// Cancel any pending timer and clear the session.
    pub fn logout(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        self.store.clear_session();
        info!("logged out");
    }

    /// Whether a refresh timer is currently armed.
    pub fn has_pending_timer(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn needs_refresh(&self, session: &AuthSession) -> bool {
        match decode_expiry_ms(&session.access_token) {
            Some(expires_at_ms) => {
                expires_at_ms - Utc::now().timestamp_millis() <= self.threshold.as_millis() as i64
            }
            // An undecodable token cannot be proven fresh; the caller asked
            // for a refresh, so attempt one.
            None => true,
        }
    }
}
