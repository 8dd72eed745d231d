//! Session exchange over the transport
//!
//! Bridges the auth crate's refresh seam onto the pipeline's transport:
//! login and refresh are ordinary POSTs whose bodies carry the new token
//! pair and user payload.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::Transport;
use crate::request::{ApiRequest, Method};
use lumen_auth::{claims, AuthSession, TokenRefresher};

#[derive(Deserialize)]
struct SessionPayload {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    user: serde_json::Value,
}

/// Build a session from a login/refresh response body.
pub(crate) fn session_from_body(body: &serde_json::Value) -> anyhow::Result<AuthSession> {
    let payload: SessionPayload = serde_json::from_value(body.clone())?;
    let expires_at_epoch_ms = claims::decode_expiry_ms(&payload.access_token).unwrap_or(0);
    Ok(AuthSession {
        access_token: payload.access_token,
        refresh_token: payload.refresh_token,
        user: payload.user,
        expires_at_epoch_ms,
    })
}

/// Token refresher that exchanges the refresh token straight over the
/// transport, outside the middleware chain. The refresh endpoint is on the
/// auth allow-list and must never be cached or retried into a loop.
pub struct TransportRefresher {
    transport: Arc<dyn Transport>,
    refresh_url: String,
}

impl TransportRefresher {
    pub fn new(transport: Arc<dyn Transport>, refresh_url: String) -> Self {
        Self {
            transport,
            refresh_url,
        }
    }
}

#[async_trait]
impl TokenRefresher for TransportRefresher {
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<AuthSession> {
        let request = ApiRequest::new(Method::Post, &self.refresh_url)
            .with_body(serde_json::json!({ "refresh_token": refresh_token }));

        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status).into());
        }
        session_from_body(&response.body)
    }
}
