//! Ordered middleware chain
//!
//! Every outbound call runs through a statically ordered list of stages
//! composed at construction time. Canonical order, outer to inner:
//!
//! auth-attach → retry → cache → loading → error-classify → transport
//!
//! The ordering is a contract, not wiring: the cache sits inside retry so
//! a hit is never "retried", and classification sits innermost so the
//! retry layer sees classified statuses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::matches_any;
use crate::error::ApiError;
use crate::loading::LoadingTracker;
use crate::request::{ApiRequest, ApiResponse};
use lumen_auth::TokenStore;
use lumen_cache::ResponseCache;
use lumen_resilience::{with_retry, RetryPolicy};

/// Abstract transport: send a request, receive a response or a transport
/// error. Any received HTTP status is `Ok`; `Err` is reserved for the
/// no-response case (connectivity, DNS, timeout).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// One stage of the chain. A stage may pass the request through, wrap the
/// downstream call with side effects, or short-circuit with a result.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError>;
}

/// The remainder of the chain, ending at the transport.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    pub(crate) stack: &'a [Arc<dyn Middleware>],
    pub(crate) transport: &'a dyn Transport,
}

impl Next<'_> {
    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        match self.stack.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stack: rest,
                    transport: self.transport,
                };
                stage.handle(request, next).await
            }
            None => self.transport.send(&request).await,
        }
    }
}

/// Attaches a bearer credential unless the URL is on the allow-list of
/// unauthenticated endpoints. Works on its own copy of the request; the
/// caller-visible request is never mutated.
pub struct AuthAttach {
    store: Arc<TokenStore>,
    skip: Vec<String>,
}

impl AuthAttach {
    pub fn new(store: Arc<TokenStore>, skip: Vec<String>) -> Self {
        Self { store, skip }
    }
}

#[async_trait]
impl Middleware for AuthAttach {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError> {
        if matches_any(&request.url, &self.skip) {
            return next.run(request).await;
        }

        match self.store.access_token() {
            Some(token) => {
                let mut authed = request;
                authed
                    .headers
                    .push(("Authorization".to_string(), format!("Bearer {token}")));
                next.run(authed).await
            }
            None => next.run(request).await,
        }
    }
}

/// Re-issues the remaining chain per the retry policy.
pub struct Retry {
    policy: RetryPolicy,
}

impl Retry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Middleware for Retry {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError> {
        let idempotent = request.method.is_idempotent();
        with_retry(&self.policy, idempotent, || next.run(request.clone())).await
    }
}

/// Cached form of a response. Headers are intentionally dropped; only the
/// status and body are replayed on a hit.
#[derive(Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    body: serde_json::Value,
}

impl From<&ApiResponse> for CachedResponse {
    fn from(response: &ApiResponse) -> Self {
        Self {
            status: response.status,
            body: response.body.clone(),
        }
    }
}

impl CachedResponse {
    fn into_response(self) -> ApiResponse {
        ApiResponse::new(self.status, self.body)
    }
}

/// Serves idempotent requests from the response cache and stores fresh
/// successful responses with a host-dependent TTL. Non-idempotent requests
/// and skip-listed URLs bypass the cache entirely, in both directions.
pub struct CacheLayer {
    cache: Arc<ResponseCache>,
    skip: Vec<String>,
    external_hosts: Vec<String>,
    default_ttl: Duration,
    external_api_ttl: Duration,
}

impl CacheLayer {
    pub fn new(
        cache: Arc<ResponseCache>,
        skip: Vec<String>,
        external_hosts: Vec<String>,
        default_ttl: Duration,
        external_api_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            skip,
            external_hosts,
            default_ttl,
            external_api_ttl,
        }
    }

    fn ttl_for(&self, url: &str) -> Duration {
        if matches_any(url, &self.external_hosts) {
            self.external_api_ttl
        } else {
            self.default_ttl
        }
    }
}

#[async_trait]
impl Middleware for CacheLayer {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError> {
        if !request.method.is_idempotent() || matches_any(&request.url, &self.skip) {
            return next.run(request).await;
        }

        let key = request.cache_key();
        if let Some(cached) = self.cache.get::<CachedResponse>(&key) {
            debug!(key = %key, "serving response from cache");
            return Ok(cached.into_response());
        }

        let response = next.run(request.clone()).await?;
        if response.is_success() {
            let ttl = self.ttl_for(&request.url);
            self.cache.set(&key, &CachedResponse::from(&response), ttl);
        }
        Ok(response)
    }
}

/// Flips the loading indicator around the downstream call. The guard hides
/// on drop, so the release runs exactly once per show even when the caller
/// abandons the request mid-flight.
pub struct LoadingLayer {
    tracker: LoadingTracker,
    skip: Vec<String>,
}

impl LoadingLayer {
    pub fn new(tracker: LoadingTracker, skip: Vec<String>) -> Self {
        Self { tracker, skip }
    }
}

#[async_trait]
impl Middleware for LoadingLayer {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError> {
        if matches_any(&request.url, &self.skip) {
            return next.run(request).await;
        }
        let _guard = self.tracker.show();
        next.run(request).await
    }
}

/// Converts received non-success statuses into the failure taxonomy and
/// logs terminal failures. Purely observational: the original failure is
/// always re-raised unchanged.
pub struct ErrorClassify;

#[async_trait]
impl Middleware for ErrorClassify {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError> {
        let method = request.method;
        let url = request.url.clone();

        match next.run(request).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => {
                let err = ApiError::from_status(response.status);
                match &err {
                    ApiError::Auth { status } => {
                        warn!(%method, url = %url, status, "authentication failure")
                    }
                    ApiError::Server { status } => {
                        warn!(%method, url = %url, status, "server error")
                    }
                    ApiError::Client { status } => {
                        debug!(%method, url = %url, status, "client error")
                    }
                    ApiError::Transport { .. } => {}
                }
                Err(err)
            }
            Err(err) => {
                warn!(%method, url = %url, error = %err, "network error");
                Err(err)
            }
        }
    }
}
