//! Lumen outbound request pipeline
//!
//! Wraps every outbound call in an ordered middleware chain:
//! credentials are attached, transient failures retried with backoff,
//! idempotent responses cached with TTL, the loading indicator kept in
//! sync, and terminal failures classified before reaching the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumen_auth::MemoryStorage;
//! use lumen_client::{ApiRequest, ClientConfig, RequestPipeline, Transport};
//!
//! # async fn example(transport: Arc<dyn Transport>) -> anyhow::Result<()> {
//! let pipeline = RequestPipeline::new(
//!     ClientConfig::default(),
//!     transport,
//!     Arc::new(MemoryStorage::new()),
//! );
//!
//! let response = pipeline.execute(&ApiRequest::get("/api/posts")).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod loading;
pub mod middleware;
pub mod request;
mod session;

pub use config::{CacheTtlConfig, ClientConfig};
pub use error::ApiError;
pub use loading::{LoadingGuard, LoadingTracker};
pub use middleware::{Middleware, Next, Transport};
pub use request::{ApiRequest, ApiResponse, Method};

use std::sync::Arc;

use middleware::{AuthAttach, CacheLayer, ErrorClassify, LoadingLayer, Retry};
use session::{session_from_body, TransportRefresher};

use lumen_auth::{AuthSession, RefreshScheduler, StorageBackend, TokenRefresher, TokenStore};
use lumen_cache::ResponseCache;
use lumen_resilience::RetryPolicy;

/// The client's single entry point for outbound calls.
///
/// Owns the middleware chain, the response cache, the token store and the
/// refresh scheduler. One instance per application run, shared by handle.
pub struct RequestPipeline {
    stack: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    store: Arc<TokenStore>,
    scheduler: Arc<RefreshScheduler>,
    loading: LoadingTracker,
    login_url: String,
}

impl RequestPipeline {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let cache = Arc::new(ResponseCache::new(
            config.cache.default_ttl,
            config.cache.max_items,
        ));
        let store = Arc::new(TokenStore::new(storage, config.auth.storage_keys.clone()));
        let refresher: Arc<dyn TokenRefresher> = Arc::new(TransportRefresher::new(
            transport.clone(),
            config.refresh_url.clone(),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            store.clone(),
            refresher,
            config.auth.refresh_threshold,
        ));
        let loading = LoadingTracker::new();

        // The chain is composed once, at construction; the order is part of
        // the pipeline's contract (see module docs in `middleware`).
        let stack: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(AuthAttach::new(store.clone(), config.auth_skip.clone())),
            Arc::new(Retry::new(RetryPolicy::new(config.retry.clone()))),
            Arc::new(CacheLayer::new(
                cache.clone(),
                config.cache_skip.clone(),
                config.external_hosts.clone(),
                config.cache.default_ttl,
                config.cache.external_api_ttl,
            )),
            Arc::new(LoadingLayer::new(
                loading.clone(),
                config.loading_skip.clone(),
            )),
            Arc::new(ErrorClassify),
        ];

        Self {
            stack,
            transport,
            cache,
            store,
            scheduler,
            loading,
            login_url: config.login_url,
        }
    }

    /// Run a request through the full middleware chain.
    ///
    /// The caller's request is cloned at the boundary and never mutated.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let next = Next {
            stack: &self.stack,
            transport: self.transport.as_ref(),
        };
        next.run(request.clone()).await
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::get(url)).await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::post(url).with_body(body)).await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::new(Method::Put, url).with_body(body))
            .await
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::new(Method::Delete, url)).await
    }

    /// Exchange credentials for a session, persist it and arm the silent
    /// refresh timer.
    pub async fn login(&self, credentials: serde_json::Value) -> anyhow::Result<AuthSession> {
        let request = ApiRequest::post(&self.login_url).with_body(credentials);
        let response = self.execute(&request).await?;
        let session = session_from_body(&response.body)?;

        self.store.store_session(&session);
        self.scheduler.schedule_from_session(&session);
        Ok(session)
    }

    /// Cancel any pending refresh and clear the persisted session.
    pub fn logout(&self) {
        self.scheduler.logout();
    }

    /// Currently persisted session, if any.
    pub fn session(&self) -> Option<AuthSession> {
        self.store.session()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn loading(&self) -> &LoadingTracker {
        &self.loading
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }
}
