/// Integration tests for the request pipeline
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;

use lumen_auth::test_utils::token_with_expiry;
use lumen_auth::{AuthSession, MemoryStorage};
use lumen_client::{
    ApiError, ApiRequest, ApiResponse, ClientConfig, RequestPipeline, Transport,
};
use lumen_resilience::RetryConfig;

/// Scripted transport: pops queued outcomes, falls back to a 200 with a
/// fixed body, and records every request it sees.
struct MockTransport {
    queue: Mutex<VecDeque<Result<ApiResponse, ApiError>>>,
    requests: Mutex<Vec<ApiRequest>>,
    calls: AtomicU32,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        })
    }

    fn enqueue(&self, outcome: Result<ApiResponse, ApiError>) {
        self.queue.lock().push_back(outcome);
    }

    fn enqueue_status(&self, status: u16) {
        self.enqueue(Ok(ApiResponse::new(status, json!({"status": status}))));
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> ApiRequest {
        self.requests.lock().last().cloned().expect("a request was sent")
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::new(200, json!({"ok": true}))))
    }
}

fn fast_config() -> ClientConfig {
    ClientConfig {
        retry: RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn pipeline_with(transport: Arc<MockTransport>, config: ClientConfig) -> RequestPipeline {
    RequestPipeline::new(config, transport, Arc::new(MemoryStorage::new()))
}

fn session_with_expiry(exp: i64) -> AuthSession {
    AuthSession {
        access_token: token_with_expiry(exp),
        refresh_token: "refresh-1".to_string(),
        user: json!({"id": "user-1"}),
        expires_at_epoch_ms: exp * 1000,
    }
}

fn session_body(exp: i64) -> serde_json::Value {
    json!({
        "access_token": token_with_expiry(exp),
        "refresh_token": "refresh-2",
        "user": {"id": "user-1"}
    })
}

// ==================== Cache behaviour ====================

#[tokio::test]
async fn test_repeated_get_is_served_from_cache() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());

    let first = pipeline.get("/api/posts").await.unwrap();
    let second = pipeline.get("/api/posts").await.unwrap();

    assert_eq!(transport.calls(), 1);
    assert_eq!(first.body, second.body);
    assert_eq!(pipeline.cache().stats().hit_count, 1);
}

#[tokio::test]
async fn test_query_order_does_not_fragment_cache() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());

    let a = ApiRequest::get("/api/posts").with_query("a", "1").with_query("b", "2");
    let b = ApiRequest::get("/api/posts").with_query("b", "2").with_query("a", "1");
    pipeline.execute(&a).await.unwrap();
    pipeline.execute(&b).await.unwrap();

    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_post_bypasses_cache_in_both_directions() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());

    // Prime the cache with a GET to the same URL
    pipeline.get("/api/posts").await.unwrap();
    pipeline.post("/api/posts", json!({"title": "x"})).await.unwrap();
    pipeline.post("/api/posts", json!({"title": "y"})).await.unwrap();

    // Both POSTs reached the transport despite the cached GET
    assert_eq!(transport.calls(), 3);
    // And the cached GET entry was not overwritten by POST responses
    pipeline.get("/api/posts").await.unwrap();
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_skip_listed_urls_are_never_cached() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());

    pipeline.get("/api/profile").await.unwrap();
    pipeline.get("/api/profile").await.unwrap();

    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_error_responses_are_not_cached() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    transport.enqueue_status(404);

    assert!(matches!(
        pipeline.get("/api/posts/9").await,
        Err(ApiError::Client { status: 404 })
    ));
    // The failure was not stored; the next call goes to the network
    pipeline.get("/api/posts/9").await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_internal_ttl_expires_before_external() {
    let transport = MockTransport::new();
    let mut config = fast_config();
    config.cache.default_ttl = Duration::from_secs(1);
    config.cache.external_api_ttl = Duration::from_secs(100);
    config.external_hosts = vec!["api.partner.example".to_string()];
    let pipeline = pipeline_with(transport.clone(), config);

    pipeline.get("/api/posts").await.unwrap();
    pipeline.get("https://api.partner.example/feed").await.unwrap();
    assert_eq!(transport.calls(), 2);

    tokio::time::advance(Duration::from_secs(2)).await;

    // Internal entry expired, external entry still live
    pipeline.get("/api/posts").await.unwrap();
    pipeline.get("https://api.partner.example/feed").await.unwrap();
    assert_eq!(transport.calls(), 3);
}

// ==================== Auth attachment ====================

#[tokio::test]
async fn test_bearer_credential_attached_when_logged_in() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    let session = session_with_expiry(chrono::Utc::now().timestamp() + 3600);
    pipeline.token_store().store_session(&session);

    pipeline.get("/api/posts").await.unwrap();

    let sent = transport.last_request();
    let header = sent.header("authorization").expect("credential attached");
    assert_eq!(header, format!("Bearer {}", session.access_token));
}

#[tokio::test]
async fn test_allow_listed_urls_stay_unauthenticated() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    pipeline
        .token_store()
        .store_session(&session_with_expiry(chrono::Utc::now().timestamp() + 3600));

    pipeline
        .post("/auth/login", json!({"email": "a@b.c"}))
        .await
        .unwrap();

    assert!(transport.last_request().header("authorization").is_none());
}

#[tokio::test]
async fn test_caller_request_is_not_mutated() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    pipeline
        .token_store()
        .store_session(&session_with_expiry(chrono::Utc::now().timestamp() + 3600));

    let request = ApiRequest::get("/api/posts");
    pipeline.execute(&request).await.unwrap();

    assert!(request.headers.is_empty());
    assert!(transport.last_request().header("authorization").is_some());
}

// ==================== Retry behaviour ====================

#[tokio::test(start_paused = true)]
async fn test_server_errors_retried_until_success() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    transport.enqueue_status(500);
    transport.enqueue_status(500);
    transport.enqueue_status(500);

    let response = pipeline.get("/api/posts").await.unwrap();
    assert!(response.is_success());
    // 3 failures then the 4th attempt succeeded
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_auth_failure_is_never_retried() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    transport.enqueue_status(401);

    let err = pipeline.get("/api/posts").await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_post_retried_only_on_transport_failure() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());

    // A received 500 on a POST is terminal
    transport.enqueue_status(500);
    assert!(matches!(
        pipeline.post("/api/posts", json!({})).await,
        Err(ApiError::Server { status: 500 })
    ));
    assert_eq!(transport.calls(), 1);

    // A pure transport failure on a POST is retried
    transport.enqueue(Err(ApiError::transport("connection reset")));
    pipeline.post("/api/posts", json!({})).await.unwrap();
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_classified_and_retried_as_transport_failure() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    transport.enqueue(Err(ApiError::transport("request timed out")));

    let response = pipeline.get("/api/slow").await.unwrap();
    assert!(response.is_success());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_last_error() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    for _ in 0..4 {
        transport.enqueue_status(503);
    }

    let err = pipeline.get("/api/posts").await.unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 503 }));
    // Initial attempt + 3 retries
    assert_eq!(transport.calls(), 4);
}

// ==================== Loading indicator ====================

/// Transport that holds every request until released, for observing the
/// loading indicator mid-flight.
struct SlowTransport {
    delay: Duration,
}

#[async_trait::async_trait]
impl Transport for SlowTransport {
    async fn send(&self, _request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        tokio::time::sleep(self.delay).await;
        Ok(ApiResponse::new(200, json!({"ok": true})))
    }
}

#[tokio::test]
async fn test_loading_visible_only_while_in_flight() {
    let transport = Arc::new(SlowTransport {
        delay: Duration::from_millis(100),
    });
    let pipeline = Arc::new(RequestPipeline::new(
        fast_config(),
        transport,
        Arc::new(MemoryStorage::new()),
    ));

    assert!(!pipeline.loading().visible());
    let worker = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.get("/api/posts").await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(pipeline.loading().visible());

    worker.await.unwrap().unwrap();
    assert!(!pipeline.loading().visible());
    assert_eq!(pipeline.loading().active(), 0);
}

#[tokio::test]
async fn test_loading_hidden_again_after_failure() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    transport.enqueue_status(404);

    let _ = pipeline.get("/api/missing").await;
    assert!(!pipeline.loading().visible());
    assert_eq!(pipeline.loading().active(), 0);
}

#[tokio::test]
async fn test_cache_hit_does_not_flip_loading() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    pipeline.get("/api/posts").await.unwrap();

    let mut visibility = pipeline.loading().subscribe();
    pipeline.get("/api/posts").await.unwrap();

    // The hit short-circuited before the loading stage
    assert_eq!(transport.calls(), 1);
    assert!(!visibility.has_changed().unwrap());
}

// ==================== Session lifecycle ====================

#[tokio::test]
async fn test_login_stores_session_and_arms_refresh() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    let exp = chrono::Utc::now().timestamp() + 3600;
    transport.enqueue(Ok(ApiResponse::new(200, session_body(exp))));

    let session = pipeline
        .login(json!({"email": "a@b.c", "password": "pw"}))
        .await
        .unwrap();

    assert_eq!(session.refresh_token, "refresh-2");
    assert!(pipeline.session().is_some());
    assert!(pipeline.scheduler().has_pending_timer());

    pipeline.logout();
    assert!(pipeline.session().is_none());
    assert!(!pipeline.scheduler().has_pending_timer());
}

#[tokio::test]
async fn test_failed_login_surfaces_error_without_session() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    transport.enqueue_status(401);

    assert!(pipeline.login(json!({"email": "a@b.c"})).await.is_err());
    assert!(pipeline.session().is_none());
}

#[tokio::test]
async fn test_concurrent_expiry_detection_refreshes_once() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    // Stored token expires within the refresh threshold
    pipeline
        .token_store()
        .store_session(&session_with_expiry(chrono::Utc::now().timestamp() + 10));
    let exp = chrono::Utc::now().timestamp() + 3600;
    transport.enqueue(Ok(ApiResponse::new(200, session_body(exp))));

    let scheduler = pipeline.scheduler();
    let (a, b) = tokio::join!(scheduler.refresh_now(), scheduler.refresh_now());

    assert!(a.is_ok());
    assert!(b.is_ok());
    // Exactly one backend call, to the refresh endpoint
    assert_eq!(transport.calls(), 1);
    assert_eq!(transport.last_request().url, "/auth/refresh");
}

#[tokio::test]
async fn test_refresh_failure_forces_logout() {
    let transport = MockTransport::new();
    let pipeline = pipeline_with(transport.clone(), fast_config());
    pipeline
        .token_store()
        .store_session(&session_with_expiry(chrono::Utc::now().timestamp() + 10));
    transport.enqueue_status(401);

    assert!(pipeline.scheduler().refresh_now().await.is_err());
    assert!(pipeline.session().is_none());
}
