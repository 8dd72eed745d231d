//! Client configuration
//!
//! Plain structs with development defaults and environment overrides.
//! All URL lists use substring containment, the matching rule the rest of
//! the application depends on.

use lumen_auth::AuthConfig;
use lumen_resilience::RetryConfig;
use std::env;
use std::time::Duration;

/// TTL and size bounds for the response cache.
#[derive(Debug, Clone)]
pub struct CacheTtlConfig {
    /// TTL for responses from the internal backend
    pub default_ttl: Duration,
    /// TTL for responses from external API hosts
    pub external_api_ttl: Duration,
    /// Item bound that triggers the eviction sweep
    pub max_items: usize,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            external_api_ttl: Duration::from_secs(30 * 60),
            max_items: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub cache: CacheTtlConfig,
    /// Hosts whose responses get the external-API TTL
    pub external_hosts: Vec<String>,
    /// URLs that are called without credentials
    pub auth_skip: Vec<String>,
    /// URLs that must never be served from or written to the cache
    pub cache_skip: Vec<String>,
    /// URLs that do not flip the loading indicator
    pub loading_skip: Vec<String>,
    /// Endpoint used to exchange the refresh token
    pub refresh_url: String,
    /// Endpoint used for credential login
    pub login_url: String,
    pub retry: RetryConfig,
    pub auth: AuthConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache: CacheTtlConfig::default(),
            external_hosts: Vec::new(),
            auth_skip: vec![
                "/auth/login".to_string(),
                "/auth/register".to_string(),
                "/auth/refresh".to_string(),
            ],
            cache_skip: vec![
                "/auth/".to_string(),
                "/profile".to_string(),
                "/notifications".to_string(),
            ],
            loading_skip: Vec::new(),
            refresh_url: "/auth/refresh".to_string(),
            login_url: "/auth/login".to_string(),
            retry: RetryConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables,
    /// falling back to defaults for development
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache: CacheTtlConfig {
                default_ttl: env_duration_ms("CLIENT_CACHE_DEFAULT_TTL_MS")
                    .unwrap_or(defaults.cache.default_ttl),
                external_api_ttl: env_duration_ms("CLIENT_CACHE_EXTERNAL_TTL_MS")
                    .unwrap_or(defaults.cache.external_api_ttl),
                max_items: env::var("CLIENT_CACHE_MAX_ITEMS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.cache.max_items),
            },
            external_hosts: env_list("CLIENT_EXTERNAL_HOSTS")
                .unwrap_or(defaults.external_hosts),
            auth_skip: env_list("CLIENT_AUTH_SKIP_URLS").unwrap_or(defaults.auth_skip),
            cache_skip: env_list("CLIENT_CACHE_SKIP_URLS").unwrap_or(defaults.cache_skip),
            loading_skip: env_list("CLIENT_LOADING_SKIP_URLS").unwrap_or(defaults.loading_skip),
            refresh_url: env::var("CLIENT_REFRESH_URL").unwrap_or(defaults.refresh_url),
            login_url: env::var("CLIENT_LOGIN_URL").unwrap_or(defaults.login_url),
            retry: RetryConfig::default(),
            auth: AuthConfig::from_env(),
        }
    }
}

fn env_duration_ms(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

/// Substring containment, the historical matching rule for all URL lists.
pub fn matches_any(url: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|pattern| !pattern.is_empty() && url.contains(pattern.as_str()))
}
