/// Retry policy with status-code classification and exponential backoff
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Status codes that are classification errors, never transient failures.
const TERMINAL_STATUSES: [u16; 3] = [401, 403, 404];

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries beyond the initial attempt
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(300),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff before re-issuing after failed attempt `attempt` (1-based):
    /// `initial * multiplier^(attempt - 1)`, capped at `max_backoff`.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base_millis = self.initial_backoff.as_millis() as f64;
        let exponent = attempt.saturating_sub(1);
        let multiplied = base_millis * self.backoff_multiplier.powi(exponent as i32);
        let millis = multiplied.min(self.max_backoff.as_millis() as f64) as u64;
        Duration::from_millis(millis)
    }
}

/// Per-attempt verdict. Ephemeral; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    fn give_up() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
        }
    }
}

/// A failure the retry driver can classify.
pub trait Retryable {
    /// HTTP status of the failure; `None` for a pure transport failure
    /// (no response received, the "status 0" case).
    fn status_code(&self) -> Option<u16>;
}

/// Decides whether a failed attempt should be re-issued.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Classify failed attempt `attempt` (1-based).
    ///
    /// - 401/403/404 are terminal, never retried
    /// - a transport failure (`None` status) is retryable for any method
    /// - a received status on a non-idempotent request is never retried,
    ///   to avoid re-issuing side effects
    /// - otherwise only 5xx responses are transient
    pub fn decide(&self, attempt: u32, idempotent: bool, status: Option<u16>) -> RetryDecision {
        let transient = match status {
            Some(status) if TERMINAL_STATUSES.contains(&status) => false,
            Some(status) => idempotent && status >= 500,
            None => true,
        };

        if !transient || attempt > self.config.max_retries {
            return RetryDecision::give_up();
        }

        RetryDecision {
            should_retry: true,
            delay: self.config.backoff_duration(attempt),
        }
    }
}

/// Re-issue `f` until it succeeds or the policy declines.
///
/// On exhaustion the last original error is surfaced unchanged; no
/// retry-specific error type is introduced.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    idempotent: bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 1u32;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                let decision = policy.decide(attempt, idempotent, err.status_code());
                if !decision.should_retry {
                    return Err(err);
                }

                warn!(
                    attempt,
                    max_retries = policy.config.max_retries,
                    delay_ms = decision.delay.as_millis() as u64,
                    error = %err,
                    "retrying request"
                );

                tokio::time::sleep(decision.delay).await;
                attempt += 1;
            }
        }
    }
}
