/// Resilience patterns for outbound API calls
///
/// Provides the retry layer used by the request pipeline:
/// - **RetryPolicy**: decides whether a failed attempt is worth retrying
///   based on the HTTP status and the request's idempotence
/// - **Exponential backoff**: progressively longer delays between attempts
/// - **`with_retry`**: a driver that re-issues a call until it succeeds,
///   the policy declines, or attempts run out
///
/// # Example
///
/// ```rust,no_run
/// use lumen_resilience::{with_retry, Retryable, RetryConfig, RetryPolicy};
///
/// #[derive(Debug)]
/// struct Failure(Option<u16>);
///
/// impl std::fmt::Display for Failure {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "failure with status {:?}", self.0)
///     }
/// }
///
/// impl Retryable for Failure {
///     fn status_code(&self) -> Option<u16> {
///         self.0
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let policy = RetryPolicy::new(RetryConfig::default());
///     let result = with_retry(&policy, true, || async {
///         // Your API call here
///         Ok::<_, Failure>(())
///     })
///     .await;
///     assert!(result.is_ok());
/// }
/// ```
pub mod retry;

pub use retry::{with_retry, RetryConfig, RetryDecision, RetryPolicy, Retryable};
