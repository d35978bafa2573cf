//! Shared retry policy for provider calls (spec §4.F).
//!
//! Three attempts, exponential backoff `2s * 2^attempt` for HTTP 5xx /
//! overload. Rate limits (429) use a longer fixed schedule (30s, 60s)
//! because provider rate-limit windows reset on the minute, not
//! exponentially. Any other 4xx fails immediately — retrying a bad request
//! never helps.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::provider::ProviderError;

pub const MAX_ATTEMPTS: u32 = 3;
const RATE_LIMIT_SCHEDULE_MS: [u64; 2] = [30_000, 60_000];

/// Computes the backoff for retrying `err` on the given zero-based attempt,
/// or `None` if `err` isn't retryable or attempts are exhausted. Shared by
/// [`with_retry`] and the agentic loop's per-iteration retry (which can't
/// use `with_retry` directly since it must stop retrying the instant any
/// stream event has been delivered).
pub fn backoff_for(attempt: u32, err: &ProviderError) -> Option<Duration> {
    if attempt + 1 >= MAX_ATTEMPTS {
        return None;
    }
    match err {
        ProviderError::RateLimited { retry_after_ms } => Some(Duration::from_millis(
            RATE_LIMIT_SCHEDULE_MS
                .get(attempt as usize)
                .copied()
                .unwrap_or(*retry_after_ms),
        )),
        e if e.is_server_error() => Some(Duration::from_millis(2_000u64 * 2u64.pow(attempt))),
        _ => None,
    }
}

/// Retries `f` per the policy above. `f` is called fresh on each attempt —
/// callers build a new request/response future each time since a `Response`
/// body can't be replayed.
pub async fn with_retry<T, F, Fut>(label: &str, mut f: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => match backoff_for(attempt, &e) {
                Some(wait) => {
                    warn!(%label, attempt, wait_ms = wait.as_millis() as u64, error = %e, "retrying");
                    tokio::time::sleep(wait).await;
                }
                None => return Err(e),
            },
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let calls = AtomicU32::new(0);
        let result = with_retry("t", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ProviderError>(42)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_4xx_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result = with_retry("t", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(ProviderError::Api {
                status: 400,
                message: "bad request".into(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_error_retries_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retry("t", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(ProviderError::Api {
                status: 503,
                message: "overloaded".into(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
