//! Bounded retry with exponential backoff and jitter

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::engine::EngineError;

/// Initial backoff delay; doubles per attempt
const INITIAL_BACKOFF_MS: u64 = 500;

/// Backoff never exceeds this ceiling
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Backoff duration for a given retry attempt (1-based), with up to 25%
/// random jitter so concurrent retriers do not stampede together.
pub fn backoff_for(attempt: u32) -> Duration {
    let base = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let base = Duration::from_millis(base).min(MAX_BACKOFF);
    let jitter = rand::rng().random_range(0.0..0.25);
    base.mul_f64(1.0 + jitter)
}

/// Run an engine call with up to `max_retries` retries on transient
/// failures. Rate limits wait out the server-provided delay; other
/// retryable errors back off exponentially. Non-retryable errors and
/// budget exhaustion return the last error.
pub async fn with_retries<F, Fut, T>(max_retries: u32, label: &str, mut call: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay = e.retry_after().unwrap_or_else(|| backoff_for(attempt));
                warn!(label, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying engine call");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_grows_and_caps() {
        let first = backoff_for(1);
        assert!(first >= Duration::from_millis(500));
        assert!(first <= Duration::from_millis(625));

        // Far past the doubling range, the ceiling holds (plus jitter)
        let capped = backoff_for(30);
        assert!(capped <= MAX_BACKOFF.mul_f64(1.25));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retries(3, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::Timeout(Duration::from_millis(1)))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(3, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::InvalidResponse("bad".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(2, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::Timeout(Duration::from_millis(1))) }
        })
        .await;
        assert!(matches!(result.unwrap_err(), EngineError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
