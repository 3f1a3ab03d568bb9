//! Exponential backoff with jitter

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ai::backend::BackendError;

/// Decides whether a failed attempt is worth repeating
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for BackendError {
    /// Rate limits, server errors and requests that never got an answer are
    /// transient. Everything else (bad request, auth, malformed payload) is not.
    fn is_retryable(&self) -> bool {
        match self {
            BackendError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            BackendError::Network { .. } => true,
            BackendError::Decode { .. } => false,
        }
    }
}

/// Retry policy constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total calls allowed, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry, doubled for each later one
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based) for a jitter sample in `[0, 1)`
    ///
    /// `base_delay * 2^attempt * (0.5 + jitter * 0.5)`
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let factor = 0.5 + jitter.clamp(0.0, 1.0) * 0.5;
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        Duration::from_secs_f64(exponential * factor)
    }

    /// Delay before retry number `attempt` with a fresh random jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen();
        self.delay_for(attempt, jitter)
    }
}

/// Why a protected call did not produce a value
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error
    #[error("Maximum retries exceeded")]
    Exhausted { attempts: u32, last: E },

    /// A non-retryable failure, propagated unchanged
    #[error("{0}")]
    Fatal(E),

    /// The caller went away before the call resolved
    #[error("operation cancelled")]
    Cancelled,
}

/// Run `operation` until it succeeds, fails fatally, runs out of attempts,
/// or `cancel` fires.
///
/// Cancellation abandons both an in-flight attempt and a pending backoff sleep;
/// no attempt is started once the token is cancelled.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + Display,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Call succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            debug!("Non-retryable failure: {}", error);
            return Err(RetryError::Fatal(error));
        }

        attempt += 1;
        if attempt >= config.max_attempts {
            warn!("Giving up after {} attempts: {}", attempt, error);
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = config.backoff_delay(attempt - 1);
        warn!(
            "Attempt {}/{} failed ({}), retrying in {:?}",
            attempt, config.max_attempts, error, delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Scripted operation: returns the queued outcomes in order and records when it ran
    fn scripted(
        outcomes: Vec<Result<&'static str, BackendError>>,
    ) -> (
        Arc<Mutex<Vec<Instant>>>,
        impl FnMut() -> std::future::Ready<Result<&'static str, BackendError>>,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let mut queue = outcomes.into_iter();
        let op = move || {
            recorded.lock().unwrap().push(Instant::now());
            let next = queue
                .next()
                .unwrap_or_else(|| Err(BackendError::http(500, "script exhausted")));
            std::future::ready(next)
        };
        (calls, op)
    }

    #[test]
    fn test_classification() {
        assert!(BackendError::http(429, "").is_retryable());
        assert!(BackendError::http(500, "").is_retryable());
        assert!(BackendError::http(503, "").is_retryable());
        assert!(BackendError::http(599, "").is_retryable());
        assert!(BackendError::network("timeout").is_retryable());
        assert!(!BackendError::http(400, "").is_retryable());
        assert!(!BackendError::http(401, "").is_retryable());
        assert!(!BackendError::http(404, "").is_retryable());
        assert!(!BackendError::http(600, "").is_retryable());
        assert!(!BackendError::decode("bad json").is_retryable());
    }

    #[test]
    fn test_delay_bounds() {
        let config = RetryConfig::default();
        for attempt in 0..4 {
            let low = config.delay_for(attempt, 0.0);
            let high = config.delay_for(attempt, 1.0);
            let expected = 1000u64 * 2u64.pow(attempt);
            assert_eq!(low, Duration::from_millis(expected / 2));
            assert_eq!(high, Duration::from_millis(expected));

            for _ in 0..50 {
                let d = config.backoff_delay(attempt);
                assert!(d >= low && d <= high, "{:?} outside [{:?}, {:?}]", d, low, high);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limit_then_succeeds() {
        let (calls, op) = scripted(vec![
            Err(BackendError::http(429, "slow down")),
            Err(BackendError::http(429, "slow down")),
            Ok("done"),
        ]);

        let result = with_retry(&RetryConfig::default(), &CancellationToken::new(), op).await;
        assert_eq!(result.unwrap(), "done");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3, "expected exactly 2 retries");

        let first = calls[1] - calls[0];
        let second = calls[2] - calls[1];
        assert!(
            first >= Duration::from_millis(500) && first <= Duration::from_millis(1000),
            "first delay {:?}",
            first
        );
        assert!(
            second >= Duration::from_millis(1000) && second <= Duration::from_millis(2000),
            "second delay {:?}",
            second
        );
        assert!(second > first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let start = Instant::now();
        let (calls, op) = scripted(vec![Err(BackendError::http(400, "bad request"))]);

        let result = with_retry(&RetryConfig::default(), &CancellationToken::new(), op).await;

        match result {
            Err(RetryError::Fatal(BackendError::Http { status, .. })) => assert_eq!(status, 400),
            other => panic!("expected fatal 400, got {:?}", other),
        }
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_exhausts_attempts() {
        let (calls, op) = scripted(vec![
            Err(BackendError::http(500, "boom")),
            Err(BackendError::http(500, "boom")),
            Err(BackendError::http(500, "boom")),
            Ok("never reached"),
        ]);

        let result = with_retry(&RetryConfig::default(), &CancellationToken::new(), op).await;

        match result {
            Err(e @ RetryError::Exhausted { attempts, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(e.to_string(), "Maximum retries exceeded");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();

        let op = move || {
            *counter.lock().unwrap() += 1;
            // The client disconnects right after the first failure
            trigger.cancel();
            std::future::ready(Err::<(), _>(BackendError::http(503, "unavailable")))
        };

        let result = with_retry(&RetryConfig::default(), &cancel, op).await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (calls, op) = scripted(vec![Ok("unused")]);

        let result = with_retry(&RetryConfig::default(), &cancel, op).await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert!(calls.lock().unwrap().is_empty());
    }
}
