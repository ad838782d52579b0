//! crates/academy_core/src/backoff.rs
//!
//! Exponential backoff with jitter for flaky remote calls (the spreadsheet API
//! throttles aggressively).

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub attempts: u32,
    pub base: Duration,
    /// Upper bound of the uniform random jitter added to every delay.
    pub jitter: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: 7,
            base: Duration::from_millis(600),
            jitter: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// No sleeping at all; used by tests and by callers that retry elsewhere.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base: Duration::ZERO,
            jitter: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// `base * 2^attempt + jitter`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            self.jitter.mul_f64(rand::rng().random::<f64>())
        };
        exp.saturating_add(jitter).min(self.max_delay)
    }
}

/// Something that can name its own failure kind for the exhaustion message.
pub trait ErrorKind {
    fn kind(&self) -> &'static str;
}

/// Runs `op` until it succeeds or `policy.attempts` are used up. On exhaustion
/// returns `PortError::RateLimited("<kind>: <message>")` built from the last error.
pub async fn with_backoff<T, E, F, Fut>(policy: &BackoffPolicy, what: &str, mut op: F) -> Result<T, PortError>
where
    E: Display + ErrorKind,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last: Option<E> = None;
    for attempt in 0..policy.attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(call = what, attempt = attempt + 1, error = %e, "remote call failed");
                last = Some(e);
                if attempt + 1 < policy.attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(match last {
        None => PortError::RateLimited("Unknown error".to_string()),
        Some(e) => {
            let msg = e.to_string();
            let msg = msg.trim();
            let msg = if msg.is_empty() { "no message" } else { msg };
            PortError::RateLimited(format!("{}: {}", e.kind(), msg))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Boom(&'static str);

    impl Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl ErrorKind for Boom {
        fn kind(&self) -> &'static str {
            "Boom"
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&BackoffPolicy::immediate(7), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(Boom("429 quota"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&BackoffPolicy::immediate(7), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Boom("quota exceeded")) }
        })
        .await;
        assert_eq!(result, Err(PortError::RateLimited("Boom: quota exceeded".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_sleeps_between_attempts() {
        let start = tokio::time::Instant::now();
        let policy = BackoffPolicy {
            jitter: Duration::ZERO,
            ..BackoffPolicy::default()
        };
        let _: Result<(), _> = with_backoff(&policy, "test", || async { Err(Boom("x")) }).await;
        // 0.6 + 1.2 + 2.4 + 4.8 + 9.6 + 10 (capped); no sleep after the last attempt.
        assert_eq!(start.elapsed(), Duration::from_millis(28_600));
    }

    #[test]
    fn delay_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
        assert!(policy.delay_for(0) >= Duration::from_millis(600));
        assert!(policy.delay_for(0) <= Duration::from_millis(850));
    }
}
