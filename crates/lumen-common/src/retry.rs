//! Bounded exponential backoff for transient infrastructure failures.
//!
//! Kafka publishes, LinkDB round trips, and topic provisioning all retry
//! through [`with_backoff`]. After the attempt budget is exhausted the last
//! error surfaces to the caller, which decides whether the operation is fatal.

use std::future::Future;
use std::time::Duration;

/// Retry policy: exponential backoff doubling from `base` up to `cap`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

/// Run `op` until it succeeds or `max_attempts` is reached.
///
/// Returns the last error when the budget is exhausted.
pub async fn with_backoff<T, E, F, Fut>(policy: Backoff, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = policy.base;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.max_attempts => {
                tracing::error!(attempt, error = %e, "{label} failed, giving up");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "{label} failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.cap);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(Backoff::default(), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = with_backoff(Backoff::default(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;

        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_doubles_up_to_cap() {
        // 4 failures → sleeps of 0.5, 1, 2, 4 seconds before the final try.
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let _: Result<(), &str> = with_backoff(Backoff::default(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;

        assert_eq!(start.elapsed(), Duration::from_millis(7500));
    }
}
