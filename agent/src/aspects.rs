//! Cross-cutting wrappers composed around probes and delivery.
//!
//! Each wrapper takes an operation and runs it with one extra behaviour:
//! default substitution on error, fixed-rate pacing, fixed-delay retry, or
//! timing/tracing. They are nested explicitly at the call site, e.g.
//! `retrying(.., || limiter.run(op()))`.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Run `op`; on failure, log it and return `default()` instead.
///
/// `default` is only evaluated when `op` fails.
pub fn or_default<T>(
    name: &str,
    op: impl FnOnce() -> anyhow::Result<T>,
    default: impl FnOnce() -> T,
) -> T {
    match op() {
        Ok(value) => value,
        Err(e) => {
            warn!(operation = name, "Probe failed, using default: {e:#}");
            default()
        }
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
}

/// Call `op` up to `max_retries` times in total, sleeping `delay` between
/// failed attempts. No backoff.
pub async fn retrying<T, E, F, Fut>(
    name: &str,
    max_retries: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, RetryError>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = max_retries.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_error = e.to_string();
                if attempt < attempts {
                    warn!(operation = name, error = %e, "Retry {attempt}/{attempts} failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    error!(operation = name, attempts, error = %last_error, "Giving up after {attempts} attempts");
    Err(RetryError::Exhausted {
        operation: name.to_string(),
        attempts,
        last_error,
    })
}

/// Enforces a minimum spacing between successive calls.
///
/// The spacing is measured from the end of the previous call. Intended for a
/// single caller; concurrent callers are serialised by the internal lock.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_called: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing at most `calls_per_second` calls per second.
    pub fn new(calls_per_second: f64) -> anyhow::Result<Self> {
        if !calls_per_second.is_finite() || calls_per_second <= 0.0 {
            anyhow::bail!("calls_per_second must be a positive number, got {calls_per_second}");
        }
        let interval = Duration::try_from_secs_f64(1.0 / calls_per_second).with_context(|| {
            format!("calls_per_second {calls_per_second} gives an unrepresentable interval")
        })?;
        Ok(Self::from_interval(interval))
    }

    /// Limiter with an explicit minimum spacing between calls.
    pub fn from_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_called: Mutex::new(None),
        }
    }

    /// Minimum spacing between calls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait out the remainder of the interval if needed, then await `op`.
    pub async fn run<T>(&self, op: impl Future<Output = T>) -> T {
        let mut last_called = self.last_called.lock().await;

        if let Some(last) = *last_called {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                let wait_ms = wait.as_millis() as u64;
                debug!(wait_ms, "Rate limited, sleeping");
                tokio::time::sleep(wait).await;
            }
        }

        let result = op.await;
        *last_called = Some(Instant::now());
        result
    }
}

/// Await `fut` and log how long it took.
pub async fn timed<T>(name: &str, fut: impl Future<Output = T>) -> T {
    let start = Instant::now();
    let result = fut.await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    debug!(operation = name, "{name} took {elapsed_ms:.2} ms");
    result
}

/// Run `op`, logging its input and output.
pub fn traced<I: Debug + ?Sized, T: Debug>(name: &str, input: &I, op: impl FnOnce() -> T) -> T {
    debug!(operation = name, input = ?input, "Call");
    let output = op();
    debug!(operation = name, output = ?output, "Return");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_or_default_passes_through_success() {
        let value = or_default("ok", || Ok(42), || 0);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_or_default_substitutes_on_error() {
        let value = or_default("boom", || anyhow::bail!("read failed"), || -1.0);
        assert_eq!(value, -1.0);
    }

    #[test]
    fn test_or_default_evaluates_default_lazily() {
        let evaluated = Cell::new(false);
        let value = or_default(
            "ok",
            || Ok("primary"),
            || {
                evaluated.set(true);
                "fallback"
            },
        );
        assert_eq!(value, "primary");
        assert!(!evaluated.get(), "default must not run when op succeeds");
    }

    #[tokio::test]
    async fn test_retrying_returns_first_success() {
        let calls = Cell::new(0u32);
        let result: Result<u32, RetryError> = retrying("flaky", 5, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(format!("attempt {n} failed"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retrying_exhausts_attempt_budget() {
        let calls = Cell::new(0u32);
        let result: Result<(), RetryError> = retrying("always_fails", 4, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>("nope") }
        })
        .await;

        assert_eq!(calls.get(), 4);
        let RetryError::Exhausted {
            operation,
            attempts,
            last_error,
        } = result.unwrap_err();
        assert_eq!(operation, "always_fails");
        assert_eq!(attempts, 4);
        assert_eq!(last_error, "nope");
    }

    #[tokio::test]
    async fn test_retrying_zero_budget_still_attempts_once() {
        let calls = Cell::new(0u32);
        let _ = retrying("once", 0, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>("nope") }
        })
        .await;
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_retrying_sleeps_between_attempts_only() {
        let start = std::time::Instant::now();
        let _ = retrying("delayed", 3, Duration::from_millis(50), || async {
            Err::<(), _>("nope")
        })
        .await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "two gaps expected, got {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1000), "no trailing sleep, got {elapsed:?}");
    }

    #[test]
    fn test_rate_limiter_rejects_non_positive_rate() {
        assert!(RateLimiter::new(0.0).is_err());
        assert!(RateLimiter::new(-2.0).is_err());
        assert!(RateLimiter::new(f64::NAN).is_err());
    }

    #[test]
    fn test_rate_limiter_rejects_unrepresentable_interval() {
        let err = RateLimiter::new(1e-30).unwrap_err();
        assert!(err.to_string().contains("unrepresentable"), "unexpected error: {err:#}");
    }

    #[test]
    fn test_rate_limiter_interval_from_rate() {
        let limiter = RateLimiter::new(0.5).unwrap();
        assert_eq!(limiter.interval(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_rate_limiter_first_call_is_immediate() {
        let limiter = RateLimiter::new(1.0).unwrap();
        let start = std::time::Instant::now();
        limiter.run(async {}).await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_back_to_back_calls() {
        let limiter = RateLimiter::new(1.0).unwrap();
        let start = std::time::Instant::now();
        limiter.run(async {}).await;
        limiter.run(async {}).await;
        assert!(
            start.elapsed() >= Duration::from_millis(990),
            "second call must wait ~1s, got {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_rate_limiter_returns_op_output() {
        let limiter = RateLimiter::from_interval(Duration::ZERO);
        assert_eq!(limiter.run(async { "done" }).await, "done");
    }

    #[tokio::test]
    async fn test_timed_and_traced_pass_through() {
        assert_eq!(timed("sum", async { 1 + 1 }).await, 2);
        assert_eq!(traced("len", "eth0", || "eth0".len()), 4);
    }
}
