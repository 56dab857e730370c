use anyhow::{Result, anyhow};
use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed pause between attempts.
///
/// Each attempt is cut off after `attempt_timeout`, so a call that never
/// resolves counts as a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Used for per-turn feedback and the summary report.
    pub const FEEDBACK: RetryPolicy = RetryPolicy {
        attempts: 3,
        backoff: Duration::from_secs(1),
        attempt_timeout: Duration::from_secs(30),
    };

    /// Used for resume skill extraction and question tailoring.
    pub const RESUME: RetryPolicy = RetryPolicy {
        attempts: 5,
        backoff: Duration::from_secs(2),
        attempt_timeout: Duration::from_secs(30),
    };

    pub fn new(attempts: u32, backoff: Duration, attempt_timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
            attempt_timeout,
        }
    }

    /// Runs `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The error of the final
    /// attempt is returned when every attempt fails.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow!(
                    "timed out after {}s",
                    self.attempt_timeout.as_secs_f32()
                )),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!("{what}: attempt {attempt}/{attempts} failed: {e:#}");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("{what}: no attempts were made")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = RetryPolicy::FEEDBACK
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(anyhow!("not yet"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_with_backoff_between_attempts() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<()> = RetryPolicy::RESUME
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(anyhow!("attempt {attempt} failed")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "attempt 5 failed");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempts_are_cut_off() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let policy = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(10));

        let result: Result<()> = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Result<()>>()
            })
            .await;

        assert!(result.unwrap_err().to_string().contains("timed out"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(21));
    }
}
