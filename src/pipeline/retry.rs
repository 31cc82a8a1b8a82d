//! Bounded retries with exponential backoff.
//!
//! A logical call moves through four phases:
//!
//! ```text
//!             success
//! Attempting ─────────▶ Done
//!     │  ▲
//!     │  └──── Backoff ◀── retryable failure, budget left
//!     │
//!     └──────▶ Failed      non-retryable failure or budget spent
//! ```
//!
//! [`RetryState`] holds the transitions; [`run_with_retry`] is the loop that
//! drives them and contains no decisions of its own. The delay before retry
//! *n* (0-based) is `base_delay × 2^n`, capped at [`MAX_BACKOFF`]. There is
//! no jitter, so schedules are deterministic: with a 1 s base and 3 retries
//! the waits are 1 s → 2 s → 4 s.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::pipeline::classify::Verdict;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry budget and backoff base for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }

    /// Delay before retry `retry` (0-based).
    pub fn next_delay(&self, retry: u32) -> Duration {
        next_delay(self.base_delay, retry)
    }

    /// Attempts made when every attempt fails with a retryable error.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// `base × 2^retry`, capped at [`MAX_BACKOFF`].
pub fn next_delay(base: Duration, retry: u32) -> Duration {
    2u32.checked_pow(retry)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Where a logical call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Attempting,
    Backoff(Duration),
    Done,
    Failed,
}

/// Per-call retry bookkeeping. Lives exactly as long as one logical call.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    policy: RetryPolicy,
    phase: RetryPhase,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            attempt: 0,
            policy,
            phase: RetryPhase::Attempting,
        }
    }

    /// 0-based index of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn on_success(&mut self) -> RetryPhase {
        self.phase = RetryPhase::Done;
        self.phase
    }

    /// Record a failed attempt. Backs off only when the failure is retryable
    /// and the budget allows another attempt.
    pub fn on_failure(&mut self, retryable: bool) -> RetryPhase {
        self.phase = if retryable && self.attempt < self.policy.max_retries {
            RetryPhase::Backoff(self.policy.next_delay(self.attempt))
        } else {
            RetryPhase::Failed
        };
        self.phase
    }

    /// The backoff sleep finished; start the next attempt.
    pub fn on_backoff_elapsed(&mut self) -> RetryPhase {
        if let RetryPhase::Backoff(_) = self.phase {
            self.attempt += 1;
            self.phase = RetryPhase::Attempting;
        }
        self.phase
    }
}

/// Something that can wait. Injected so tests can skip real sleeps.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the current tokio runtime's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Drive `attempt_fn` until it succeeds, fails fatally, or the budget runs out.
///
/// `attempt_fn` receives the 0-based attempt index. On final failure the
/// last attempt's error is returned unchanged.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut attempt_fn: F,
) -> Result<T, ClientError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Verdict>>,
{
    let mut state = RetryState::new(policy);
    loop {
        let attempt = state.attempt();
        debug!("Attempt {}/{}", attempt + 1, policy.max_attempts());
        match attempt_fn(attempt).await {
            Ok(value) => {
                state.on_success();
                return Ok(value);
            }
            Err(verdict) => match state.on_failure(verdict.retryable) {
                RetryPhase::Backoff(delay) => {
                    warn!(
                        "Attempt {}/{} failed ({}): {}; retrying in {}ms",
                        attempt + 1,
                        policy.max_attempts(),
                        verdict.error.kind(),
                        verdict.error,
                        delay.as_millis()
                    );
                    sleeper.sleep(delay).await;
                    state.on_backoff_elapsed();
                }
                _ => return Err(verdict.error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.0.lock().unwrap().push(delay);
        }
    }

    fn retryable(msg: &str) -> Verdict {
        Verdict {
            error: ClientError::network(msg),
            retryable: true,
        }
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(250);
        for n in 0..5 {
            assert_eq!(next_delay(base, n + 1), next_delay(base, n) * 2);
        }
        assert_eq!(next_delay(Duration::from_secs(1), 0), Duration::from_secs(1));
        assert_eq!(next_delay(Duration::from_secs(1), 2), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(next_delay(Duration::from_secs(1), 6), MAX_BACKOFF);
        assert_eq!(next_delay(Duration::from_secs(1), 40), MAX_BACKOFF);
        assert_eq!(next_delay(Duration::from_secs(90), 0), MAX_BACKOFF);
    }

    #[test]
    fn state_machine_transitions() {
        let mut s = RetryState::new(RetryPolicy::new(1, Duration::from_millis(10)));
        assert_eq!(s.phase(), RetryPhase::Attempting);
        assert_eq!(s.on_failure(true), RetryPhase::Backoff(Duration::from_millis(10)));
        assert_eq!(s.on_backoff_elapsed(), RetryPhase::Attempting);
        assert_eq!(s.attempt(), 1);
        assert_eq!(s.on_failure(true), RetryPhase::Failed);

        let mut s = RetryState::new(RetryPolicy::new(5, Duration::from_millis(10)));
        assert_eq!(s.on_failure(false), RetryPhase::Failed);

        let mut s = RetryState::new(RetryPolicy::new(5, Duration::from_millis(10)));
        assert_eq!(s.on_success(), RetryPhase::Done);
        // Not in backoff: nothing to advance.
        assert_eq!(s.on_backoff_elapsed(), RetryPhase::Done);
        assert_eq!(s.attempt(), 0);
    }

    #[test]
    fn budget_allows_exactly_max_retries_backoffs() {
        let mut s = RetryState::new(RetryPolicy::new(3, Duration::from_millis(10)));
        for attempt in 0..3 {
            assert_eq!(s.attempt(), attempt);
            assert!(matches!(s.on_failure(true), RetryPhase::Backoff(_)));
            s.on_backoff_elapsed();
        }
        assert_eq!(s.attempt(), 3);
        assert_eq!(s.on_failure(true), RetryPhase::Failed);

        let mut s = RetryState::new(RetryPolicy::new(0, Duration::from_millis(10)));
        assert_eq!(s.on_failure(true), RetryPhase::Failed);
    }

    #[tokio::test]
    async fn exhausts_budget_and_returns_last_error() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0u32;
        let result: Result<(), _> = run_with_retry(RetryPolicy::new(3, Duration::from_millis(100)), &sleeper, |n| {
            calls += 1;
            async move { Err(retryable(&format!("failure #{n}"))) }
        })
        .await;

        assert_eq!(calls, 4);
        assert_eq!(result.unwrap_err().message(), "failure #3");
        assert_eq!(
            *sleeper.0.lock().unwrap(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn fatal_failure_stops_immediately() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0u32;
        let result: Result<(), _> = run_with_retry(RetryPolicy::new(3, Duration::from_millis(1)), &sleeper, |_| {
            calls += 1;
            async { Err(Verdict::fatal(ClientError::invalid_input("bad"))) }
        })
        .await;
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err(), ClientError::invalid_input("bad"));
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let sleeper = RecordingSleeper::default();
        let result = run_with_retry(RetryPolicy::new(3, Duration::from_millis(1)), &sleeper, |n| async move {
            if n < 2 {
                Err(retryable("busy"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0u32;
        let _: Result<(), _> = run_with_retry(RetryPolicy::new(0, Duration::from_secs(1)), &sleeper, |_| {
            calls += 1;
            async { Err(retryable("down")) }
        })
        .await;
        assert_eq!(calls, 1);
    }
}
