//! Bounded retry with pluggable backoff.
//!
//! The operation yields `Ok(Some(value))`, `Ok(None)` (not ready yet) or an error. By default
//! only `Ok(Some(_))` stops the loop; a custom predicate can widen or narrow that.

use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backoff {
    #[default]
    Fixed,
    Linear,
    Exponential,
}

type ShouldRetry<T, E> = Box<dyn Fn(Result<Option<&T>, &E>) -> bool + Send + Sync>;
type OnRetry = Box<dyn Fn(u32, Duration) + Send + Sync>;

pub struct RetryPolicy<T, E> {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff: Backoff,
    should_retry: Option<ShouldRetry<T, E>>,
    on_retry: Option<OnRetry>,
}

impl<T, E> RetryPolicy<T, E> {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
            backoff: Backoff::Fixed,
            should_retry: None,
            on_retry: None,
        }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Called with the outcome of every attempt; `true` means "try again".
    pub fn should_retry(
        mut self,
        predicate: impl Fn(Result<Option<&T>, &E>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Some(Box::new(predicate));
        self
    }

    /// Observer invoked with the failed attempt number and the delay before the next one.
    pub fn on_retry(mut self, observer: impl Fn(u32, Duration) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Box::new(observer));
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        compute_delay(self.backoff, attempt, self.base_delay, self.max_delay)
    }

    fn wants_retry(&self, outcome: Result<Option<&T>, &E>) -> bool {
        match &self.should_retry {
            Some(predicate) => predicate(outcome),
            None => !matches!(outcome, Ok(Some(_))),
        }
    }
}

/// Delay after the 1-based `attempt`, clamped to `max_delay`.
pub fn compute_delay(backoff: Backoff, attempt: u32, base: Duration, max_delay: Duration) -> Duration {
    let attempt = attempt.max(1);
    let delay = match backoff {
        Backoff::Fixed => base,
        Backoff::Linear => base.saturating_mul(attempt),
        Backoff::Exponential => base.saturating_mul(2u32.saturating_pow(attempt - 1)),
    };
    delay.min(max_delay)
}

/// Runs `operation` at most `policy.attempts()` times.
///
/// Returns the first accepted outcome. When every attempt is rejected, the last attempt decides:
/// its error is returned as-is, an unaccepted value collapses to `Ok(None)`.
pub async fn retry<T, E, F, Fut>(mut operation: F, policy: &RetryPolicy<T, E>) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let mut attempt = 1;
    loop {
        let delay = {
            let outcome = operation().await;
            if !policy.wants_retry(outcome.as_ref().map(Option::as_ref)) {
                return outcome;
            }
            if attempt >= policy.attempts {
                return outcome.map(|_| None);
            }
            policy.delay_for(attempt)
        };
        if let Some(observer) = &policy.on_retry {
            observer(attempt, delay);
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
