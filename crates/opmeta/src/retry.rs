use backon::{BlockingRetryable, ConstantBuilder};
use diagnostics::*;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt::Display;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: usize = 20;

/// Bounded retry: up to `max_attempts` calls, `delay_ms` apart.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay_ms: u64,
}

/// The last failure once every attempt has been used.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: usize,
    pub last: E,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    fn backoff(&self) -> ConstantBuilder {
        // backon counts retries, not attempts.
        ConstantBuilder::default()
            .with_delay(self.delay())
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    /// Call `op` until it succeeds or the attempts run out.
    ///
    /// A policy with `max_attempts == 0` still makes one call.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Display,
    {
        let attempts = Cell::new(0usize);
        let max_attempts = self.max_attempts.max(1);

        let result = (|| {
            attempts.set(attempts.get() + 1);
            op()
        })
        .retry(self.backoff())
        .sleep(std::thread::sleep)
        .notify(|failure: &E, delay: Duration| {
            let attempt = attempts.get();
            let cause = failure.to_string();
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            warn!(
                "{what} failed ({attempt}/{max_attempts}): {cause}; retrying in {delay_ms}ms",
                what: what,
                attempt: attempt,
                max_attempts: max_attempts,
                cause: cause,
                delay_ms: delay_ms
            );
        })
        .call();

        result.map_err(|last| Exhausted {
            attempts: attempts.get(),
            last,
        })
    }
}
