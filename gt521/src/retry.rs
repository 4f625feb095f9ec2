//! Bounded retry with delay
//!
//! One combinator for every "try, sleep, try again" loop: link bring-up,
//! finger polling and each enrollment step.

use std::thread;
use std::time::{Duration, Instant};

use gt521_core::CancelToken;
use gt521_core::constants::{DEFAULT_RETRY_DELAY, DEFAULT_TRY_COUNT};
use tracing::trace;

use crate::error::{Error, Result};

/// Longest uninterrupted sleep while waiting on a delay
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Why a retry loop ended without an accepted value
#[derive(Debug)]
pub enum RetryError<T> {
    /// Every attempt ran and none was accepted
    Exhausted { attempts: usize, last: T },
    /// The cancellation token was set between attempts
    Cancelled,
}

/// Result of retrying an ack-only command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Acked on attempt number `attempts`
    Acked { attempts: usize },
    /// Never acked
    Exhausted { attempts: usize },
}

impl AckOutcome {
    pub fn is_acked(self) -> bool {
        matches!(self, Self::Acked { .. })
    }
}

/// Retry policy: at most `attempts` tries, `delay` apart
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gt521::Retry;
///
/// let retry = Retry::new(3, Duration::ZERO);
/// let value = retry.run(|attempt| attempt * 10, |v| *v >= 20).unwrap();
/// assert_eq!(value, 20);
/// ```
#[derive(Debug, Clone)]
pub struct Retry {
    attempts: usize,
    delay: Duration,
    cancel: CancelToken,
}

impl Retry {
    /// Policy with `attempts` tries (at least one) and `delay` between them
    pub fn new(attempts: usize, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            cancel: CancelToken::new(),
        }
    }

    /// Stop between attempts once `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Call `op` until `accept` returns true for its value
    ///
    /// `op` receives the 1-based attempt number. The delay is slept between
    /// attempts, never after the last one.
    pub fn run<T>(
        &self,
        mut op: impl FnMut(usize) -> T,
        mut accept: impl FnMut(&T) -> bool,
    ) -> std::result::Result<T, RetryError<T>> {
        let mut attempt = 1;

        loop {
            let value = op(attempt);
            if accept(&value) {
                return Ok(value);
            }

            if attempt >= self.attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: value,
                });
            }

            trace!(attempt, max = self.attempts, "Retrying after {:?}", self.delay);
            if pause(self.delay, &self.cancel).is_err() {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;
        }
    }

    /// Retry an ack-only call until it acks
    ///
    /// Nacks and recoverable errors use up attempts; any other error is
    /// returned immediately.
    pub fn until_ack(&self, mut op: impl FnMut() -> Result<bool>) -> Result<AckOutcome> {
        let mut used = 0;
        let outcome = self.run(
            |attempt| {
                used = attempt;
                op()
            },
            |result| match result {
                Ok(ack) => *ack,
                Err(e) => !e.is_recoverable(),
            },
        );

        match outcome {
            Ok(Ok(_)) => Ok(AckOutcome::Acked { attempts: used }),
            Ok(Err(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, .. }) => Ok(AckOutcome::Exhausted { attempts }),
            Err(RetryError::Cancelled) => Err(gt521_core::Error::Cancelled.into()),
        }
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self::new(DEFAULT_TRY_COUNT, DEFAULT_RETRY_DELAY)
    }
}

/// Sleep for `delay`, waking early with `Cancelled` if `cancel` is set
pub(crate) fn pause(delay: Duration, cancel: &CancelToken) -> Result<()> {
    let until = Instant::now() + delay;

    loop {
        cancel.check().map_err(Error::from)?;

        let left = until.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Ok(());
        }
        thread::sleep(left.min(PAUSE_SLICE));
    }
}
