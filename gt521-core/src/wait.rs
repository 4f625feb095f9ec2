//! Bounded waiting and cancellation
//!
//! Every blocking loop in the protocol engine polls a [`Deadline`] and a
//! [`CancelToken`] between reads, so a wait always ends in success,
//! timeout or cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Point in time after which an empty read ends the wait
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Instant,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            expires: Instant::now() + budget,
            budget,
        }
    }

    /// Deadline that allows a single read window
    pub fn immediate() -> Self {
        Self::after(Duration::ZERO)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Duration {
        self.expires.saturating_duration_since(Instant::now())
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Timeout error describing this deadline
    pub fn timeout(&self) -> Error {
        Error::Timeout {
            waited: self.budget,
        }
    }
}

/// Shared flag asking blocking operations to give up
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Clear the flag so the owner can be reused
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_deadline_is_expired() {
        let deadline = Deadline::immediate();
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_deadline_in_future() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(59));
        assert!(matches!(deadline.timeout(), Error::Timeout { waited } if waited == Duration::from_secs(60)));
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));

        token.reset();
        assert!(!other.is_cancelled());
    }
}
