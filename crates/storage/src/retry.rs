//! Bounded retry policies.
//!
//! Only two operations retry on their own: resolving a path under optimistic
//! search, and ranged downloads whose length doesn't check out. Everything
//! else fails on the first error.

use crate::error::{ErrorKind, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay after every attempt.
    Fixed(Duration),
    /// `step * attempt`: 1s, 2s, 3s, ...
    Linear(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// A single attempt and no retries.
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    /// Searches that come back empty while the remote is still indexing a
    /// fresh upload: three more tries, one second apart.
    pub const fn optimistic_search() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
        }
    }

    /// Ranged downloads the CDN answered with the wrong length.
    pub const fn range_download() -> Self {
        Self {
            max_attempts: 7,
            backoff: Backoff::Linear(Duration::from_secs(1)),
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after attempt number `attempt` (1-based) fails.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(step) => step.saturating_mul(attempt),
        }
    }
}

/// Waits out the backoff, then refuses to start the next attempt if the
/// token has been cancelled in the meantime.
pub(crate) async fn pause(cancel: &CancellationToken, delay: Duration) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {},
        _ = cancel.cancelled() => {},
    }
    if cancel.is_cancelled() {
        exn::bail!(ErrorKind::Cancelled);
    }
    Ok(())
}
