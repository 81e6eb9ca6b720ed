//! Minimum spacing between sensor reads.

use crate::config::Throttle;
use crate::logging::warn;

/// Rejects reads that come too soon after the last recorded one.
///
/// Timestamps are milliseconds on any monotonic clock the caller chooses.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimiter {
    min_interval_ms: u32,
    throttle: Throttle,
    last_ms: u64,
}

/// A read was attempted before the minimum interval elapsed.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TooFrequent {
    /// Milliseconds left until the next read is allowed.
    pub wait_ms: u64,
}

impl RateLimiter {
    /// Creates a limiter whose first permitted read is `min_interval_ms` after
    /// `created_ms`.
    pub const fn new(min_interval_ms: u32, throttle: Throttle, created_ms: u64) -> Self {
        Self {
            min_interval_ms,
            throttle,
            last_ms: created_ms,
        }
    }

    /// Timestamp the next read is measured against.
    pub fn last_ms(&self) -> u64 {
        self.last_ms
    }

    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    /// Compares `now_ms` against the recorded timestamp without changing it.
    ///
    /// A clock that appears to run backwards counts as no time elapsed.
    pub fn check(&self, now_ms: u64) -> Result<(), TooFrequent> {
        let elapsed = now_ms.saturating_sub(self.last_ms);
        let min = u64::from(self.min_interval_ms);
        if elapsed < min {
            Err(TooFrequent {
                wait_ms: min - elapsed,
            })
        } else {
            Ok(())
        }
    }

    /// Admits or rejects a read attempt at `now_ms`.
    ///
    /// Under [`Throttle::PerAttempt`] an admitted attempt becomes the new reference
    /// point straight away. Under [`Throttle::PerSuccess`] the caller reports
    /// success through [`record`](Self::record).
    pub fn gate(&mut self, now_ms: u64) -> Result<(), TooFrequent> {
        if let Err(e) = self.check(now_ms) {
            warn!(
                "read call frequency too high: now={} last={} wait={}ms",
                now_ms, self.last_ms, e.wait_ms
            );
            return Err(e);
        }
        if self.throttle == Throttle::PerAttempt {
            self.last_ms = now_ms;
        }
        Ok(())
    }

    /// Records a successful read at `now_ms`.
    pub fn record(&mut self, now_ms: u64) {
        self.last_ms = now_ms;
    }
}
