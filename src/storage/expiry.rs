//! Active expiry scheduling.
//!
//! Lazy expiry (checking on access) never reclaims a key that is not touched
//! again, so the event loop also runs [`StorageEngine::sweep_expired`] on a
//! timer. There is no background thread: the loop asks the schedule how long
//! it may block in the poller, and runs a sweep whenever the schedule is due.
//!
//! Sweeps run at most once per configured interval. Each sweep is already
//! bounded by the engine, so a heavy expiry load is absorbed by the sweep's
//! extra rounds rather than by running it more often.
//!
//! [`StorageEngine::sweep_expired`]: crate::storage::StorageEngine::sweep_expired

use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Tracks when the next active-expiry sweep is due.
#[derive(Debug, Clone)]
pub struct ExpirySchedule {
    interval: Duration,
    next_due: Instant,
}

impl ExpirySchedule {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now + interval,
        }
    }

    /// Interval between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// How long the caller may block before the next sweep.
    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Records a finished sweep and schedules the next one a full interval
    /// after `now`.
    pub fn record_sweep(&mut self, now: Instant, expired: u64) {
        if expired > 0 {
            debug!(expired, "Active expiry removed keys");
        } else {
            trace!("Active expiry found nothing");
        }
        self.next_due = now + self.interval;
    }
}
