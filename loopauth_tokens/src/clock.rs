//! Clocks used to judge token freshness
//!
//! Time types come from [`aliri_clock`]. [`ManualClock`] is a clock whose
//! clones share one reading, so a test can advance the time seen by a client
//! it has already handed a copy to.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

pub use aliri_clock::{Clock, DurationSecs, System, UnixTime};

/// A clock whose time is moved by hand
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    /// Creates a new clock reading `time`
    pub fn new(time: UnixTime) -> Self {
        Self(Arc::new(AtomicU64::new(time.0)))
    }

    /// Moves the clock forward by `secs`
    pub fn advance(&self, secs: DurationSecs) {
        self.0.fetch_add(secs.0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}
