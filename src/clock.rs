//! Time sources for entry expiration.
//!
//! Expiration is tracked in coarse seconds stored as `u32`. An expiration of
//! zero means the entry never expires.

use clocksource::coarse::UnixInstant;
use std::sync::atomic::{AtomicU32, Ordering};

/// Supplies the current tick used by [`Entry::is_expired`](crate::Entry::is_expired).
pub trait Clock: Send + Sync {
    /// Current time in coarse seconds
    fn now(&self) -> u32;
}

/// Wall clock backed by the coarse unix time from `clocksource`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoarseClock;

impl CoarseClock {
    pub fn new() -> Self {
        Self
    }

    /// Expiration tick for an entry that should live for `ttl`
    ///
    /// Saturates instead of wrapping for very long TTLs.
    pub fn expire_at(&self, ttl: std::time::Duration) -> u32 {
        let ttl_secs = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX);
        self.now().saturating_add(ttl_secs)
    }
}

impl Clock for CoarseClock {
    fn now(&self) -> u32 {
        UnixInstant::now().duration_since(UnixInstant::EPOCH).as_secs()
    }
}

/// A clock that only moves when told to.
///
/// Useful for driving expiration deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    pub fn new(now: u32) -> Self {
        Self {
            now: AtomicU32::new(now),
        }
    }

    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, secs: u32) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> u32 {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u32 {
        (**self).now()
    }
}
