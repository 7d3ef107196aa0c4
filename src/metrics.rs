use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonically increasing counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Gauge that can increase or decrease
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Set from an unsigned total, saturating at `i64::MAX`
    pub fn set_unsigned(&self, value: u64) {
        self.set(i64::try_from(value).unwrap_or(i64::MAX));
    }

    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-policy metrics for observability and testing
///
/// Each Policy instance owns its metrics so that tests and multiple shards
/// never share state.
#[derive(Debug, Default)]
pub struct PolicyMetrics {
    // Small (admission window)
    pub small_insert: Counter,
    pub small_evict: Counter,
    pub small_promote: Counter,

    // Main (protected segment)
    pub main_insert: Counter,
    pub main_evict: Counter,
    pub main_reinsert: Counter,

    // Ghost history
    pub ghost_insert: Counter,
    pub ghost_hit: Counter,
    pub ghost_evict: Counter,

    // Policy driver
    pub item_expire: Counter,
    pub admit_reject: Counter,
    pub cost_update: Counter,

    // Current state gauges
    pub small_cost: Gauge,
    pub main_cost: Gauge,
    pub entries_live: Gauge,
}

impl PolicyMetrics {
    /// Create a new set of metrics for a policy instance
    pub fn new() -> Self {
        Self::default()
    }
}
