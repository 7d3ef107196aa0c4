mod arena;
mod clock;
mod entry;
mod ghost;
mod mainqueue;
mod queue;
mod smallqueue;
mod spinlock;

pub(crate) mod metrics;
pub(crate) mod sync;


pub use arena::{Arena, EntryId};
pub use clock::{Clock, CoarseClock, ManualClock};
pub use entry::{Entry, MAX_FREQUENCY};
pub use ghost::Ghost;
pub use mainqueue::MainQueue;
pub use metrics::{Counter, Gauge, PolicyMetrics};
pub use queue::Queue;
pub use smallqueue::SmallQueue;
pub use spinlock::{SpinGuard, SpinLock, SpinMutex};

use std::sync::Arc;
use tracing::{debug, trace};

const DEFAULT_MAX_COST: u64 = 64 * 1024;
const DEFAULT_SMALL_PERCENT: u8 = 10;

/// Upper bound on the default ghost history, in records
const MAX_DEFAULT_GHOST_CAPACITY: usize = 1 << 20;

/// Error type for policy construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The total budget must be positive
    #[error("max cost must be greater than zero")]
    ZeroMaxCost,
    /// The small queue share is outside 1..=90 percent
    #[error("small queue percent must be within 1..=90, got {0}")]
    InvalidSmallPercent(u8),
    /// The budget is too small to leave any room for the main queue
    #[error("max cost {0} leaves no room for the main queue")]
    BudgetTooSmall(u64),
}

/// Outcome of [`Policy::add`]
#[derive(Debug)]
pub struct Admission<K, V> {
    /// Handle of the admitted entry, `None` if it was rejected
    pub id: Option<EntryId>,
    /// Entries that left the policy to make room, plus the new entry itself
    /// when it was rejected
    pub evicted: Vec<Arc<Entry<K, V>>>,
}

/// S3-FIFO admission and eviction policy
///
/// Owns the entry arena and the three queues. Every method that takes
/// `&mut self` is a policy mutation and must be serialized by the owner,
/// typically by keeping the policy inside a [`SpinMutex`]. Values can be
/// read concurrently through the `Arc<Entry>` handles without that lock.
pub struct Policy<K, V, C = CoarseClock> {
    arena: Arena<K, V>,
    small: SmallQueue,
    main: MainQueue,
    ghost: Ghost,
    clock: C,
    metrics: PolicyMetrics,
    max_cost: u64,
}

/// Builder for constructing a Policy with custom configuration
pub struct PolicyBuilder<C = CoarseClock> {
    max_cost: u64,
    small_percent: u8,
    ghost_capacity: Option<usize>,
    clock: C,
}

impl PolicyBuilder<CoarseClock> {
    /// Create a new PolicyBuilder with default settings
    pub fn new() -> Self {
        Self {
            max_cost: DEFAULT_MAX_COST,
            small_percent: DEFAULT_SMALL_PERCENT,
            ghost_capacity: None,
            clock: CoarseClock::new(),
        }
    }
}

impl Default for PolicyBuilder<CoarseClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> PolicyBuilder<C> {
    /// Set the total cost budget shared by the small and main queues
    ///
    /// Default is 65536.
    pub fn max_cost(mut self, max_cost: u64) -> Self {
        self.max_cost = max_cost;
        self
    }

    /// Set the share of the budget given to the small queue, in percent
    ///
    /// Default is 10. Must be within 1..=90.
    pub fn small_percent(mut self, percent: u8) -> Self {
        self.small_percent = percent;
        self
    }

    /// Set the number of hashes the ghost queue remembers
    ///
    /// Defaults to the main queue budget, assuming unit costs, capped at
    /// 2^20 records. Zero disables the ghost queue.
    pub fn ghost_capacity(mut self, capacity: usize) -> Self {
        self.ghost_capacity = Some(capacity);
        self
    }

    /// Use a different time source for expiration checks
    pub fn clock<T: Clock>(self, clock: T) -> PolicyBuilder<T> {
        PolicyBuilder {
            max_cost: self.max_cost,
            small_percent: self.small_percent,
            ghost_capacity: self.ghost_capacity,
            clock,
        }
    }

    /// Build the Policy with the configured settings
    pub fn build<K, V>(self) -> Result<Policy<K, V, C>, BuildError> {
        if self.max_cost == 0 {
            return Err(BuildError::ZeroMaxCost);
        }
        if !(1..=90).contains(&self.small_percent) {
            return Err(BuildError::InvalidSmallPercent(self.small_percent));
        }

        // Split without overflowing for budgets close to u64::MAX
        let percent = self.small_percent as u64;
        let small_max = ((self.max_cost / 100) * percent + (self.max_cost % 100) * percent / 100).max(1);
        let main_max = self.max_cost - small_max;
        if main_max == 0 {
            return Err(BuildError::BudgetTooSmall(self.max_cost));
        }

        let ghost_capacity = self.ghost_capacity.unwrap_or_else(|| {
            usize::try_from(main_max)
                .unwrap_or(usize::MAX)
                .min(MAX_DEFAULT_GHOST_CAPACITY)
        });

        debug!(
            max_cost = self.max_cost,
            small_max,
            main_max,
            ghost_capacity,
            "building s3-fifo policy"
        );

        Ok(Policy {
            arena: Arena::new(),
            small: SmallQueue::new(small_max),
            main: MainQueue::new(main_max),
            ghost: Ghost::new(ghost_capacity),
            clock: self.clock,
            metrics: PolicyMetrics::new(),
            max_cost: self.max_cost,
        })
    }
}

impl<K, V> Policy<K, V> {
    /// Create a new Policy with default settings and the given budget
    ///
    /// For custom configuration, use PolicyBuilder:
    /// ```
    /// use s3fifo_policy::{ManualClock, Policy, PolicyBuilder};
    ///
    /// let policy: Policy<u64, u64, ManualClock> = PolicyBuilder::new()
    ///     .max_cost(1000)
    ///     .small_percent(20)
    ///     .ghost_capacity(500)
    ///     .clock(ManualClock::new(0))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(policy.small().max_cost(), 200);
    /// ```
    pub fn new(max_cost: u64) -> Result<Self, BuildError> {
        PolicyBuilder::new().max_cost(max_cost).build()
    }
}

impl<K, V, C: Clock> Policy<K, V, C> {
    /// Admit a new entry.
    ///
    /// The entry's current cost becomes its policy cost. Entries costing more
    /// than the main queue budget could never be protected and are rejected,
    /// handed straight back in `evicted`. Otherwise queues are evicted until the entry fits, then it
    /// is placed in the main queue if the ghost queue remembers its hash, or
    /// in the small queue if not.
    ///
    /// Set the entry's hash before adding it; ghost tracking keys on it.
    pub fn add(&mut self, entry: Entry<K, V>) -> Admission<K, V> {
        let cost = entry.cost();
        if cost as u64 > self.main.max_cost() {
            debug!(cost, main_max_cost = self.main.max_cost(), "rejecting entry larger than the main budget");
            self.metrics.admit_reject.increment();
            return Admission {
                id: None,
                evicted: vec![Arc::new(entry)],
            };
        }

        entry.set_policy_cost(cost);

        let mut victims = Vec::new();
        while self.cost() + cost as u64 > self.max_cost && self.has_evictable() {
            victims = self.evict(victims);
        }

        let hash = entry.hash();
        let id = self.arena.insert(entry);
        self.metrics.entries_live.increment();

        if self.ghost.remove(hash) {
            trace!(id = id.index(), hash, "ghost hit, admitting to main queue");
            self.metrics.ghost_hit.increment();
            self.main.insert(&self.arena, id, &self.metrics);
        } else {
            self.small.insert(&self.arena, id, &self.metrics);
        }

        Admission {
            id: Some(id),
            evicted: self.release(victims),
        }
    }

    /// Record reads of live entries
    pub fn read(&mut self, ids: &[EntryId]) {
        for &id in ids {
            if let Some(entry) = self.arena.get(id) {
                entry.increment_frequency();
            }
        }
    }

    /// Remove an entry out of band (explicit delete or overwrite)
    pub fn delete(&mut self, id: EntryId) -> Option<Arc<Entry<K, V>>> {
        let entry = self.arena.get(id)?;
        let (small, main) = (entry.is_small(), entry.is_main());

        if small {
            self.small.remove(&self.arena, id, &self.metrics);
        } else if main {
            self.main.remove(&self.arena, id, &self.metrics);
        }

        let entry = self.arena.release(id)?;
        self.metrics.entries_live.decrement();
        Some(entry)
    }

    /// Change an entry's cost and account for the difference.
    ///
    /// The entry stays where it is in its queue. Returns entries evicted to
    /// get back under budget, which may include this entry. An entry that
    /// grows past the main queue budget is removed, as it would have been
    /// rejected on admission.
    pub fn update_cost(&mut self, id: EntryId, cost: u32) -> Vec<Arc<Entry<K, V>>> {
        let Some(entry) = self.arena.get(id) else {
            return Vec::new();
        };
        entry.set_cost(cost);

        if cost as u64 > self.main.max_cost() {
            debug!(id = id.index(), cost, "evicting entry grown past the main budget");
            self.metrics.admit_reject.increment();
            return self.delete(id).into_iter().collect();
        }

        let diff = cost as i64 - entry.policy_cost() as i64;
        if diff != 0 {
            entry.add_policy_cost_diff(diff);
            if entry.is_small() {
                self.small.adjust_cost(diff, &self.metrics);
            } else if entry.is_main() {
                self.main.adjust_cost(diff, &self.metrics);
            }
            self.metrics.cost_update.increment();
        }

        let mut victims = Vec::new();
        while self.cost() > self.max_cost && self.has_evictable() {
            victims = self.evict(victims);
        }
        self.release(victims)
    }

    /// Drop every entry and forget the ghost history
    pub fn clear(&mut self) -> Vec<Arc<Entry<K, V>>> {
        for (_, entry) in self.arena.iter() {
            entry.unmark();
        }

        self.small.clear(&self.metrics);
        self.main.clear(&self.metrics);
        self.ghost.clear();
        self.metrics.entries_live.set(0);
        self.arena.drain()
    }

    pub fn get(&self, id: EntryId) -> Option<&Arc<Entry<K, V>>> {
        self.arena.get(id)
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Accumulated policy cost of the small and main queues
    pub fn cost(&self) -> u64 {
        self.small.cost() + self.main.cost()
    }

    pub fn max_cost(&self) -> u64 {
        self.max_cost
    }

    pub fn small(&self) -> &SmallQueue {
        &self.small
    }

    pub fn main(&self) -> &MainQueue {
        &self.main
    }

    pub fn ghost(&self) -> &Ghost {
        &self.ghost
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn metrics(&self) -> &PolicyMetrics {
        &self.metrics
    }

    fn has_evictable(&self) -> bool {
        self.small.cost() > 0 || self.main.length() > 0
    }

    /// One eviction step: the small queue while it is over its share (or
    /// the only one holding cost), the main queue otherwise
    fn evict(&mut self, victims: Vec<EntryId>) -> Vec<EntryId> {
        let small_cost = self.small.cost();
        if small_cost > 0 && (small_cost >= self.small.max_cost() || self.main.length() == 0) {
            self.small.evict(
                &self.arena,
                &mut self.main,
                &mut self.ghost,
                &self.clock,
                victims,
                &self.metrics,
            )
        } else {
            self.main.evict(&self.arena, victims, &self.metrics)
        }
    }

    fn release(&mut self, victims: Vec<EntryId>) -> Vec<Arc<Entry<K, V>>> {
        let mut evicted = Vec::with_capacity(victims.len());
        for id in victims {
            if let Some(entry) = self.arena.release(id) {
                self.metrics.entries_live.decrement();
                evicted.push(entry);
            }
        }
        evicted
    }
}
