//! Small Queue (Admission Queue) for S3-FIFO cache policy
//!
//! The small queue acts as an admission filter to prevent one-hit-wonders from
//! polluting the main queue. New entries are inserted here first and must be
//! read again to be promoted.
//!
//! # Design
//!
//! - FIFO eviction order over a cost budget
//! - On eviction: expired entries are dropped, entries with frequency > 1 are
//!   promoted to the main queue, everything else is remembered by the ghost
//!   queue and dropped
//! - Promotion may cascade into main queue evictions

use crate::arena::{Arena, EntryId};
use crate::clock::Clock;
use crate::ghost::Ghost;
use crate::mainqueue::MainQueue;
use crate::metrics::PolicyMetrics;
use crate::queue::Queue;
use tracing::trace;

pub struct SmallQueue {
    queue: Queue,
    cost: u64,
    max_cost: u64,
}

impl SmallQueue {
    pub fn new(max_cost: u64) -> Self {
        Self {
            queue: Queue::new(),
            cost: 0,
            max_cost,
        }
    }

    /// Append a new entry. Never evicts; the caller decides when to.
    pub fn insert<K, V>(&mut self, arena: &Arena<K, V>, id: EntryId, metrics: &PolicyMetrics) {
        self.queue.push(arena, id);
        let entry = &arena[id];
        entry.mark_small();
        self.cost += entry.policy_cost() as u64;
        metrics.small_insert.increment();
        self.publish_cost(metrics);
    }

    /// Evict the head entry.
    ///
    /// Returns `victims` with every entry that left the policy appended:
    /// the head itself if it expired or was ghosted, or whatever the main
    /// queue displaced to make room for a promotion.
    ///
    /// No-op while the accumulated cost is zero.
    pub fn evict<K, V, C: Clock + ?Sized>(
        &mut self,
        arena: &Arena<K, V>,
        main: &mut MainQueue,
        ghost: &mut Ghost,
        clock: &C,
        mut victims: Vec<EntryId>,
        metrics: &PolicyMetrics,
    ) -> Vec<EntryId> {
        if self.cost == 0 {
            return victims;
        }

        let Some(id) = self.queue.pop(arena) else {
            return victims;
        };

        let entry = &arena[id];
        self.cost = self.cost.saturating_sub(entry.policy_cost() as u64);
        entry.unmark();
        metrics.small_evict.increment();
        self.publish_cost(metrics);

        if entry.is_expired(clock) {
            trace!(id = id.index(), "dropping expired entry from small queue");
            metrics.item_expire.increment();
            victims.push(id);
            return victims;
        }

        if entry.frequency() > 1 {
            trace!(id = id.index(), freq = entry.frequency(), "promoting entry to main queue");
            metrics.small_promote.increment();
            main.insert(arena, id, metrics);
            while main.is_full() && main.length() > 0 {
                victims = main.evict(arena, victims, metrics);
            }
            entry.reset_frequency();
            return victims;
        }

        trace!(id = id.index(), "demoting entry to ghost queue");
        ghost.insert(arena, victims, id, metrics)
    }

    /// Out-of-band removal (delete or overwrite)
    pub fn remove<K, V>(&mut self, arena: &Arena<K, V>, id: EntryId, metrics: &PolicyMetrics) {
        let entry = &arena[id];
        self.cost = self.cost.saturating_sub(entry.policy_cost() as u64);
        entry.unmark();
        self.queue.remove(arena, id);
        self.publish_cost(metrics);
    }

    /// Apply a member's policy cost change to the accumulated cost
    pub(crate) fn adjust_cost(&mut self, diff: i64, metrics: &PolicyMetrics) {
        self.cost = self.cost.saturating_add_signed(diff);
        self.publish_cost(metrics);
    }

    pub fn length(&self) -> usize {
        self.queue.len()
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn max_cost(&self) -> u64 {
        self.max_cost
    }

    pub fn clear(&mut self, metrics: &PolicyMetrics) {
        self.queue.clear();
        self.cost = 0;
        self.publish_cost(metrics);
    }

    fn publish_cost(&self, metrics: &PolicyMetrics) {
        metrics.small_cost.set_unsigned(self.cost);
    }
}
