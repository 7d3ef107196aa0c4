//! Main Queue (protected segment) for S3-FIFO cache policy
//!
//! Entries land here after proving reuse in the small queue, or directly on a
//! ghost hit. Eviction is CLOCK-like: the head entry gets one more pass
//! through the queue for every unit of frequency it has left.

use crate::arena::{Arena, EntryId};
use crate::metrics::PolicyMetrics;
use crate::queue::Queue;

pub struct MainQueue {
    queue: Queue,
    cost: u64,
    max_cost: u64,
}

impl MainQueue {
    pub fn new(max_cost: u64) -> Self {
        Self {
            queue: Queue::new(),
            cost: 0,
            max_cost,
        }
    }

    /// Accumulated policy cost has reached the budget
    pub fn is_full(&self) -> bool {
        self.cost >= self.max_cost
    }

    pub fn insert<K, V>(&mut self, arena: &Arena<K, V>, id: EntryId, metrics: &PolicyMetrics) {
        self.queue.push(arena, id);
        let entry = &arena[id];
        entry.mark_main();
        self.cost += entry.policy_cost() as u64;
        metrics.main_insert.increment();
        self.publish_cost(metrics);
    }

    /// Examine the head entry once.
    ///
    /// An entry with frequency left is decremented and moved to the tail
    /// without touching the accumulated cost. An entry at frequency zero is
    /// removed and appended to `victims`. Callers drive this in a loop while
    /// [`MainQueue::is_full`] holds; an empty queue is a no-op.
    pub fn evict<K, V>(
        &mut self,
        arena: &Arena<K, V>,
        mut victims: Vec<EntryId>,
        metrics: &PolicyMetrics,
    ) -> Vec<EntryId> {
        let Some(id) = self.queue.pop(arena) else {
            return victims;
        };

        let entry = &arena[id];
        if entry.frequency() > 0 {
            entry.decrement_frequency();
            self.queue.push(arena, id);
            metrics.main_reinsert.increment();
            return victims;
        }

        self.cost = self.cost.saturating_sub(entry.policy_cost() as u64);
        entry.unmark();
        metrics.main_evict.increment();
        self.publish_cost(metrics);
        victims.push(id);
        victims
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

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn clear(&mut self, metrics: &PolicyMetrics) {
        self.queue.clear();
        self.cost = 0;
        self.publish_cost(metrics);
    }

    fn publish_cost(&self, metrics: &PolicyMetrics) {
        metrics.main_cost.set_unsigned(self.cost);
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::entry::Entry;

    fn admit(arena: &mut Arena<&'static str, u32>, key: &'static str, cost: u32) -> EntryId {
        let id = arena.insert(Entry::new(key, 0, 0, cost));
        arena[id].set_policy_cost(cost);
        id
    }

    #[test]
    fn test_insert_and_is_full() {
        let mut arena = Arena::new();
        let metrics = PolicyMetrics::new();
        let mut main = MainQueue::new(3);

        let a = admit(&mut arena, "a", 2);
        main.insert(&arena, a, &metrics);
        assert!(arena[a].is_main());
        assert_eq!(main.cost(), 2);
        assert!(!main.is_full());

        let b = admit(&mut arena, "b", 1);
        main.insert(&arena, b, &metrics);
        assert_eq!(main.cost(), 3);
        assert!(main.is_full());
        assert_eq!(main.length(), 2);
    }

    #[test]
    fn test_second_chance_keeps_cost() {
        let mut arena = Arena::new();
        let metrics = PolicyMetrics::new();
        let mut main = MainQueue::new(10);

        let a = admit(&mut arena, "a", 2);
        let b = admit(&mut arena, "b", 3);
        main.insert(&arena, a, &metrics);
        main.insert(&arena, b, &metrics);
        arena[a].increment_frequency();
        arena[a].increment_frequency();

        let victims = main.evict(&arena, Vec::new(), &metrics);

        assert!(victims.is_empty());
        assert_eq!(arena[a].frequency(), 1, "frequency drops by exactly one");
        assert!(arena[a].is_main());
        assert_eq!(main.cost(), 5);
        assert_eq!(main.length(), 2);
        // "a" now sits behind "b"
        assert_eq!(main.queue().iter(&arena).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(metrics.main_reinsert.value(), 1);
    }

    #[test]
    fn test_evict_cold_head() {
        let mut arena = Arena::new();
        let metrics = PolicyMetrics::new();
        let mut main = MainQueue::new(10);

        let a = admit(&mut arena, "a", 4);
        let b = admit(&mut arena, "b", 1);
        main.insert(&arena, a, &metrics);
        main.insert(&arena, b, &metrics);

        let victims = main.evict(&arena, Vec::new(), &metrics);

        assert_eq!(victims, vec![a]);
        assert!(!arena[a].is_main());
        assert_eq!(main.cost(), 1);
        assert_eq!(main.length(), 1);
    }

    #[test]
    fn test_evict_loop_until_under_budget() {
        let mut arena = Arena::new();
        let metrics = PolicyMetrics::new();
        let mut main = MainQueue::new(2);

        let ids: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|key| admit(&mut arena, key, 1))
            .collect();
        for &id in &ids {
            main.insert(&arena, id, &metrics);
        }
        // "a" is hot and survives one pass
        arena[ids[0]].increment_frequency();

        let mut victims = Vec::new();
        while main.is_full() {
            victims = main.evict(&arena, victims, &metrics);
        }

        assert_eq!(victims, vec![ids[1], ids[2]]);
        assert_eq!(main.length(), 1);
        assert_eq!(arena[ids[0]].frequency(), 0);
    }

    #[test]
    fn test_evict_empty_is_noop() {
        let arena: Arena<&str, u32> = Arena::new();
        let metrics = PolicyMetrics::new();
        let mut main = MainQueue::new(0);

        assert!(main.is_full());
        let victims = main.evict(&arena, Vec::new(), &metrics);
        assert!(victims.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut arena = Arena::new();
        let metrics = PolicyMetrics::new();
        let mut main = MainQueue::new(10);

        let a = admit(&mut arena, "a", 2);
        let b = admit(&mut arena, "b", 3);
        main.insert(&arena, a, &metrics);
        main.insert(&arena, b, &metrics);

        assert_eq!(metrics.main_cost.value(), 5);

        main.remove(&arena, a, &metrics);
        assert!(!arena[a].is_main());
        assert_eq!(main.cost(), 3);
        assert_eq!(main.length(), 1);
        assert_eq!(metrics.main_cost.value(), 3);

        main.clear(&metrics);
        assert_eq!(main.cost(), 0);
        assert_eq!(main.length(), 0);
        assert_eq!(metrics.main_cost.value(), 0);
    }
}
