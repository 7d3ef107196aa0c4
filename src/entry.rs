//! Cache entry with a seqlock-protected value and S3-FIFO policy metadata.
//!
//! # Value access
//!
//! The value lives in an `UnsafeCell` guarded by a sequence counter. An even
//! counter means no writer is active, an odd counter means a writer is inside
//! its critical section. Readers copy the value optimistically and retry if
//! the counter was odd or changed while they were copying, so a returned
//! value is never a mix of two writes.
//!
//! The copy itself races with a concurrent writer. That race is benign: the
//! copied bytes are discarded unless the counter proves they were stable, and
//! `V: Copy` guarantees a discarded copy owns nothing that needs dropping.
//!
//! # Policy metadata
//!
//! Linkage, frequency, queue marker and policy cost are relaxed atomics. They
//! are only mutated by the single policy writer (see [`Policy`](crate::Policy)),
//! the atomics simply make it sound to share the entry with readers.

use crate::clock::Clock;
use crate::sync::*;
use std::cell::UnsafeCell;
use std::ptr;

/// Null link in the intrusive queue
pub(crate) const NULL: u32 = u32::MAX;

/// Frequency counters saturate here
pub const MAX_FREQUENCY: u8 = 3;

// Queue marker values
const QUEUE_NONE: u8 = 0;
const QUEUE_SMALL: u8 = 1;
const QUEUE_MAIN: u8 = 2;

pub struct Entry<K, V> {
    key: K,
    value: UnsafeCell<V>,

    // Sequence counter: odd while a writer holds the value lock
    seq: AtomicU32,

    // Intrusive queue links, arena handles or NULL
    prev: AtomicU32,
    next: AtomicU32,

    hash: AtomicU64,
    expiration: u32,
    cost: AtomicU32,
    policy_cost: AtomicU32,
    frequency: AtomicU8,
    queue: AtomicU8,
}

// SAFETY: the value is only written under the seqlock and readers only
// return copies validated by the sequence counter. All other shared fields
// are atomics.
unsafe impl<K: Send, V: Send> Send for Entry<K, V> {}
unsafe impl<K: Sync, V: Send + Copy> Sync for Entry<K, V> {}

impl<K, V> Entry<K, V> {
    /// Create an entry that is not yet tracked by any segment.
    ///
    /// `expiration` is an absolute tick in the units of the policy's clock,
    /// zero meaning the entry never expires. Policy fields start at zero.
    pub fn new(key: K, value: V, expiration: u32, cost: u32) -> Self {
        Self {
            key,
            value: UnsafeCell::new(value),
            seq: AtomicU32::new(0),
            prev: AtomicU32::new(NULL),
            next: AtomicU32::new(NULL),
            hash: AtomicU64::new(0),
            expiration,
            cost: AtomicU32::new(cost),
            policy_cost: AtomicU32::new(0),
            frequency: AtomicU8::new(0),
            queue: AtomicU8::new(QUEUE_NONE),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Acquire exclusive write access to the value.
    ///
    /// Moves the sequence counter from an even `n` to `n + 1`, yielding while
    /// another writer holds it or when the CAS loses a race. Not reentrant:
    /// locking twice without an `unlock` deadlocks.
    pub fn lock(&self) {
        loop {
            let seq = self.seq.load(Ordering::Relaxed);
            if seq & 1 == 1 {
                yield_now();
                continue;
            }

            if self
                .seq
                .compare_exchange_weak(seq, seq.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                // Publish the odd counter before any write to the value
                fence(Ordering::Release);
                return;
            }

            yield_now();
        }
    }

    /// Release write access, restoring even parity.
    ///
    /// May be called from a different thread than the one that locked.
    pub fn unlock(&self) {
        self.seq.fetch_add(1, Ordering::Release);
    }

    /// Overwrite the value.
    ///
    /// # Safety
    /// The caller must hold the write lock (see [`Entry::lock`]). Writing
    /// without it races with other writers and lets readers observe a torn
    /// value as consistent.
    pub unsafe fn set_value(&self, value: V) {
        let slot = self.value.get();
        // SAFETY: exclusive writer per the caller contract. Readers may copy
        // concurrently but discard the copy because the counter is odd. The
        // old value is moved out before the write and dropped after it.
        let old = unsafe { ptr::read(slot) };
        unsafe { ptr::write_volatile(slot, value) };
        drop(old);
    }

    pub fn hash(&self) -> u64 {
        self.hash.load(Ordering::Relaxed)
    }

    pub fn set_hash(&self, hash: u64) {
        self.hash.store(hash, Ordering::Relaxed);
    }

    pub fn expiration(&self) -> u32 {
        self.expiration
    }

    /// An entry is expired once the clock has moved past its expiration tick
    pub fn is_expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        self.expiration > 0 && self.expiration < clock.now()
    }

    pub fn cost(&self) -> u32 {
        self.cost.load(Ordering::Relaxed)
    }

    /// Update the external cost. The policy's accounted cost is untouched.
    pub fn set_cost(&self, cost: u32) {
        self.cost.store(cost, Ordering::Relaxed);
    }

    pub fn policy_cost(&self) -> u32 {
        self.policy_cost.load(Ordering::Relaxed)
    }

    /// Adjust the accounted cost by a signed difference, clamped to `u32`.
    pub fn add_policy_cost_diff(&self, diff: i64) {
        let current = self.policy_cost() as i64;
        let updated = (current + diff).clamp(0, u32::MAX as i64) as u32;
        self.policy_cost.store(updated, Ordering::Relaxed);
    }

    pub fn frequency(&self) -> u8 {
        self.frequency.load(Ordering::Relaxed)
    }

    pub fn increment_frequency(&self) {
        let freq = self.frequency();
        self.frequency
            .store((freq + 1).min(MAX_FREQUENCY), Ordering::Relaxed);
    }

    /// Decrement the frequency. Must only be called when it is positive.
    pub fn decrement_frequency(&self) {
        let freq = self.frequency();
        debug_assert!(freq > 0, "frequency underflow");
        self.frequency.store(freq.wrapping_sub(1), Ordering::Relaxed);
    }

    pub fn reset_frequency(&self) {
        self.frequency.store(0, Ordering::Relaxed);
    }

    pub fn mark_small(&self) {
        self.queue.store(QUEUE_SMALL, Ordering::Relaxed);
    }

    pub fn is_small(&self) -> bool {
        self.queue.load(Ordering::Relaxed) == QUEUE_SMALL
    }

    pub fn mark_main(&self) {
        self.queue.store(QUEUE_MAIN, Ordering::Relaxed);
    }

    pub fn is_main(&self) -> bool {
        self.queue.load(Ordering::Relaxed) == QUEUE_MAIN
    }

    pub fn unmark(&self) {
        self.queue.store(QUEUE_NONE, Ordering::Relaxed);
    }

    pub(crate) fn set_policy_cost(&self, cost: u32) {
        self.policy_cost.store(cost, Ordering::Relaxed);
    }

    pub(crate) fn prev(&self) -> u32 {
        self.prev.load(Ordering::Relaxed)
    }

    pub(crate) fn set_prev(&self, prev: u32) {
        self.prev.store(prev, Ordering::Relaxed);
    }

    pub(crate) fn next(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    pub(crate) fn set_next(&self, next: u32) {
        self.next.store(next, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn sequence(&self) -> u32 {
        self.seq.load(Ordering::Relaxed)
    }
}

impl<K, V: Copy> Entry<K, V> {
    /// Read a consistent copy of the value.
    ///
    /// Never blocks. Spins, yielding between attempts, while a writer holds
    /// the lock or until a copy is taken with the counter even and unchanged.
    pub fn value(&self) -> V {
        loop {
            let seq = self.seq.load(Ordering::Acquire);
            if seq & 1 == 1 {
                yield_now();
                continue;
            }

            // SAFETY: may race with a writer. The copy is only returned when
            // the counter check below proves no write overlapped it.
            let value = unsafe { ptr::read_volatile(self.value.get()) };

            // Order the copy before the validating load
            fence(Ordering::Acquire);

            if self.seq.load(Ordering::Relaxed) == seq {
                return value;
            }

            yield_now();
        }
    }

    /// Replace the value under the write lock.
    pub fn store(&self, value: V) {
        self.lock();
        // SAFETY: we hold the write lock
        unsafe { self.set_value(value) };
        self.unlock();
    }
}

impl<K: std::fmt::Debug, V> std::fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("hash", &self.hash())
            .field("expiration", &self.expiration)
            .field("cost", &self.cost())
            .field("policy_cost", &self.policy_cost())
            .field("frequency", &self.frequency())
            .field("queue", &self.queue.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_entry_defaults() {
        let entry = Entry::new("key", 7u64, 0, 3);

        assert_eq!(*entry.key(), "key");
        assert_eq!(entry.value(), 7);
        assert_eq!(entry.cost(), 3);
        assert_eq!(entry.policy_cost(), 0);
        assert_eq!(entry.frequency(), 0);
        assert_eq!(entry.hash(), 0);
        assert!(!entry.is_small());
        assert!(!entry.is_main());
        assert_eq!(entry.prev(), NULL);
        assert_eq!(entry.next(), NULL);
    }

    #[test]
    fn test_frequency_saturates() {
        let entry = Entry::new(1u32, 0u8, 0, 1);

        for _ in 0..10 {
            entry.increment_frequency();
            assert!(entry.frequency() <= MAX_FREQUENCY);
        }
        assert_eq!(entry.frequency(), MAX_FREQUENCY);

        entry.decrement_frequency();
        assert_eq!(entry.frequency(), 2);

        entry.reset_frequency();
        assert_eq!(entry.frequency(), 0);
    }

    #[test]
    fn test_queue_marker() {
        let entry = Entry::new(1u32, 0u8, 0, 1);

        entry.mark_small();
        assert!(entry.is_small());
        assert!(!entry.is_main());

        entry.mark_main();
        assert!(entry.is_main());
        assert!(!entry.is_small());

        entry.unmark();
        assert!(!entry.is_small());
        assert!(!entry.is_main());
    }

    #[test]
    fn test_expiration() {
        let clock = ManualClock::new(100);

        let never = Entry::new(1u32, 0u8, 0, 1);
        assert!(!never.is_expired(&clock));

        let entry = Entry::new(2u32, 0u8, 150, 1);
        assert!(!entry.is_expired(&clock));

        // Expiration is strict: the tick itself is still live
        clock.set(150);
        assert!(!entry.is_expired(&clock));

        clock.set(151);
        assert!(entry.is_expired(&clock));
        assert!(!never.is_expired(&clock));
    }

    #[test]
    fn test_policy_cost_is_independent_of_cost() {
        let entry = Entry::new(1u32, 0u8, 0, 4);
        entry.set_policy_cost(4);

        entry.set_cost(10);
        assert_eq!(entry.cost(), 10);
        assert_eq!(entry.policy_cost(), 4, "set_cost must not move the policy cost");

        entry.add_policy_cost_diff(6);
        assert_eq!(entry.policy_cost(), 10);

        entry.add_policy_cost_diff(-3);
        assert_eq!(entry.policy_cost(), 7);

        // Clamped at zero rather than wrapping
        entry.add_policy_cost_diff(-100);
        assert_eq!(entry.policy_cost(), 0);
    }

    #[test]
    fn test_lock_parity() {
        let entry = Entry::new(1u32, 0u64, 0, 1);
        assert_eq!(entry.sequence(), 0);

        entry.lock();
        assert_eq!(entry.sequence() & 1, 1);
        unsafe { entry.set_value(99) };
        entry.unlock();

        assert_eq!(entry.sequence(), 2);
        assert_eq!(entry.value(), 99);

        entry.store(100);
        assert_eq!(entry.sequence(), 4);
        assert_eq!(entry.value(), 100);
    }

    #[test]
    fn test_reader_waits_for_writer() {
        let entry = Arc::new(Entry::new(1u32, [0u64; 4], 0, 1));

        // Hold the lock so the reader has to spin
        entry.lock();
        unsafe { entry.set_value([5; 4]) };

        let reader = {
            let entry = Arc::clone(&entry);
            thread::spawn(move || entry.value())
        };

        thread::sleep(std::time::Duration::from_millis(10));
        entry.unlock();

        assert_eq!(reader.join().unwrap(), [5; 4]);
    }

    #[test]
    fn test_unlock_from_another_thread() {
        let entry = Arc::new(Entry::new(1u32, 0u32, 0, 1));
        entry.lock();
        unsafe { entry.set_value(8) };

        let remote = Arc::clone(&entry);
        thread::spawn(move || remote.unlock()).join().unwrap();

        assert_eq!(entry.value(), 8);
        entry.store(9);
        assert_eq!(entry.value(), 9);
    }

    #[test]
    fn test_set_value_drops_previous_value() {
        let first = Arc::new("first");
        let second = Arc::new("second");
        let entry = Entry::new(1u32, Arc::clone(&first), 0, 1);
        assert_eq!(Arc::strong_count(&first), 2);

        entry.lock();
        unsafe { entry.set_value(Arc::clone(&second)) };
        entry.unlock();

        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(Arc::strong_count(&second), 2);

        drop(entry);
        assert_eq!(Arc::strong_count(&second), 1);
    }

    proptest! {
        /// Frequency follows a saturating counter model for any sequence of
        /// increments, decrements and resets.
        #[test]
        fn prop_frequency_tracks_saturating_model(ops in prop::collection::vec(0u8..3, 0..64)) {
            let entry = Entry::new(1u32, 0u8, 0, 1);
            let mut model = 0u8;

            for op in ops {
                match op {
                    0 => {
                        entry.increment_frequency();
                        model = (model + 1).min(MAX_FREQUENCY);
                    }
                    1 if model > 0 => {
                        entry.decrement_frequency();
                        model -= 1;
                    }
                    _ => {
                        entry.reset_frequency();
                        model = 0;
                    }
                }
                prop_assert!(entry.frequency() <= MAX_FREQUENCY);
                prop_assert_eq!(entry.frequency(), model);
            }
        }
    }
}
