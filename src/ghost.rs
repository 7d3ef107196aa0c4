//! Ghost queue: bounded history of entries demoted from the small queue.
//!
//! Only the entry hash is kept, not the entry. When a key whose hash is
//! still in the history is admitted again, it skips the small queue and goes
//! straight to the main queue.

use crate::arena::{Arena, EntryId};
use crate::metrics::PolicyMetrics;
use ahash::RandomState;
use std::collections::{HashMap, VecDeque};

/// Bounded FIFO of entry hashes.
///
/// Each record is stamped with an insertion sequence number. `members` maps
/// a live hash to the stamp of its record, so a record left behind in
/// `history` by [`Ghost::remove`] is recognised as stale when it reaches the
/// front and skipped.
pub struct Ghost {
    // Oldest record at the front, possibly interleaved with stale ones
    history: VecDeque<(u64, u64)>,
    members: HashMap<u64, u64, RandomState>,
    next_stamp: u64,
    capacity: usize,
}

impl Ghost {
    /// Create a ghost history holding at most `capacity` hashes.
    ///
    /// A capacity of zero disables tracking.
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::new(),
            members: HashMap::with_hasher(RandomState::new()),
            next_stamp: 0,
            capacity,
        }
    }

    /// Record an entry evicted from the small queue.
    ///
    /// The entry itself is appended to `victims` since its storage is no
    /// longer tracked by any queue. Hashes already in the history are not
    /// recorded twice. When the history is full the oldest hashes are
    /// dropped first; those have no live entry and add nothing to `victims`.
    pub fn insert<K, V>(
        &mut self,
        arena: &Arena<K, V>,
        mut victims: Vec<EntryId>,
        id: EntryId,
        metrics: &PolicyMetrics,
    ) -> Vec<EntryId> {
        victims.push(id);

        if self.capacity == 0 {
            return victims;
        }

        let hash = arena[id].hash();
        if self.members.contains_key(&hash) {
            return victims;
        }

        // Stale records count against a looser bound so the deque stays
        // within twice the capacity
        let limit = self.capacity.saturating_mul(2);
        while self.members.len() >= self.capacity || self.history.len() >= limit {
            let Some((oldest, stamp)) = self.history.pop_front() else {
                break;
            };
            if self.members.get(&oldest) == Some(&stamp) {
                self.members.remove(&oldest);
                metrics.ghost_evict.increment();
            }
        }

        let stamp = self.next_stamp;
        self.next_stamp = self.next_stamp.wrapping_add(1);
        self.history.push_back((hash, stamp));
        self.members.insert(hash, stamp);
        metrics.ghost_insert.increment();
        victims
    }

    /// Was an entry with this hash recently demoted?
    pub fn contains(&self, hash: u64) -> bool {
        self.members.contains_key(&hash)
    }

    /// Forget a hash, typically once its key has been readmitted.
    ///
    /// O(1): the record stays in the history until it reaches the front.
    pub fn remove(&mut self, hash: u64) -> bool {
        self.members.remove(&hash).is_some()
    }

    /// Number of live records
    pub fn length(&self) -> usize {
        self.members.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.members.clear();
    }
}
