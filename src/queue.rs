//! Intrusive doubly linked FIFO over arena entries.
//!
//! The list only stores head, tail and length. Links live in the entries
//! themselves as [`EntryId`] handles, so push, pop and removal of an
//! arbitrary member are O(1) with no allocation.
//!
//! ```text
//! head (oldest) <-> e1 <-> e2 <-> ... <-> tail (newest)
//! ```

use crate::arena::{Arena, EntryId};
use crate::entry::NULL;

#[derive(Debug)]
pub struct Queue {
    head: u32,
    tail: u32,
    len: usize,
}

impl Queue {
    pub fn new() -> Self {
        Self {
            head: NULL,
            tail: NULL,
            len: 0,
        }
    }

    /// Append an entry at the tail.
    ///
    /// The entry must not currently be a member of any queue.
    pub fn push<K, V>(&mut self, arena: &Arena<K, V>, id: EntryId) {
        let raw = id.into_raw();
        let entry = &arena[id];
        entry.set_prev(self.tail);
        entry.set_next(NULL);

        if self.tail == NULL {
            self.head = raw;
        } else {
            arena[EntryId(self.tail)].set_next(raw);
        }
        self.tail = raw;
        self.len += 1;
    }

    /// Remove and return the head, or `None` when empty
    pub fn pop<K, V>(&mut self, arena: &Arena<K, V>) -> Option<EntryId> {
        let id = EntryId::from_raw(self.head)?;
        self.remove(arena, id);
        Some(id)
    }

    /// Unlink an arbitrary member.
    ///
    /// The caller guarantees the entry is a member of this queue.
    pub fn remove<K, V>(&mut self, arena: &Arena<K, V>, id: EntryId) {
        debug_assert!(self.len > 0, "remove from empty queue");

        let entry = &arena[id];
        let prev = entry.prev();
        let next = entry.next();

        if prev == NULL {
            debug_assert_eq!(self.head, id.into_raw(), "entry is not a member");
            self.head = next;
        } else {
            arena[EntryId(prev)].set_next(next);
        }

        if next == NULL {
            self.tail = prev;
        } else {
            arena[EntryId(next)].set_prev(prev);
        }

        entry.set_prev(NULL);
        entry.set_next(NULL);
        self.len -= 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<EntryId> {
        EntryId::from_raw(self.head)
    }

    /// Forget every member in O(1).
    ///
    /// Member links are left as they were; queue markers are the caller's
    /// responsibility.
    pub fn clear(&mut self) {
        self.head = NULL;
        self.tail = NULL;
        self.len = 0;
    }

    /// Walk the queue from head to tail
    pub fn iter<'a, K, V>(&self, arena: &'a Arena<K, V>) -> Iter<'a, K, V> {
        Iter {
            arena,
            cursor: self.head,
            remaining: self.len,
        }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, K, V> {
    arena: &'a Arena<K, V>,
    cursor: u32,
    remaining: usize,
}

impl<K, V> Iterator for Iter<'_, K, V> {
    type Item = EntryId;

    fn next(&mut self) -> Option<EntryId> {
        // Bounded by length so a corrupted link cannot loop forever
        if self.remaining == 0 {
            return None;
        }
        let id = EntryId::from_raw(self.cursor)?;
        self.cursor = self.arena[id].next();
        self.remaining -= 1;
        Some(id)
    }
}
