use crate::entry::{Entry, NULL};
use std::sync::Arc;

/// Stable handle to an entry slot in an [`Arena`].
///
/// Handles are reused once their entry is released, so a handle must not be
/// kept past the point where its entry is handed back as a victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u32);

impl EntryId {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        if raw == NULL { None } else { Some(Self(raw)) }
    }

    pub(crate) fn into_raw(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Slot storage for entries tracked by the policy.
///
/// Queue linkage inside each [`Entry`] refers to other entries by
/// [`EntryId`], which avoids ownership cycles while keeping O(1) splices.
/// Entries are reference counted so readers can keep using an entry after
/// the policy has released it.
pub struct Arena<K, V> {
    slots: Vec<Option<Arc<Entry<K, V>>>>,
    // Released slot indices available for reuse
    free: Vec<u32>,
    live: usize,
}

impl<K, V> Arena<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store an entry and return its handle.
    ///
    /// # Panics
    /// Panics if the arena would exceed `u32::MAX - 1` slots.
    pub fn insert(&mut self, entry: Entry<K, V>) -> EntryId {
        let entry = Arc::new(entry);
        entry.set_prev(NULL);
        entry.set_next(NULL);
        self.live += 1;

        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(entry);
            return EntryId(index);
        }

        let index = self.slots.len();
        assert!(index < NULL as usize, "arena exhausted");
        self.slots.push(Some(entry));
        EntryId(index as u32)
    }

    pub fn get(&self, id: EntryId) -> Option<&Arc<Entry<K, V>>> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Remove an entry from the arena and return it.
    ///
    /// Returns `None` if the slot is already vacant.
    pub fn release(&mut self, id: EntryId) -> Option<Arc<Entry<K, V>>> {
        let entry = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.into_raw());
        self.live -= 1;
        Some(entry)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live entries and their handles
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Arc<Entry<K, V>>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|entry| (EntryId(index as u32), entry)))
    }

    /// Release every entry, returning them to the caller
    pub fn drain(&mut self) -> Vec<Arc<Entry<K, V>>> {
        let entries: Vec<_> = self.slots.drain(..).flatten().collect();
        self.free.clear();
        self.live = 0;
        entries
    }
}

impl<K, V> Default for Arena<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::ops::Index<EntryId> for Arena<K, V> {
    type Output = Entry<K, V>;

    /// # Panics
    /// Panics if the slot is vacant. Queue code only indexes members, which
    /// are live by construction.
    fn index(&self, id: EntryId) -> &Entry<K, V> {
        match self.get(id) {
            Some(entry) => entry.as_ref(),
            None => panic!("no live entry for {id:?}"),
        }
    }
}
