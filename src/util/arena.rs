//! Generational arena for runtime records.
//!
//! Slots are recycled by the underlying [`Slab`], but every insertion stamps a
//! fresh generation, so an index taken before a slot was reused never resolves
//! to the new occupant. The interpreter relies on this: completions from
//! channels, timers and wakers may arrive after the effect they target has
//! been cancelled, and must be dropped rather than misrouted.

use core::fmt;
use slab::Slab;

/// An index into an [`Arena`], tagged with the generation of its slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaIndex {
    index: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Creates an index from raw parts.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot position.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation stamped at insertion.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    value: T,
}

/// Slab-backed storage with generation-checked lookups.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Slab<Entry<T>>,
    next_generation: u32,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Slab::new(),
            next_generation: 1,
        }
    }

    /// Inserts a value built from its own index.
    ///
    /// Records that need to know their id (tasks, effect nodes) are
    /// constructed inside the closure.
    pub fn insert_with(&mut self, build: impl FnOnce(ArenaIndex) -> T) -> ArenaIndex {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1).max(1);
        let entry = self.slots.vacant_entry();
        let index = ArenaIndex::new(entry.key() as u32, generation);
        entry.insert(Entry {
            generation,
            value: build(index),
        });
        index
    }

    /// Returns the index the next insertion will receive.
    #[must_use]
    pub fn vacant_index(&self) -> ArenaIndex {
        ArenaIndex::new(self.slots.vacant_key() as u32, self.next_generation)
    }

    /// Inserts a value and returns its index.
    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.insert_with(|_| value)
    }

    /// Returns a shared reference if `index` is still live.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        self.slots
            .get(index.index as usize)
            .filter(|entry| entry.generation == index.generation)
            .map(|entry| &entry.value)
    }

    /// Returns a mutable reference if `index` is still live.
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        self.slots
            .get_mut(index.index as usize)
            .filter(|entry| entry.generation == index.generation)
            .map(|entry| &mut entry.value)
    }

    /// Removes and returns the value if `index` is still live.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let key = index.index as usize;
        let live = self
            .slots
            .get(key)
            .is_some_and(|entry| entry.generation == index.generation);
        if live {
            Some(self.slots.remove(key).value)
        } else {
            None
        }
    }

    /// Returns true if `index` is still live.
    #[must_use]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Returns the number of live values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the arena holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates live values with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.slots.iter().map(|(key, entry)| {
            (
                ArenaIndex::new(key as u32, entry.generation),
                &entry.value,
            )
        })
    }
}
