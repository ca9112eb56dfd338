//! Generational Arena
//!
//! Nodes and links live in slabs addressed by `(index, generation)` keys.
//! Removing an entry bumps the slot's generation, so a key that outlived its
//! entry never aliases whatever is stored in the slot next.

use std::fmt::Debug;
use std::marker::PhantomData;

/// A key into an [`Arena`].
pub trait ArenaKey: Copy + Eq + Debug {
    /// Build a key from its raw parts.
    fn from_parts(index: u32, generation: u32) -> Self;

    /// Slot index.
    fn index(self) -> u32;

    /// Generation the key was issued for.
    fn generation(self) -> u32;
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A slab with generation-checked keys.
#[derive(Debug)]
pub struct Arena<K: ArenaKey, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K: ArenaKey, T> Arena<K, T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// Insert a value, reusing a free slot when one exists.
    pub fn insert(&mut self, value: T) -> K {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return K::from_parts(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).expect("arena exceeded u32::MAX slots");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        K::from_parts(index, 0)
    }

    /// Remove the value behind `key`. Stale keys return `None`.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index());
        self.len -= 1;
        Some(value)
    }

    /// Shared access to a live entry.
    pub fn get(&self, key: K) -> Option<&T> {
        self.slots
            .get(key.index() as usize)
            .filter(|slot| slot.generation == key.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    /// Exclusive access to a live entry.
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots
            .get_mut(key.index() as usize)
            .filter(|slot| slot.generation == key.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `key` still refers to a live entry.
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
