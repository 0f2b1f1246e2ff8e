//! A hash map that also supports uniform random sampling in O(1).
//!
//! Entries live densely in a `Vec`; a `HashMap` maps each key to its slot.
//! Removal swaps the last slot into the hole, so the vector never has gaps
//! and `slots[rng.gen_range(0..len)]` is a uniform draw.

use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub(crate) struct SampledMap<V> {
    index: HashMap<Bytes, usize>,
    slots: Vec<(Bytes, V)>,
}

impl<V> Default for SampledMap<V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
        }
    }
}

impl<V> SampledMap<V> {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn contains_key(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&V> {
        self.index.get(key).map(|&slot| &self.slots[slot].1)
    }

    pub(crate) fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        match self.index.get(key) {
            Some(&slot) => Some(&mut self.slots[slot].1),
            None => None,
        }
    }

    /// Inserts or replaces. Returns the previous value.
    pub(crate) fn insert(&mut self, key: Bytes, value: V) -> Option<V> {
        if let Some(&slot) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.slots[slot].1, value));
        }
        self.index.insert(key.clone(), self.slots.len());
        self.slots.push((key, value));
        None
    }

    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<V> {
        let slot = self.index.remove(key)?;
        let (_, value) = self.slots.swap_remove(slot);
        if let Some((moved, _)) = self.slots.get(slot) {
            self.index.insert(moved.clone(), slot);
        }
        Some(value)
    }

    /// Returns a uniformly random entry.
    pub(crate) fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(&Bytes, &V)> {
        if self.slots.is_empty() {
            return None;
        }
        let (key, value) = &self.slots[rng.gen_range(0..self.slots.len())];
        Some((key, value))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Bytes, &V)> {
        self.slots.iter().map(|(k, v)| (k, v))
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
    }
}
