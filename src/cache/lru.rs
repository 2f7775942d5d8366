//! Bounded least-recently-used map.
//!
//! A `HashMap` from key to arena slot plus a [`RecencyList`] holding the
//! entries. Both `get` and `put` are O(1). The cache never holds more than
//! `capacity` entries and the arena never grows past `capacity + 2` slots.
//!
//! The type is not synchronised; callers share it behind a lock.

use std::{borrow::Borrow, collections::HashMap, hash::Hash, num::NonZeroUsize};

use super::list::{RecencyList, SlotIndex};

#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: NonZeroUsize,
    index: HashMap<K, SlotIndex>,
    entries: RecencyList<(K, V)>,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity(capacity.get()),
            entries: RecencyList::with_capacity(capacity.get()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look up `key` and mark it most recently used on a hit.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.entries.move_to_front(slot);
        self.entries.get(slot).map(|(_, value)| value)
    }

    /// Look up `key` without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.entries.get(slot).map(|(_, value)| value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Insert or replace `key`, making it most recently used.
    ///
    /// Inserting a new key into a full cache evicts exactly one entry, the
    /// least recently used, and returns it. Replacing an existing key never
    /// evicts.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            if let Some(entry) = self.entries.get_mut(slot) {
                entry.1 = value;
            }
            self.entries.move_to_front(slot);
            return None;
        }

        let evicted = if self.index.len() >= self.capacity.get() {
            self.evict_lru()
        } else {
            None
        };

        let slot = self.entries.push_front((key.clone(), value));
        self.index.insert(key, slot);
        evicted
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.index.remove(key)?;
        self.entries.remove(slot).map(|(_, value)| value)
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }

    /// Keys from most to least recently used.
    pub fn keys_mru(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.iter().map(|(key, _)| key)
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.entries.slot_count()
    }

    fn evict_lru(&mut self) -> Option<(K, V)> {
        let (key, value) = self.entries.pop_back()?;
        self.index.remove(&key);
        Some((key, value))
    }
}
