//! Arena-backed doubly linked recency list.
//!
//! Slots live in a `Vec` and link to each other by index. Slot 0 is the head
//! sentinel and slot 1 the tail sentinel; neither carries a value and neither
//! is ever unlinked. Real entries always sit strictly between them, most
//! recently used next to the head. Released slots go on a free list and are
//! reused before the arena grows.

const HEAD: usize = 0;
const TAIL: usize = 1;
const SENTINELS: usize = 2;

/// Handle to a live entry in a [`RecencyList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlotIndex(usize);

#[derive(Debug)]
struct Slot<T> {
    prev: usize,
    next: usize,
    value: Option<T>,
}

#[derive(Debug)]
pub(crate) struct RecencyList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> RecencyList<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.saturating_add(SENTINELS));
        slots.push(Slot {
            prev: HEAD,
            next: TAIL,
            value: None,
        });
        slots.push(Slot {
            prev: HEAD,
            next: TAIL,
            value: None,
        });
        Self {
            slots,
            free: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Number of slots allocated in the arena, sentinels included.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Insert `value` as the most recently used entry.
    pub(crate) fn push_front(&mut self, value: T) -> SlotIndex {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].value = Some(value);
                index
            }
            None => {
                self.slots.push(Slot {
                    prev: HEAD,
                    next: TAIL,
                    value: Some(value),
                });
                self.slots.len() - 1
            }
        };
        self.link_after_head(index);
        self.len += 1;
        SlotIndex(index)
    }

    pub(crate) fn move_to_front(&mut self, index: SlotIndex) {
        if self.slots[HEAD].next == index.0 {
            return;
        }
        self.unlink(index.0);
        self.link_after_head(index.0);
    }

    pub(crate) fn remove(&mut self, index: SlotIndex) -> Option<T> {
        let value = self.slots.get_mut(index.0)?.value.take()?;
        self.unlink(index.0);
        self.free.push(index.0);
        self.len -= 1;
        Some(value)
    }

    /// Remove and return the least recently used entry.
    pub(crate) fn pop_back(&mut self) -> Option<T> {
        let last = self.slots[TAIL].prev;
        if last == HEAD {
            return None;
        }
        self.remove(SlotIndex(last))
    }

    pub(crate) fn get(&self, index: SlotIndex) -> Option<&T> {
        self.slots.get(index.0)?.value.as_ref()
    }

    pub(crate) fn get_mut(&mut self, index: SlotIndex) -> Option<&mut T> {
        self.slots.get_mut(index.0)?.value.as_mut()
    }

    /// Iterate from most to least recently used.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.slots[HEAD].next,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.truncate(SENTINELS);
        self.slots[HEAD].next = TAIL;
        self.slots[TAIL].prev = HEAD;
        self.free.clear();
        self.len = 0;
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.slots[index].prev, self.slots[index].next);
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
    }

    fn link_after_head(&mut self, index: usize) {
        let first = self.slots[HEAD].next;
        self.slots[index].prev = HEAD;
        self.slots[index].next = first;
        self.slots[first].prev = index;
        self.slots[HEAD].next = index;
    }
}

pub(crate) struct Iter<'a, T> {
    list: &'a RecencyList<T>,
    cursor: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == TAIL {
            return None;
        }
        let slot = &self.list.slots[self.cursor];
        self.cursor = slot.next;
        slot.value.as_ref()
    }
}
