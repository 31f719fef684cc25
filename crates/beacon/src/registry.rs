//! Ordered subscriber storage with O(1) removal.
//!
//! [`Registry<S>`] is an index arena threaded by a doubly linked list. Entries
//! keep their insertion order for iteration; removal unlinks in O(1) given the
//! [`SubscriberKey`] returned by [`insert`](Registry::insert). Freed slots are
//! reused, and each reuse bumps the slot generation so a stale key never
//! reaches the new occupant. A slot at the last generation is never reused.

/// Handle to an entry in a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberKey {
    index: u32,
    generation: u32,
}

impl SubscriberKey {
    /// Slot index.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at insertion time.
    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Node<S> {
    value: S,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
struct Slot<S> {
    generation: u32,
    node: Option<Node<S>>,
}

/// Insertion-ordered arena of entries.
#[derive(Debug)]
pub struct Registry<S> {
    slots: Vec<Slot<S>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Registry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `value` at the tail.
    pub fn insert(&mut self, value: S) -> SubscriberKey {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).expect("registry exceeds u32 slots");
                self.slots.push(Slot {
                    generation: 0,
                    node: None,
                });
                index
            }
        };

        let prev = self.tail;
        let slot = &mut self.slots[index as usize];
        slot.node = Some(Node {
            value,
            prev,
            next: None,
        });
        let generation = slot.generation;

        match prev {
            Some(tail) => self.node_mut(tail).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        SubscriberKey { index, generation }
    }

    /// Unlink the entry for `key`. Returns `None` if the key is stale.
    pub fn remove(&mut self, key: SubscriberKey) -> Option<S> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let node = slot.node.take()?;
        // A slot whose generation would wrap is retired so old keys stay stale.
        if let Some(next) = slot.generation.checked_add(1) {
            slot.generation = next;
            self.free.push(key.index);
        }

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }
        self.len -= 1;

        Some(node.value)
    }

    #[must_use]
    pub fn get(&self, key: SubscriberKey) -> Option<&S> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_ref().map(|n| &n.value)
    }

    pub fn get_mut(&mut self, key: SubscriberKey) -> Option<&mut S> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_mut().map(|n| &mut n.value)
    }

    #[must_use]
    pub fn contains(&self, key: SubscriberKey) -> bool {
        self.get(key).is_some()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> Iter<'_, S> {
        Iter {
            registry: self,
            cursor: self.head,
        }
    }

    fn node_mut(&mut self, index: u32) -> &mut Node<S> {
        self.slots[index as usize]
            .node
            .as_mut()
            .expect("linked index points at an occupied slot")
    }
}

/// Iterator over a [`Registry`] in insertion order.
pub struct Iter<'a, S> {
    registry: &'a Registry<S>,
    cursor: Option<u32>,
}

impl<'a, S> Iterator for Iter<'a, S> {
    type Item = &'a S;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = self.registry.slots[index as usize].node.as_ref()?;
        self.cursor = node.next;
        Some(&node.value)
    }
}
