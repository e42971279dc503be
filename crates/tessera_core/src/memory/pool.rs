//! # Pool Allocator
//!
//! Fixed-capacity slot allocator for objects of one type.
//!
//! ```text
//!  slot:   0        1        2        3
//!        ┌──────┬────────┬──────┬────────┐
//!        │ obj  │ vacant │ obj  │ vacant │     head ──> 3 ──> 1 ──> end
//!        └──────┴────────┴──────┴────────┘
//! ```
//!
//! Vacant slots form a singly linked list threaded through the slots
//! themselves, so the pool needs no side allocation after construction.

/// A slot is either a live object or a link in the vacant list.
#[derive(Debug)]
enum Slot<T> {
    Occupied(T),
    Vacant { next: Option<usize> },
}

/// A pool allocator for fixed-size objects.
///
/// Objects never move while alive. Slots are released individually in any
/// order and the most recently released slot is handed out next.
///
/// Every chunk of a [`ChunkedStore`](crate::ChunkedStore) is one pool.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: PoolAllocator<Bullet> = PoolAllocator::new(256);
///
/// let handle = pool.allocate(Bullet::default())?;
/// pool.free(handle);
/// ```
#[derive(Debug)]
pub struct PoolAllocator<T> {
    slots: Box<[Slot<T>]>,
    head: Option<usize>,
    occupied: usize,
}

/// Position of an object inside a [`PoolAllocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: usize,
}

impl PoolHandle {
    /// Rebuilds a handle from a slot index.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self { index }
    }

    /// Slot index inside the pool.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

impl<T> PoolAllocator<T> {
    /// Creates a pool with `capacity` vacant slots.
    ///
    /// Slots are handed out lowest index first until the first release.
    /// A zero-capacity pool is permanently full.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|index| Slot::Vacant {
                next: (index + 1 < capacity).then_some(index + 1),
            })
            .collect();

        Self {
            head: (capacity > 0).then_some(0),
            slots,
            occupied: 0,
        }
    }

    /// Total number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live objects.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.occupied
    }

    /// Number of vacant slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.slots.len() - self.occupied
    }

    /// Whether every slot is occupied.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.head.is_none()
    }

    /// The slot the next [`allocate`](Self::allocate) will use, if any.
    #[inline]
    #[must_use]
    pub fn next_free(&self) -> Option<PoolHandle> {
        self.head.map(PoolHandle::from_index)
    }

    /// Moves `value` into the head of the vacant list.
    ///
    /// Returns `None` when the pool is full.
    pub fn allocate(&mut self, value: T) -> Option<PoolHandle> {
        let index = self.head?;
        let Slot::Vacant { next } = self.slots[index] else {
            return None;
        };

        self.slots[index] = Slot::Occupied(value);
        self.head = next;
        self.occupied += 1;
        Some(PoolHandle { index })
    }

    /// Takes the object out of `handle`'s slot.
    ///
    /// Returns `None` if the slot is out of range or already vacant.
    pub fn free(&mut self, handle: PoolHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index)?;
        if matches!(slot, Slot::Vacant { .. }) {
            return None;
        }

        let Slot::Occupied(value) = std::mem::replace(slot, Slot::Vacant { next: self.head }) else {
            return None;
        };
        self.head = Some(handle.index);
        self.occupied -= 1;
        Some(value)
    }

    /// The object in `handle`'s slot.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        match self.slots.get(handle.index)? {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// The object in `handle`'s slot, mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index)? {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Drops every object and rebuilds the vacant list in index order.
    pub fn clear(&mut self) {
        let capacity = self.slots.len();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            *slot = Slot::Vacant {
                next: (index + 1 < capacity).then_some(index + 1),
            };
        }
        self.head = (capacity > 0).then_some(0);
        self.occupied = 0;
    }

    /// Live objects in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied(value) => Some((PoolHandle { index }, value)),
            Slot::Vacant { .. } => None,
        })
    }

    /// Live objects in slot order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied(value) => Some((PoolHandle { index }, value)),
            Slot::Vacant { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_slot_first() {
        let mut pool: PoolAllocator<&str> = PoolAllocator::new(3);
        let a = pool.allocate("a").unwrap();
        let b = pool.allocate("b").unwrap();

        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(pool.get(b), Some(&"b"));
        assert_eq!(pool.allocated_count(), 2);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(2);
        let h = pool.allocate(7).unwrap();

        assert_eq!(pool.free(h), Some(7));
        assert_eq!(pool.free(h), None);
        assert_eq!(pool.free(PoolHandle::from_index(99)), None);
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_last_released_is_reused_first() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(4);
        let handles: Vec<PoolHandle> = (0..4).map(|v| pool.allocate(v).unwrap()).collect();
        assert!(pool.is_full());
        assert!(pool.allocate(9).is_none());

        pool.free(handles[1]);
        pool.free(handles[3]);
        assert_eq!(pool.next_free(), Some(handles[3]));
        assert_eq!(pool.allocate(30), Some(handles[3]));
        assert_eq!(pool.allocate(10), Some(handles[1]));
        assert!(pool.is_full());
    }

    #[test]
    fn test_zero_capacity_is_full() {
        let mut pool: PoolAllocator<u8> = PoolAllocator::new(0);
        assert!(pool.is_full());
        assert!(pool.allocate(1).is_none());
    }

    #[test]
    fn test_iteration_skips_vacant_slots() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(4);
        let a = pool.allocate(10).unwrap();
        pool.allocate(20).unwrap();
        pool.allocate(30).unwrap();
        pool.free(a);

        for (_, value) in pool.iter_mut() {
            *value += 1;
        }
        let values: Vec<u32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![21, 31]);

        pool.clear();
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.next_free(), Some(PoolHandle::from_index(0)));
    }
}
