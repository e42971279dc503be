//! # Chunked Object Store
//!
//! Stable-address storage for objects of one concrete type.
//!
//! The store is a list of fixed-capacity chunks. Each chunk is a
//! [`PoolAllocator`] whose budget was reserved from the shared
//! [`MemoryManager`]:
//! - Creation scans chunks in list order and takes the first free slot
//! - When every chunk is full a new one is reserved and pushed to the
//!   **front**, so later creations land in the newest chunk first
//! - Objects are never moved; a [`SlotRef`] stays valid until destroyed
//! - Iteration walks chunk order, then slot order, so it is not stable
//!   across a growth event
//!
//! Dropping the store drops every live object and returns every chunk's
//! block to the memory manager.

use std::collections::VecDeque;
use std::mem::{align_of, size_of};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{EcsError, EcsResult};
use crate::memory::{Block, MemoryManager, PoolAllocator, PoolHandle};

/// Identifier of a chunk inside one store.
pub type ChunkId = u32;

/// Stable location of an object inside a [`ChunkedStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotRef {
    chunk: ChunkId,
    slot: usize,
}

impl SlotRef {
    /// The owning chunk.
    #[inline]
    #[must_use]
    pub const fn chunk(self) -> ChunkId {
        self.chunk
    }

    /// Slot index inside the owning chunk.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        self.slot
    }
}

#[derive(Debug)]
struct Chunk<T> {
    id: ChunkId,
    block: Block,
    pool: PoolAllocator<T>,
}

/// Growable pool of fixed-capacity chunks for one object type.
///
/// # Type Parameters
///
/// * `T` - The stored object type
///
/// # Example
///
/// ```rust,ignore
/// let memory = Arc::new(MemoryManager::new(1 << 20));
/// let mut store: ChunkedStore<u64> = ChunkedStore::new(memory, 512, "Example");
///
/// let (slot, value) = store.create_with(|_| Ok(7))?;
/// *value += 1;
/// assert_eq!(store.destroy(slot), Some(8));
/// ```
#[derive(Debug)]
pub struct ChunkedStore<T> {
    chunks: VecDeque<Chunk<T>>,
    chunk_capacity: usize,
    memory: Arc<MemoryManager>,
    user: &'static str,
    next_chunk_id: ChunkId,
    len: usize,
}

impl<T> ChunkedStore<T> {
    /// Creates an empty store. No memory is reserved until the first object.
    ///
    /// # Arguments
    ///
    /// * `memory` - Budget every chunk is reserved from
    /// * `chunk_capacity` - Objects per chunk (clamped to at least 1)
    /// * `user` - Name reported to the memory manager and in logs
    #[must_use]
    pub fn new(memory: Arc<MemoryManager>, chunk_capacity: usize, user: &'static str) -> Self {
        Self {
            chunks: VecDeque::new(),
            chunk_capacity: chunk_capacity.max(1),
            memory,
            user,
            next_chunk_id: 0,
            len: 0,
        }
    }

    /// Objects per chunk.
    #[inline]
    #[must_use]
    pub const fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Number of chunks reserved so far.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of live objects.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the store holds no live objects.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes reserved from the memory manager by this store.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.block.size).sum()
    }

    /// Bytes reserved for one chunk.
    #[inline]
    #[must_use]
    pub const fn chunk_bytes(&self) -> usize {
        (size_of::<T>() + align_of::<T>()) * self.chunk_capacity
    }

    /// Places a new object in the first free slot, growing if needed.
    ///
    /// `build` receives the slot the object will occupy so identity can be
    /// stamped before the object becomes reachable. If `build` fails the
    /// slot stays free.
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfMemory`] if a new chunk cannot be reserved, or
    /// whatever `build` returns.
    pub fn create_with<F>(&mut self, build: F) -> EcsResult<(SlotRef, &mut T)>
    where
        F: FnOnce(SlotRef) -> EcsResult<T>,
    {
        let position = match self.chunks.iter().position(|chunk| !chunk.pool.is_full()) {
            Some(position) => position,
            None => {
                self.grow()?;
                0
            }
        };

        let chunk = &mut self.chunks[position];
        let next = chunk.pool.next_free().ok_or(EcsError::OutOfMemory {
            user: self.user,
            requested: size_of::<T>(),
        })?;
        let slot = SlotRef {
            chunk: chunk.id,
            slot: next.index(),
        };

        let value = build(slot)?;
        let handle = chunk.pool.allocate(value).ok_or(EcsError::OutOfMemory {
            user: self.user,
            requested: size_of::<T>(),
        })?;
        self.len += 1;

        let object = chunk.pool.get_mut(handle).ok_or(EcsError::OutOfMemory {
            user: self.user,
            requested: size_of::<T>(),
        })?;
        Ok((slot, object))
    }

    /// Places `value` in the first free slot, growing if needed.
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfMemory`] if a new chunk cannot be reserved.
    pub fn create(&mut self, value: T) -> EcsResult<(SlotRef, &mut T)> {
        self.create_with(|_| Ok(value))
    }

    /// Destroys the object at `slot` and returns it to the caller.
    ///
    /// The slot goes back to its chunk's free set. Returns `None` if the
    /// slot is not live.
    pub fn destroy(&mut self, slot: SlotRef) -> Option<T> {
        let chunk = self.chunks.iter_mut().find(|chunk| chunk.id == slot.chunk)?;
        let value = chunk.pool.free(PoolHandle::from_index(slot.slot))?;
        self.len -= 1;
        Some(value)
    }

    /// Gets a live object.
    #[must_use]
    pub fn get(&self, slot: SlotRef) -> Option<&T> {
        self.chunks
            .iter()
            .find(|chunk| chunk.id == slot.chunk)?
            .pool
            .get(PoolHandle::from_index(slot.slot))
    }

    /// Gets a live object mutably.
    pub fn get_mut(&mut self, slot: SlotRef) -> Option<&mut T> {
        self.chunks
            .iter_mut()
            .find(|chunk| chunk.id == slot.chunk)?
            .pool
            .get_mut(PoolHandle::from_index(slot.slot))
    }

    /// Whether `slot` holds a live object.
    #[inline]
    #[must_use]
    pub fn contains(&self, slot: SlotRef) -> bool {
        self.get(slot).is_some()
    }

    /// Iterates over live objects in chunk order, then slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotRef, &T)> {
        self.chunks.iter().flat_map(|chunk| {
            let id = chunk.id;
            chunk
                .pool
                .iter()
                .map(move |(handle, value)| (SlotRef { chunk: id, slot: handle.index() }, value))
        })
    }

    /// Iterates mutably over live objects in chunk order, then slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotRef, &mut T)> {
        self.chunks.iter_mut().flat_map(|chunk| {
            let id = chunk.id;
            chunk
                .pool
                .iter_mut()
                .map(move |(handle, value)| (SlotRef { chunk: id, slot: handle.index() }, value))
        })
    }

    /// Drops every live object. Chunks stay reserved.
    pub fn clear(&mut self) {
        for chunk in &mut self.chunks {
            chunk.pool.clear();
        }
        self.len = 0;
    }

    fn grow(&mut self) -> EcsResult<()> {
        let bytes = self.chunk_bytes();
        let block = self
            .memory
            .allocate(bytes, align_of::<T>(), self.user)
            .ok_or(EcsError::OutOfMemory {
                user: self.user,
                requested: bytes,
            })?;

        let id = self.next_chunk_id;
        self.next_chunk_id = self.next_chunk_id.wrapping_add(1);
        self.chunks.push_front(Chunk {
            id,
            block,
            pool: PoolAllocator::new(self.chunk_capacity),
        });

        debug!(
            target: "ChunkedStore",
            user = self.user,
            chunk = id,
            chunks = self.chunks.len(),
            bytes,
            "reserved new chunk"
        );
        Ok(())
    }
}

impl<T> Drop for ChunkedStore<T> {
    fn drop(&mut self) {
        // Front holds the newest chunk, so blocks go back in reverse order
        while let Some(mut chunk) = self.chunks.pop_front() {
            chunk.pool.clear();
            if let Err(err) = self.memory.free(chunk.block) {
                warn!(target: "ChunkedStore", user = self.user, %err, "failed to release chunk");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Arc<MemoryManager> {
        Arc::new(MemoryManager::new(1 << 20))
    }

    #[test]
    fn test_create_and_destroy() {
        let mut store: ChunkedStore<u64> = ChunkedStore::new(memory(), 4, "test");
        assert_eq!(store.chunk_count(), 0);

        let (slot, value) = store.create(7).unwrap();
        *value += 1;
        assert_eq!(store.get(slot), Some(&8));
        assert_eq!(store.len(), 1);

        assert_eq!(store.destroy(slot), Some(8));
        assert_eq!(store.destroy(slot), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_overflow_adds_exactly_one_chunk() {
        const CAP: usize = 8;
        let mut store: ChunkedStore<usize> = ChunkedStore::new(memory(), CAP, "test");

        for i in 0..=CAP {
            store.create(i).unwrap();
        }

        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.len(), CAP + 1);

        let mut seen: Vec<usize> = store.iter().map(|(_, v)| *v).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..=CAP).collect::<Vec<_>>());
    }

    #[test]
    fn test_newest_chunk_is_scanned_first() {
        let mut store: ChunkedStore<u32> = ChunkedStore::new(memory(), 2, "test");
        let (old_slot, _) = store.create(1).unwrap();
        store.create(2).unwrap();
        let (new_slot, _) = store.create(3).unwrap();
        assert_ne!(old_slot.chunk(), new_slot.chunk());

        // A hole in the old chunk does not beat the newest chunk
        store.destroy(old_slot);
        let (slot, _) = store.create(4).unwrap();
        assert_eq!(slot.chunk(), new_slot.chunk());

        // Newest chunk comes first in iteration
        let first = store.iter().next().map(|(_, v)| *v);
        assert_eq!(first, Some(3));
    }

    #[test]
    fn test_failed_build_leaves_slot_free() {
        let mut store: ChunkedStore<u32> = ChunkedStore::new(memory(), 2, "test");
        let result = store.create_with(|_| Err(EcsError::InvalidConfig("nope".into())));
        assert!(result.is_err());
        assert!(store.is_empty());

        let (slot, _) = store.create(5).unwrap();
        assert_eq!(slot.slot(), 0);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let memory = Arc::new(MemoryManager::new(64));
        let mut store: ChunkedStore<u64> = ChunkedStore::new(memory, 16, "tiny");
        assert!(matches!(
            store.create(1),
            Err(EcsError::OutOfMemory { user: "tiny", .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_drop_returns_memory() {
        let memory = memory();
        {
            let mut store: ChunkedStore<u64> = ChunkedStore::new(Arc::clone(&memory), 2, "test");
            for i in 0..5 {
                store.create(i).unwrap();
            }
            assert_eq!(store.chunk_count(), 3);
            assert!(memory.used() > 0);
        }
        assert_eq!(memory.used(), 0);
        assert!(memory.check_memory_leaks().is_empty());
    }

    #[test]
    fn test_iter_mut_updates_in_place() {
        let mut store: ChunkedStore<i32> = ChunkedStore::new(memory(), 3, "test");
        let slots: Vec<SlotRef> = (0..5).map(|i| store.create(i).unwrap().0).collect();

        for (_, value) in store.iter_mut() {
            *value *= 10;
        }
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(store.get(*slot), Some(&(i as i32 * 10)));
        }
    }
}
