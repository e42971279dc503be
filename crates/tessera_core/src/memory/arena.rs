//! # Arena Allocator
//!
//! A bump allocator for memory that lives as long as its owner.

use super::{align_forward, Allocator, Block, MemoryError};

/// A bump-pointer arena allocator.
///
/// Allocations are fast (just bump an offset). Individual blocks cannot
/// be released; memory is reclaimed all at once with [`Allocator::clear`].
///
/// The system manager uses one arena for the process lifetime of every
/// registered system.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = Arena::new(1024 * 1024); // 1MB
///
/// let block = arena.allocate(64, 8).expect("fits");
///
/// // Reset to free all allocations
/// arena.clear();
/// ```
#[derive(Debug)]
pub struct Arena {
    /// Current allocation offset.
    offset: usize,
    /// Total capacity.
    capacity: usize,
    /// Number of blocks handed out since the last clear.
    allocations: usize,
}

impl Arena {
    /// Creates a new arena with the specified capacity in bytes.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total size in bytes
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            offset: 0,
            capacity,
            allocations: 0,
        }
    }
}

impl Allocator for Arena {
    fn allocate(&mut self, size: usize, alignment: usize) -> Option<Block> {
        debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");

        let aligned_offset = align_forward(self.offset, alignment);
        let new_offset = aligned_offset.checked_add(size)?;

        if new_offset > self.capacity {
            return None;
        }

        self.offset = new_offset;
        self.allocations += 1;

        Some(Block {
            offset: aligned_offset,
            size,
        })
    }

    fn free(&mut self, _block: Block) -> Result<(), MemoryError> {
        Err(MemoryError::UnsupportedFree)
    }

    /// Resets the arena, invalidating all previous allocations.
    ///
    /// This is a **zero-cost** operation - nothing is walked or freed.
    fn clear(&mut self) {
        self.offset = 0;
        self.allocations = 0;
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn used(&self) -> usize {
        self.offset
    }

    #[inline]
    fn allocation_count(&self) -> usize {
        self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_allocation() {
        let mut arena = Arena::new(1024);
        let block = arena.allocate(10, 4).unwrap();
        assert_eq!(block.offset, 0);
        assert_eq!(block.size, 10);

        let next = arena.allocate(4, 8).unwrap();
        assert_eq!(next.offset, 16);
        assert_eq!(arena.allocation_count(), 2);
    }

    #[test]
    fn test_arena_exhaustion() {
        let mut arena = Arena::new(32);
        assert!(arena.allocate(32, 1).is_some());
        assert!(arena.allocate(1, 1).is_none());
    }

    #[test]
    fn test_arena_rejects_free() {
        let mut arena = Arena::new(64);
        let block = arena.allocate(8, 8).unwrap();
        assert_eq!(arena.free(block), Err(MemoryError::UnsupportedFree));
    }

    #[test]
    fn test_arena_reset() {
        let mut arena = Arena::new(1024);
        let _ = arena.allocate(40, 4).unwrap();
        assert!(arena.used() > 0);

        arena.clear();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.remaining(), 1024);
    }
}
