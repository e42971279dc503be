//! # Memory Management
//!
//! Block allocators that back every store in the runtime.
//!
//! ## Design Philosophy
//!
//! Allocators never hand out raw pointers. An allocation is a [`Block`]
//! record describing an aligned byte range inside the allocator's buffer,
//! which keeps all bookkeeping in safe code while preserving the
//! allocation policies:
//! - [`Arena`]: bump allocation, whole-buffer clear only
//! - [`StackAllocator`]: LIFO release of the most recent block
//! - [`PoolAllocator`]: typed fixed-capacity slots, free in any order
//! - [`MemoryManager`]: the global stack that every manager draws from,
//!   tolerant of out-of-order release and able to report leaks

mod arena;
mod manager;
mod pool;
mod stack;

pub use arena::Arena;
pub use manager::{MemoryLeak, MemoryManager};
pub use pool::{PoolAllocator, PoolHandle};
pub use stack::StackAllocator;

use thiserror::Error;

/// An aligned byte range handed out by an [`Allocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    /// Offset of the first usable byte inside the allocator's buffer.
    pub offset: usize,
    /// Number of usable bytes.
    pub size: usize,
}

impl Block {
    /// One past the last byte of this block.
    #[inline]
    #[must_use]
    pub const fn end(self) -> usize {
        self.offset + self.size
    }

    /// Whether `offset` lies inside this block.
    #[inline]
    #[must_use]
    pub const fn contains(self, offset: usize) -> bool {
        self.offset <= offset && offset < self.end()
    }
}

/// Errors raised when an allocator contract is broken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The allocator only supports releasing everything at once.
    #[error("allocator does not support individual free, use clear instead")]
    UnsupportedFree,

    /// A stack allocator was asked to release a block that is not on top.
    #[error("block at offset {offset} is not the top of the stack")]
    OutOfOrderFree {
        /// Offset of the offending block.
        offset: usize,
    },

    /// The block was never handed out by this allocator (or was already released).
    #[error("unknown block at offset {offset} ({size} bytes)")]
    UnknownBlock {
        /// Offset of the offending block.
        offset: usize,
        /// Size of the offending block.
        size: usize,
    },
}

/// The allocation contract consumed by every store.
///
/// `allocate` returns `None` on exhaustion. What `free` accepts depends
/// on the policy; `clear` invalidates every prior allocation.
pub trait Allocator {
    /// Allocates `size` bytes aligned to `alignment` (a power of two).
    fn allocate(&mut self, size: usize, alignment: usize) -> Option<Block>;

    /// Releases a single block.
    ///
    /// # Errors
    ///
    /// Returns a [`MemoryError`] when the policy rejects the release.
    fn free(&mut self, block: Block) -> Result<(), MemoryError>;

    /// Invalidates every allocation made so far.
    fn clear(&mut self);

    /// Total capacity in bytes.
    fn capacity(&self) -> usize;

    /// Bytes currently in use, including alignment padding.
    fn used(&self) -> usize;

    /// Number of live allocations.
    fn allocation_count(&self) -> usize;

    /// Bytes still available.
    fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }
}

/// Rounds `offset` up to the next multiple of `alignment`.
#[inline]
pub(crate) const fn align_forward(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_forward() {
        assert_eq!(align_forward(0, 8), 0);
        assert_eq!(align_forward(1, 8), 8);
        assert_eq!(align_forward(17, 16), 32);
        assert_eq!(align_forward(5, 1), 5);
    }

    #[test]
    fn test_block_bounds() {
        let block = Block { offset: 16, size: 8 };
        assert_eq!(block.end(), 24);
        assert!(block.contains(16));
        assert!(block.contains(23));
        assert!(!block.contains(24));
    }
}
