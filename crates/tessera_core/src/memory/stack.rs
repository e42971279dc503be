//! # Stack Allocator
//!
//! LIFO allocator: blocks are released in reverse order of allocation.

use super::{align_forward, Allocator, Block, MemoryError};

/// One allocation on the stack and the offset to rewind to when it is freed.
#[derive(Clone, Copy, Debug)]
struct Frame {
    block: Block,
    previous_offset: usize,
}

/// A stack allocator over a fixed byte budget.
///
/// Only the most recent live block can be freed. Releasing it rewinds
/// the top of the stack to where it was before that block (padding
/// included). Callers that cannot guarantee LIFO order should go through
/// [`MemoryManager`](super::MemoryManager), which buffers early releases.
#[derive(Debug)]
pub struct StackAllocator {
    frames: Vec<Frame>,
    offset: usize,
    capacity: usize,
}

impl StackAllocator {
    /// Creates a new stack allocator with the specified capacity in bytes.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            frames: Vec::new(),
            offset: 0,
            capacity,
        }
    }

    /// The block on top of the stack, if any.
    #[inline]
    #[must_use]
    pub fn top(&self) -> Option<Block> {
        self.frames.last().map(|frame| frame.block)
    }
}

impl Allocator for StackAllocator {
    fn allocate(&mut self, size: usize, alignment: usize) -> Option<Block> {
        debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");

        let aligned_offset = align_forward(self.offset, alignment);
        let new_offset = aligned_offset.checked_add(size)?;
        if new_offset > self.capacity {
            return None;
        }

        let block = Block {
            offset: aligned_offset,
            size,
        };
        self.frames.push(Frame {
            block,
            previous_offset: self.offset,
        });
        self.offset = new_offset;

        Some(block)
    }

    fn free(&mut self, block: Block) -> Result<(), MemoryError> {
        match self.frames.last() {
            Some(frame) if frame.block == block => {
                self.offset = frame.previous_offset;
                self.frames.pop();
                Ok(())
            }
            Some(_) if self.frames.iter().any(|frame| frame.block == block) => {
                Err(MemoryError::OutOfOrderFree {
                    offset: block.offset,
                })
            }
            _ => Err(MemoryError::UnknownBlock {
                offset: block.offset,
                size: block.size,
            }),
        }
    }

    fn clear(&mut self) {
        self.frames.clear();
        self.offset = 0;
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
        self.frames.len()
    }
}
