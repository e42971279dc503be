//! # Memory Manager
//!
//! The global memory budget every manager draws its sub-allocations from.
//!
//! ## Out-of-order release
//!
//! The budget is a [`StackAllocator`], but chunk stores and managers are
//! torn down in whatever order their owners drop them. A release that is
//! not on top of the stack is parked; as soon as the blocks above it are
//! gone it is replayed. Whatever is still outstanding at teardown is
//! reported by [`MemoryManager::check_memory_leaks`].

use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::{Allocator, Block, MemoryError, StackAllocator};

/// A sub-allocation that was never released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryLeak {
    /// Name of the memory user that requested the block.
    pub user: &'static str,
    /// The outstanding block.
    pub block: Block,
}

#[derive(Debug)]
struct ManagerState {
    stack: StackAllocator,
    /// Live blocks in allocation order, tagged with their user.
    pending: Vec<(&'static str, Block)>,
    /// Blocks released while something above them was still live.
    freed: Vec<Block>,
}

/// Shared, internally synchronized global allocator.
///
/// Managers hold it through an `Arc` and release everything they were
/// given when they drop.
#[derive(Debug)]
pub struct MemoryManager {
    state: Mutex<ManagerState>,
    capacity: usize,
}

impl MemoryManager {
    /// Creates a memory manager with `capacity` bytes of global budget.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        info!(target: "MemoryManager", capacity, "Initialize MemoryManager");
        Self {
            state: Mutex::new(ManagerState {
                stack: StackAllocator::new(capacity),
                pending: Vec::new(),
                freed: Vec::new(),
            }),
            capacity,
        }
    }

    /// Total budget in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently reserved on the global stack.
    #[must_use]
    pub fn used(&self) -> usize {
        self.state.lock().stack.used()
    }

    /// Number of blocks that have not been returned to the stack yet.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of released blocks waiting for the blocks above them.
    #[must_use]
    pub fn deferred_count(&self) -> usize {
        self.state.lock().freed.len()
    }

    /// Reserves `size` bytes aligned to `alignment` on behalf of `user`.
    ///
    /// Returns `None` when the global budget is exhausted.
    pub fn allocate(&self, size: usize, alignment: usize, user: &'static str) -> Option<Block> {
        let mut state = self.state.lock();
        let block = state.stack.allocate(size, alignment)?;
        state.pending.push((user, block));
        debug!(target: "MemoryManager", user, size, offset = block.offset, "allocated global memory");
        Some(block)
    }

    /// Releases a block handed out by [`allocate`](Self::allocate).
    ///
    /// Releases that are not on top of the stack are deferred until they are.
    ///
    /// # Errors
    ///
    /// [`MemoryError::UnknownBlock`] if the block is not live.
    pub fn free(&self, block: Block) -> Result<(), MemoryError> {
        let mut state = self.state.lock();

        let is_top = state.pending.last().is_some_and(|&(_, top)| top == block);
        if !is_top {
            let is_live = state.pending.iter().any(|&(_, live)| live == block);
            if !is_live || state.freed.contains(&block) {
                return Err(MemoryError::UnknownBlock {
                    offset: block.offset,
                    size: block.size,
                });
            }
            state.freed.push(block);
            return Ok(());
        }

        state.stack.free(block)?;
        state.pending.pop();

        // Replay releases that were waiting on this block
        while let Some(&(_, top)) = state.pending.last() {
            let Some(position) = state.freed.iter().position(|&freed| freed == top) else {
                break;
            };
            state.freed.swap_remove(position);
            state.stack.free(top)?;
            state.pending.pop();
        }

        Ok(())
    }

    /// Reports every block that was allocated and never released.
    ///
    /// Each leak is logged at error level; an empty result is logged at info.
    pub fn check_memory_leaks(&self) -> Vec<MemoryLeak> {
        let state = self.state.lock();

        let leaks: Vec<MemoryLeak> = state
            .pending
            .iter()
            .filter(|(_, block)| !state.freed.contains(block))
            .map(|&(user, block)| MemoryLeak { user, block })
            .collect();

        if leaks.is_empty() {
            info!(target: "MemoryManager", "No memory leaks detected");
        } else {
            error!(target: "MemoryManager", count = leaks.len(), "MEMORY LEAK DETECTED");
            for leak in &leaks {
                error!(
                    target: "MemoryManager",
                    user = leak.user,
                    offset = leak.block.offset,
                    size = leak.block.size,
                    "memory user didn't release allocated memory"
                );
            }
        }

        leaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_release() {
        let memory = MemoryManager::new(1024);
        let a = memory.allocate(64, 8, "a").unwrap();
        let b = memory.allocate(64, 8, "b").unwrap();

        memory.free(b).unwrap();
        memory.free(a).unwrap();
        assert_eq!(memory.used(), 0);
        assert!(memory.check_memory_leaks().is_empty());
    }

    #[test]
    fn test_out_of_order_release_is_replayed() {
        let memory = MemoryManager::new(1024);
        let a = memory.allocate(64, 8, "a").unwrap();
        let b = memory.allocate(64, 8, "b").unwrap();
        let c = memory.allocate(64, 8, "c").unwrap();

        memory.free(a).unwrap();
        memory.free(b).unwrap();
        assert_eq!(memory.deferred_count(), 2);
        assert_eq!(memory.used(), 192);

        memory.free(c).unwrap();
        assert_eq!(memory.deferred_count(), 0);
        assert_eq!(memory.pending_count(), 0);
        assert_eq!(memory.used(), 0);
    }

    #[test]
    fn test_leak_report_names_user() {
        let memory = MemoryManager::new(1024);
        let a = memory.allocate(32, 8, "EntityManager").unwrap();
        let _b = memory.allocate(32, 8, "ComponentManager").unwrap();
        memory.free(a).unwrap();

        let leaks = memory.check_memory_leaks();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].user, "ComponentManager");
    }

    #[test]
    fn test_double_free_rejected() {
        let memory = MemoryManager::new(1024);
        let a = memory.allocate(32, 8, "a").unwrap();
        let _b = memory.allocate(32, 8, "b").unwrap();
        memory.free(a).unwrap();
        assert!(matches!(memory.free(a), Err(MemoryError::UnknownBlock { .. })));
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let memory = MemoryManager::new(100);
        assert!(memory.allocate(80, 1, "big").is_some());
        assert!(memory.allocate(80, 1, "too big").is_none());
        assert_eq!(memory.pending_count(), 1);
    }
}
