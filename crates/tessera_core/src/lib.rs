//! # Tessera Core
//!
//! Generic Entity Component System runtime:
//! - Generation-checked handles that detect stale references
//! - Chunked object stores with stable addresses
//! - Entity and component managers with deferred destruction
//! - A system scheduler deriving a deterministic work order from
//!   dependencies and priorities
//!
//! ## Architecture Rules
//!
//! 1. **One memory budget** - Every store draws from a shared [`MemoryManager`]
//! 2. **Explicit registries** - Type ids come from a [`TypeRegistry`] object,
//!    never from hidden global counters
//! 3. **Deferred destruction** - Entities die between ticks, never mid-tick
//! 4. **Single-threaded ticks** - Systems run cooperatively in work order
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera_core::{EcsConfig, MemoryManager, TypeRegistry, World};
//!
//! let config = EcsConfig::default();
//! let memory = Arc::new(MemoryManager::new(config.global_memory_bytes));
//! let mut world = World::new(memory, Arc::new(TypeRegistry::new()), &config);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod handle;
pub mod memory;
pub mod registry;

pub use config::EcsConfig;
pub use ecs::{
    AnyEntity, ChunkId, ChunkedStore, Component, ComponentEntry, ComponentId, ComponentManager, Entity,
    EntityEntry, EntityManager, SlotRef, System, SystemManager, SystemPriority, SystemState, WorkStateMask,
    World,
};
pub use error::{EcsError, EcsResult};
pub use handle::{EntityId, Handle, Handle32, Handle64, HandleTable};
pub use memory::{Allocator, Arena, Block, MemoryError, MemoryLeak, MemoryManager, PoolAllocator, PoolHandle, StackAllocator};
pub use registry::{ComponentTypeId, EntityTypeId, SystemTypeId, TypeFamily, TypeRegistry};
