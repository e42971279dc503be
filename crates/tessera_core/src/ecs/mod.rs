//! # Entity Component System
//!
//! Entities, components and systems on top of the chunked object store.
//!
//! ## Layout
//!
//! - [`ChunkedStore`]: stable-address pool of fixed-capacity chunks
//! - [`EntityManager`]: entity stores, id table and deferred destruction
//! - [`ComponentManager`]: component stores and the entity → component map
//! - [`World`]: both managers, handed to systems every phase
//! - [`SystemManager`]: registration, work order and the three-phase tick

mod component;
mod entity;
mod scheduler;
mod storage;
mod system;
mod world;

pub use component::{Component, ComponentEntry, ComponentId, ComponentManager};
pub use entity::{AnyEntity, Entity, EntityEntry, EntityManager};
pub use scheduler::{SystemManager, WorkStateMask};
pub use storage::{ChunkId, ChunkedStore, SlotRef};
pub use system::{System, SystemPriority, SystemState};
pub use world::World;
