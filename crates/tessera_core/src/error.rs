//! # ECS Error Types
//!
//! All errors that can occur in the runtime.
//!
//! Two classes exist: resource exhaustion ([`EcsError::OutOfMemory`]) and
//! contract violations (everything else). Contract violations are always
//! reported before any state is touched, so the identity and mapping
//! tables stay consistent after an error.

use thiserror::Error;

use crate::handle::EntityId;
use crate::memory::MemoryError;
use crate::registry::TypeFamily;

/// Errors that can occur in the ECS runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// An allocator could not satisfy a creation request.
    #[error("out of memory: {user} requested {requested} bytes")]
    OutOfMemory {
        /// The memory user that made the request.
        user: &'static str,
        /// The number of bytes requested.
        requested: usize,
    },

    /// A handle was released or dereferenced while not currently valid.
    #[error("invalid handle: index {index}, generation {generation}")]
    InvalidHandle {
        /// Slot index carried by the handle.
        index: u64,
        /// Generation carried by the handle.
        generation: u64,
    },

    /// The handle table cannot grow any further.
    #[error("handle table full: capacity {capacity}")]
    HandleTableFull {
        /// Maximum number of slots for the handle layout.
        capacity: u64,
    },

    /// The entity id does not resolve to a live entity.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The entity does not own a component of the requested type.
    #[error("entity {entity} has no component of type {component}")]
    ComponentNotPresent {
        /// The entity that was queried.
        entity: EntityId,
        /// The component type name.
        component: &'static str,
    },

    /// The entity already owns a component of this type.
    #[error("entity {entity} already has a component of type {component}")]
    ComponentAlreadyPresent {
        /// The entity that was queried.
        entity: EntityId,
        /// The component type name.
        component: &'static str,
    },

    /// A type id was looked up in a family it was never registered in.
    #[error("unregistered {family:?} type id {id}")]
    UnregisteredType {
        /// The type family.
        family: TypeFamily,
        /// The unknown id.
        id: u32,
    },

    /// The system type has not been added to the system manager.
    #[error("system not registered: {0}")]
    SystemNotRegistered(&'static str),

    /// A work-state mask does not match the current work order.
    #[error("work state mask has {actual} entries, work order has {expected}")]
    WorkStateMismatch {
        /// Current work-order length.
        expected: usize,
        /// Supplied mask length.
        actual: usize,
    },

    /// A type-erased container held a different concrete type than requested.
    #[error("container type mismatch for {0}")]
    ContainerTypeMismatch(&'static str),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An allocator contract was broken.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;
