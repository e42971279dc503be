//! # Type Registry
//!
//! Assigns small dense ids to concrete entity, component and system types.
//!
//! Each family keeps its own counter, so the first component type ever
//! seen gets `ComponentTypeId(0)` regardless of how many entity or system
//! types exist. Ids are handed out in first-use order and never reused.
//!
//! A registry is an explicit object shared through `Arc` by every manager
//! of one world. Independent worlds (and tests) use independent registries.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use crate::error::{EcsError, EcsResult};

/// The three id families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    /// Concrete entity types.
    Entity,
    /// Concrete component types.
    Component,
    /// Concrete system types.
    System,
}

impl TypeFamily {
    const ALL: [Self; 3] = [Self::Entity, Self::Component, Self::System];

    #[inline]
    const fn slot(self) -> usize {
        match self {
            Self::Entity => 0,
            Self::Component => 1,
            Self::System => 2,
        }
    }
}

macro_rules! define_type_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// The id as a table index.
            #[inline]
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_type_id!(
    /// Dense id of a concrete entity type.
    EntityTypeId
);
define_type_id!(
    /// Dense id of a concrete component type.
    ComponentTypeId
);
define_type_id!(
    /// Dense id of a concrete system type.
    SystemTypeId
);

#[derive(Debug, Default)]
struct FamilyTable {
    ids: HashMap<TypeId, u32>,
    names: Vec<&'static str>,
}

impl FamilyTable {
    fn id_of<T: 'static>(&mut self) -> u32 {
        let next = self.names.len();
        *self.ids.entry(TypeId::of::<T>()).or_insert_with(|| {
            self.names.push(type_name::<T>());
            // Families never approach u32::MAX types
            u32::try_from(next).unwrap_or(u32::MAX)
        })
    }
}

/// Per-family type id allocator.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    families: Mutex<[FamilyTable; 3]>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of entity type `E`, assigning one on first use.
    pub fn entity_type_id<E: 'static>(&self) -> EntityTypeId {
        EntityTypeId(self.id_of::<E>(TypeFamily::Entity))
    }

    /// Returns the id of component type `C`, assigning one on first use.
    pub fn component_type_id<C: 'static>(&self) -> ComponentTypeId {
        ComponentTypeId(self.id_of::<C>(TypeFamily::Component))
    }

    /// Returns the id of system type `S`, assigning one on first use.
    pub fn system_type_id<S: 'static>(&self) -> SystemTypeId {
        SystemTypeId(self.id_of::<S>(TypeFamily::System))
    }

    /// Registers component type `C` ahead of first use.
    ///
    /// Useful to pin ids to a known order before any manager exists.
    pub fn register_component<C: 'static>(&self) -> ComponentTypeId {
        self.component_type_id::<C>()
    }

    /// Registers entity type `E` ahead of first use.
    pub fn register_entity<E: 'static>(&self) -> EntityTypeId {
        self.entity_type_id::<E>()
    }

    /// Registers system type `S` ahead of first use.
    pub fn register_system<S: 'static>(&self) -> SystemTypeId {
        self.system_type_id::<S>()
    }

    /// Looks up the id of `T` in `family` without assigning one.
    #[must_use]
    pub fn lookup<T: 'static>(&self, family: TypeFamily) -> Option<u32> {
        self.families.lock()[family.slot()]
            .ids
            .get(&TypeId::of::<T>())
            .copied()
    }

    /// Number of types registered in `family`.
    #[must_use]
    pub fn count(&self, family: TypeFamily) -> usize {
        self.families.lock()[family.slot()].names.len()
    }

    /// The Rust type name registered under `id` in `family`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredType`] if no type was ever given that id.
    pub fn type_name(&self, family: TypeFamily, id: u32) -> EcsResult<&'static str> {
        self.families.lock()[family.slot()]
            .names
            .get(id as usize)
            .copied()
            .ok_or(EcsError::UnregisteredType { family, id })
    }

    /// Total number of registered types across all families.
    #[must_use]
    pub fn total(&self) -> usize {
        TypeFamily::ALL.iter().map(|&family| self.count(family)).sum()
    }

    fn id_of<T: 'static>(&self, family: TypeFamily) -> u32 {
        self.families.lock()[family.slot()].id_of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    #[test]
    fn test_ids_in_first_use_order() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.component_type_id::<Beta>(), ComponentTypeId(0));
        assert_eq!(registry.component_type_id::<Alpha>(), ComponentTypeId(1));
        assert_eq!(registry.component_type_id::<Beta>(), ComponentTypeId(0));
        assert_eq!(registry.count(TypeFamily::Component), 2);
    }

    #[test]
    fn test_families_are_independent() {
        let registry = TypeRegistry::new();
        registry.register_component::<Alpha>();
        registry.register_component::<Beta>();

        assert_eq!(registry.system_type_id::<Alpha>(), SystemTypeId(0));
        assert_eq!(registry.entity_type_id::<Beta>(), EntityTypeId(0));
        assert_eq!(registry.total(), 4);
    }

    #[test]
    fn test_registries_do_not_share_counters() {
        let first = TypeRegistry::new();
        let second = TypeRegistry::new();
        first.register_system::<Alpha>();

        assert_eq!(second.system_type_id::<Beta>(), SystemTypeId(0));
        assert_eq!(second.lookup::<Alpha>(TypeFamily::System), None);
        assert_eq!(first.lookup::<Alpha>(TypeFamily::System), Some(0));
    }

    #[test]
    fn test_type_name_lookup() {
        let registry = TypeRegistry::new();
        let id = registry.register_entity::<Alpha>();

        let name = registry.type_name(TypeFamily::Entity, id.0).unwrap();
        assert!(name.ends_with("Alpha"));

        assert_eq!(
            registry.type_name(TypeFamily::Entity, 7),
            Err(EcsError::UnregisteredType {
                family: TypeFamily::Entity,
                id: 7
            })
        );
    }
}
