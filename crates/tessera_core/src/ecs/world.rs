//! # World
//!
//! The entity and component managers of one simulation, side by side.
//!
//! Entity-scoped component calls go through the world so the entity can be
//! validated first. Systems receive `&mut World` in every phase.

use std::sync::Arc;

use super::component::{Component, ComponentEntry, ComponentManager};
use super::entity::{AnyEntity, Entity, EntityEntry, EntityManager};
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};
use crate::handle::EntityId;
use crate::memory::MemoryManager;
use crate::registry::TypeRegistry;

/// Container for all entities and their components.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = World::new(memory, registry, &EcsConfig::default());
///
/// let player = world.create_entity(Player::default())?;
/// world.add_component(player, Health(100))?;
///
/// world.destroy_entity(player)?;
/// world.remove_destroyed_entities();
/// ```
#[derive(Debug)]
pub struct World {
    entities: EntityManager,
    components: ComponentManager,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new(memory: Arc<MemoryManager>, registry: Arc<TypeRegistry>, config: &EcsConfig) -> Self {
        Self {
            entities: EntityManager::new(Arc::clone(&memory), Arc::clone(&registry), config),
            components: ComponentManager::new(memory, registry, config),
        }
    }

    /// The entity manager.
    #[inline]
    #[must_use]
    pub const fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// The entity manager, mutably.
    #[inline]
    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    /// The component manager.
    #[inline]
    #[must_use]
    pub const fn components(&self) -> &ComponentManager {
        &self.components
    }

    /// The component manager, mutably.
    #[inline]
    pub fn components_mut(&mut self) -> &mut ComponentManager {
        &mut self.components
    }

    /// Both managers at once.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut EntityManager, &mut ComponentManager) {
        (&mut self.entities, &mut self.components)
    }

    /// Creates an entity. See [`EntityManager::create_entity`].
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfMemory`] or [`EcsError::HandleTableFull`].
    pub fn create_entity<E: Entity>(&mut self, entity: E) -> EcsResult<EntityId> {
        self.entities.create_entity(entity)
    }

    /// Creates an entity whose constructor receives its own id.
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfMemory`] or [`EcsError::HandleTableFull`].
    pub fn create_entity_with<E, F>(&mut self, build: F) -> EcsResult<EntityId>
    where
        E: Entity,
        F: FnOnce(EntityId) -> E,
    {
        self.entities.create_entity_with(build)
    }

    /// Queues an entity for destruction at the end of the tick.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if `id` is stale.
    pub fn destroy_entity(&mut self, id: EntityId) -> EcsResult<()> {
        self.entities.destroy_entity(id)
    }

    /// Destroys every queued entity together with its components.
    pub fn remove_destroyed_entities(&mut self) -> usize {
        self.entities.remove_destroyed_entities(&mut self.components)
    }

    /// Whether `id` resolves to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
    }

    /// Resolves an id to its entity.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&dyn AnyEntity> {
        self.entities.get_entity(id)
    }

    /// Resolves an id to an entity of concrete type `E`.
    #[must_use]
    pub fn get_entity_as<E: Entity>(&self, id: EntityId) -> Option<&EntityEntry<E>> {
        self.entities.get_entity_as(id)
    }

    /// Resolves an id to an entity of concrete type `E`, mutably.
    pub fn get_entity_as_mut<E: Entity>(&mut self, id: EntityId) -> Option<&mut EntityEntry<E>> {
        self.entities.get_entity_as_mut(id)
    }

    /// Attaches `component` to a live entity.
    ///
    /// # Errors
    ///
    /// - [`EcsError::EntityNotFound`] if `entity` is stale
    /// - [`EcsError::ComponentAlreadyPresent`] if it already owns a `C`
    /// - [`EcsError::OutOfMemory`] if a new chunk cannot be reserved
    pub fn add_component<C: Component>(
        &mut self,
        entity: EntityId,
        component: C,
    ) -> EcsResult<&mut ComponentEntry<C>> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        self.components.add_component(entity, component)
    }

    /// Detaches the `C` owned by a live entity and returns its data.
    ///
    /// # Errors
    ///
    /// - [`EcsError::EntityNotFound`] if `entity` is stale
    /// - [`EcsError::ComponentNotPresent`] if it owns no `C`
    pub fn remove_component<C: Component>(&mut self, entity: EntityId) -> EcsResult<C> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        self.components.remove_component(entity)
    }

    /// The `C` owned by a live entity.
    #[must_use]
    pub fn get_component<C: Component>(&self, entity: EntityId) -> Option<&ComponentEntry<C>> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.components.get_component(entity)
    }

    /// The `C` owned by a live entity, mutably.
    pub fn get_component_mut<C: Component>(&mut self, entity: EntityId) -> Option<&mut ComponentEntry<C>> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.components.get_component_mut(entity)
    }

    /// Whether a live entity owns a `C`.
    #[must_use]
    pub fn has_component<C: Component>(&self, entity: EntityId) -> bool {
        self.get_component::<C>(entity).is_some()
    }
}
