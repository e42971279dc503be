//! # Entity Manager
//!
//! Entities are identified by a generation-checked [`EntityId`] and stored
//! in one [`ChunkedStore`] per concrete entity type.
//!
//! ## Deferred destruction
//!
//! [`EntityManager::destroy_entity`] only queues the id. The entity stays
//! fully resolvable until [`EntityManager::remove_destroyed_entities`]
//! drains the queue, which the engine does once per tick after every
//! system has run. Draining removes the entity's components, drops the
//! entity and releases its handle, after which the id is stale.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::component::ComponentManager;
use super::storage::{ChunkedStore, SlotRef};
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};
use crate::handle::{EntityId, HandleTable};
use crate::memory::MemoryManager;
use crate::registry::{EntityTypeId, TypeFamily, TypeRegistry};

/// A concrete kind of simulation object.
///
/// Both hooks run only when the active flag actually changes.
///
/// # Example
///
/// ```rust,ignore
/// struct Player { name: String }
///
/// impl Entity for Player {
///     fn on_disable(&mut self) {
///         tracing::info!("{} went idle", self.name);
///     }
/// }
/// ```
pub trait Entity: Any + Send {
    /// Called when the entity becomes active.
    fn on_enable(&mut self) {}

    /// Called when the entity becomes inactive.
    fn on_disable(&mut self) {}
}

/// An entity instance together with its identity and active flag.
#[derive(Debug)]
pub struct EntityEntry<E> {
    id: EntityId,
    active: bool,
    data: E,
}

impl<E: Entity> EntityEntry<E> {
    /// The entity's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Whether the entity is active.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Changes the active flag, running the matching hook on a change.
    pub fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        if active {
            self.data.on_enable();
        } else {
            self.data.on_disable();
        }
    }

    /// The entity data.
    #[inline]
    #[must_use]
    pub const fn data(&self) -> &E {
        &self.data
    }

    /// The entity data, mutably.
    #[inline]
    pub fn data_mut(&mut self) -> &mut E {
        &mut self.data
    }
}

impl<E> Deref for EntityEntry<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.data
    }
}

impl<E> DerefMut for EntityEntry<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.data
    }
}

/// Type-erased access to an entity of any concrete type.
pub trait AnyEntity: Any + Send {
    /// The entity's id.
    fn id(&self) -> EntityId;
    /// Whether the entity is active.
    fn is_active(&self) -> bool;
    /// Changes the active flag, running the matching hook on a change.
    fn set_active(&mut self, active: bool);
    /// Name of the concrete entity type.
    fn entity_type_name(&self) -> &'static str;
    /// Upcast for downcasting to [`EntityEntry<E>`].
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting to [`EntityEntry<E>`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: Entity> AnyEntity for EntityEntry<E> {
    fn id(&self) -> EntityId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        EntityEntry::set_active(self, active);
    }

    fn entity_type_name(&self) -> &'static str {
        type_name::<E>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

trait EntityContainer: Send {
    fn type_name(&self) -> &'static str;
    fn destroy(&mut self, slot: SlotRef) -> bool;
    fn get(&self, slot: SlotRef) -> Option<&dyn AnyEntity>;
    fn get_mut(&mut self, slot: SlotRef) -> Option<&mut dyn AnyEntity>;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: Entity> EntityContainer for ChunkedStore<EntityEntry<E>> {
    fn type_name(&self) -> &'static str {
        type_name::<E>()
    }

    fn destroy(&mut self, slot: SlotRef) -> bool {
        ChunkedStore::destroy(self, slot).is_some()
    }

    fn get(&self, slot: SlotRef) -> Option<&dyn AnyEntity> {
        ChunkedStore::get(self, slot).map(|entry| entry as &dyn AnyEntity)
    }

    fn get_mut(&mut self, slot: SlotRef) -> Option<&mut dyn AnyEntity> {
        ChunkedStore::get_mut(self, slot).map(|entry| entry as &mut dyn AnyEntity)
    }

    fn len(&self) -> usize {
        ChunkedStore::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Clone, Copy, Debug)]
struct EntityLocation {
    type_id: EntityTypeId,
    slot: SlotRef,
}

/// Creates entities, resolves ids and runs deferred destruction.
pub struct EntityManager {
    memory: Arc<MemoryManager>,
    registry: Arc<TypeRegistry>,
    containers: HashMap<EntityTypeId, Box<dyn EntityContainer>>,
    handles: HandleTable<EntityLocation, EntityId>,
    pending_destroy: Vec<EntityId>,
    /// Reused buffer for the batch being drained.
    draining: Vec<EntityId>,
    chunk_capacity: usize,
}

impl EntityManager {
    /// Creates an entity manager drawing chunk memory from `memory`.
    #[must_use]
    pub fn new(memory: Arc<MemoryManager>, registry: Arc<TypeRegistry>, config: &EcsConfig) -> Self {
        info!(target: "EntityManager", "Initialize EntityManager");
        Self {
            memory,
            registry,
            containers: HashMap::new(),
            handles: HandleTable::with_grow(config.entity_table_grow),
            pending_destroy: Vec::with_capacity(config.pending_destroy_reserve),
            draining: Vec::with_capacity(config.pending_destroy_reserve),
            chunk_capacity: config.entity_chunk_capacity.max(1),
        }
    }

    /// Creates an entity and returns its id.
    ///
    /// # Errors
    ///
    /// - [`EcsError::OutOfMemory`] if a new chunk cannot be reserved
    /// - [`EcsError::HandleTableFull`] if no more ids can be issued
    pub fn create_entity<E: Entity>(&mut self, entity: E) -> EcsResult<EntityId> {
        self.create_entity_with(|_| entity)
    }

    /// Creates an entity whose constructor receives its own id.
    ///
    /// The id is issued and stamped before `build` runs.
    ///
    /// # Errors
    ///
    /// Same as [`create_entity`](Self::create_entity).
    pub fn create_entity_with<E, F>(&mut self, build: F) -> EcsResult<EntityId>
    where
        E: Entity,
        F: FnOnce(EntityId) -> E,
    {
        let type_id = self.registry.entity_type_id::<E>();
        let store = container_for::<E>(&mut self.containers, type_id, &self.memory, self.chunk_capacity)?;

        let handles = &mut self.handles;
        let (_, entry) = store.create_with(|slot| {
            let id = handles.acquire(EntityLocation { type_id, slot })?;
            Ok(EntityEntry {
                id,
                active: true,
                data: build(id),
            })
        })?;

        Ok(entry.id)
    }

    /// Queues an entity for destruction at the end of the tick.
    ///
    /// The entity stays resolvable until
    /// [`remove_destroyed_entities`](Self::remove_destroyed_entities) runs.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if `id` is stale.
    pub fn destroy_entity(&mut self, id: EntityId) -> EcsResult<()> {
        if !self.handles.contains(id) {
            return Err(EcsError::EntityNotFound(id));
        }
        self.pending_destroy.push(id);
        Ok(())
    }

    /// Destroys every entity queued before this call.
    ///
    /// For each queued id: removes all its components, drops the entity and
    /// releases its handle. Ids queued more than once are destroyed once.
    ///
    /// Returns the number of entities destroyed.
    pub fn remove_destroyed_entities(&mut self, components: &mut ComponentManager) -> usize {
        if self.pending_destroy.is_empty() {
            return 0;
        }

        let mut batch = std::mem::replace(&mut self.pending_destroy, std::mem::take(&mut self.draining));
        let mut destroyed = 0;

        for id in batch.drain(..) {
            let Some(location) = self.handles.get(id) else {
                warn!(target: "EntityManager", %id, "entity already destroyed, skipping");
                continue;
            };

            components.remove_all_components(id);

            let removed = self
                .containers
                .get_mut(&location.type_id)
                .is_some_and(|container| container.destroy(location.slot));
            if !removed {
                warn!(target: "EntityManager", %id, "entity object missing from its container");
            }

            match self.handles.release(id) {
                Ok(_) => destroyed += 1,
                Err(err) => warn!(target: "EntityManager", %id, %err, "failed to release entity handle"),
            }
        }

        self.draining = batch;
        debug!(target: "EntityManager", destroyed, "removed destroyed entities");
        destroyed
    }

    /// Resolves an id to its entity.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&dyn AnyEntity> {
        let location = self.handles.get(id)?;
        self.containers.get(&location.type_id)?.get(location.slot)
    }

    /// Resolves an id to its entity, mutably.
    pub fn get_entity_mut(&mut self, id: EntityId) -> Option<&mut dyn AnyEntity> {
        let location = self.handles.get(id)?;
        self.containers.get_mut(&location.type_id)?.get_mut(location.slot)
    }

    /// Resolves an id to an entity of concrete type `E`.
    #[must_use]
    pub fn get_entity_as<E: Entity>(&self, id: EntityId) -> Option<&EntityEntry<E>> {
        self.get_entity(id)?.as_any().downcast_ref()
    }

    /// Resolves an id to an entity of concrete type `E`, mutably.
    pub fn get_entity_as_mut<E: Entity>(&mut self, id: EntityId) -> Option<&mut EntityEntry<E>> {
        self.get_entity_mut(id)?.as_any_mut().downcast_mut()
    }

    /// The current id of the handle slot at `index`.
    ///
    /// The id may be stale if the slot is not live.
    #[must_use]
    pub fn get_entity_id(&self, index: usize) -> Option<EntityId> {
        self.handles.handle_at(index)
    }

    /// Whether `id` resolves to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.handles.contains(id)
    }

    /// Whether `id` is queued for destruction.
    #[must_use]
    pub fn is_pending_destroy(&self, id: EntityId) -> bool {
        self.pending_destroy.contains(&id)
    }

    /// Changes an entity's active flag.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if `id` is stale.
    pub fn set_active(&mut self, id: EntityId, active: bool) -> EcsResult<()> {
        self.get_entity_mut(id)
            .ok_or(EcsError::EntityNotFound(id))?
            .set_active(active);
        Ok(())
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no entity is alive.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of ids waiting for destruction.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending_destroy.len()
    }

    /// Number of live entities of type `E`.
    #[must_use]
    pub fn count<E: Entity>(&self) -> usize {
        self.store::<E>().map_or(0, ChunkedStore::len)
    }

    /// Iterates over every live `E` in store order.
    pub fn iter<E: Entity>(&self) -> impl Iterator<Item = &EntityEntry<E>> {
        self.store::<E>()
            .into_iter()
            .flat_map(|store| store.iter().map(|(_, entry)| entry))
    }

    /// Iterates mutably over every live `E` in store order.
    pub fn iter_mut<E: Entity>(&mut self) -> impl Iterator<Item = &mut EntityEntry<E>> {
        self.store_mut::<E>()
            .into_iter()
            .flat_map(|store| store.iter_mut().map(|(_, entry)| entry))
    }

    /// Iterates over the ids of every live entity in slot order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.handles.iter().map(|(id, _)| id)
    }

    fn store<E: Entity>(&self) -> Option<&ChunkedStore<EntityEntry<E>>> {
        let type_id = self.registry.lookup::<E>(TypeFamily::Entity).map(EntityTypeId)?;
        self.containers.get(&type_id)?.as_any().downcast_ref()
    }

    fn store_mut<E: Entity>(&mut self) -> Option<&mut ChunkedStore<EntityEntry<E>>> {
        let type_id = self.registry.lookup::<E>(TypeFamily::Entity).map(EntityTypeId)?;
        self.containers.get_mut(&type_id)?.as_any_mut().downcast_mut()
    }
}

fn container_for<'a, E: Entity>(
    containers: &'a mut HashMap<EntityTypeId, Box<dyn EntityContainer>>,
    type_id: EntityTypeId,
    memory: &Arc<MemoryManager>,
    chunk_capacity: usize,
) -> EcsResult<&'a mut ChunkedStore<EntityEntry<E>>> {
    containers
        .entry(type_id)
        .or_insert_with(|| {
            debug!(target: "EntityManager", entity = type_name::<E>(), "created entity container");
            Box::new(ChunkedStore::<EntityEntry<E>>::new(
                Arc::clone(memory),
                chunk_capacity,
                "EntityContainer",
            ))
        })
        .as_any_mut()
        .downcast_mut()
        .ok_or(EcsError::ContainerTypeMismatch(type_name::<E>()))
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let containers: Vec<(&'static str, usize)> = self
            .containers
            .values()
            .map(|container| (container.type_name(), container.len()))
            .collect();
        f.debug_struct("EntityManager")
            .field("containers", &containers)
            .field("live", &self.handles.len())
            .field("pending_destroy", &self.pending_destroy.len())
            .finish_non_exhaustive()
    }
}

impl Drop for EntityManager {
    fn drop(&mut self) {
        info!(target: "EntityManager", remaining = self.handles.len(), "Release EntityManager");
    }
}
