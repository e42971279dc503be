//! # Component Manager
//!
//! Owns every component instance and the entity → component mapping.
//!
//! Storage is split in three layers:
//! - One [`ChunkedStore`] per concrete component type
//! - A lookup table indexed by [`ComponentId`] pointing into those stores
//! - An entity × component-type matrix whose cells hold a [`ComponentId`]
//!
//! Rows of the matrix are indexed by entity slot index and grow in blocks
//! alongside the entity handle table. Columns are added per row on demand,
//! so component types first seen late still get a cell.
//!
//! A cell is filled iff the referenced lookup slot holds a live component
//! owned by that entity.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, info};

use super::storage::{ChunkedStore, SlotRef};
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};
use crate::handle::EntityId;
use crate::memory::MemoryManager;
use crate::registry::{ComponentTypeId, TypeFamily, TypeRegistry};

/// Marker trait for data attached to entities.
///
/// # Example
///
/// ```rust,ignore
/// struct Health(f32);
/// impl Component for Health {}
/// ```
pub trait Component: Any + Send {}

/// Reusable index of a component instance.
///
/// Carries no generation: an id is only meaningful while its component lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    /// The id as a table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A component instance together with its identity fields.
#[derive(Debug)]
pub struct ComponentEntry<C> {
    id: ComponentId,
    owner: EntityId,
    fingerprint: u64,
    enabled: bool,
    data: C,
}

impl<C> ComponentEntry<C> {
    fn new(id: ComponentId, owner: EntityId, data: C) -> Self {
        Self {
            id,
            owner,
            fingerprint: u64::from(owner.raw()) ^ (u64::from(id.0) << 1),
            enabled: true,
            data,
        }
    }

    /// Id of this instance.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// The owning entity.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> EntityId {
        self.owner
    }

    /// Identity hash combining owner and component id.
    #[inline]
    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Whether the component is enabled.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the component.
    #[inline]
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// The component data.
    #[inline]
    #[must_use]
    pub const fn data(&self) -> &C {
        &self.data
    }

    /// The component data, mutably.
    #[inline]
    pub fn data_mut(&mut self) -> &mut C {
        &mut self.data
    }
}

impl<C> Deref for ComponentEntry<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.data
    }
}

impl<C> DerefMut for ComponentEntry<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.data
    }
}

/// Type-erased view of one component type's store.
trait ComponentContainer: Send {
    fn type_name(&self) -> &'static str;
    fn destroy(&mut self, slot: SlotRef) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Component> ComponentContainer for ChunkedStore<ComponentEntry<C>> {
    fn type_name(&self) -> &'static str {
        type_name::<C>()
    }

    fn destroy(&mut self, slot: SlotRef) -> bool {
        ChunkedStore::destroy(self, slot).is_some()
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
struct ComponentLocation {
    type_id: ComponentTypeId,
    slot: SlotRef,
}

/// Creates, destroys and looks up components by owning entity.
pub struct ComponentManager {
    memory: Arc<MemoryManager>,
    registry: Arc<TypeRegistry>,
    containers: HashMap<ComponentTypeId, Box<dyn ComponentContainer>>,
    /// Indexed by [`ComponentId`].
    lookup: Vec<Option<ComponentLocation>>,
    /// Row per entity slot index, column per component type.
    entity_components: Vec<Vec<Option<ComponentId>>>,
    chunk_capacity: usize,
    lookup_grow: usize,
    entity_grow: usize,
}

impl ComponentManager {
    /// Creates a component manager drawing chunk memory from `memory`.
    #[must_use]
    pub fn new(memory: Arc<MemoryManager>, registry: Arc<TypeRegistry>, config: &EcsConfig) -> Self {
        info!(target: "ComponentManager", "Initialize ComponentManager");

        let mut manager = Self {
            memory,
            registry,
            containers: HashMap::new(),
            lookup: Vec::new(),
            entity_components: Vec::new(),
            chunk_capacity: config.component_chunk_capacity.max(1),
            lookup_grow: config.component_table_grow.max(1),
            entity_grow: config.entity_table_grow.max(1),
        };
        manager.lookup.resize(manager.lookup_grow, None);
        let columns = manager.registry.count(TypeFamily::Component);
        manager
            .entity_components
            .resize(manager.entity_grow, vec![None; columns]);
        manager
    }

    /// Attaches `component` to `entity`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::ComponentAlreadyPresent`] if the entity already owns a `C`
    /// - [`EcsError::OutOfMemory`] if a new chunk cannot be reserved
    pub fn add_component<C: Component>(
        &mut self,
        entity: EntityId,
        component: C,
    ) -> EcsResult<&mut ComponentEntry<C>> {
        let type_id = self.registry.component_type_id::<C>();
        let row = entity.index() as usize;
        let column = type_id.index();

        if self.cell(row, column).is_some() {
            return Err(EcsError::ComponentAlreadyPresent {
                entity,
                component: type_name::<C>(),
            });
        }

        let id = self.next_component_id();
        let store = container_for::<C>(&mut self.containers, type_id, &self.memory, self.chunk_capacity)?;
        let (slot, entry) = store.create_with(|_| Ok(ComponentEntry::new(id, entity, component)))?;

        self.lookup[id.index()] = Some(ComponentLocation { type_id, slot });

        while self.entity_components.len() <= row {
            let new_len = self.entity_components.len() + self.entity_grow;
            self.entity_components.resize(new_len, Vec::new());
        }
        let cells = &mut self.entity_components[row];
        if cells.len() <= column {
            cells.resize(column + 1, None);
        }
        cells[column] = Some(id);

        Ok(entry)
    }

    /// Detaches the `C` owned by `entity` and returns its data.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentNotPresent`] if the entity owns no `C`.
    pub fn remove_component<C: Component>(&mut self, entity: EntityId) -> EcsResult<C> {
        let not_present = EcsError::ComponentNotPresent {
            entity,
            component: type_name::<C>(),
        };

        let Some(type_id) = self.registered_type::<C>() else {
            return Err(not_present);
        };
        let row = entity.index() as usize;
        let Some(id) = self.cell(row, type_id.index()) else {
            return Err(not_present);
        };
        let Some(location) = self.lookup.get(id.index()).copied().flatten() else {
            return Err(not_present);
        };

        let store = self
            .containers
            .get_mut(&type_id)
            .and_then(|container| container.as_any_mut().downcast_mut::<ChunkedStore<ComponentEntry<C>>>())
            .ok_or(EcsError::ContainerTypeMismatch(type_name::<C>()))?;

        if store.get(location.slot).map(ComponentEntry::owner) != Some(entity) {
            return Err(not_present);
        }
        let entry = store.destroy(location.slot).ok_or(not_present)?;

        self.lookup[id.index()] = None;
        self.entity_components[row][type_id.index()] = None;

        Ok(entry.data)
    }

    /// Removes every component owned by `entity`, whatever its type.
    ///
    /// Returns the number of components removed.
    pub fn remove_all_components(&mut self, entity: EntityId) -> usize {
        let row = entity.index() as usize;
        let Some(cells) = self.entity_components.get_mut(row) else {
            return 0;
        };

        let mut removed = 0;
        for cell in cells.iter_mut() {
            let Some(id) = cell.take() else {
                continue;
            };
            let Some(location) = self.lookup.get_mut(id.index()).and_then(Option::take) else {
                continue;
            };
            if let Some(container) = self.containers.get_mut(&location.type_id) {
                if container.destroy(location.slot) {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!(target: "ComponentManager", %entity, removed, "removed all components");
        }
        removed
    }

    /// The `C` owned by `entity`, if any.
    #[must_use]
    pub fn get_component<C: Component>(&self, entity: EntityId) -> Option<&ComponentEntry<C>> {
        let location = self.location_of::<C>(entity)?;
        self.store::<C>()?
            .get(location.slot)
            .filter(|entry| entry.owner == entity)
    }

    /// The `C` owned by `entity`, mutably.
    pub fn get_component_mut<C: Component>(&mut self, entity: EntityId) -> Option<&mut ComponentEntry<C>> {
        let location = self.location_of::<C>(entity)?;
        self.store_mut::<C>()?
            .get_mut(location.slot)
            .filter(|entry| entry.owner == entity)
    }

    /// Whether `entity` owns a `C`.
    #[must_use]
    pub fn has_component<C: Component>(&self, entity: EntityId) -> bool {
        self.get_component::<C>(entity).is_some()
    }

    /// Number of components owned by `entity`.
    #[must_use]
    pub fn component_count(&self, entity: EntityId) -> usize {
        self.entity_components
            .get(entity.index() as usize)
            .map_or(0, |cells| cells.iter().filter(|cell| cell.is_some()).count())
    }

    /// Number of live components of type `C`.
    #[must_use]
    pub fn len<C: Component>(&self) -> usize {
        self.store::<C>().map_or(0, ChunkedStore::len)
    }

    /// Number of live components across all types.
    #[must_use]
    pub fn total_components(&self) -> usize {
        self.containers.values().map(|container| container.len()).sum()
    }

    /// Iterates over every live `C` in store order.
    pub fn iter<C: Component>(&self) -> impl Iterator<Item = &ComponentEntry<C>> {
        self.store::<C>()
            .into_iter()
            .flat_map(|store| store.iter().map(|(_, entry)| entry))
    }

    /// Iterates mutably over every live `C` in store order.
    pub fn iter_mut<C: Component>(&mut self) -> impl Iterator<Item = &mut ComponentEntry<C>> {
        self.store_mut::<C>()
            .into_iter()
            .flat_map(|store| store.iter_mut().map(|(_, entry)| entry))
    }

    /// Capacity of the component id table.
    #[inline]
    #[must_use]
    pub fn id_capacity(&self) -> usize {
        self.lookup.len()
    }

    fn registered_type<C: Component>(&self) -> Option<ComponentTypeId> {
        self.registry
            .lookup::<C>(TypeFamily::Component)
            .map(ComponentTypeId)
    }

    fn cell(&self, row: usize, column: usize) -> Option<ComponentId> {
        self.entity_components.get(row)?.get(column).copied().flatten()
    }

    fn location_of<C: Component>(&self, entity: EntityId) -> Option<ComponentLocation> {
        let type_id = self.registered_type::<C>()?;
        let id = self.cell(entity.index() as usize, type_id.index())?;
        self.lookup.get(id.index()).copied().flatten()
    }

    fn store<C: Component>(&self) -> Option<&ChunkedStore<ComponentEntry<C>>> {
        self.containers
            .get(&self.registered_type::<C>()?)?
            .as_any()
            .downcast_ref()
    }

    fn store_mut<C: Component>(&mut self) -> Option<&mut ChunkedStore<ComponentEntry<C>>> {
        let type_id = self.registered_type::<C>()?;
        self.containers.get_mut(&type_id)?.as_any_mut().downcast_mut()
    }

    /// First free id, growing the table by a block when none is left.
    fn next_component_id(&mut self) -> ComponentId {
        let index = match self.lookup.iter().position(Option::is_none) {
            Some(index) => index,
            None => {
                let index = self.lookup.len();
                self.lookup.resize(index + self.lookup_grow, None);
                debug!(target: "ComponentManager", capacity = self.lookup.len(), "grew component table");
                index
            }
        };
        ComponentId(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

fn container_for<'a, C: Component>(
    containers: &'a mut HashMap<ComponentTypeId, Box<dyn ComponentContainer>>,
    type_id: ComponentTypeId,
    memory: &Arc<MemoryManager>,
    chunk_capacity: usize,
) -> EcsResult<&'a mut ChunkedStore<ComponentEntry<C>>> {
    containers
        .entry(type_id)
        .or_insert_with(|| {
            debug!(target: "ComponentManager", component = type_name::<C>(), "created component container");
            Box::new(ChunkedStore::<ComponentEntry<C>>::new(
                Arc::clone(memory),
                chunk_capacity,
                "ComponentContainer",
            ))
        })
        .as_any_mut()
        .downcast_mut()
        .ok_or(EcsError::ContainerTypeMismatch(type_name::<C>()))
}

impl fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let containers: Vec<(&'static str, usize)> = self
            .containers
            .values()
            .map(|container| (container.type_name(), container.len()))
            .collect();
        f.debug_struct("ComponentManager")
            .field("containers", &containers)
            .field("id_capacity", &self.lookup.len())
            .field("rows", &self.entity_components.len())
            .finish_non_exhaustive()
    }
}

impl Drop for ComponentManager {
    fn drop(&mut self) {
        info!(
            target: "ComponentManager",
            remaining = self.total_components(),
            "Release ComponentManager"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(f32, f32);
    impl Component for Position {}

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    fn manager() -> ComponentManager {
        let config = EcsConfig {
            component_table_grow: 4,
            entity_table_grow: 4,
            component_chunk_capacity: 2,
            ..EcsConfig::default()
        };
        ComponentManager::new(
            Arc::new(MemoryManager::new(1 << 20)),
            Arc::new(TypeRegistry::new()),
            &config,
        )
    }

    #[test]
    fn test_add_then_get() {
        let mut components = manager();
        let entity = EntityId::new(3, 1);

        let entry = components.add_component(entity, Position(1.0, 2.0)).unwrap();
        assert_eq!(entry.owner(), entity);
        assert!(entry.is_enabled());
        let id = entry.id();

        let found = components.get_component::<Position>(entity).unwrap();
        assert_eq!(found.id(), id);
        assert_eq!(**found, Position(1.0, 2.0));
        assert!(components.get_component::<Health>(entity).is_none());
    }

    #[test]
    fn test_fingerprint_combines_owner_and_id() {
        let mut components = manager();
        let entity = EntityId::new(5, 2);
        let entry = components.add_component(entity, Health(10)).unwrap();
        let expected = u64::from(entity.raw()) ^ (u64::from(entry.id().0) << 1);
        assert_eq!(entry.fingerprint(), expected);
    }

    #[test]
    fn test_remove_then_get_is_empty() {
        let mut components = manager();
        let entity = EntityId::new(0, 1);
        components.add_component(entity, Health(3)).unwrap();

        assert_eq!(components.remove_component::<Health>(entity).unwrap(), Health(3));
        assert!(components.get_component::<Health>(entity).is_none());
        assert!(matches!(
            components.remove_component::<Health>(entity),
            Err(EcsError::ComponentNotPresent { .. })
        ));
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let mut components = manager();
        let entity = EntityId::new(1, 1);
        components.add_component(entity, Health(1)).unwrap();
        assert!(matches!(
            components.add_component(entity, Health(2)),
            Err(EcsError::ComponentAlreadyPresent { .. })
        ));
        assert_eq!(components.get_component::<Health>(entity).map(|h| h.0), Some(1));
    }

    #[test]
    fn test_remove_all_frees_ids() {
        let mut components = manager();
        let entity = EntityId::new(2, 1);
        let other = EntityId::new(3, 1);
        let first = components.add_component(entity, Position(0.0, 0.0)).unwrap().id();
        components.add_component(entity, Health(9)).unwrap();
        components.add_component(other, Health(4)).unwrap();

        assert_eq!(components.remove_all_components(entity), 2);
        assert_eq!(components.component_count(entity), 0);
        assert_eq!(components.total_components(), 1);

        // The lowest freed id is reused first
        let reused = components.add_component(other, Position(1.0, 1.0)).unwrap().id();
        assert_eq!(reused, first);
    }

    #[test]
    fn test_tables_grow_past_initial_block() {
        let mut components = manager();
        for index in 0..10 {
            components.add_component(EntityId::new(index, 1), Health(index as u32)).unwrap();
        }
        assert!(components.id_capacity() >= 10);
        assert_eq!(components.len::<Health>(), 10);
        assert_eq!(
            components.get_component::<Health>(EntityId::new(9, 1)).map(|h| h.0),
            Some(9)
        );
    }

    #[test]
    fn test_type_registered_after_construction_gets_column() {
        let registry = Arc::new(TypeRegistry::new());
        let mut components = ComponentManager::new(
            Arc::new(MemoryManager::new(1 << 20)),
            Arc::clone(&registry),
            &EcsConfig::default(),
        );
        assert_eq!(registry.count(TypeFamily::Component), 0);

        let entity = EntityId::new(0, 1);
        components.add_component(entity, Position(0.0, 0.0)).unwrap();
        components.add_component(entity, Health(1)).unwrap();
        assert!(components.has_component::<Position>(entity));
        assert!(components.has_component::<Health>(entity));
    }

    #[test]
    fn test_stale_owner_does_not_resolve() {
        let mut components = manager();
        let live = EntityId::new(4, 2);
        let stale = EntityId::new(4, 1);
        components.add_component(live, Health(1)).unwrap();

        assert!(components.get_component::<Health>(stale).is_none());
        assert!(components.remove_component::<Health>(stale).is_err());
        assert!(components.has_component::<Health>(live));
    }

    #[test]
    fn test_iteration_and_toggle() {
        let mut components = manager();
        for index in 0..3 {
            components.add_component(EntityId::new(index, 1), Health(index as u32)).unwrap();
        }
        for entry in components.iter_mut::<Health>() {
            entry.0 += 100;
            entry.set_enabled(false);
        }
        let mut values: Vec<u32> = components.iter::<Health>().map(|h| h.0).collect();
        values.sort_unstable();
        assert_eq!(values, vec![100, 101, 102]);
        assert!(components.iter::<Health>().all(|h| !h.is_enabled()));
        assert_eq!(components.iter::<Position>().count(), 0);
    }

    #[test]
    fn test_out_of_memory_leaves_no_component() {
        let memory = Arc::new(MemoryManager::new(1 << 16));
        let mut components = ComponentManager::new(
            Arc::clone(&memory),
            Arc::new(TypeRegistry::new()),
            &EcsConfig::default(),
        );
        let entity = EntityId::new(0, 1);
        let filler = memory.allocate(memory.capacity(), 1, "filler").unwrap();

        assert!(matches!(
            components.add_component(entity, Health(1)),
            Err(EcsError::OutOfMemory { .. })
        ));
        assert!(components.get_component::<Health>(entity).is_none());
        assert_eq!(components.component_count(entity), 0);
        assert_eq!(components.total_components(), 0);

        memory.free(filler).unwrap();
        let entry = components.add_component(entity, Health(2)).unwrap();
        assert_eq!(entry.id().index(), 0);
    }
}
