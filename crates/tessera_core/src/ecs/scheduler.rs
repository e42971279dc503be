//! # System Manager
//!
//! Registers systems, records their dependencies and runs them each tick.
//!
//! ## Work order
//!
//! Systems run in the order of the work order. Registration appends to it;
//! [`SystemManager::update_system_work_order`] rebuilds it from the
//! dependency matrix and priorities:
//!
//! 1. Systems are split into groups connected by dependency edges, seeded
//!    from the highest system id down
//! 2. Each group takes the highest priority among its members
//! 3. Inside a group, every system comes before the systems depending on it
//! 4. Groups are ordered by descending priority, ties in discovery order
//!
//! Neither priority nor dependency changes rebuild the order on their own.
//!
//! ## Tick
//!
//! [`SystemManager::update`] computes which systems are due, then runs the
//! pre phase of every due system, then every main phase, then every post
//! phase. Phases are never interleaved per system.

use std::any::type_name;
use std::mem::{align_of, size_of};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::system::{AnySystem, System, SystemPriority, SystemState};
use super::world::World;
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};
use crate::memory::{Allocator, Arena, Block, MemoryManager};
use crate::registry::{SystemTypeId, TypeFamily, TypeRegistry};

/// Enabled flag of every system, in work-order position.
pub type WorkStateMask = Vec<bool>;

struct SystemSlot {
    name: &'static str,
    state: SystemState,
    system: Box<dyn AnySystem>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Owns every system and drives the per-tick update.
pub struct SystemManager {
    memory: Arc<MemoryManager>,
    registry: Arc<TypeRegistry>,
    /// Global block backing the system arena.
    block: Block,
    arena: Arena,
    /// Indexed by [`SystemTypeId`].
    systems: Vec<Option<SystemSlot>>,
    /// `dependencies[target][dependency]`: target runs after dependency.
    dependencies: Vec<Vec<bool>>,
    work_order: Vec<SystemTypeId>,
}

impl SystemManager {
    /// Creates a system manager and reserves its system memory.
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfMemory`] if the global budget cannot cover
    /// `config.system_memory_bytes`.
    pub fn new(memory: Arc<MemoryManager>, registry: Arc<TypeRegistry>, config: &EcsConfig) -> EcsResult<Self> {
        info!(target: "SystemManager", "Initialize SystemManager");

        let block = memory
            .allocate(config.system_memory_bytes, 16, "SystemManager")
            .ok_or(EcsError::OutOfMemory {
                user: "SystemManager",
                requested: config.system_memory_bytes,
            })?;

        let mut manager = Self {
            memory,
            registry,
            block,
            arena: Arena::new(block.size),
            systems: Vec::new(),
            dependencies: Vec::new(),
            work_order: Vec::new(),
        };
        let known = manager.registry.count(TypeFamily::System);
        manager.grow_matrix(known);
        Ok(manager)
    }

    /// Registers `system`, or returns the already registered `S`.
    ///
    /// A second registration of the same type drops `system` and returns
    /// the existing instance. New systems are appended to the work order.
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfMemory`] if the system arena is exhausted.
    pub fn add_system<S: System>(&mut self, system: S) -> EcsResult<&mut S> {
        let id = self.registry.system_type_id::<S>();
        let name = type_name::<S>();

        if self.slot(id).is_some() {
            debug!(target: "SystemManager", system = name, "system already registered");
            return self.get_system_mut::<S>().ok_or(EcsError::ContainerTypeMismatch(name));
        }

        let size = size_of::<S>().max(1);
        if self.arena.allocate(size, align_of::<S>()).is_none() {
            error!(target: "SystemManager", system = name, bytes = size, "Unable to create system");
            return Err(EcsError::OutOfMemory {
                user: "SystemManager",
                requested: size,
            });
        }

        let state = SystemState::new(system.priority(), system.update_interval());
        self.grow_matrix(id.index() + 1);
        self.systems[id.index()] = Some(SystemSlot {
            name,
            state,
            system: Box::new(system),
        });
        self.work_order.push(id);

        info!(target: "SystemManager", system = name, bytes = size, "System created");

        self.get_system_mut::<S>().ok_or(EcsError::ContainerTypeMismatch(name))
    }

    /// Id of system type `S`, if it is registered.
    #[must_use]
    pub fn system_id<S: System>(&self) -> Option<SystemTypeId> {
        let id = self.registry.lookup::<S>(TypeFamily::System).map(SystemTypeId)?;
        self.slot(id).map(|_| id)
    }

    /// Records that `target` must run after each of `dependencies`.
    ///
    /// The work order is not rebuilt.
    pub fn add_system_dependency(&mut self, target: SystemTypeId, dependencies: &[SystemTypeId]) {
        let highest = dependencies.iter().copied().chain([target]).max().map_or(0, SystemTypeId::index);
        self.grow_matrix(highest + 1);

        for &dependency in dependencies {
            let edge = &mut self.dependencies[target.index()][dependency.index()];
            if !*edge {
                *edge = true;
                info!(
                    target: "SystemManager",
                    dependency = self.name_of(dependency),
                    system = self.name_of(target),
                    "added dependency"
                );
            }
        }
    }

    /// Records that system `T` must run after system `D`.
    pub fn depends_on<T: System, D: System>(&mut self) {
        let target = self.registry.system_type_id::<T>();
        let dependency = self.registry.system_type_id::<D>();
        self.add_system_dependency(target, &[dependency]);
    }

    /// Rebuilds the work order from dependencies and priorities.
    pub fn update_system_work_order(&mut self) {
        let order = self.compute_work_order();
        self.work_order = order;

        info!(target: "SystemManager", "Update system work order:");
        for &id in &self.work_order {
            info!(target: "SystemManager", "\t{}", self.name_of(id));
        }
    }

    /// The current work order.
    #[inline]
    #[must_use]
    pub fn work_order(&self) -> &[SystemTypeId] {
        &self.work_order
    }

    /// Type names of the systems in work order.
    #[must_use]
    pub fn work_order_names(&self) -> Vec<&'static str> {
        self.work_order.iter().map(|&id| self.name_of(id)).collect()
    }

    /// The registered `S`.
    #[must_use]
    pub fn get_system<S: System>(&self) -> Option<&S> {
        let id = self.registry.lookup::<S>(TypeFamily::System).map(SystemTypeId)?;
        self.slot(id)?.system.as_any().downcast_ref()
    }

    /// The registered `S`, mutably.
    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        let id = self.registry.lookup::<S>(TypeFamily::System).map(SystemTypeId)?;
        self.slot_mut(id)?.system.as_any_mut().downcast_mut()
    }

    /// Scheduling state of the system with `id`.
    #[must_use]
    pub fn system_state(&self, id: SystemTypeId) -> Option<&SystemState> {
        self.slot(id).map(|slot| &slot.state)
    }

    /// Lets `S` take part in updates.
    ///
    /// # Errors
    ///
    /// [`EcsError::SystemNotRegistered`] if `S` was never added.
    pub fn enable_system<S: System>(&mut self) -> EcsResult<()> {
        self.state_mut::<S>("enable")?.enabled = true;
        Ok(())
    }

    /// Excludes `S` from updates.
    ///
    /// # Errors
    ///
    /// [`EcsError::SystemNotRegistered`] if `S` was never added.
    pub fn disable_system<S: System>(&mut self) -> EcsResult<()> {
        self.state_mut::<S>("disable")?.enabled = false;
        Ok(())
    }

    /// Sets the minimum milliseconds between main-phase runs of `S`.
    ///
    /// # Errors
    ///
    /// [`EcsError::SystemNotRegistered`] if `S` was never added.
    pub fn set_system_update_interval<S: System>(&mut self, interval_ms: f32) -> EcsResult<()> {
        self.state_mut::<S>("change update interval of")?.update_interval = interval_ms;
        Ok(())
    }

    /// Changes the priority of `S`. The work order is not rebuilt.
    ///
    /// # Errors
    ///
    /// [`EcsError::SystemNotRegistered`] if `S` was never added.
    pub fn set_system_priority<S: System>(&mut self, priority: SystemPriority) -> EcsResult<()> {
        self.state_mut::<S>("change priority of")?.priority = priority;
        Ok(())
    }

    /// Snapshot of every system's enabled flag in work-order position.
    #[must_use]
    pub fn get_work_state(&self) -> WorkStateMask {
        self.work_order
            .iter()
            .map(|&id| self.slot(id).is_some_and(|slot| slot.state.enabled))
            .collect()
    }

    /// Restores every system's enabled flag from `mask`.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorkStateMismatch`] if `mask` does not have one entry per
    /// work-order position. Nothing is changed in that case.
    pub fn set_work_state(&mut self, mask: &[bool]) -> EcsResult<()> {
        if mask.len() != self.work_order.len() {
            return Err(EcsError::WorkStateMismatch {
                expected: self.work_order.len(),
                actual: mask.len(),
            });
        }

        for (&id, &enabled) in self.work_order.iter().zip(mask) {
            if let Some(Some(slot)) = self.systems.get_mut(id.index()) {
                slot.state.enabled = enabled;
            }
        }
        Ok(())
    }

    /// A mask enabling exactly the listed systems.
    #[must_use]
    pub fn generate_active_work_state(&self, active: &[SystemTypeId]) -> WorkStateMask {
        self.work_order.iter().map(|id| active.contains(id)).collect()
    }

    /// Runs one tick of every due system.
    ///
    /// Every system accumulates `dt_ms`. A system is due when it is enabled
    /// and its interval is negative or has elapsed. Due systems run their
    /// pre phase, then all main phases (resetting elapsed time), then all
    /// post phases.
    pub fn update(&mut self, dt_ms: f32, world: &mut World) {
        for &id in &self.work_order {
            if let Some(Some(slot)) = self.systems.get_mut(id.index()) {
                slot.state.advance(dt_ms);
            }
        }

        for &id in &self.work_order {
            if let Some(Some(slot)) = self.systems.get_mut(id.index()) {
                if slot.state.needs_update {
                    slot.system.pre_update(world, dt_ms);
                }
            }
        }

        for &id in &self.work_order {
            if let Some(Some(slot)) = self.systems.get_mut(id.index()) {
                if slot.state.needs_update {
                    slot.system.update(world, dt_ms);
                    slot.state.elapsed = 0.0;
                }
            }
        }

        for &id in &self.work_order {
            if let Some(Some(slot)) = self.systems.get_mut(id.index()) {
                if slot.state.needs_update {
                    slot.system.post_update(world, dt_ms);
                }
            }
        }
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of system memory accounted to registered systems.
    #[inline]
    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.arena.used()
    }

    fn slot(&self, id: SystemTypeId) -> Option<&SystemSlot> {
        self.systems.get(id.index())?.as_ref()
    }

    fn slot_mut(&mut self, id: SystemTypeId) -> Option<&mut SystemSlot> {
        self.systems.get_mut(id.index())?.as_mut()
    }

    fn state_mut<S: System>(&mut self, action: &str) -> EcsResult<&mut SystemState> {
        let slot = match self.registry.lookup::<S>(TypeFamily::System) {
            Some(id) => self.systems.get_mut(id as usize).and_then(Option::as_mut),
            None => None,
        };
        match slot {
            Some(slot) => Ok(&mut slot.state),
            None => {
                warn!(
                    target: "SystemManager",
                    system = type_name::<S>(),
                    "Trying to {action} system, but system is not registered yet"
                );
                Err(EcsError::SystemNotRegistered(type_name::<S>()))
            }
        }
    }

    fn name_of(&self, id: SystemTypeId) -> &'static str {
        self.slot(id).map_or_else(
            || self.registry.type_name(TypeFamily::System, id.0).unwrap_or("<unknown>"),
            |slot| slot.name,
        )
    }

    fn priority_of(&self, index: usize) -> SystemPriority {
        self.systems
            .get(index)
            .and_then(Option::as_ref)
            .map_or(SystemPriority::NORMAL, |slot| slot.state.priority)
    }

    fn grow_matrix(&mut self, size: usize) {
        if size <= self.dependencies.len() {
            return;
        }
        self.dependencies.resize_with(size, Vec::new);
        for row in &mut self.dependencies {
            row.resize(size, false);
        }
        self.systems.resize_with(size.max(self.systems.len()), || None);
    }

    fn compute_work_order(&self) -> Vec<SystemTypeId> {
        let count = self.dependencies.len();

        // Undirected connectivity groups, seeded from the highest id down.
        // `remaining[i]` is `None` once id `i` has joined a group.
        let mut remaining: Vec<Option<usize>> = (0..count).map(Some).collect();
        let mut groups: Vec<(SystemPriority, Vec<usize>)> = Vec::new();
        while let Some(seed) = remaining.pop() {
            let Some(seed) = seed else {
                continue;
            };

            let mut members = Vec::new();
            let mut priority = SystemPriority::LOWEST;
            let mut stack = vec![seed];
            while let Some(node) = stack.pop() {
                for (other, entry) in remaining.iter_mut().enumerate() {
                    if entry.is_some() && (self.dependencies[other][node] || self.dependencies[node][other]) {
                        *entry = None;
                        stack.push(other);
                    }
                }
                priority = priority.max(self.priority_of(node));
                members.push(node);
            }
            groups.push((priority, members));
        }

        let mut visits = vec![Visit::New; count];
        let mut ordered: Vec<(SystemPriority, Vec<usize>)> = groups
            .into_iter()
            .map(|(priority, members)| {
                let mut order = Vec::with_capacity(members.len());
                for &member in &members {
                    if visits[member] == Visit::New {
                        self.visit_dependents(member, &mut visits, &mut order);
                    }
                }
                order.reverse();
                (priority, order)
            })
            .collect();

        // Stable, so equal priorities keep discovery order
        ordered.sort_by(|a, b| b.0.cmp(&a.0));

        ordered
            .into_iter()
            .flat_map(|(_, order)| order)
            .filter(|&index| self.systems.get(index).is_some_and(Option::is_some))
            .filter_map(|index| u32::try_from(index).ok().map(SystemTypeId))
            .collect()
    }

    /// Post-order walk over the systems that depend on `node`.
    fn visit_dependents(&self, node: usize, visits: &mut [Visit], order: &mut Vec<usize>) {
        visits[node] = Visit::Active;
        for dependent in 0..self.dependencies.len() {
            if !self.dependencies[dependent][node] {
                continue;
            }
            match visits[dependent] {
                Visit::New => self.visit_dependents(dependent, visits, order),
                Visit::Active => warn!(
                    target: "SystemManager",
                    system = self.name_of(SystemTypeId(u32::try_from(dependent).unwrap_or(u32::MAX))),
                    "dependency cycle detected"
                ),
                Visit::Done => {}
            }
        }
        visits[node] = Visit::Done;
        order.push(node);
    }
}

impl std::fmt::Debug for SystemManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemManager")
            .field("work_order", &self.work_order_names())
            .field("memory_used", &self.arena.used())
            .finish_non_exhaustive()
    }
}

impl Drop for SystemManager {
    fn drop(&mut self) {
        // Tear down in reverse work order
        for index in (0..self.work_order.len()).rev() {
            let id = self.work_order[index];
            if let Some(slot) = self.systems.get_mut(id.index()) {
                slot.take();
            }
        }
        self.systems.clear();
        self.arena.clear();

        if let Err(err) = self.memory.free(self.block) {
            warn!(target: "SystemManager", %err, "failed to release system memory");
        }
        info!(target: "SystemManager", "Release SystemManager");
    }
}
