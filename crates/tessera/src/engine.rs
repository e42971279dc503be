//! # Engine
//!
//! Owns one of each manager and sequences every tick.
//!
//! ## Tick order
//!
//! ```text
//! advance time → systems → dispatch events → reclaim entities → dispatch events
//! ```
//!
//! Entities destroyed during a tick are reclaimed only after every system
//! has finished, so all systems see the same entity set.

use std::sync::Arc;
use std::time::Instant;

use tessera_core::{
    EcsConfig, EcsResult, Entity, EntityId, MemoryLeak, MemoryManager, System, SystemManager, TypeRegistry, World,
};
use tracing::{debug, info};

use crate::events::{Event, EventHandler, EventSender, SubscriptionId};

/// Accumulated engine time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EngineTime {
    total_ms: f64,
    last_tick_ms: f32,
    frame: u64,
}

impl EngineTime {
    /// Advances by one tick of `tick_ms` milliseconds.
    pub fn tick(&mut self, tick_ms: f32) {
        self.total_ms += f64::from(tick_ms);
        self.last_tick_ms = tick_ms;
        self.frame += 1;
    }

    /// Milliseconds accumulated over all ticks.
    #[inline]
    #[must_use]
    pub const fn total_ms(&self) -> f64 {
        self.total_ms
    }

    /// Length of the most recent tick.
    #[inline]
    #[must_use]
    pub const fn last_tick_ms(&self) -> f32 {
        self.last_tick_ms
    }

    /// Number of ticks so far.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }
}

/// What happened during one [`Engine::update`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TickStats {
    /// Frame number after this tick.
    pub frame: u64,
    /// Simulated tick length in milliseconds.
    pub tick_ms: f32,
    /// Events delivered across both dispatches.
    pub events_dispatched: usize,
    /// Entities reclaimed at the end of the tick.
    pub entities_destroyed: usize,
    /// Wall-clock time spent in the tick, in microseconds.
    pub duration_us: u64,
}

/// The ECS engine.
///
/// # Example
///
/// ```rust,ignore
/// let mut engine = Engine::new(EcsConfig::default())?;
/// engine.add_system(Movement)?;
/// let player = engine.create_entity(Player::default())?;
///
/// loop {
///     engine.update(16.6);
/// }
/// ```
pub struct Engine {
    config: EcsConfig,
    memory: Arc<MemoryManager>,
    registry: Arc<TypeRegistry>,
    world: World,
    systems: SystemManager,
    events: EventHandler,
    time: EngineTime,
}

impl Engine {
    /// Creates an engine with its own type registry.
    ///
    /// # Errors
    ///
    /// - [`EcsError::InvalidConfig`](tessera_core::EcsError::InvalidConfig) if `config` is invalid
    /// - [`EcsError::OutOfMemory`](tessera_core::EcsError::OutOfMemory) if system memory cannot be reserved
    pub fn new(config: EcsConfig) -> EcsResult<Self> {
        Self::with_registry(config, Arc::new(TypeRegistry::new()))
    }

    /// Creates an engine sharing an explicit type registry.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::new`].
    pub fn with_registry(config: EcsConfig, registry: Arc<TypeRegistry>) -> EcsResult<Self> {
        config.validate()?;
        info!(target: "Engine", global_memory = config.global_memory_bytes, "Initialize Engine");

        let memory = Arc::new(MemoryManager::new(config.global_memory_bytes));
        let systems = SystemManager::new(Arc::clone(&memory), Arc::clone(&registry), &config)?;
        let world = World::new(Arc::clone(&memory), Arc::clone(&registry), &config);

        Ok(Self {
            config,
            memory,
            registry,
            world,
            systems,
            events: EventHandler::new(),
            time: EngineTime::default(),
        })
    }

    /// Runs one tick of `tick_ms` milliseconds.
    pub fn update(&mut self, tick_ms: f32) -> TickStats {
        let start = Instant::now();

        self.time.tick(tick_ms);

        self.systems.update(tick_ms, &mut self.world);
        let mut events_dispatched = self.events.dispatch();

        let entities_destroyed = self.world.remove_destroyed_entities();
        events_dispatched += self.events.dispatch();

        let stats = TickStats {
            frame: self.time.frame(),
            tick_ms,
            events_dispatched,
            entities_destroyed,
            duration_us: u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
        };
        debug!(
            target: "Engine",
            frame = stats.frame,
            events = stats.events_dispatched,
            destroyed = stats.entities_destroyed,
            duration_us = stats.duration_us,
            "tick"
        );
        stats
    }

    /// Tears everything down and reports unreleased memory.
    ///
    /// Entities, components and systems are dropped in that order before
    /// the leak check runs.
    pub fn shutdown(self) -> Vec<MemoryLeak> {
        let Self {
            memory,
            world,
            systems,
            events,
            time,
            ..
        } = self;

        info!(target: "Engine", frames = time.frame(), "Shutdown Engine");
        drop(world);
        drop(systems);
        drop(events);

        memory.check_memory_leaks()
    }

    /// Creates an entity. See [`World::create_entity`].
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfMemory`](tessera_core::EcsError::OutOfMemory) or
    /// [`EcsError::HandleTableFull`](tessera_core::EcsError::HandleTableFull).
    pub fn create_entity<E: Entity>(&mut self, entity: E) -> EcsResult<EntityId> {
        self.world.create_entity(entity)
    }

    /// Queues an entity for destruction at the end of the tick.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`](tessera_core::EcsError::EntityNotFound) if `id` is stale.
    pub fn destroy_entity(&mut self, id: EntityId) -> EcsResult<()> {
        self.world.destroy_entity(id)
    }

    /// Registers a system. See [`SystemManager::add_system`].
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfMemory`](tessera_core::EcsError::OutOfMemory) if system memory is exhausted.
    pub fn add_system<S: System>(&mut self, system: S) -> EcsResult<&mut S> {
        self.systems.add_system(system)
    }

    /// Queues an event for the next dispatch.
    pub fn send_event<E: Event>(&self, event: E) {
        self.events.send(event);
    }

    /// Registers an event callback.
    pub fn subscribe<E, F>(&mut self, callback: F) -> SubscriptionId
    where
        E: Event,
        F: FnMut(&E) + Send + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Removes an event callback.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// A sender systems can keep to emit events.
    #[must_use]
    pub fn event_sender(&self) -> EventSender {
        self.events.sender()
    }

    /// The world.
    #[inline]
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// The world, mutably.
    #[inline]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The system manager.
    #[inline]
    #[must_use]
    pub const fn systems(&self) -> &SystemManager {
        &self.systems
    }

    /// The system manager, mutably.
    #[inline]
    pub fn systems_mut(&mut self) -> &mut SystemManager {
        &mut self.systems
    }

    /// The event handler.
    #[inline]
    #[must_use]
    pub const fn events(&self) -> &EventHandler {
        &self.events
    }

    /// The event handler, mutably.
    #[inline]
    pub fn events_mut(&mut self) -> &mut EventHandler {
        &mut self.events
    }

    /// Engine time.
    #[inline]
    #[must_use]
    pub const fn time(&self) -> &EngineTime {
        &self.time
    }

    /// The shared memory manager.
    #[inline]
    #[must_use]
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// The shared type registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The configuration the engine was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &EcsConfig {
        &self.config
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("time", &self.time)
            .field("world", &self.world)
            .field("systems", &self.systems)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> EcsConfig {
        EcsConfig {
            global_memory_bytes: 4 * 1024 * 1024,
            system_memory_bytes: 64 * 1024,
            ..EcsConfig::default()
        }
    }

    #[test]
    fn test_time_accumulates() {
        let mut engine = Engine::new(small_config()).unwrap();
        engine.update(10.0);
        let stats = engine.update(15.0);

        assert_eq!(stats.frame, 2);
        assert_eq!(engine.time().frame(), 2);
        assert!((engine.time().total_ms() - 25.0).abs() < f64::EPSILON);
        assert!((engine.time().last_tick_ms() - 15.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EcsConfig {
            entity_chunk_capacity: 0,
            ..small_config()
        };
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_clean_shutdown_reports_no_leaks() {
        struct Rock;
        impl Entity for Rock {}

        let mut engine = Engine::new(small_config()).unwrap();
        for _ in 0..10 {
            engine.create_entity(Rock).unwrap();
        }
        engine.update(16.0);

        assert!(engine.shutdown().is_empty());
    }
}
