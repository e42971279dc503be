//! # Systems
//!
//! Per-tick logic units. A system is registered once per concrete type
//! and runs up to three phases per tick; see
//! [`SystemManager::update`](super::SystemManager::update).

use std::any::Any;
use std::fmt;

use super::world::World;

/// Ordered priority band of a system.
///
/// Among systems with no dependency relation, higher priorities run first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemPriority(pub u16);

impl SystemPriority {
    /// Runs after everything else.
    pub const LOWEST: Self = Self(0);
    /// Just below [`LOW`](Self::LOW).
    pub const VERY_LOW: Self = Self(99);
    /// Low priority.
    pub const LOW: Self = Self(100);
    /// Default priority.
    pub const NORMAL: Self = Self(200);
    /// Medium priority.
    pub const MEDIUM: Self = Self(300);
    /// High priority.
    pub const HIGH: Self = Self(400);
    /// Just above [`HIGH`](Self::HIGH).
    pub const VERY_HIGH: Self = Self(401);
    /// Runs before everything else.
    pub const HIGHEST: Self = Self(u16::MAX);
}

impl Default for SystemPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for SystemPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A per-tick logic unit.
///
/// All phases default to doing nothing. `dt_ms` is the tick length in
/// milliseconds, not the time since the system last ran.
///
/// # Example
///
/// ```rust,ignore
/// struct Gravity;
///
/// impl System for Gravity {
///     fn priority(&self) -> SystemPriority {
///         SystemPriority::HIGH
///     }
///
///     fn update(&mut self, world: &mut World, dt_ms: f32) {
///         for body in world.components_mut().iter_mut::<Velocity>() {
///             body.y -= 9.81 * dt_ms / 1000.0;
///         }
///     }
/// }
/// ```
pub trait System: Any + Send {
    /// Priority the system is registered with.
    fn priority(&self) -> SystemPriority {
        SystemPriority::NORMAL
    }

    /// Minimum milliseconds between main-phase runs. Negative runs every tick.
    fn update_interval(&self) -> f32 {
        -1.0
    }

    /// First phase. Runs for every due system before any main phase.
    fn pre_update(&mut self, _world: &mut World, _dt_ms: f32) {}

    /// Main phase.
    fn update(&mut self, _world: &mut World, _dt_ms: f32) {}

    /// Last phase. Runs for every due system after every main phase.
    fn post_update(&mut self, _world: &mut World, _dt_ms: f32) {}
}

/// Scheduling state the manager keeps for each registered system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SystemState {
    /// Priority band.
    pub priority: SystemPriority,
    /// Minimum milliseconds between main-phase runs; negative means every tick.
    pub update_interval: f32,
    /// Milliseconds accumulated since the main phase last ran.
    pub elapsed: f32,
    /// Whether the system takes part in updates.
    pub enabled: bool,
    /// Whether the system is due in the current tick.
    pub needs_update: bool,
}

impl SystemState {
    /// Fresh state: enabled, nothing elapsed.
    #[must_use]
    pub const fn new(priority: SystemPriority, update_interval: f32) -> Self {
        Self {
            priority,
            update_interval,
            elapsed: 0.0,
            enabled: true,
            needs_update: true,
        }
    }

    /// Adds `dt_ms` to the elapsed time and recomputes due-ness.
    pub fn advance(&mut self, dt_ms: f32) {
        self.elapsed += dt_ms;
        self.needs_update =
            self.enabled && (self.update_interval < 0.0 || self.elapsed >= self.update_interval);
    }
}

/// Object-safe view of a boxed system that still allows downcasting.
pub(crate) trait AnySystem: System {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<S: System> AnySystem for S {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(SystemPriority::HIGHEST > SystemPriority::VERY_HIGH);
        assert!(SystemPriority::VERY_HIGH > SystemPriority::HIGH);
        assert!(SystemPriority::NORMAL > SystemPriority::LOW);
        assert!(SystemPriority::VERY_LOW > SystemPriority::LOWEST);
        assert_eq!(SystemPriority::default(), SystemPriority::NORMAL);
    }

    #[test]
    fn test_negative_interval_is_always_due() {
        let mut state = SystemState::new(SystemPriority::NORMAL, -1.0);
        state.advance(0.0);
        assert!(state.needs_update);
    }

    #[test]
    fn test_interval_gates_due_ness() {
        let mut state = SystemState::new(SystemPriority::NORMAL, 100.0);
        state.advance(40.0);
        assert!(!state.needs_update);
        state.advance(60.0);
        assert!(state.needs_update);
    }

    #[test]
    fn test_disabled_is_never_due() {
        let mut state = SystemState::new(SystemPriority::NORMAL, -1.0);
        state.enabled = false;
        state.advance(16.0);
        assert!(!state.needs_update);
        assert!((state.elapsed - 16.0).abs() < f32::EPSILON);
    }
}
