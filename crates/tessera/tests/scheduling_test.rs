//! Integration test for system scheduling.

use std::sync::Arc;

use parking_lot::Mutex;
use tessera::{EcsConfig, Engine, System, SystemPriority, World};

type Journal = Arc<Mutex<Vec<&'static str>>>;

macro_rules! logging_system {
    ($name:ident, $priority:expr) => {
        struct $name(Journal);

        impl System for $name {
            fn priority(&self) -> SystemPriority {
                $priority
            }

            fn update(&mut self, _world: &mut World, _dt_ms: f32) {
                self.0.lock().push(stringify!($name));
            }
        }
    };
}

logging_system!(Alpha, SystemPriority::LOW);
logging_system!(Bravo, SystemPriority::HIGH);
logging_system!(Charlie, SystemPriority::HIGH);

struct Periodic {
    runs: u32,
}

impl System for Periodic {
    fn update_interval(&self) -> f32 {
        100.0
    }

    fn update(&mut self, _world: &mut World, _dt_ms: f32) {
        self.runs += 1;
    }
}

fn engine() -> Engine {
    Engine::new(EcsConfig {
        global_memory_bytes: 4 * 1024 * 1024,
        system_memory_bytes: 64 * 1024,
        ..EcsConfig::default()
    })
    .unwrap()
}

#[test]
fn test_dependency_and_priority_order() {
    let mut engine = engine();
    let journal = Journal::default();
    engine.add_system(Alpha(Arc::clone(&journal))).unwrap();
    engine.add_system(Bravo(Arc::clone(&journal))).unwrap();
    engine.add_system(Charlie(Arc::clone(&journal))).unwrap();

    let systems = engine.systems_mut();
    systems.depends_on::<Charlie, Bravo>();
    systems.update_system_work_order();

    engine.update(16.0);
    assert_eq!(*journal.lock(), vec!["Bravo", "Charlie", "Alpha"]);
}

#[test]
fn test_throttled_system() {
    let mut engine = engine();
    engine.add_system(Periodic { runs: 0 }).unwrap();

    engine.update(40.0);
    engine.update(40.0);
    assert_eq!(engine.systems().get_system::<Periodic>().map(|s| s.runs), Some(0));

    engine.update(40.0);
    assert_eq!(engine.systems().get_system::<Periodic>().map(|s| s.runs), Some(1));

    let id = engine.systems().system_id::<Periodic>().unwrap();
    assert_eq!(engine.systems().system_state(id).map(|s| s.elapsed), Some(0.0));
}

#[test]
fn test_work_state_round_trip() {
    let mut engine = engine();
    let journal = Journal::default();
    engine.add_system(Alpha(Arc::clone(&journal))).unwrap();
    engine.add_system(Bravo(Arc::clone(&journal))).unwrap();
    engine.add_system(Charlie(Arc::clone(&journal))).unwrap();
    engine.systems_mut().disable_system::<Charlie>().unwrap();

    let saved = engine.systems().get_work_state();
    let toggled: Vec<bool> = saved.iter().map(|enabled| !enabled).collect();
    engine.systems_mut().set_work_state(&toggled).unwrap();
    assert_eq!(engine.systems().get_work_state(), toggled);

    engine.systems_mut().set_work_state(&saved).unwrap();
    assert_eq!(engine.systems().get_work_state(), saved);

    engine.update(16.0);
    assert_eq!(*journal.lock(), vec!["Alpha", "Bravo"]);
}

#[test]
fn test_active_work_state_mask() {
    let mut engine = engine();
    let journal = Journal::default();
    engine.add_system(Alpha(Arc::clone(&journal))).unwrap();
    engine.add_system(Bravo(Arc::clone(&journal))).unwrap();

    let bravo = engine.systems().system_id::<Bravo>().unwrap();
    let mask = engine.systems().generate_active_work_state(&[bravo]);
    engine.systems_mut().set_work_state(&mask).unwrap();

    engine.update(16.0);
    assert_eq!(*journal.lock(), vec!["Bravo"]);
}
