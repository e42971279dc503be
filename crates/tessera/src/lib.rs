//! # TESSERA
//!
//! The engine crate: ties the core runtime to a tick loop and an event queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Engine                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐   ┌───────────────┐   ┌───────────────┐   │
//! │  │ SystemManager │──>│     World     │   │ EventHandler  │   │
//! │  │ • work order  │   │ • entities    │<──│ • buffered    │   │
//! │  │ • 3 phases    │   │ • components  │   │ • dispatch ×2 │   │
//! │  └───────┬───────┘   └───────┬───────┘   └───────────────┘   │
//! │          └─────────┬─────────┘                               │
//! │             ┌──────┴────────┐                                │
//! │             │ MemoryManager │                                │
//! │             └───────────────┘                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `engine`: Tick orchestration, engine time and shutdown leak check
//! - `events`: Buffered publish/subscribe

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod events;

// Re-export the core runtime
pub use tessera_core as core;

// Re-export commonly used types
pub use engine::{Engine, EngineTime, TickStats};
pub use events::{Event, EventHandler, EventSender, SubscriptionId};
pub use tessera_core::{
    Component, ComponentEntry, EcsConfig, EcsError, EcsResult, Entity, EntityEntry, EntityId, MemoryLeak, System,
    SystemPriority, SystemTypeId, World,
};
