//! Entity/element lifecycle runtime
//!
//! Fixed-capacity pools for entities and for every registered element kind,
//! a deferred two-phase create/destroy scheduler, and a parent/child graph
//! that never admits a cycle.

pub mod commands;
pub mod element;
pub mod entity;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod world;

mod slot_list;

#[cfg(test)]
mod tests;

pub use commands::{Command, CommandBuffer, SpawnBuilder};
pub use element::{
    Element, ElementContext, ElementHandle, ElementPayload, ElementRef, GuiGrouping, KindDescriptor, KindHandle,
    KindId, PayloadError, read_pod,
};
pub use entity::{Entity, EntityPool};
pub use pool::{ElementFlags, ElementPool, ErasedPool};
pub use registry::ElementRegistry;
pub use scheduler::{FlushReport, FrameClock, LifecyclePhase};
pub use world::Manager;
