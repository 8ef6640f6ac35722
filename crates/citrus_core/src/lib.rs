//! # Citrus Core
//!
//! Pooled entity/element lifecycle runtime with prefab tree serialization.
//!
//! ## Features
//!
//! - **Fixed-capacity pools**: one arena for entities and one per element kind
//! - **Deferred lifecycle**: creation and destruction take effect at flush points
//! - **Scene graph**: parent/child relations that can never form a cycle
//! - **Prefabs**: subtrees saved to and instantiated from JSON tree documents
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use citrus_core::prelude::*;
//!
//! #[derive(Default)]
//! struct Spin {
//!     speed: f32,
//! }
//!
//! impl Element for Spin {}
//!
//! fn main() -> Result<(), EcsError> {
//!     let mut manager = Manager::new(ManagerConfig::default())?;
//!     let spin = manager.register::<Spin>(KindDescriptor::new("Spin"))?;
//!
//!     let wheel = manager.create("Wheel")?;
//!     manager.add_element(wheel, spin)?;
//!     manager.step();
//!
//!     let prefab = manager.serialize_tree(wheel)?;
//!     let copy = manager.deserialize_tree(&prefab)?;
//!     manager.destroy(copy)?;
//!     manager.step();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod ecs;
pub mod foundation;
pub mod scene;

mod error;

pub use error::{EcsError, EcsResult};

/// Common imports for users of the runtime
pub mod prelude {
    pub use crate::{
        config::{Config, DuplicatePolicy, ManagerConfig},
        ecs::{
            CommandBuffer, Element, ElementContext, ElementHandle, ElementPayload, ElementRef, Entity, FlushReport,
            GuiGrouping, KindDescriptor, KindHandle, Manager, PayloadError,
        },
        foundation::math::{Quat, Transform, Vec3},
        scene::{DocumentSource, FsDocumentSource, MemoryDocumentSource},
        EcsError, EcsResult,
    };
}
