//! Integration tests for the lifecycle runtime and prefab trees
//!
//! Shared element kinds live here; the scenarios are split per area.

mod lifecycle_integration;

use std::cell::RefCell;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ecs::{read_pod, Element, ElementContext, ElementPayload, Entity, GuiGrouping, KindHandle, PayloadError};

/// Eight-byte health value, loadable from raw bytes or a document
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub(crate) struct Health {
    pub current: u32,
    pub max: u32,
}

impl Element for Health {
    fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), PayloadError> {
        *self = read_pod(bytes)?;
        Ok(())
    }

    fn load_document(&mut self, doc: &Value) -> Result<(), PayloadError> {
        *self = serde_json::from_value(doc.clone())?;
        Ok(())
    }

    fn save_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn render_gui(&self) -> Option<GuiGrouping> {
        Some(GuiGrouping::new("Health").field("current", self.current).field("max", self.max))
    }
}

/// Holds a reference value and nothing else
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Link {
    pub target: Value,
}

impl Element for Link {
    fn load_document(&mut self, doc: &Value) -> Result<(), PayloadError> {
        self.target = doc
            .get("target")
            .cloned()
            .ok_or_else(|| PayloadError::Invalid("missing 'target'".to_string()))?;
        Ok(())
    }

    fn save_document(&self) -> Value {
        serde_json::json!({ "target": self.target })
    }
}

thread_local! {
    /// Hook observations, in call order
    pub(crate) static HOOK_LOG: RefCell<Vec<HookEvent>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HookEvent {
    Created { entity_id: u64 },
    Destroyed { entity_id: u64, still_linked: bool },
}

pub(crate) fn take_hook_log() -> Vec<HookEvent> {
    HOOK_LOG.with(|log| log.borrow_mut().drain(..).collect())
}

/// Records its hooks and checks what the pool looks like while they run
#[derive(Debug, Default)]
pub(crate) struct Probe;

impl Element for Probe {
    fn on_create(&mut self, ctx: &mut ElementContext<'_>) {
        let entity_id = ctx.entities.id(ctx.entity).unwrap_or(0);
        HOOK_LOG.with(|log| log.borrow_mut().push(HookEvent::Created { entity_id }));
    }

    fn on_destroy(&mut self, ctx: &mut ElementContext<'_>) {
        let entity_id = ctx.entities.id(ctx.entity).unwrap_or(0);
        let still_linked = ctx
            .entities
            .elements(ctx.entity)
            .is_ok_and(|elements| elements.contains(&ctx.element));
        HOOK_LOG.with(|log| {
            log.borrow_mut().push(HookEvent::Destroyed {
                entity_id,
                still_linked,
            });
        });
    }
}

/// Spawns a child carrying a `Probe` during its first action pass
#[derive(Debug, Default)]
pub(crate) struct Spawner {
    pub probe: Option<KindHandle<Probe>>,
    pub spawned_in: Option<u64>,
}

impl Element for Spawner {
    fn action(&mut self, ctx: &mut ElementContext<'_>) {
        if let Some(probe) = self.probe.take() {
            ctx.commands
                .spawn("spawned", Some(ctx.entity))
                .with(probe, ElementPayload::none());
            self.spawned_in = Some(ctx.frame);
        }
    }
}

/// Records structural requests from its create and destroy hooks
#[derive(Debug, Default)]
pub(crate) struct Relay {
    pub attach_on_create: Option<KindHandle<Probe>>,
    pub destroy_on_destroy: Option<Entity>,
}

impl Element for Relay {
    fn on_create(&mut self, ctx: &mut ElementContext<'_>) {
        if let Some(probe) = self.attach_on_create.take() {
            ctx.commands.add_element(ctx.entity, probe, ElementPayload::none());
        }
    }

    fn on_destroy(&mut self, ctx: &mut ElementContext<'_>) {
        if let Some(victim) = self.destroy_on_destroy.take() {
            ctx.commands.destroy(victim);
        }
    }
}
