//! Deferred structural requests
//!
//! Hooks only get a read-only view of the entity pool, so anything that
//! changes structure is recorded here and applied by the
//! [`Manager`](super::Manager) once the running phase has finished. Element
//! creations recorded during a create flush therefore land in the next one.

use super::element::{Element, ElementPayload, ElementRef, KindHandle, KindId};
use super::entity::Entity;

/// One recorded request
#[derive(Debug, Clone)]
pub enum Command {
    /// Create an entity, optionally attach it, and add elements to it
    Spawn {
        /// Display name
        name: String,
        /// Parent to attach to
        parent: Option<Entity>,
        /// Elements to add, in order
        elements: Vec<(KindId, ElementPayload)>,
    },
    /// Queue an entity and its descendants for destruction
    Destroy(Entity),
    /// Add an element to an existing entity
    AddElement {
        /// Owner
        entity: Entity,
        /// Element kind
        kind: KindId,
        /// Payloads for the create flush
        payload: ElementPayload,
    },
    /// Queue an element for destruction
    DestroyElement(ElementRef),
    /// Attach `child` to `parent`
    SetRelation {
        /// New parent
        parent: Entity,
        /// Entity being attached
        child: Entity,
    },
    /// Detach an entity from its parent
    ClearRelation(Entity),
    /// Ask the frame loop to stop
    Stop,
}

/// Commands recorded while a phase runs
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arbitrary command
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Record a new entity
    pub fn spawn(&mut self, name: impl Into<String>, parent: Option<Entity>) -> SpawnBuilder<'_> {
        self.commands.push(Command::Spawn {
            name: name.into(),
            parent,
            elements: Vec::new(),
        });
        SpawnBuilder { buffer: self }
    }

    /// Record an entity destruction
    pub fn destroy(&mut self, entity: Entity) {
        self.commands.push(Command::Destroy(entity));
    }

    /// Record an element addition
    pub fn add_element<T: Element>(&mut self, entity: Entity, kind: KindHandle<T>, payload: ElementPayload) {
        self.commands.push(Command::AddElement {
            entity,
            kind: kind.id(),
            payload,
        });
    }

    /// Record an element destruction
    pub fn destroy_element(&mut self, element: ElementRef) {
        self.commands.push(Command::DestroyElement(element));
    }

    /// Record a relation change
    pub fn set_relation(&mut self, parent: Entity, child: Entity) {
        self.commands.push(Command::SetRelation { parent, child });
    }

    /// Record a detach
    pub fn clear_relation(&mut self, child: Entity) {
        self.commands.push(Command::ClearRelation(child));
    }

    /// Record a stop request
    pub fn stop(&mut self) {
        self.commands.push(Command::Stop);
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

/// Adds elements to the entity recorded by [`CommandBuffer::spawn`]
pub struct SpawnBuilder<'a> {
    buffer: &'a mut CommandBuffer,
}

impl SpawnBuilder<'_> {
    /// Add an element to the spawned entity
    pub fn with<T: Element>(self, kind: KindHandle<T>, payload: ElementPayload) -> Self {
        if let Some(Command::Spawn { elements, .. }) = self.buffer.commands.last_mut() {
            elements.push((kind.id(), payload));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Tag;

    impl Element for Tag {}

    #[test]
    fn test_spawn_builder_collects_elements() {
        let kind = KindHandle::<Tag>::new(KindId(3));
        let mut buffer = CommandBuffer::new();
        buffer
            .spawn("bullet", None)
            .with(kind, ElementPayload::none())
            .with(kind, ElementPayload::bytes(vec![1]));
        buffer.stop();

        let commands = buffer.take();
        assert!(buffer.is_empty());
        assert_eq!(commands.len(), 2);
        match &commands[0] {
            Command::Spawn { name, parent, elements } => {
                assert_eq!(name, "bullet");
                assert!(parent.is_none());
                assert_eq!(elements.len(), 2);
                assert_eq!(elements[0].0, KindId(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(matches!(commands[1], Command::Stop));
    }
}
