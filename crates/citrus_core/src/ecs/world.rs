//! Manager: entity pool, element registry and scheduler state in one place

use serde_json::Value;

use super::commands::{Command, CommandBuffer};
use super::element::{Element, ElementHandle, ElementPayload, ElementRef, KindDescriptor, KindHandle, KindId};
use super::entity::{Entity, EntityPool};
use super::pool::ElementFlags;
use super::registry::ElementRegistry;
use super::scheduler::{FlushReport, FrameClock, LifecyclePhase};
use crate::config::{DuplicatePolicy, ManagerConfig};
use crate::error::{EcsError, EcsResult};
use crate::foundation::math::Transform;

/// Owns every pool and drives their lifecycle
pub struct Manager {
    pub(crate) config: ManagerConfig,
    pub(crate) entities: EntityPool,
    pub(crate) registry: ElementRegistry,
    pub(crate) commands: CommandBuffer,
    pub(crate) clock: FrameClock,
    pub(crate) phase: LifecyclePhase,
    pub(crate) stopped: bool,
}

impl Manager {
    /// Create a manager from a validated configuration
    pub fn new(config: ManagerConfig) -> EcsResult<Self> {
        config.validate()?;

        log::info!(
            "Creating Manager: {} entities, default element capacity {}, duplicate policy {:?}",
            config.max_entities,
            config.default_element_capacity,
            config.duplicate_policy
        );

        Ok(Self {
            entities: EntityPool::new(config.max_entities),
            registry: ElementRegistry::new(),
            commands: CommandBuffer::new(),
            clock: FrameClock::new(config.time_step),
            phase: LifecyclePhase::Idle,
            stopped: false,
            config,
        })
    }

    /// Active configuration
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Register an element kind
    pub fn register<T: Element>(&mut self, descriptor: KindDescriptor) -> EcsResult<KindHandle<T>> {
        let default_capacity = self.config.default_element_capacity;
        self.registry.register(descriptor, default_capacity)
    }

    /// Registered kinds
    pub const fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    /// Entity pool, for read access to names, relations and transforms
    pub const fn entities(&self) -> &EntityPool {
        &self.entities
    }

    /// Create an entity; it is visible immediately
    pub fn create(&mut self, name: impl Into<String>) -> EcsResult<Entity> {
        self.entities.create(name)
    }

    /// Queue an entity and its descendants for destruction at the next destroy flush
    pub fn destroy(&mut self, entity: Entity) -> EcsResult<()> {
        self.entities.destroy(entity)
    }

    /// Attach `child` to `parent`; false if nothing changed
    pub fn set_relation(&mut self, parent: Entity, child: Entity) -> EcsResult<bool> {
        self.entities.set_relation(parent, child)
    }

    /// Detach an entity from its parent
    pub fn clear_relation(&mut self, child: Entity) -> EcsResult<bool> {
        self.entities.clear_relation(child)
    }

    /// Replace an entity's local transform
    pub fn set_transform(&mut self, entity: Entity, transform: Transform) -> EcsResult<()> {
        self.entities.set_transform(entity, transform)
    }

    /// Rename an entity
    pub fn set_name(&mut self, entity: Entity, name: impl Into<String>) -> EcsResult<()> {
        self.entities.set_name(entity, name)
    }

    /// Find a live entity by runtime id
    pub fn find_entity(&self, id: u64) -> Option<Entity> {
        self.entities.find(id)
    }

    /// Live entities in allocation order
    pub fn all_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// Add an element with no payload
    pub fn add_element<T: Element>(&mut self, entity: Entity, kind: KindHandle<T>) -> EcsResult<ElementHandle<T>> {
        self.add_element_erased(entity, kind.id(), ElementPayload::none())
            .map(ElementHandle::new)
    }

    /// Add an element and load a raw payload after its construction hook
    pub fn add_element_with_bytes<T: Element>(
        &mut self,
        entity: Entity,
        kind: KindHandle<T>,
        bytes: impl Into<Vec<u8>>,
    ) -> EcsResult<ElementHandle<T>> {
        self.add_element_erased(entity, kind.id(), ElementPayload::bytes(bytes))
            .map(ElementHandle::new)
    }

    /// Add an element and load an initializer document after its construction hook
    pub fn add_element_with_document<T: Element>(
        &mut self,
        entity: Entity,
        kind: KindHandle<T>,
        document: Value,
    ) -> EcsResult<ElementHandle<T>> {
        self.add_element_erased(entity, kind.id(), ElementPayload::document(document))
            .map(ElementHandle::new)
    }

    /// Add an element by kind name
    pub fn add_element_by_name(
        &mut self,
        entity: Entity,
        kind_name: &str,
        payload: ElementPayload,
    ) -> EcsResult<ElementRef> {
        let kind = self.registry.require(kind_name)?;
        self.add_element_erased(entity, kind, payload)
    }

    /// Reserve an element slot, link it to `entity` and queue its construction
    ///
    /// The element becomes live at the next create flush.
    pub fn add_element_erased(&mut self, entity: Entity, kind: KindId, payload: ElementPayload) -> EcsResult<ElementRef> {
        if let Some(existing) = self.existing_element(entity, kind)? {
            let pool = self.registry.pool(kind)?;
            match self.config.duplicate_policy {
                DuplicatePolicy::Reject => {
                    return Err(EcsError::DuplicateElement {
                        entity: self.entities.id(entity)?,
                        kind: pool.name().to_string(),
                    });
                }
                DuplicatePolicy::Ignore => {
                    log::debug!("Ignoring duplicate '{}' on entity {}", pool.name(), self.entities.id(entity)?);
                    return Ok(existing);
                }
            }
        }

        let pool = self.registry.pool_mut(kind)?;
        let element = pool.alloc(entity)?;
        self.entities.push_element(entity, element)?;
        pool.enqueue_create(element, payload);
        Ok(element)
    }

    fn existing_element(&self, entity: Entity, kind: KindId) -> EcsResult<Option<ElementRef>> {
        let pool = self.registry.pool(kind)?;
        Ok(self.entities.elements(entity)?.iter().copied().find(|element| {
            element.kind() == kind
                && pool
                    .flags(*element)
                    .is_ok_and(|flags| !flags.contains(ElementFlags::DESTROYED))
        }))
    }

    /// Queue an element for destruction at the next destroy flush
    pub fn destroy_element(&mut self, element: ElementRef) -> EcsResult<()> {
        self.registry.pool_mut(element.kind())?.enqueue_destroy(element)?;
        Ok(())
    }

    /// Borrow an element value
    pub fn element<T: Element>(&self, handle: ElementHandle<T>) -> EcsResult<&T> {
        let kind = KindHandle::<T>::new(handle.raw().kind());
        self.registry.typed(kind)?.get(handle.raw())
    }

    /// Mutably borrow an element value
    pub fn element_mut<T: Element>(&mut self, handle: ElementHandle<T>) -> EcsResult<&mut T> {
        let kind = KindHandle::<T>::new(handle.raw().kind());
        self.registry.typed_mut(kind)?.get_mut(handle.raw())
    }

    /// Owner of an element
    pub fn element_owner(&self, element: ElementRef) -> EcsResult<Entity> {
        self.registry.pool(element.kind())?.owner(element)
    }

    /// The entity's element of a kind, unless it is queued for destruction
    pub fn find_element<T: Element>(&self, entity: Entity, kind: KindHandle<T>) -> Option<ElementHandle<T>> {
        self.existing_element(entity, kind.id())
            .ok()
            .flatten()
            .map(ElementHandle::new)
    }

    /// The entity's element of a kind, looked up by kind name
    pub fn find_element_by_name(&self, entity: Entity, kind_name: &str) -> Option<ElementRef> {
        let kind = self.registry.find(kind_name)?;
        self.existing_element(entity, kind).ok().flatten()
    }

    /// Live elements of a kind, with their owners, in allocation order
    pub fn live_elements<T: Element>(
        &self,
        kind: KindHandle<T>,
    ) -> EcsResult<impl Iterator<Item = (ElementHandle<T>, Entity, &T)> + '_> {
        Ok(self
            .registry
            .typed(kind)?
            .iter_live()
            .map(|(element, owner, value)| (ElementHandle::new(element), owner, value)))
    }

    /// Enable or disable the action pass for a kind
    pub fn set_kind_enabled(&mut self, kind: KindId, enabled: bool) -> EcsResult<()> {
        self.registry.pool_mut(kind)?.set_enabled(enabled);
        Ok(())
    }

    /// Apply commands recorded by hooks during the last phase
    pub(crate) fn apply_commands(&mut self, report: &mut FlushReport) {
        for command in self.commands.take() {
            if let Err(err) = self.apply_command(command) {
                log::warn!("Deferred command failed: {}", err);
                report.errors.push(err);
            }
        }
    }

    fn apply_command(&mut self, command: Command) -> EcsResult<()> {
        match command {
            Command::Spawn { name, parent, elements } => {
                let entity = self.create(name)?;
                if let Some(parent) = parent {
                    self.set_relation(parent, entity)?;
                }
                for (kind, payload) in elements {
                    self.add_element_erased(entity, kind, payload)?;
                }
            }
            Command::Destroy(entity) => self.destroy(entity)?,
            Command::AddElement { entity, kind, payload } => {
                self.add_element_erased(entity, kind, payload)?;
            }
            Command::DestroyElement(element) => self.destroy_element(element)?,
            Command::SetRelation { parent, child } => {
                self.set_relation(parent, child)?;
            }
            Command::ClearRelation(child) => {
                self.clear_relation(child)?;
            }
            Command::Stop => self.stop(),
        }
        Ok(())
    }
}
