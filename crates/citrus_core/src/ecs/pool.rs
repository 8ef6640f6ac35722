//! Per-kind element pools
//!
//! Each registered kind owns one [`ElementPool`]: a fixed slot array with the
//! element header stored next to the value, intrusive free/alloc lists, and
//! pending create/destroy queues that the scheduler swaps out before
//! processing.

use std::any::Any;
use std::mem;

use bitflags::bitflags;
use serde_json::Value;

use super::commands::CommandBuffer;
use super::element::{Element, ElementContext, ElementPayload, ElementRef, GuiGrouping, KindId};
use super::entity::{Entity, EntityPool};
use super::scheduler::{FlushReport, FrameClock};
use super::slot_list::{Linked, SlotLinks, SlotList};
use crate::error::{EcsError, EcsResult};

bitflags! {
    /// Element state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ElementFlags: u8 {
        /// Destruction requested; further requests are no-ops
        const DESTROYED = 0b0000_0001;
        /// Construction hook has run; visited by iteration
        const ACTIVE = 0b0000_0010;
    }
}

/// Bookkeeping stored next to every element value
#[derive(Debug, Clone, Copy)]
struct ElementHeader {
    owner: Entity,
    flags: ElementFlags,
    generation: u32,
    links: SlotLinks,
}

impl Default for ElementHeader {
    fn default() -> Self {
        Self {
            owner: Entity::NULL,
            flags: ElementFlags::empty(),
            generation: 0,
            links: SlotLinks::default(),
        }
    }
}

impl ElementHeader {
    /// Clear everything except the list links and the generation
    fn reset_preserving_links(&mut self) {
        *self = Self {
            generation: self.generation,
            links: self.links,
            ..Self::default()
        };
    }
}

#[derive(Debug, Default)]
struct Slot<T> {
    header: ElementHeader,
    value: T,
}

impl<T> Linked for Slot<T> {
    fn links(&self) -> &SlotLinks {
        &self.header.links
    }

    fn links_mut(&mut self) -> &mut SlotLinks {
        &mut self.header.links
    }
}

#[derive(Debug)]
struct PendingCreate {
    index: u32,
    generation: u32,
    payload: ElementPayload,
}

#[derive(Debug, Clone, Copy)]
struct PendingDestroy {
    index: u32,
    generation: u32,
}

/// Fixed-capacity pool for one element kind
pub struct ElementPool<T: Element> {
    name: String,
    kind: KindId,
    slots: Vec<Slot<T>>,
    list: SlotList,
    to_create: Vec<PendingCreate>,
    creating: Vec<PendingCreate>,
    to_destroy: Vec<PendingDestroy>,
    destroying: Vec<PendingDestroy>,
    enabled: bool,
}

impl<T: Element> ElementPool<T> {
    /// Create a pool with `capacity` slots
    pub fn new(name: impl Into<String>, kind: KindId, capacity: usize) -> Self {
        let name = name.into();
        let mut slots: Vec<Slot<T>> = (0..capacity).map(|_| Slot::default()).collect();
        let list = SlotList::new(&mut slots);

        log::info!(
            "Created ElementPool '{}' with {} slots of {} bytes",
            name,
            capacity,
            mem::size_of::<T>()
        );

        Self {
            name,
            kind,
            slots,
            list,
            to_create: Vec::new(),
            creating: Vec::new(),
            to_destroy: Vec::new(),
            destroying: Vec::new(),
            enabled: true,
        }
    }

    /// Reserve and reset a slot for `owner`
    pub(crate) fn alloc(&mut self, owner: Entity) -> EcsResult<ElementRef> {
        let index = self.list.alloc(&mut self.slots).ok_or_else(|| {
            log::warn!("Element pool '{}' exhausted", self.name);
            EcsError::PoolExhausted {
                pool: self.name.clone(),
                capacity: self.list.capacity(),
            }
        })?;

        let slot = &mut self.slots[index as usize];
        slot.header.reset_preserving_links();
        slot.header.owner = owner;
        slot.value = T::default();

        log::trace!("Allocated '{}' slot {}", self.name, index);
        Ok(ElementRef {
            kind: self.kind,
            index,
            generation: slot.header.generation,
        })
    }

    /// Queue construction of an allocated element
    pub(crate) fn enqueue_create(&mut self, element: ElementRef, payload: ElementPayload) {
        self.to_create.push(PendingCreate {
            index: element.index,
            generation: element.generation,
            payload,
        });
    }

    /// Mark an element destroyed and queue it; false if it already was
    pub(crate) fn enqueue_destroy(&mut self, element: ElementRef) -> EcsResult<bool> {
        let header = &mut self.slot_mut(element)?.header;
        if header.flags.contains(ElementFlags::DESTROYED) {
            return Ok(false);
        }
        header.flags.insert(ElementFlags::DESTROYED);
        self.to_destroy.push(PendingDestroy {
            index: element.index,
            generation: element.generation,
        });
        Ok(true)
    }

    /// Move pending creations into the in-flight buffer
    pub(crate) fn swap_create(&mut self) {
        debug_assert!(self.creating.is_empty());
        mem::swap(&mut self.to_create, &mut self.creating);
    }

    /// Move pending destructions into the in-flight buffer
    pub(crate) fn swap_destroy(&mut self) {
        debug_assert!(self.destroying.is_empty());
        mem::swap(&mut self.to_destroy, &mut self.destroying);
    }

    /// Construct every in-flight element in request order
    pub(crate) fn flush_create(
        &mut self,
        entities: &EntityPool,
        commands: &mut CommandBuffer,
        clock: FrameClock,
        report: &mut FlushReport,
    ) {
        for request in mem::take(&mut self.creating) {
            let element = ElementRef {
                kind: self.kind,
                index: request.index,
                generation: request.generation,
            };
            let Some(slot) = self
                .slots
                .get_mut(request.index as usize)
                .filter(|slot| is_current(&slot.header, request.generation))
            else {
                log::trace!("Skipping stale create for '{}' slot {}", self.name, request.index);
                continue;
            };
            if slot.header.flags.contains(ElementFlags::DESTROYED) {
                continue;
            }

            let links = slot.header.links;
            let mut ctx = ElementContext {
                entity: slot.header.owner,
                element,
                entities,
                commands: &mut *commands,
                frame: clock.frame,
                time_step: clock.time_step,
            };
            slot.value.on_create(&mut ctx);

            if let Some(bytes) = &request.payload.raw {
                if let Err(err) = slot.value.load_bytes(bytes) {
                    log::error!("'{}' slot {} rejected raw payload: {}", self.name, request.index, err);
                    report.errors.push(EcsError::invalid_payload(&self.name, err));
                }
            }
            if let Some(doc) = &request.payload.document {
                if let Err(err) = slot.value.load_document(doc) {
                    log::error!("'{}' slot {} rejected document payload: {}", self.name, request.index, err);
                    report.errors.push(EcsError::invalid_payload(&self.name, err));
                }
            }

            slot.header.links = links;
            slot.header.flags.insert(ElementFlags::ACTIVE);
            report.processed += 1;
        }
    }

    /// Free every in-flight element, then run its destruction hook
    pub(crate) fn flush_destroy(
        &mut self,
        entities: &mut EntityPool,
        commands: &mut CommandBuffer,
        clock: FrameClock,
        report: &mut FlushReport,
    ) {
        for request in mem::take(&mut self.destroying) {
            let element = ElementRef {
                kind: self.kind,
                index: request.index,
                generation: request.generation,
            };
            let Some(header) = self
                .slots
                .get(request.index as usize)
                .map(|slot| slot.header)
                .filter(|header| is_current(header, request.generation))
            else {
                continue;
            };

            entities.remove_element(header.owner, element);
            self.list.free(&mut self.slots, request.index);

            let slot = &mut self.slots[request.index as usize];
            slot.header.generation = slot.header.generation.wrapping_add(1);
            let links = slot.header.links;

            if header.flags.contains(ElementFlags::ACTIVE) {
                let mut ctx = ElementContext {
                    entity: header.owner,
                    element,
                    entities: &*entities,
                    commands: &mut *commands,
                    frame: clock.frame,
                    time_step: clock.time_step,
                };
                slot.value.on_destroy(&mut ctx);
            }

            slot.value = T::default();
            slot.header.links = links;
            slot.header.reset_preserving_links();
            report.processed += 1;
            log::trace!("Freed '{}' slot {}", self.name, request.index);
        }
    }

    /// Run the action hook over live elements
    pub(crate) fn action(&mut self, entities: &EntityPool, commands: &mut CommandBuffer, clock: FrameClock) {
        if !self.enabled {
            return;
        }
        let live: Vec<u32> = self.list.iter_alloc(&self.slots).collect();
        for index in live {
            let slot = &mut self.slots[index as usize];
            if !is_live(&slot.header) {
                continue;
            }
            let mut ctx = ElementContext {
                entity: slot.header.owner,
                element: ElementRef {
                    kind: self.kind,
                    index,
                    generation: slot.header.generation,
                },
                entities,
                commands: &mut *commands,
                frame: clock.frame,
                time_step: clock.time_step,
            };
            slot.value.action(&mut ctx);
        }
    }

    /// Borrow an element value
    pub fn get(&self, element: ElementRef) -> EcsResult<&T> {
        Ok(&self.slot(element)?.value)
    }

    /// Mutably borrow an element value
    pub fn get_mut(&mut self, element: ElementRef) -> EcsResult<&mut T> {
        Ok(&mut self.slot_mut(element)?.value)
    }

    /// Live elements in allocation order
    pub fn iter_live(&self) -> impl Iterator<Item = (ElementRef, Entity, &T)> + '_ {
        self.list.iter_alloc(&self.slots).filter_map(move |index| {
            let slot = &self.slots[index as usize];
            is_live(&slot.header).then(|| {
                (
                    ElementRef {
                        kind: self.kind,
                        index,
                        generation: slot.header.generation,
                    },
                    slot.header.owner,
                    &slot.value,
                )
            })
        })
    }

    fn slot(&self, element: ElementRef) -> EcsResult<&Slot<T>> {
        self.slots
            .get(element.index as usize)
            .filter(|slot| element.kind == self.kind && is_current(&slot.header, element.generation))
            .ok_or_else(|| stale_element(&self.name, element))
    }

    fn slot_mut(&mut self, element: ElementRef) -> EcsResult<&mut Slot<T>> {
        let kind = self.kind;
        let name = &self.name;
        self.slots
            .get_mut(element.index as usize)
            .filter(|slot| element.kind == kind && is_current(&slot.header, element.generation))
            .ok_or_else(|| stale_element(name, element))
    }
}

fn is_current(header: &ElementHeader, generation: u32) -> bool {
    !header.owner.is_null() && header.generation == generation
}

fn is_live(header: &ElementHeader) -> bool {
    header.flags.contains(ElementFlags::ACTIVE) && !header.flags.contains(ElementFlags::DESTROYED)
}

fn stale_element(name: &str, element: ElementRef) -> EcsError {
    EcsError::NullReference(format!(
        "'{}' element handle {}:{} is stale",
        name, element.index, element.generation
    ))
}

/// Kind-independent view of an [`ElementPool`]
///
/// Only inspection and the enable switch are public; allocation and flushing
/// stay with the [`Manager`](super::Manager):
///
/// ```compile_fail
/// use citrus_core::ecs::{Element, ElementRegistry, Entity, KindDescriptor};
///
/// #[derive(Default)]
/// struct Tag;
/// impl Element for Tag {}
///
/// let mut registry = ElementRegistry::new();
/// let tag = registry.register::<Tag>(KindDescriptor::new("Tag"), 4).unwrap();
/// registry.typed_mut(tag).unwrap().alloc(Entity::NULL).unwrap();
/// ```
pub trait ErasedPool: Any {
    /// Lookup name
    fn name(&self) -> &str;
    /// Registration id
    fn kind(&self) -> KindId;
    /// Total slot count
    fn capacity(&self) -> usize;
    /// Size of one element value in bytes
    fn slot_size(&self) -> usize;
    /// Number of allocated slots
    fn allocated(&self) -> usize;
    /// Number of free slots
    fn available(&self) -> usize;
    /// Free-list length, counted by walking it
    fn free_len(&self) -> usize;
    /// Alloc-list length, counted by walking it
    fn alloc_len(&self) -> usize;
    /// Requests waiting for the next create flush
    fn pending_create(&self) -> usize;
    /// Requests waiting for the next destroy flush
    fn pending_destroy(&self) -> usize;
    /// Whether the action pass visits this kind
    fn is_enabled(&self) -> bool;
    /// Enable or disable the action pass for this kind
    fn set_enabled(&mut self, enabled: bool);
    /// Owner of an element
    fn owner(&self, element: ElementRef) -> EcsResult<Entity>;
    /// Element state bits
    fn flags(&self, element: ElementRef) -> EcsResult<ElementFlags>;
    /// Initializer document for an element
    fn save_document(&self, element: ElementRef) -> EcsResult<Value>;
    /// Inspector descriptions of live elements
    fn render_gui(&self) -> Vec<(ElementRef, GuiGrouping)>;

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
    /// Downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Structural operations the scheduler drives on every pool
pub(crate) trait PoolLifecycle: ErasedPool {
    fn erased(&self) -> &dyn ErasedPool;
    fn alloc(&mut self, owner: Entity) -> EcsResult<ElementRef>;
    fn enqueue_create(&mut self, element: ElementRef, payload: ElementPayload);
    fn enqueue_destroy(&mut self, element: ElementRef) -> EcsResult<bool>;
    fn swap_create(&mut self);
    fn swap_destroy(&mut self);
    fn flush_create(
        &mut self,
        entities: &EntityPool,
        commands: &mut CommandBuffer,
        clock: FrameClock,
        report: &mut FlushReport,
    );
    fn flush_destroy(
        &mut self,
        entities: &mut EntityPool,
        commands: &mut CommandBuffer,
        clock: FrameClock,
        report: &mut FlushReport,
    );
    fn action(&mut self, entities: &EntityPool, commands: &mut CommandBuffer, clock: FrameClock);
}

impl<T: Element> ErasedPool for ElementPool<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> KindId {
        self.kind
    }

    fn capacity(&self) -> usize {
        self.list.capacity()
    }

    fn slot_size(&self) -> usize {
        mem::size_of::<T>()
    }

    fn allocated(&self) -> usize {
        self.list.allocated()
    }

    fn available(&self) -> usize {
        self.list.available()
    }

    fn free_len(&self) -> usize {
        self.list.walk_free_len(&self.slots)
    }

    fn alloc_len(&self) -> usize {
        self.list.iter_alloc(&self.slots).count()
    }

    fn pending_create(&self) -> usize {
        self.to_create.len()
    }

    fn pending_destroy(&self) -> usize {
        self.to_destroy.len()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn owner(&self, element: ElementRef) -> EcsResult<Entity> {
        Ok(self.slot(element)?.header.owner)
    }

    fn flags(&self, element: ElementRef) -> EcsResult<ElementFlags> {
        Ok(self.slot(element)?.header.flags)
    }

    fn save_document(&self, element: ElementRef) -> EcsResult<Value> {
        Ok(self.slot(element)?.value.save_document())
    }

    fn render_gui(&self) -> Vec<(ElementRef, GuiGrouping)> {
        self.iter_live()
            .filter_map(|(element, _, value)| value.render_gui().map(|gui| (element, gui)))
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Element> PoolLifecycle for ElementPool<T> {
    fn erased(&self) -> &dyn ErasedPool {
        self
    }

    fn alloc(&mut self, owner: Entity) -> EcsResult<ElementRef> {
        Self::alloc(self, owner)
    }

    fn enqueue_create(&mut self, element: ElementRef, payload: ElementPayload) {
        Self::enqueue_create(self, element, payload);
    }

    fn enqueue_destroy(&mut self, element: ElementRef) -> EcsResult<bool> {
        Self::enqueue_destroy(self, element)
    }

    fn swap_create(&mut self) {
        Self::swap_create(self);
    }

    fn swap_destroy(&mut self) {
        Self::swap_destroy(self);
    }

    fn flush_create(
        &mut self,
        entities: &EntityPool,
        commands: &mut CommandBuffer,
        clock: FrameClock,
        report: &mut FlushReport,
    ) {
        Self::flush_create(self, entities, commands, clock, report);
    }

    fn flush_destroy(
        &mut self,
        entities: &mut EntityPool,
        commands: &mut CommandBuffer,
        clock: FrameClock,
        report: &mut FlushReport,
    ) {
        Self::flush_destroy(self, entities, commands, clock, report);
    }

    fn action(&mut self, entities: &EntityPool, commands: &mut CommandBuffer, clock: FrameClock) {
        Self::action(self, entities, commands, clock);
    }
}
