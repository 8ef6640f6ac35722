//! Entity pool and relation graph
//!
//! Entities live in a fixed-capacity slot array. Creation is immediate;
//! destruction only marks the entity (and its descendants) and queues it for
//! the scheduler's reclaim phase. Parent/child edges are kept on both sides
//! and are only ever changed through [`EntityPool::set_relation`] and
//! [`EntityPool::clear_relation`], which keep them consistent and acyclic.

use std::collections::HashMap;

use super::element::ElementRef;
use super::slot_list::{Linked, SlotLinks, SlotList};
use crate::error::{EcsError, EcsResult};
use crate::foundation::math::Transform;

/// Entity handle
///
/// An `(index, generation)` pair. The generation changes every time the slot
/// is reclaimed, so a handle kept past its entity's destruction is detected
/// instead of silently aliasing a newer entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// The null handle; never refers to a live entity
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Whether this is the null handle
    pub const fn is_null(&self) -> bool {
        self.index == u32::MAX
    }

    /// Slot index
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at the time the handle was issued
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

/// Storage for one entity
#[derive(Debug, Default)]
struct EntitySlot {
    id: u64,
    generation: u32,
    name: String,
    parent: Option<Entity>,
    children: Vec<Entity>,
    elements: Vec<ElementRef>,
    transform: Transform,
    destroyed: bool,
    links: SlotLinks,
}

impl Linked for EntitySlot {
    fn links(&self) -> &SlotLinks {
        &self.links
    }

    fn links_mut(&mut self) -> &mut SlotLinks {
        &mut self.links
    }
}

/// Fixed-capacity arena of entities with an intrusive free/alloc list
pub struct EntityPool {
    slots: Vec<EntitySlot>,
    list: SlotList,
    next_id: u64,
    by_id: HashMap<u64, Entity>,
    pending_destroy: Vec<Entity>,
}

impl EntityPool {
    /// Create a pool holding at most `capacity` entities
    pub fn new(capacity: usize) -> Self {
        let mut slots: Vec<EntitySlot> = (0..capacity).map(|_| EntitySlot::default()).collect();
        let list = SlotList::new(&mut slots);

        log::info!("Created EntityPool with {} slots", capacity);

        Self {
            slots,
            list,
            next_id: 1,
            by_id: HashMap::with_capacity(capacity),
            pending_destroy: Vec::new(),
        }
    }

    /// Allocate a named entity; it is visible immediately
    pub fn create(&mut self, name: impl Into<String>) -> EcsResult<Entity> {
        let index = self.list.alloc(&mut self.slots).ok_or_else(|| {
            log::warn!("Entity pool exhausted ({} slots)", self.list.capacity());
            EcsError::PoolExhausted {
                pool: "entities".to_string(),
                capacity: self.list.capacity(),
            }
        })?;

        let id = self.next_id;
        self.next_id += 1;

        let slot = &mut self.slots[index as usize];
        slot.id = id;
        slot.name = name.into();
        slot.parent = None;
        slot.children.clear();
        slot.elements.clear();
        slot.transform = Transform::default();
        slot.destroyed = false;

        let entity = Entity::new(index, slot.generation);
        self.by_id.insert(id, entity);
        log::trace!("Created entity {} '{}' at slot {}", id, slot.name, index);
        Ok(entity)
    }

    /// Queue an entity and all of its descendants for destruction
    ///
    /// Nothing is unlinked until the scheduler's reclaim phase; calling this
    /// again before then has no further effect.
    pub fn destroy(&mut self, entity: Entity) -> EcsResult<()> {
        self.slot(entity)?;

        let mut stack = vec![entity];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slot_mut_opt(current) else {
                continue;
            };
            if slot.destroyed {
                continue;
            }
            slot.destroyed = true;
            stack.extend(slot.children.iter().rev().copied());
            self.pending_destroy.push(current);
        }
        Ok(())
    }

    /// Make `child` a child of `parent`
    ///
    /// Returns `Ok(false)` without touching the graph when the pair is
    /// already related, when `parent == child`, or when `child` is an
    /// ancestor of `parent` (the edge would close a cycle).
    pub fn set_relation(&mut self, parent: Entity, child: Entity) -> EcsResult<bool> {
        self.slot(parent)?;
        let current_parent = self.slot(child)?.parent;

        if parent == child || current_parent == Some(parent) {
            return Ok(false);
        }

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                log::warn!(
                    "Rejected relation {} -> {}: would create a cycle",
                    self.slots[parent.index as usize].id,
                    self.slots[child.index as usize].id
                );
                return Ok(false);
            }
            cursor = self.slots[ancestor.index as usize].parent;
        }

        self.detach(child);
        self.slots[child.index as usize].parent = Some(parent);
        self.slots[parent.index as usize].children.push(child);
        Ok(true)
    }

    /// Detach `child` from its parent; its own children stay attached to it
    ///
    /// Returns whether there was a parent to detach from.
    pub fn clear_relation(&mut self, child: Entity) -> EcsResult<bool> {
        self.slot(child)?;
        Ok(self.detach(child))
    }

    fn detach(&mut self, child: Entity) -> bool {
        let Some(parent) = self.slots[child.index as usize].parent.take() else {
            return false;
        };
        if let Some(parent_slot) = self.slot_mut_opt(parent) {
            parent_slot.children.retain(|&c| c != child);
        }
        true
    }

    /// Whether the handle refers to an allocated entity
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slot(entity).is_ok()
    }

    /// Whether the entity is queued for destruction
    pub fn is_destroyed(&self, entity: Entity) -> EcsResult<bool> {
        Ok(self.slot(entity)?.destroyed)
    }

    /// Runtime id of a live entity
    pub fn id(&self, entity: Entity) -> EcsResult<u64> {
        Ok(self.slot(entity)?.id)
    }

    /// Find a live entity by runtime id
    pub fn find(&self, id: u64) -> Option<Entity> {
        self.by_id.get(&id).copied()
    }

    /// Display name
    pub fn name(&self, entity: Entity) -> EcsResult<&str> {
        Ok(&self.slot(entity)?.name)
    }

    /// Rename an entity
    pub fn set_name(&mut self, entity: Entity, name: impl Into<String>) -> EcsResult<()> {
        self.slot_mut(entity)?.name = name.into();
        Ok(())
    }

    /// Parent, if any
    pub fn parent(&self, entity: Entity) -> EcsResult<Option<Entity>> {
        Ok(self.slot(entity)?.parent)
    }

    /// Children in attachment order
    pub fn children(&self, entity: Entity) -> EcsResult<&[Entity]> {
        Ok(&self.slot(entity)?.children)
    }

    /// Owned elements in creation order
    pub fn elements(&self, entity: Entity) -> EcsResult<&[ElementRef]> {
        Ok(&self.slot(entity)?.elements)
    }

    /// Local transform
    pub fn transform(&self, entity: Entity) -> EcsResult<&Transform> {
        Ok(&self.slot(entity)?.transform)
    }

    /// Replace the local transform
    pub fn set_transform(&mut self, entity: Entity, transform: Transform) -> EcsResult<()> {
        self.slot_mut(entity)?.transform = transform;
        Ok(())
    }

    /// Live entities in allocation order
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.list
            .iter_alloc(&self.slots)
            .map(|index| Entity::new(index, self.slots[index as usize].generation))
    }

    /// All descendants of `root`: its children first, then each child's
    /// descendants in turn
    pub fn descendants(&self, root: Entity) -> EcsResult<Vec<Entity>> {
        self.slot(root)?;
        let mut out = Vec::new();
        self.collect_descendants(root, &mut out);
        Ok(out)
    }

    fn collect_descendants(&self, entity: Entity, out: &mut Vec<Entity>) {
        let children = &self.slots[entity.index as usize].children;
        out.extend_from_slice(children);
        for &child in children {
            self.collect_descendants(child, out);
        }
    }

    /// Number of live entities
    pub const fn live_count(&self) -> usize {
        self.list.allocated()
    }

    /// Number of free slots
    pub const fn free_count(&self) -> usize {
        self.list.available()
    }

    /// Free-list length, counted by walking the list
    pub fn free_list_len(&self) -> usize {
        self.list.walk_free_len(&self.slots)
    }

    /// Total slot count
    pub const fn capacity(&self) -> usize {
        self.list.capacity()
    }

    /// Entities queued for destruction and not yet reclaimed
    pub fn pending_destroy(&self) -> &[Entity] {
        &self.pending_destroy
    }

    pub(crate) fn take_pending_destroy(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.pending_destroy)
    }

    pub(crate) fn push_element(&mut self, entity: Entity, element: ElementRef) -> EcsResult<()> {
        self.slot_mut(entity)?.elements.push(element);
        Ok(())
    }

    /// Remove an element from its owner's list; false if it was not there
    pub(crate) fn remove_element(&mut self, entity: Entity, element: ElementRef) -> bool {
        let Some(slot) = self.slot_mut_opt(entity) else {
            return false;
        };
        match slot.elements.iter().position(|&e| e == element) {
            Some(position) => {
                slot.elements.remove(position);
                true
            }
            None => false,
        }
    }

    /// Unlink a queued entity from the graph and return its slot
    ///
    /// Children become parentless. Any elements still owned are returned so
    /// the caller can queue them.
    pub(crate) fn reclaim(&mut self, entity: Entity) -> Vec<ElementRef> {
        if !self.is_alive(entity) {
            return Vec::new();
        }

        self.detach(entity);
        let children = std::mem::take(&mut self.slots[entity.index as usize].children);
        for child in children {
            if let Some(child_slot) = self.slot_mut_opt(child) {
                child_slot.parent = None;
            }
        }

        self.list.free(&mut self.slots, entity.index);

        let slot = &mut self.slots[entity.index as usize];
        let leftover = std::mem::take(&mut slot.elements);
        self.by_id.remove(&slot.id);
        log::trace!("Reclaimed entity {} '{}'", slot.id, slot.name);

        slot.id = 0;
        slot.generation = slot.generation.wrapping_add(1);
        slot.name.clear();
        slot.transform = Transform::default();
        slot.destroyed = false;

        leftover
    }

    fn slot(&self, entity: Entity) -> EcsResult<&EntitySlot> {
        self.slots
            .get(entity.index as usize)
            .filter(|slot| slot.id != 0 && slot.generation == entity.generation)
            .ok_or_else(|| null_entity(entity))
    }

    fn slot_mut(&mut self, entity: Entity) -> EcsResult<&mut EntitySlot> {
        self.slot_mut_opt(entity).ok_or_else(|| null_entity(entity))
    }

    fn slot_mut_opt(&mut self, entity: Entity) -> Option<&mut EntitySlot> {
        self.slots
            .get_mut(entity.index as usize)
            .filter(|slot| slot.id != 0 && slot.generation == entity.generation)
    }
}

fn null_entity(entity: Entity) -> EcsError {
    if entity.is_null() {
        EcsError::NullReference("null entity handle".to_string())
    } else {
        EcsError::NullReference(format!(
            "entity handle {}:{} is stale or was never issued",
            entity.index, entity.generation
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_and_never_zero() {
        let mut pool = EntityPool::new(4);
        let a = pool.create("a").unwrap();
        let b = pool.create("b").unwrap();
        assert_eq!(pool.id(a).unwrap(), 1);
        assert_eq!(pool.id(b).unwrap(), 2);
        assert_eq!(pool.find(2), Some(b));
        assert_eq!(pool.find(0), None);
    }

    #[test]
    fn test_capacity_exhaustion() {
        let mut pool = EntityPool::new(2);
        pool.create("a").unwrap();
        pool.create("b").unwrap();
        assert!(matches!(pool.create("c"), Err(EcsError::PoolExhausted { capacity: 2, .. })));
        assert_eq!(pool.live_count(), 2);
        assert_eq!(pool.free_list_len(), 0);
    }

    #[test]
    fn test_relation_is_mutual() {
        let mut pool = EntityPool::new(4);
        let parent = pool.create("parent").unwrap();
        let child = pool.create("child").unwrap();

        assert!(pool.set_relation(parent, child).unwrap());
        assert_eq!(pool.parent(child).unwrap(), Some(parent));
        assert_eq!(pool.children(parent).unwrap(), &[child]);

        // Already related
        assert!(!pool.set_relation(parent, child).unwrap());
        assert_eq!(pool.children(parent).unwrap().len(), 1);
    }

    #[test]
    fn test_relation_rejects_cycles() {
        let mut pool = EntityPool::new(4);
        let a = pool.create("a").unwrap();
        let b = pool.create("b").unwrap();
        let c = pool.create("c").unwrap();
        pool.set_relation(a, b).unwrap();
        pool.set_relation(b, c).unwrap();

        assert!(!pool.set_relation(c, a).unwrap());
        assert!(!pool.set_relation(a, a).unwrap());
        assert_eq!(pool.parent(a).unwrap(), None);
        assert_eq!(pool.children(c).unwrap(), &[] as &[Entity]);
        assert_eq!(pool.parent(c).unwrap(), Some(b));
    }

    #[test]
    fn test_reparent_moves_child() {
        let mut pool = EntityPool::new(4);
        let first = pool.create("first").unwrap();
        let second = pool.create("second").unwrap();
        let child = pool.create("child").unwrap();

        pool.set_relation(first, child).unwrap();
        assert!(pool.set_relation(second, child).unwrap());
        assert!(pool.children(first).unwrap().is_empty());
        assert_eq!(pool.children(second).unwrap(), &[child]);
    }

    #[test]
    fn test_clear_relation_keeps_grandchildren() {
        let mut pool = EntityPool::new(4);
        let a = pool.create("a").unwrap();
        let b = pool.create("b").unwrap();
        let c = pool.create("c").unwrap();
        pool.set_relation(a, b).unwrap();
        pool.set_relation(b, c).unwrap();

        assert!(pool.clear_relation(b).unwrap());
        assert!(!pool.clear_relation(b).unwrap());
        assert_eq!(pool.parent(b).unwrap(), None);
        assert_eq!(pool.parent(c).unwrap(), Some(b));
        assert!(pool.children(a).unwrap().is_empty());
    }

    #[test]
    fn test_destroy_queues_descendants_once() {
        let mut pool = EntityPool::new(4);
        let a = pool.create("a").unwrap();
        let b = pool.create("b").unwrap();
        let c = pool.create("c").unwrap();
        pool.set_relation(a, b).unwrap();
        pool.set_relation(b, c).unwrap();

        pool.destroy(a).unwrap();
        pool.destroy(a).unwrap();
        pool.destroy(c).unwrap();
        assert_eq!(pool.pending_destroy(), &[a, b, c]);
        assert!(pool.is_destroyed(b).unwrap());
    }

    #[test]
    fn test_reclaim_orphans_children_and_invalidates_handle() {
        let mut pool = EntityPool::new(4);
        let root = pool.create("root").unwrap();
        let middle = pool.create("middle").unwrap();
        let leaf = pool.create("leaf").unwrap();
        pool.set_relation(root, middle).unwrap();
        pool.set_relation(middle, leaf).unwrap();

        let leftover = pool.reclaim(middle);
        assert!(leftover.is_empty());
        assert!(!pool.is_alive(middle));
        assert!(pool.children(root).unwrap().is_empty());
        assert_eq!(pool.parent(leaf).unwrap(), None);
        assert!(matches!(pool.id(middle), Err(EcsError::NullReference(_))));

        // The recycled slot issues a handle with a new generation
        let reused = pool.create("reused").unwrap();
        assert_eq!(reused.index(), middle.index());
        assert_ne!(reused, middle);
        assert!(pool.is_alive(reused));
        assert_eq!(pool.id(reused).unwrap(), 4);
    }

    #[test]
    fn test_descendants_order() {
        let mut pool = EntityPool::new(8);
        let root = pool.create("root").unwrap();
        let a = pool.create("a").unwrap();
        let b = pool.create("b").unwrap();
        let a1 = pool.create("a1").unwrap();
        let b1 = pool.create("b1").unwrap();
        pool.set_relation(root, a).unwrap();
        pool.set_relation(root, b).unwrap();
        pool.set_relation(a, a1).unwrap();
        pool.set_relation(b, b1).unwrap();

        assert_eq!(pool.descendants(root).unwrap(), vec![a, b, a1, b1]);
    }

    #[test]
    fn test_null_handle_rejected() {
        let mut pool = EntityPool::new(1);
        assert!(matches!(pool.destroy(Entity::NULL), Err(EcsError::NullReference(_))));
        assert!(matches!(pool.clear_relation(Entity::NULL), Err(EcsError::NullReference(_))));
    }
}
