//! Element kind registry
//!
//! Maps kind handles and lookup names to their pools. Pools are kept in
//! registration order, which is also the order the scheduler flushes them in.

use std::collections::HashMap;

use super::element::{Element, KindDescriptor, KindHandle, KindId};
use super::pool::{ElementPool, ErasedPool, PoolLifecycle};
use crate::error::{EcsError, EcsResult};

/// Directory of registered element kinds
#[derive(Default)]
pub struct ElementRegistry {
    pools: Vec<Box<dyn PoolLifecycle>>,
    by_name: HashMap<String, KindId>,
}

impl ElementRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind and create its pool
    pub fn register<T: Element>(
        &mut self,
        descriptor: KindDescriptor,
        default_capacity: usize,
    ) -> EcsResult<KindHandle<T>> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(EcsError::KindAlreadyRegistered(descriptor.name));
        }
        let capacity = descriptor.capacity.unwrap_or(default_capacity);
        if capacity == 0 || capacity >= u32::MAX as usize {
            return Err(EcsError::Config(crate::config::ConfigError::Invalid {
                field: "capacity",
                reason: format!("'{}' capacity must be in 1..{}, got {}", descriptor.name, u32::MAX, capacity),
            }));
        }

        #[allow(clippy::cast_possible_truncation)]
        let kind = KindId(self.pools.len() as u32);
        self.pools
            .push(Box::new(ElementPool::<T>::new(descriptor.name.clone(), kind, capacity)));
        self.by_name.insert(descriptor.name, kind);
        Ok(KindHandle::new(kind))
    }

    /// Find a kind by lookup name
    pub fn find(&self, name: &str) -> Option<KindId> {
        self.by_name.get(name).copied()
    }

    /// Find a kind by lookup name, failing with `UnknownElementKind`
    pub fn require(&self, name: &str) -> EcsResult<KindId> {
        self.find(name)
            .ok_or_else(|| EcsError::UnknownElementKind(name.to_string()))
    }

    /// Type-erased pool for a kind
    pub fn pool(&self, kind: KindId) -> EcsResult<&dyn ErasedPool> {
        self.pools
            .get(kind.index())
            .map(|pool| pool.erased())
            .ok_or_else(|| unknown_kind(kind))
    }

    pub(crate) fn pool_mut(&mut self, kind: KindId) -> EcsResult<&mut dyn PoolLifecycle> {
        match self.pools.get_mut(kind.index()) {
            Some(pool) => Ok(&mut **pool),
            None => Err(unknown_kind(kind)),
        }
    }

    /// Typed pool for a kind handle
    pub fn typed<T: Element>(&self, kind: KindHandle<T>) -> EcsResult<&ElementPool<T>> {
        self.pool(kind.id())?
            .as_any()
            .downcast_ref::<ElementPool<T>>()
            .ok_or_else(|| unknown_kind(kind.id()))
    }

    /// Mutable typed pool for a kind handle
    pub fn typed_mut<T: Element>(&mut self, kind: KindHandle<T>) -> EcsResult<&mut ElementPool<T>> {
        self.pool_mut(kind.id())?
            .as_any_mut()
            .downcast_mut::<ElementPool<T>>()
            .ok_or_else(|| unknown_kind(kind.id()))
    }

    /// Lookup name of a kind
    pub fn name(&self, kind: KindId) -> EcsResult<&str> {
        Ok(self.pool(kind)?.name())
    }

    /// Pools in registration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn ErasedPool> + '_ {
        self.pools.iter().map(|pool| pool.erased())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn PoolLifecycle>> + '_ {
        self.pools.iter_mut()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no kind is registered
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

fn unknown_kind(kind: KindId) -> EcsError {
    EcsError::UnknownElementKind(format!("#{}", kind.index()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Marker;

    impl Element for Marker {}

    #[derive(Default)]
    struct Other(#[allow(dead_code)] u64);

    impl Element for Other {}

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ElementRegistry::new();
        let marker = registry
            .register::<Marker>(KindDescriptor::new("Marker").with_capacity(3), 8)
            .unwrap();
        let other = registry.register::<Other>(KindDescriptor::new("Other"), 8).unwrap();

        assert_eq!(registry.find("Marker"), Some(marker.id()));
        assert_eq!(registry.find("Other"), Some(other.id()));
        assert_eq!(registry.pool(marker.id()).unwrap().capacity(), 3);
        assert_eq!(registry.pool(other.id()).unwrap().capacity(), 8);
        assert_eq!(registry.pool(other.id()).unwrap().slot_size(), 8);
        assert!(registry.typed(marker).is_ok());
        assert!(matches!(registry.require("Missing"), Err(EcsError::UnknownElementKind(_))));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ElementRegistry::new();
        registry.register::<Marker>(KindDescriptor::new("Marker"), 4).unwrap();
        assert!(matches!(
            registry.register::<Other>(KindDescriptor::new("Marker"), 4),
            Err(EcsError::KindAlreadyRegistered(_))
        ));
        assert_eq!(registry.len(), 1);
    }
}
