//! Tree document vocabulary and reference rewriting
//!
//! Element initializers may embed references to other entities in the same
//! document:
//!
//! ```json
//! { "Type": "Entity Reference", "ID": 3 }
//! { "Type": "Element Reference", "Name": "Health", "ID": 3 }
//! ```
//!
//! `ID` is the document id of the target entity. It is rewritten to the
//! runtime id when the tree is instantiated. `ID` 0 is the null reference and
//! is never rewritten.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crate::ecs::{ElementRef, ElementRegistry, Entity, Manager};
use crate::error::{EcsError, EcsResult};

/// Entity display name
pub const NAME: &str = "Name";
/// Entity id
pub const ID: &str = "ID";
/// Parent entity id
pub const PARENT: &str = "Parent";
/// Local transform
pub const TRANSFORM: &str = "Transform";
/// Element records
pub const ELEMENTS: &str = "Elements";
/// Descendant entity records
pub const ENTITIES: &str = "Entities";
/// Path of an included tree document
pub const LOAD: &str = "Load";
/// Element initializer
pub const INIT: &str = "Init";
/// Reference discriminator
pub const TYPE: &str = "Type";

/// `Type` value of an entity reference
pub const ENTITY_REFERENCE: &str = "Entity Reference";
/// `Type` value of an element reference
pub const ELEMENT_REFERENCE: &str = "Element Reference";

/// Build an entity reference value
pub fn entity_reference(id: u64) -> Value {
    json!({ TYPE: ENTITY_REFERENCE, ID: id })
}

/// Build an element reference value
pub fn element_reference(kind_name: &str, id: u64) -> Value {
    json!({ TYPE: ELEMENT_REFERENCE, NAME: kind_name, ID: id })
}

fn reference_type(value: &Value) -> Option<&str> {
    value.get(TYPE).and_then(Value::as_str)
}

/// Whether a value is shaped as an entity reference
pub fn is_entity_reference(value: &Value) -> bool {
    reference_type(value) == Some(ENTITY_REFERENCE) && value.get(ID).is_some_and(Value::is_u64)
}

/// Whether a value is shaped as an element reference to a registered kind
pub fn is_element_reference(value: &Value, registry: &ElementRegistry) -> bool {
    reference_type(value) == Some(ELEMENT_REFERENCE)
        && value.get(ID).is_some_and(Value::is_u64)
        && value
            .get(NAME)
            .and_then(Value::as_str)
            .is_some_and(|name| registry.find(name).is_some())
}

fn reference_id(value: &Value, registry: &ElementRegistry) -> Option<u64> {
    if is_entity_reference(value) || is_element_reference(value, registry) {
        value.get(ID).and_then(Value::as_u64)
    } else {
        None
    }
}

/// Check that every non-null reference in `value` names an id in `known`
pub fn check_references(value: &Value, known: &HashSet<u64>, registry: &ElementRegistry) -> EcsResult<()> {
    if let Some(id) = reference_id(value, registry) {
        return if id == 0 || known.contains(&id) {
            Ok(())
        } else {
            Err(EcsError::UnresolvedReference(id))
        };
    }
    match value {
        Value::Array(items) => items.iter().try_for_each(|item| check_references(item, known, registry)),
        Value::Object(fields) => fields
            .values()
            .try_for_each(|field| check_references(field, known, registry)),
        _ => Ok(()),
    }
}

/// Rewrite the `ID` of every non-null reference in `value` through `map`
pub fn remap_references(value: &mut Value, map: &HashMap<u64, u64>, registry: &ElementRegistry) -> EcsResult<()> {
    if let Some(id) = reference_id(value, registry) {
        if id == 0 {
            return Ok(());
        }
        let mapped = map.get(&id).copied().ok_or(EcsError::UnresolvedReference(id))?;
        value[ID] = Value::from(mapped);
        return Ok(());
    }
    match value {
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| remap_references(item, map, registry)),
        Value::Object(fields) => fields
            .values_mut()
            .try_for_each(|field| remap_references(field, map, registry)),
        _ => Ok(()),
    }
}

impl Manager {
    /// Resolve an entity reference against the live entity set
    pub fn resolve_entity_reference(&self, value: &Value) -> Option<Entity> {
        if !is_entity_reference(value) {
            return None;
        }
        self.find_entity(value.get(ID)?.as_u64()?)
    }

    /// Resolve an element reference against the live entity set
    pub fn resolve_element_reference(&self, value: &Value) -> Option<ElementRef> {
        if !is_element_reference(value, self.registry()) {
            return None;
        }
        let entity = self.find_entity(value.get(ID)?.as_u64()?)?;
        self.find_element_by_name(entity, value.get(NAME)?.as_str()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Element, KindDescriptor};

    #[derive(Default)]
    struct Target;

    impl Element for Target {}

    fn registry() -> ElementRegistry {
        let mut registry = ElementRegistry::new();
        registry.register::<Target>(KindDescriptor::new("Target"), 4).unwrap();
        registry
    }

    #[test]
    fn test_reference_shapes() {
        let registry = registry();
        assert!(is_entity_reference(&entity_reference(4)));
        assert!(!is_entity_reference(&json!({ "Type": "Entity Reference", "ID": -1 })));
        assert!(!is_entity_reference(&json!({ "Type": "Entity Reference" })));
        assert!(is_element_reference(&element_reference("Target", 2), &registry));
        assert!(!is_element_reference(&element_reference("Unregistered", 2), &registry));
    }

    #[test]
    fn test_remap_nested_references() {
        let registry = registry();
        let mut value = json!({
            "target": entity_reference(1),
            "list": [element_reference("Target", 2), entity_reference(0)],
            "plain": { "ID": 1 },
        });
        let map = HashMap::from([(1, 10), (2, 20)]);

        remap_references(&mut value, &map, &registry).unwrap();
        assert_eq!(value["target"]["ID"], 10);
        assert_eq!(value["list"][0]["ID"], 20);
        assert_eq!(value["list"][1]["ID"], 0);
        assert_eq!(value["plain"]["ID"], 1);
    }

    #[test]
    fn test_unresolved_reference() {
        let registry = registry();
        let mut value = json!([entity_reference(7)]);
        let known = HashSet::from([1, 2]);

        assert!(matches!(
            check_references(&value, &known, &registry),
            Err(EcsError::UnresolvedReference(7))
        ));
        assert!(matches!(
            remap_references(&mut value, &HashMap::new(), &registry),
            Err(EcsError::UnresolvedReference(7))
        ));
    }
}
