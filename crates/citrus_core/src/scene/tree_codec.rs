//! Entity subtree serialization and instantiation
//!
//! A tree document describes its root in the top-level object and every
//! descendant as a record in `Entities`:
//!
//! ```json
//! {
//!   "Name": "Ship", "ID": 1, "Transform": { ... },
//!   "Elements": [ { "Name": "Health", "Init": { "current": 10 } } ],
//!   "Entities": [
//!     { "Name": "Turret", "ID": 2, "Parent": 1, "Transform": { ... }, "Elements": [] },
//!     { "Name": "Escort", "ID": 3, "Parent": 0, "Transform": { ... }, "Load": "escort.json" }
//!   ]
//! }
//! ```
//!
//! `Parent` 0 (or the top-level `ID`) attaches a record to the root. A record
//! carries either `Elements` or `Load`: the included document's root elements
//! become the record's elements and its descendants are spliced in below it
//! with fresh ids. Inside an included document, `Parent` 0 and the included
//! top-level `ID` both mean the importing record. References to that top-level
//! `ID` are rewritten to the importing record as well; reference `ID` 0 stays
//! null. Parents and references of the importing document itself must resolve
//! among its own records.
//!
//! Instantiation plans the whole tree first, includes and all, and only
//! allocates once every check has passed.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Map, Value};

use super::document::{
    check_references, remap_references, ELEMENTS, ENTITIES, ID, INIT, LOAD, NAME, PARENT, TRANSFORM,
};
use super::prefab::{DocumentSource, FsDocumentSource};
use crate::config::DuplicatePolicy;
use crate::ecs::{ElementFlags, ElementPayload, ElementRegistry, Entity, EntityPool, KindId, Manager};
use crate::error::{EcsError, EcsResult};
use crate::foundation::math::Transform;

#[derive(Debug, Clone)]
struct RawElement {
    kind_name: String,
    init: Value,
}

#[derive(Debug, Clone)]
enum RecordBody {
    Inline(Vec<RawElement>),
    Load(String),
}

#[derive(Debug, Clone)]
struct RawRecord {
    id: u64,
    parent: u64,
    name: String,
    transform: Transform,
    body: RecordBody,
}

#[derive(Debug)]
struct ParsedDocument {
    name: String,
    id: u64,
    transform: Transform,
    elements: Vec<RawElement>,
    records: Vec<RawRecord>,
}

#[derive(Debug, Clone)]
struct PlannedElement {
    kind: KindId,
    init: Value,
}

#[derive(Debug, Clone)]
struct PlannedRecord {
    id: u64,
    parent: u64,
    name: String,
    transform: Transform,
    elements: Vec<PlannedElement>,
}

#[derive(Debug)]
struct TreePlan {
    root: PlannedRecord,
    records: Vec<PlannedRecord>,
}

impl TreePlan {
    fn all_records(&self) -> impl Iterator<Item = &PlannedRecord> + '_ {
        std::iter::once(&self.root).chain(&self.records)
    }

    fn is_root(&self, id: u64) -> bool {
        id == 0 || id == self.root.id
    }
}

fn field<'a>(object: &'a Map<String, Value>, name: &str, context: &str) -> EcsResult<&'a Value> {
    object
        .get(name)
        .ok_or_else(|| EcsError::malformed(format!("{context}: missing '{name}'")))
}

fn string_field(object: &Map<String, Value>, name: &str, context: &str) -> EcsResult<String> {
    field(object, name, context)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| EcsError::malformed(format!("{context}: '{name}' must be a string")))
}

fn id_field(object: &Map<String, Value>, name: &str, context: &str) -> EcsResult<u64> {
    field(object, name, context)?
        .as_u64()
        .ok_or_else(|| EcsError::malformed(format!("{context}: '{name}' must be an unsigned integer")))
}

fn parse_elements(value: &Value, context: &str) -> EcsResult<Vec<RawElement>> {
    let items = value
        .as_array()
        .ok_or_else(|| EcsError::malformed(format!("{context}: '{ELEMENTS}' must be an array")))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| -> EcsResult<RawElement> {
            let context = format!("{context}, element {index}");
            let object = item
                .as_object()
                .ok_or_else(|| EcsError::malformed(format!("{context}: must be an object")))?;
            Ok(RawElement {
                kind_name: string_field(object, NAME, &context)?,
                init: field(object, INIT, &context)?.clone(),
            })
        })
        .collect()
}

fn parse_record(value: &Value, index: usize) -> EcsResult<RawRecord> {
    let context = format!("entity record {index}");
    let object = value
        .as_object()
        .ok_or_else(|| EcsError::malformed(format!("{context}: must be an object")))?;

    let id = id_field(object, ID, &context)?;
    if id == 0 {
        return Err(EcsError::malformed(format!("{context}: '{ID}' must be nonzero")));
    }

    let body = match (object.get(ELEMENTS), object.get(LOAD)) {
        (Some(elements), None) => RecordBody::Inline(parse_elements(elements, &context)?),
        (None, Some(load)) => RecordBody::Load(
            load.as_str()
                .map(str::to_string)
                .ok_or_else(|| EcsError::malformed(format!("{context}: '{LOAD}' must be a path string")))?,
        ),
        (Some(_), Some(_)) => {
            return Err(EcsError::malformed(format!(
                "{context}: '{ELEMENTS}' and '{LOAD}' are mutually exclusive"
            )))
        }
        (None, None) => {
            return Err(EcsError::malformed(format!(
                "{context}: needs either '{ELEMENTS}' or '{LOAD}'"
            )))
        }
    };

    Ok(RawRecord {
        id,
        parent: id_field(object, PARENT, &context)?,
        name: string_field(object, NAME, &context)?,
        transform: Transform::from_document(field(object, TRANSFORM, &context)?)?,
        body,
    })
}

fn parse_document(document: &Value) -> EcsResult<ParsedDocument> {
    let object = document
        .as_object()
        .ok_or_else(|| EcsError::malformed("tree document must be an object"))?;

    let records = field(object, ENTITIES, "tree document")?
        .as_array()
        .ok_or_else(|| EcsError::malformed(format!("'{ENTITIES}' must be an array")))?
        .iter()
        .enumerate()
        .map(|(index, record)| parse_record(record, index))
        .collect::<EcsResult<Vec<_>>>()?;
    let elements = parse_elements(field(object, ELEMENTS, "tree document")?, "tree document")?;

    let name = match object.get(NAME) {
        Some(name) => name
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EcsError::malformed(format!("top-level '{NAME}' must be a string")))?,
        None => String::new(),
    };
    let id = match object.get(ID) {
        Some(id) => id
            .as_u64()
            .ok_or_else(|| EcsError::malformed(format!("top-level '{ID}' must be an unsigned integer")))?,
        None => 0,
    };
    let transform = match object.get(TRANSFORM) {
        Some(transform) => Transform::from_document(transform)?,
        None => Transform::default(),
    };

    let mut seen = HashSet::new();
    if id != 0 {
        seen.insert(id);
    }
    for record in &records {
        if !seen.insert(record.id) {
            return Err(EcsError::DuplicateId(record.id));
        }
    }

    Ok(ParsedDocument {
        name,
        id,
        transform,
        elements,
        records,
    })
}

/// Dry run over a tree document: expands includes and checks everything
/// that could make instantiation fail
struct Planner<'a> {
    registry: &'a ElementRegistry,
    source: &'a dyn DocumentSource,
    max_depth: usize,
    policy: DuplicatePolicy,
    /// Next id handed to an included record; `None` once the id space is used up
    next_id: Option<u64>,
}

impl<'a> Planner<'a> {
    fn new(manager: &'a Manager, source: &'a dyn DocumentSource) -> Self {
        Self {
            registry: &manager.registry,
            source,
            max_depth: manager.config.max_include_depth,
            policy: manager.config.duplicate_policy,
            next_id: Some(1),
        }
    }

    fn fresh_id(&mut self) -> EcsResult<u64> {
        let id = self
            .next_id
            .ok_or_else(|| EcsError::malformed(format!("'{ID}' values leave no room for included records")))?;
        self.next_id = id.checked_add(1);
        Ok(id)
    }

    fn plan(mut self, document: &Value) -> EcsResult<TreePlan> {
        let parsed = parse_document(document)?;
        check_top_level(&parsed, self.registry)?;
        self.next_id = parsed
            .records
            .iter()
            .map(|record| record.id)
            .chain(std::iter::once(parsed.id))
            .max()
            .unwrap_or(0)
            .checked_add(1);

        let root = PlannedRecord {
            id: parsed.id,
            parent: 0,
            name: parsed.name,
            transform: parsed.transform,
            elements: self.resolve_elements(parsed.elements)?,
        };

        let mut records = Vec::with_capacity(parsed.records.len());
        for record in parsed.records {
            self.expand(record, 0, &mut records)?;
        }

        let mut plan = TreePlan { root, records };
        self.check_parents(&plan)?;
        self.check_references(&plan)?;
        self.apply_duplicate_policy(&mut plan)?;
        Ok(plan)
    }

    fn resolve_elements(&self, elements: Vec<RawElement>) -> EcsResult<Vec<PlannedElement>> {
        elements
            .into_iter()
            .map(|element| -> EcsResult<PlannedElement> {
                Ok(PlannedElement {
                    kind: self.registry.require(&element.kind_name)?,
                    init: element.init,
                })
            })
            .collect()
    }

    fn expand(&mut self, record: RawRecord, depth: usize, out: &mut Vec<PlannedRecord>) -> EcsResult<()> {
        let slot = out.len();
        out.push(PlannedRecord {
            id: record.id,
            parent: record.parent,
            name: record.name,
            transform: record.transform,
            elements: Vec::new(),
        });

        out[slot].elements = match record.body {
            RecordBody::Inline(elements) => self.resolve_elements(elements)?,
            RecordBody::Load(path) => self.include(record.id, &path, depth + 1, out)?,
        };
        Ok(())
    }

    /// Splice the document at `path` below `importer`; returns its root elements
    fn include(
        &mut self,
        importer: u64,
        path: &str,
        depth: usize,
        out: &mut Vec<PlannedRecord>,
    ) -> EcsResult<Vec<PlannedElement>> {
        if depth > self.max_depth {
            return Err(EcsError::malformed(format!(
                "include '{path}' nests deeper than {} levels",
                self.max_depth
            )));
        }

        let parsed = parse_document(&self.source.load(path)?)?;

        let mut map = HashMap::with_capacity(parsed.records.len() + 1);
        if parsed.id != 0 {
            map.insert(parsed.id, importer);
        }
        for record in &parsed.records {
            map.insert(record.id, self.fresh_id()?);
        }

        let mut elements = parsed.elements;
        for element in &mut elements {
            remap_references(&mut element.init, &map, self.registry)?;
        }

        for mut record in parsed.records {
            let parent = match record.parent {
                0 => importer,
                parent => map.get(&parent).copied().ok_or(EcsError::UnresolvedParent {
                    id: record.id,
                    parent,
                })?,
            };
            record.id = map[&record.id];
            record.parent = parent;
            if let RecordBody::Inline(inline) = &mut record.body {
                for element in inline {
                    remap_references(&mut element.init, &map, self.registry)?;
                }
            }
            self.expand(record, depth, out)?;
        }

        log::debug!("Expanded include '{}' below record {}", path, importer);
        self.resolve_elements(elements)
    }

    fn check_parents(&self, plan: &TreePlan) -> EcsResult<()> {
        let parents: HashMap<u64, u64> = plan.records.iter().map(|record| (record.id, record.parent)).collect();

        for record in &plan.records {
            let unresolved = || EcsError::UnresolvedParent {
                id: record.id,
                parent: record.parent,
            };
            let mut cursor = record.parent;
            let mut steps = 0;
            while !plan.is_root(cursor) {
                cursor = *parents.get(&cursor).ok_or_else(unresolved)?;
                steps += 1;
                if steps > plan.records.len() {
                    return Err(unresolved());
                }
            }
        }
        Ok(())
    }

    fn check_references(&self, plan: &TreePlan) -> EcsResult<()> {
        let known: HashSet<u64> = plan.all_records().map(|record| record.id).filter(|&id| id != 0).collect();
        plan.all_records()
            .flat_map(|record| &record.elements)
            .try_for_each(|element| check_references(&element.init, &known, self.registry))
    }

    fn apply_duplicate_policy(&self, plan: &mut TreePlan) -> EcsResult<()> {
        let policy = self.policy;
        let registry = self.registry;
        std::iter::once(&mut plan.root)
            .chain(plan.records.iter_mut())
            .try_for_each(|record| {
                let id = record.id;
                let mut seen = HashSet::new();
                let mut error = None;
                record.elements.retain(|element| {
                    if seen.insert(element.kind) {
                        return true;
                    }
                    if policy == DuplicatePolicy::Reject && error.is_none() {
                        error = Some(EcsError::DuplicateElement {
                            entity: id,
                            kind: registry.name(element.kind).unwrap_or_default().to_string(),
                        });
                    }
                    false
                });
                error.map_or(Ok(()), Err)
            })
    }
}

/// Resolve the document's own parents and references before includes add
/// ids of their own
fn check_top_level(parsed: &ParsedDocument, registry: &ElementRegistry) -> EcsResult<()> {
    let mut known: HashSet<u64> = parsed.records.iter().map(|record| record.id).collect();
    if parsed.id != 0 {
        known.insert(parsed.id);
    }

    for record in &parsed.records {
        if record.parent != 0 && !known.contains(&record.parent) {
            return Err(EcsError::UnresolvedParent {
                id: record.id,
                parent: record.parent,
            });
        }
    }

    let inline = parsed.records.iter().filter_map(|record| match &record.body {
        RecordBody::Inline(elements) => Some(elements),
        RecordBody::Load(_) => None,
    });
    std::iter::once(&parsed.elements)
        .chain(inline)
        .flatten()
        .try_for_each(|element| check_references(&element.init, &known, registry))
}

fn check_capacity(entities: &EntityPool, registry: &ElementRegistry, plan: &TreePlan) -> EcsResult<()> {
    let needed = plan.records.len() + 1;
    if needed > entities.free_count() {
        return Err(EcsError::PoolExhausted {
            pool: "entities".to_string(),
            capacity: entities.capacity(),
        });
    }

    let mut per_kind: HashMap<KindId, usize> = HashMap::new();
    for element in plan.all_records().flat_map(|record| &record.elements) {
        *per_kind.entry(element.kind).or_default() += 1;
    }
    for (kind, count) in per_kind {
        let pool = registry.pool(kind)?;
        if count > pool.available() {
            return Err(EcsError::PoolExhausted {
                pool: pool.name().to_string(),
                capacity: pool.capacity(),
            });
        }
    }
    Ok(())
}

impl Manager {
    /// Describe the subtree under `root` as a tree document
    pub fn serialize_tree(&self, root: Entity) -> EcsResult<Value> {
        let mut document = Map::new();
        document.insert(NAME.to_string(), json!(self.entities.name(root)?));
        document.insert(ID.to_string(), json!(self.entities.id(root)?));
        document.insert(TRANSFORM.to_string(), self.entities.transform(root)?.to_document());
        document.insert(ELEMENTS.to_string(), self.element_records(root)?);

        let records = self
            .entities
            .descendants(root)?
            .into_iter()
            .map(|entity| -> EcsResult<Value> {
                let parent = self
                    .entities
                    .parent(entity)?
                    .map_or(Ok(0), |parent| self.entities.id(parent))?;
                Ok(json!({
                    NAME: self.entities.name(entity)?,
                    ID: self.entities.id(entity)?,
                    PARENT: parent,
                    TRANSFORM: self.entities.transform(entity)?.to_document(),
                    ELEMENTS: self.element_records(entity)?,
                }))
            })
            .collect::<EcsResult<Vec<_>>>()?;
        document.insert(ENTITIES.to_string(), Value::Array(records));

        Ok(Value::Object(document))
    }

    fn element_records(&self, entity: Entity) -> EcsResult<Value> {
        let mut records = Vec::new();
        for &element in self.entities.elements(entity)? {
            let pool = self.registry.pool(element.kind())?;
            if pool.flags(element)?.contains(ElementFlags::DESTROYED) {
                continue;
            }
            records.push(json!({
                NAME: pool.name(),
                INIT: pool.save_document(element)?,
            }));
        }
        Ok(Value::Array(records))
    }

    /// Instantiate a tree document; includes resolve under the prefab root
    pub fn deserialize_tree(&mut self, document: &Value) -> EcsResult<Entity> {
        let source = FsDocumentSource::new(self.config.prefab_root.clone());
        self.deserialize_tree_with(document, &source)
    }

    /// Instantiate a tree document, reading includes from `source`
    ///
    /// Either the whole tree is created or nothing is. Elements become live
    /// at the next create flush.
    pub fn deserialize_tree_with(&mut self, document: &Value, source: &dyn DocumentSource) -> EcsResult<Entity> {
        let plan = Planner::new(self, source).plan(document)?;
        check_capacity(&self.entities, &self.registry, &plan)?;

        let root = self.create(plan.root.name.clone())?;
        match self.populate(root, &plan) {
            Ok(()) => {
                log::debug!("Instantiated tree of {} entities", plan.records.len() + 1);
                Ok(root)
            }
            Err(err) => {
                log::error!("Tree instantiation failed after allocation: {}", err);
                if let Err(cleanup) = self.destroy(root) {
                    log::error!("Failed to discard partial tree: {}", cleanup);
                }
                Err(err)
            }
        }
    }

    fn populate(&mut self, root: Entity, plan: &TreePlan) -> EcsResult<()> {
        let mut created: HashMap<u64, Entity> = HashMap::with_capacity(plan.records.len() + 1);
        let mut ids: HashMap<u64, u64> = HashMap::with_capacity(plan.records.len() + 1);
        if plan.root.id != 0 {
            created.insert(plan.root.id, root);
            ids.insert(plan.root.id, self.entities.id(root)?);
        }

        let mut entities = Vec::with_capacity(plan.records.len());
        for record in &plan.records {
            let entity = self.create(record.name.clone())?;
            created.insert(record.id, entity);
            ids.insert(record.id, self.entities.id(entity)?);
            entities.push(entity);
        }

        for (record, &entity) in plan.records.iter().zip(&entities) {
            let parent = if plan.is_root(record.parent) {
                root
            } else {
                created
                    .get(&record.parent)
                    .copied()
                    .ok_or(EcsError::UnresolvedParent {
                        id: record.id,
                        parent: record.parent,
                    })?
            };
            self.set_relation(parent, entity)?;
        }

        for (record, entity) in std::iter::once((&plan.root, root)).chain(plan.records.iter().zip(entities)) {
            self.set_transform(entity, record.transform.clone())?;
            for element in &record.elements {
                let mut init = element.init.clone();
                remap_references(&mut init, &ids, &self.registry)?;
                self.add_element_erased(entity, element.kind, ElementPayload::document(init))?;
            }
        }
        Ok(())
    }
}
