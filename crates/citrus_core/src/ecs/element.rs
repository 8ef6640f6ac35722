//! Element trait and handles
//!
//! An element is a typed unit of data and behavior attached to exactly one
//! entity. Each registered kind gets its own fixed-capacity
//! [`ElementPool`](super::pool::ElementPool); the lifecycle hooks below are
//! called by that pool during the scheduler's flushes.

use std::fmt;
use std::marker::PhantomData;

use bytemuck::Pod;
use serde_json::{json, Value};

use super::commands::CommandBuffer;
use super::entity::{Entity, EntityPool};

/// Index of a registered element kind, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId(pub(crate) u32);

impl KindId {
    /// Registration index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Untyped element handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub(crate) kind: KindId,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ElementRef {
    /// Kind of the element
    pub const fn kind(&self) -> KindId {
        self.kind
    }

    /// Slot index inside the kind's pool
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at the time the handle was issued
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Typed element handle
pub struct ElementHandle<T> {
    raw: ElementRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ElementHandle<T> {
    pub(crate) const fn new(raw: ElementRef) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Drop the type parameter
    pub const fn raw(&self) -> ElementRef {
        self.raw
    }
}

impl<T> Clone for ElementHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ElementHandle<T> {}

impl<T> PartialEq for ElementHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for ElementHandle<T> {}

impl<T> fmt::Debug for ElementHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ElementHandle").field(&self.raw).finish()
    }
}

/// Opaque handle returned by kind registration
pub struct KindHandle<T> {
    id: KindId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> KindHandle<T> {
    pub(crate) const fn new(id: KindId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Untyped kind id
    pub const fn id(&self) -> KindId {
        self.id
    }
}

impl<T> Clone for KindHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for KindHandle<T> {}

impl<T> PartialEq for KindHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for KindHandle<T> {}

impl<T> fmt::Debug for KindHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KindHandle").field(&self.id).finish()
    }
}

/// Registration parameters for an element kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDescriptor {
    /// Lookup name used by tree documents
    pub name: String,
    /// Pool capacity; the manager's default when `None`
    pub capacity: Option<usize>,
}

impl KindDescriptor {
    /// Descriptor using the default capacity
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
        }
    }

    /// Set an explicit pool capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Why an element rejected a payload
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The kind does not accept this payload form
    #[error("payload form not supported by this kind")]
    Unsupported,

    /// Raw payload has the wrong length
    #[error("expected {expected} bytes, got {actual}")]
    Size {
        /// Byte size the kind expects
        expected: usize,
        /// Byte size provided
        actual: usize,
    },

    /// Document payload could not be decoded
    #[error("document payload: {0}")]
    Document(#[from] serde_json::Error),

    /// Any other rejection
    #[error("{0}")]
    Invalid(String),
}

/// Payloads applied after the construction hook
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPayload {
    /// Raw bytes, loaded first
    pub raw: Option<Vec<u8>>,
    /// Initializer document, loaded second
    pub document: Option<Value>,
}

impl ElementPayload {
    /// No payload; the element keeps whatever its hook sets up
    pub const fn none() -> Self {
        Self {
            raw: None,
            document: None,
        }
    }

    /// Raw byte payload
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: Some(bytes.into()),
            document: None,
        }
    }

    /// Initializer document payload
    pub const fn document(document: Value) -> Self {
        Self {
            raw: None,
            document: Some(document),
        }
    }

    /// Raw payload holding the bytes of a plain-old-data value
    pub fn pod<T: Pod>(value: &T) -> Self {
        Self::bytes(bytemuck::bytes_of(value))
    }
}

/// Copy a plain-old-data value out of a raw payload
///
/// The payload does not need to be aligned for `T`.
pub fn read_pod<T: Pod>(bytes: &[u8]) -> Result<T, PayloadError> {
    bytemuck::try_pod_read_unaligned(bytes).map_err(|_| PayloadError::Size {
        expected: std::mem::size_of::<T>(),
        actual: bytes.len(),
    })
}

/// What a hook can see and request while it runs
///
/// Structural changes made through [`ElementContext::commands`] are applied
/// once the current phase finishes.
pub struct ElementContext<'a> {
    /// Owning entity
    pub entity: Entity,
    /// The element the hook runs for
    pub element: ElementRef,
    /// Read-only view of the entity pool
    pub entities: &'a EntityPool,
    /// Deferred requests
    pub commands: &'a mut CommandBuffer,
    /// Current frame number
    pub frame: u64,
    /// Seconds per frame
    pub time_step: f64,
}

/// Labelled fields an element exposes to an inspector UI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuiGrouping {
    /// Group heading
    pub title: String,
    /// `(label, value)` pairs in display order
    pub fields: Vec<(String, String)>,
}

impl GuiGrouping {
    /// Empty group with a heading
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field
    pub fn field(mut self, label: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((label.into(), value.to_string()));
        self
    }
}

/// A component kind
///
/// `Default` provides the reset state of a slot. All hooks have no-op
/// defaults.
pub trait Element: Default + 'static {
    /// Construction hook, run at the create flush before any payload
    fn on_create(&mut self, _ctx: &mut ElementContext<'_>) {}

    /// Destruction hook, run at the destroy flush after the slot is freed
    ///
    /// Only called for elements whose construction hook ran.
    fn on_destroy(&mut self, _ctx: &mut ElementContext<'_>) {}

    /// Load a raw byte payload
    fn load_bytes(&mut self, _bytes: &[u8]) -> Result<(), PayloadError> {
        Err(PayloadError::Unsupported)
    }

    /// Load an initializer document
    fn load_document(&mut self, _doc: &Value) -> Result<(), PayloadError> {
        Ok(())
    }

    /// Save an initializer document that [`Element::load_document`] accepts
    fn save_document(&self) -> Value {
        json!({})
    }

    /// Per-frame action hook
    fn action(&mut self, _ctx: &mut ElementContext<'_>) {}

    /// Inspector description
    fn render_gui(&self) -> Option<GuiGrouping> {
        None
    }
}
