//! Prefab trees: subtree serialization, instantiation and file loading

pub mod document;
pub mod prefab;
pub mod tree_codec;

pub use document::{element_reference, entity_reference};
pub use prefab::{DocumentSource, FsDocumentSource, MemoryDocumentSource};
