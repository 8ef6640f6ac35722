//! Error types shared by the pools, the scheduler and the tree codec

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used across the crate
pub type EcsResult<T> = Result<T, EcsError>;

/// Errors raised by entity/element operations and prefab loading
#[derive(Debug, Error)]
pub enum EcsError {
    /// A fixed-capacity pool has no free slot left
    #[error("Pool exhausted: '{pool}' has all {capacity} slots in use")]
    PoolExhausted {
        /// Name of the exhausted pool ("entities" or an element kind name)
        pool: String,
        /// Capacity of that pool
        capacity: usize,
    },

    /// An entity or element handle is null or refers to a recycled slot
    #[error("Null reference: {0}")]
    NullReference(String),

    /// The entity already owns an element of this kind
    #[error("Duplicate element: entity {entity} already has a '{kind}' element")]
    DuplicateElement {
        /// Id of the owning entity
        entity: u64,
        /// Kind name of the duplicated element
        kind: String,
    },

    /// No element kind is registered under this name
    #[error("Unknown element kind: '{0}'")]
    UnknownElementKind(String),

    /// A document does not have the expected structure
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Two entity records in one document share an id
    #[error("Duplicate ID {0} in tree document")]
    DuplicateId(u64),

    /// An Entity or Element Reference points at an id not present in the document
    #[error("Unresolved reference to ID {0}")]
    UnresolvedReference(u64),

    /// A record's parent id is not present in the document or never reaches the root
    #[error("Unresolved parent {parent} for entity record {id}")]
    UnresolvedParent {
        /// Id of the record
        id: u64,
        /// Parent id that could not be resolved
        parent: u64,
    },

    /// A prefab file does not exist or cannot be read
    #[error("Missing file: {path}")]
    MissingFile {
        /// Resolved path
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A prefab file is not a valid document
    #[error("Parse failure in {path}: {source}")]
    ParseFailure {
        /// Resolved path
        path: String,
        /// Underlying parser error
        #[source]
        source: serde_json::Error,
    },

    /// An element rejected its raw or document payload
    #[error("Invalid payload for '{kind}': {reason}")]
    InvalidPayload {
        /// Kind name of the element
        kind: String,
        /// Why the payload was rejected
        reason: String,
    },

    /// An element kind name was registered twice
    #[error("Element kind '{0}' is already registered")]
    KindAlreadyRegistered(String),

    /// A tree document could not be written
    #[error("Failed to write {path}")]
    WriteFailure {
        /// Resolved path
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded or saved
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EcsError {
    /// Shorthand for [`EcsError::MalformedDocument`]
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDocument(reason.into())
    }

    /// Shorthand for [`EcsError::InvalidPayload`]
    pub fn invalid_payload(kind: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPayload {
            kind: kind.into(),
            reason: reason.to_string(),
        }
    }
}
