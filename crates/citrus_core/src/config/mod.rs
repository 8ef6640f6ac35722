//! Configuration system
//!
//! Runtime settings for the [`Manager`](crate::ecs::Manager): pool sizes, the
//! prefab root directory, the duplicate-element policy and the fixed time
//! step. Settings load from TOML or RON depending on the file extension.

use std::path::{Path, PathBuf};

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of range
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// What to do when an element kind is added to an entity that already has one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Fail with [`EcsError::DuplicateElement`](crate::EcsError::DuplicateElement)
    Reject,
    /// Keep the existing element and return it
    Ignore,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        if cfg!(feature = "ignore-duplicate-elements") {
            Self::Ignore
        } else {
            Self::Reject
        }
    }
}

/// Settings for an entity/element manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of the entity pool
    pub max_entities: usize,

    /// Capacity used for element kinds registered without an explicit one
    pub default_element_capacity: usize,

    /// Directory prefab paths are resolved against
    pub prefab_root: PathBuf,

    /// Policy for adding an element kind twice to one entity
    pub duplicate_policy: DuplicatePolicy,

    /// How deeply `Load` includes may nest inside one tree document
    pub max_include_depth: usize,

    /// Seconds of simulated time per frame
    pub time_step: f64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_entities: 4096,
            default_element_capacity: 1024,
            prefab_root: PathBuf::from("prefabs"),
            duplicate_policy: DuplicatePolicy::default(),
            max_include_depth: 16,
            time_step: 0.01,
        }
    }
}

impl Config for ManagerConfig {}

impl ManagerConfig {
    /// Create a configuration with the given entity capacity
    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities;
        self
    }

    /// Set the prefab root directory
    pub fn with_prefab_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.prefab_root = root.into();
        self
    }

    /// Set the duplicate-element policy
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Check that every field is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entities == 0 || self.max_entities >= u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "max_entities",
                reason: format!("must be in 1..{}, got {}", u32::MAX, self.max_entities),
            });
        }
        if self.default_element_capacity == 0 || self.default_element_capacity >= u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "default_element_capacity",
                reason: format!("must be in 1..{}, got {}", u32::MAX, self.default_element_capacity),
            });
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(ConfigError::Invalid {
                field: "time_step",
                reason: format!("must be a positive number, got {}", self.time_step),
            });
        }
        Ok(())
    }
}
