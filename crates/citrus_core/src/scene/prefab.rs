//! File-backed prefab loading and saving

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::ecs::{Entity, Manager};
use crate::error::{EcsError, EcsResult};

/// Where tree documents and their `Load` includes come from
pub trait DocumentSource {
    /// Read the raw text of a document
    fn read_text(&self, path: &str) -> io::Result<String>;

    /// Human-readable location of a document, for errors and logs
    fn locate(&self, path: &str) -> String {
        path.to_string()
    }

    /// Read and parse a document
    ///
    /// A missing or unreadable file is [`EcsError::MissingFile`]; text that
    /// is not a valid document is [`EcsError::ParseFailure`].
    fn load(&self, path: &str) -> EcsResult<Value> {
        let text = self.read_text(path).map_err(|source| EcsError::MissingFile {
            path: self.locate(path),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| EcsError::ParseFailure {
            path: self.locate(path),
            source,
        })
    }
}

/// Documents under a root directory
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    /// Resolve paths against `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolved filesystem path of a document
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl DocumentSource for FsDocumentSource {
    fn read_text(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.resolve(path))
    }

    fn locate(&self, path: &str) -> String {
        self.resolve(path).display().to_string()
    }
}

/// Documents held in memory, keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentSource {
    files: HashMap<String, String>,
}

impl MemoryDocumentSource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add raw document text
    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }

    /// Add a document value
    pub fn insert_document(&mut self, path: impl Into<String>, document: &Value) {
        self.files.insert(path.into(), document.to_string());
    }
}

impl DocumentSource for MemoryDocumentSource {
    fn read_text(&self, path: &str) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no document at '{path}'")))
    }
}

impl Manager {
    /// Instantiate the prefab at `path`, resolved under the configured prefab root
    pub fn load_tree(&mut self, path: &str) -> EcsResult<Entity> {
        let source = FsDocumentSource::new(self.config.prefab_root.clone());
        self.load_tree_from(&source, path)
    }

    /// Instantiate a prefab from any document source
    pub fn load_tree_from(&mut self, source: &dyn DocumentSource, path: &str) -> EcsResult<Entity> {
        let document = source.load(path)?;
        let root = self.deserialize_tree_with(&document, source)?;
        log::info!(
            "Loaded prefab {} as entity {}",
            source.locate(path),
            self.entities.id(root)?
        );
        Ok(root)
    }

    /// Write the subtree under `root` to `path` under the configured prefab root
    pub fn save_tree(&self, root: Entity, path: &str) -> EcsResult<PathBuf> {
        let resolved = self.config.prefab_root.join(path);
        let document = self.serialize_tree(root)?;
        write_document(&resolved, &document)?;
        log::info!("Saved prefab {}", resolved.display());
        Ok(resolved)
    }
}

fn write_document(path: &Path, document: &Value) -> EcsResult<()> {
    let write_failure = |source: io::Error| EcsError::WriteFailure {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_failure)?;
    }
    let text = serde_json::to_string_pretty(document).map_err(|err| write_failure(err.into()))?;
    std::fs::write(path, text).map_err(write_failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_source_errors_are_distinguished() {
        let mut source = MemoryDocumentSource::new();
        source.insert("broken.json", "{ not json");
        source.insert_document("ok.json", &json!({ "Elements": [], "Entities": [] }));

        assert!(matches!(source.load("absent.json"), Err(EcsError::MissingFile { .. })));
        assert!(matches!(source.load("broken.json"), Err(EcsError::ParseFailure { .. })));
        assert_eq!(source.load("ok.json").unwrap()["Elements"], json!([]));
    }

    #[test]
    fn test_fs_source_resolves_under_root() {
        let dir = std::env::temp_dir().join(format!("citrus_prefab_src_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/thing.json"), r#"{ "Elements": [], "Entities": [] }"#).unwrap();

        let source = FsDocumentSource::new(&dir);
        assert!(source.load("nested/thing.json").is_ok());
        assert!(matches!(source.load("nested/none.json"), Err(EcsError::MissingFile { .. })));
        assert!(source.locate("nested/thing.json").ends_with("thing.json"));
    }
}
