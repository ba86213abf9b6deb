//! Whole-file YAML documents under a project root

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid document {path}: {message}")]
    Invalid { path: String, message: String },

    #[error("not a research project: {}", .0.display())]
    NotAProject(PathBuf),

    #[error("directory already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("gap #{0} not found in active gaps")]
    GapNotFound(u32),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Narrow read/write interface over structured documents.
///
/// Writes replace the whole document. Callers read-modify-write and
/// assume a single writer.
pub trait DocumentStore: Send + Sync {
    /// Read the document at `path` (relative to the store root).
    /// A missing or empty document reads as `Null`.
    fn read_document(&self, path: &str) -> StoreResult<serde_yaml::Value>;

    /// Replace the document at `path`.
    fn write_document(&self, path: &str, document: &serde_yaml::Value) -> StoreResult<()>;
}

/// Typed access on top of any `DocumentStore`; reading validates the schema.
pub trait DocumentStoreExt: DocumentStore {
    fn read_doc<T: DeserializeOwned>(&self, path: &str) -> StoreResult<T> {
        let value = self.read_document(path)?;
        serde_yaml::from_value(value).map_err(|e| StoreError::Invalid {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Like `read_doc`, but a missing or empty document reads as `T::default()`.
    fn read_doc_or_default<T: DeserializeOwned + Default>(&self, path: &str) -> StoreResult<T> {
        match self.read_document(path)? {
            serde_yaml::Value::Null => Ok(T::default()),
            value => serde_yaml::from_value(value).map_err(|e| StoreError::Invalid {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn write_doc<T: Serialize>(&self, path: &str, document: &T) -> StoreResult<()> {
        let value = serde_yaml::to_value(document)?;
        self.write_document(path, &value)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// YAML files on disk, one document per file.
#[derive(Debug, Clone)]
pub struct YamlStore {
    root: PathBuf,
}

impl YamlStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl DocumentStore for YamlStore {
    fn read_document(&self, path: &str) -> StoreResult<serde_yaml::Value> {
        let file = self.resolve(path);
        if !file.exists() {
            return Ok(serde_yaml::Value::Null);
        }
        let text = std::fs::read_to_string(&file)?;
        let blank = text
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'));
        if blank {
            return Ok(serde_yaml::Value::Null);
        }
        Ok(serde_yaml::from_str(&text)?)
    }

    fn write_document(&self, path: &str, document: &serde_yaml::Value) -> StoreResult<()> {
        let file = self.resolve(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file, serde_yaml::to_string(document)?)?;
        Ok(())
    }
}
