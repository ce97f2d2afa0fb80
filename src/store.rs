//! Flat file store.
//!
//! A byte-addressable hierarchy rooted at one directory. All paths are
//! store-relative; every failure is tagged with the action and path it
//! failed on.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{StorageAction, StorageError};
use crate::models::ListingEntry;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.absolute(path).exists()
    }

    pub fn read(&self, path: &str) -> Result<String, StorageError> {
        fs::read_to_string(self.absolute(path))
            .map_err(|e| StorageError::new(StorageAction::Read, path, e))
    }

    pub fn write(&self, path: &str, content: &str) -> Result<(), StorageError> {
        let absolute = self.absolute(path);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::new(StorageAction::Write, path, e))?;
        }
        fs::write(&absolute, content).map_err(|e| StorageError::new(StorageAction::Write, path, e))
    }

    /// Remove a file or a whole prefix. Removing something absent is not an
    /// error; retries clear previous partial output with this.
    pub fn remove(&self, path: &str) -> Result<(), StorageError> {
        let absolute = self.absolute(path);
        let result = if absolute.is_dir() {
            fs::remove_dir_all(&absolute)
        } else {
            fs::remove_file(&absolute)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::new(StorageAction::Remove, path, e)),
        }
    }

    /// Recursive listing under `prefix`, store-relative, directories
    /// included. Entries come back in lexical walk order.
    pub fn list(&self, prefix: &str) -> Result<Vec<ListingEntry>, StorageError> {
        let base = self.absolute(prefix);
        let mut entries = Vec::new();

        for entry in WalkDir::new(&base).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                StorageError::new(StorageAction::List, prefix, std::io::Error::from(e))
            })?;
            if entry.path() == base {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            entries.push(ListingEntry {
                path: relative.to_string_lossy().to_string(),
                is_dir: entry.file_type().is_dir(),
            });
        }

        Ok(entries)
    }
}
