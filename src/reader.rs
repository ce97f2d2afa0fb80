//! Storage reader abstraction.
//!
//! A [`SourceReader`] gives the assembly pipeline uniform `list`/`read`
//! access over one storage backend; the [`ReaderProvider`] picks the
//! backend for a given source. Callers never branch on backend kind.

use std::sync::Arc;

use crate::error::{ReaderError, ReaderMatchError};
use crate::models::{ListingEntry, Source};

pub trait SourceReader: Send + Sync {
    /// Whether this reader can serve the given source.
    fn handles(&self, source: &Source) -> bool;

    /// The base path the source's listing entries fall under; the listing
    /// filter strips this prefix to produce source-relative paths.
    fn base_path(&self, source: &Source) -> String;

    /// Recursive listing of everything under the source's base path.
    fn list(&self, source: &Source) -> Result<Vec<ListingEntry>, ReaderError>;

    /// Read one file by store-relative path.
    fn read(&self, path: &str) -> Result<String, ReaderError>;
}

/// Registration-ordered set of readers. `find` returns the first reader
/// whose `handles` predicate matches; first match wins when predicates
/// overlap.
pub struct ReaderProvider {
    readers: Vec<Arc<dyn SourceReader>>,
}

impl ReaderProvider {
    pub fn new(readers: Vec<Arc<dyn SourceReader>>) -> Self {
        Self { readers }
    }

    pub fn register(&mut self, reader: Arc<dyn SourceReader>) {
        self.readers.push(reader);
    }

    pub fn find(&self, source: &Source) -> Result<Arc<dyn SourceReader>, ReaderMatchError> {
        self.readers
            .iter()
            .find(|reader| reader.handles(source))
            .cloned()
            .ok_or_else(|| ReaderMatchError {
                source_id: source.id.clone(),
                kind: source.kind.as_str().to_string(),
            })
    }
}

impl Default for ReaderProvider {
    fn default() -> Self {
        Self {
            readers: Vec::new(),
        }
    }
}
