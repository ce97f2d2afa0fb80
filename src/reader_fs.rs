//! File-store-backed source reader.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::ReaderError;
use crate::models::{ListingEntry, Source, SourceKind};
use crate::reader::SourceReader;
use crate::store::FileStore;

pub struct FileStoreReader {
    store: FileStore,
    exclude: GlobSet,
}

impl FileStoreReader {
    pub fn new(store: FileStore, exclude_globs: &[String]) -> Result<Self, globset::Error> {
        Ok(Self {
            store,
            exclude: build_globset(exclude_globs)?,
        })
    }
}

impl SourceReader for FileStoreReader {
    fn handles(&self, source: &Source) -> bool {
        source.kind == SourceKind::File
    }

    fn base_path(&self, source: &Source) -> String {
        source.path.clone()
    }

    fn list(&self, source: &Source) -> Result<Vec<ListingEntry>, ReaderError> {
        let entries = self.store.list(&source.path)?;
        Ok(entries
            .into_iter()
            .filter(|entry| !self.exclude.is_match(&entry.path))
            .collect())
    }

    fn read(&self, path: &str) -> Result<String, ReaderError> {
        Ok(self.store.read(path)?)
    }
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
