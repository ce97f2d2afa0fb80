//! Git-checkout-backed source reader.
//!
//! Materializes a working tree under the git cache directory by shelling
//! out to `git`, then serves `list`/`read` from that tree. Each source gets
//! a deterministic checkout directory keyed by its id, so re-listing after
//! a halted run reuses the clone.

use std::path::Path;
use std::process::Command;

use globset::GlobSet;
use tracing::debug;

use crate::error::{GitError, GitOperation, ReaderError};
use crate::models::{ListingEntry, Source, SourceKind};
use crate::reader::SourceReader;
use crate::reader_fs::build_globset;
use crate::store::FileStore;

pub struct GitCheckoutReader {
    cache: FileStore,
    exclude: GlobSet,
}

impl GitCheckoutReader {
    pub fn new(cache: FileStore, exclude_globs: &[String]) -> Result<Self, globset::Error> {
        Ok(Self {
            cache,
            exclude: build_globset(exclude_globs)?,
        })
    }

    /// Clone the repository if the checkout is missing, otherwise fetch,
    /// then move the work tree to the requested ref.
    fn ensure_checkout(&self, source: &Source) -> Result<(), GitError> {
        let url = source
            .parameters
            .get("url")
            .ok_or_else(|| GitError {
                operation: GitOperation::Clone,
                repository: format!("source {}", source.id),
                detail: "source has no 'url' parameter".to_string(),
            })?
            .clone();
        let checkout_dir = self.cache.root().join(&source.id);

        if checkout_dir.join(".git").exists() {
            debug!(source_id = %source.id, "checkout exists, fetching");
            run_git(
                GitOperation::Checkout,
                &url,
                Some(&checkout_dir),
                &["fetch", "origin"],
            )?;
        } else {
            if let Some(parent) = checkout_dir.parent() {
                std::fs::create_dir_all(parent).map_err(|e| GitError {
                    operation: GitOperation::Clone,
                    repository: url.clone(),
                    detail: format!("failed to create cache directory: {e}"),
                })?;
            }
            debug!(source_id = %source.id, repository = %url, "cloning");
            run_git(
                GitOperation::Clone,
                &url,
                None,
                &["clone", &url, &checkout_dir.to_string_lossy()],
            )?;
        }

        if let Some(reference) = source.parameters.get("ref") {
            run_git(
                GitOperation::Checkout,
                &url,
                Some(&checkout_dir),
                &["checkout", reference],
            )?;
        }

        Ok(())
    }
}

impl SourceReader for GitCheckoutReader {
    fn handles(&self, source: &Source) -> bool {
        source.kind == SourceKind::Git
    }

    fn base_path(&self, source: &Source) -> String {
        source.id.clone()
    }

    fn list(&self, source: &Source) -> Result<Vec<ListingEntry>, ReaderError> {
        self.ensure_checkout(source)?;
        let entries = self.cache.list(&source.id)?;
        Ok(entries
            .into_iter()
            .filter(|entry| !self.exclude.is_match(&entry.path))
            .collect())
    }

    fn read(&self, path: &str) -> Result<String, ReaderError> {
        Ok(self.cache.read(path)?)
    }
}

fn run_git(
    operation: GitOperation,
    repository: &str,
    working_dir: Option<&Path>,
    args: &[&str],
) -> Result<(), GitError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|e| GitError {
        operation,
        repository: repository.to_string(),
        detail: format!("failed to execute git: {e}"),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError {
            operation,
            repository: repository.to_string(),
            detail: stderr.trim().to_string(),
        });
    }

    Ok(())
}
