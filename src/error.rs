//! Error types for the serialization pipeline and its handlers.
//!
//! Low-level failures carry the failed path and action; handler-level
//! wrappers bundle the entity being processed with the original cause.
//! Nothing below the handler layer retries or swallows.

use thiserror::Error;

use crate::models::FailureReason;

/// Storage operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageAction {
    List,
    Read,
    Write,
    Remove,
}

impl StorageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageAction::List => "list",
            StorageAction::Read => "read",
            StorageAction::Write => "write",
            StorageAction::Remove => "remove",
        }
    }
}

impl std::fmt::Display for StorageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An I/O failure against the file store, tagged with the action and the
/// store-relative path it failed on.
#[derive(Debug, Error)]
#[error("storage {action} failed for '{path}': {source}")]
pub struct StorageError {
    pub action: StorageAction,
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

impl StorageError {
    pub fn new(action: StorageAction, path: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Git operation that failed while materializing a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOperation {
    Clone,
    Checkout,
}

impl std::fmt::Display for GitOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            GitOperation::Clone => "clone",
            GitOperation::Checkout => "checkout",
        })
    }
}

/// A git clone or checkout failure, with the repository and the trimmed
/// stderr of the failed command.
#[derive(Debug, Error)]
#[error("git {operation} failed for '{repository}': {detail}")]
pub struct GitError {
    pub operation: GitOperation,
    pub repository: String,
    pub detail: String,
}

/// A reader backend failure: either plain storage I/O or a git operation.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Git(#[from] GitError),
}

/// A file that does not parse as YAML, tagged with its source-relative path.
#[derive(Debug, Error)]
#[error("invalid yaml in '{path}': {source}")]
pub struct YamlError {
    pub path: String,
    #[source]
    pub source: serde_yaml::Error,
}

/// No registered reader matches the given source.
#[derive(Debug, Error)]
#[error("no reader matches source '{source_id}' of kind '{kind}'")]
pub struct ReaderMatchError {
    pub source_id: String,
    pub kind: String,
}

/// Any failure that aborts an in-progress assembly. Assemblies are
/// all-or-nothing: no partial manifest or document stream is ever returned.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error(transparent)]
    Yaml(#[from] YamlError),
}

/// Everything that can halt a preparation or serialization run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    ReaderMatch(#[from] ReaderMatchError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    /// Write-side storage failure while materializing output.
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("{kind} '{id}' referenced by the run does not exist")]
    MissingDependency { kind: &'static str, id: String },
}

impl PipelineError {
    /// Map the halt cause onto the persisted failure-reason token.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            PipelineError::ReaderMatch(_) => FailureReason::ReaderMatch,
            PipelineError::Assembly(AssemblyError::Yaml(_)) => FailureReason::YamlParse,
            PipelineError::Assembly(AssemblyError::Reader(ReaderError::Git(err))) => {
                match err.operation {
                    GitOperation::Clone => FailureReason::GitClone,
                    GitOperation::Checkout => FailureReason::GitCheckout,
                }
            }
            PipelineError::Assembly(AssemblyError::Reader(ReaderError::Storage(err)))
            | PipelineError::Storage(err) => match err.action {
                StorageAction::Write | StorageAction::Remove => FailureReason::StorageWrite,
                StorageAction::Read | StorageAction::List => FailureReason::SourceRead,
            },
            PipelineError::Persistence(_) | PipelineError::MissingDependency { .. } => {
                FailureReason::Unknown
            }
        }
    }
}

/// Database access failure, or a uniqueness conflict surfaced as a domain
/// error.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database {operation} failed: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("suite label '{label}' already exists for source '{source_id}' with a different test selection")]
    SuiteLabelTaken { source_id: String, label: String },
    #[error("row for {entity} '{id}' holds unreadable column data: {detail}")]
    CorruptRow {
        entity: &'static str,
        id: String,
        detail: String,
    },
}

impl PersistenceError {
    pub fn database(operation: &'static str, source: sqlx::Error) -> Self {
        PersistenceError::Database { operation, source }
    }
}

/// Raised by the source preparation handler after persisting the halted
/// state. Redelivery of the triggering message is the only retry path.
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("preparation of source '{source_id}' halted: {cause}")]
    Halted {
        source_id: String,
        #[source]
        cause: PipelineError,
    },
}

/// Raised by the suite serialization handler after persisting the halted
/// state together with the failure reason and message.
#[derive(Debug, Error)]
pub enum SerializeSuiteError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("serialization of suite bundle '{serialized_suite_id}' halted ({reason}): {message}")]
    Halted {
        serialized_suite_id: String,
        reason: FailureReason,
        message: String,
        #[source]
        cause: PipelineError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(action: StorageAction) -> StorageError {
        StorageError::new(
            action,
            "a/b.yaml",
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        )
    }

    #[test]
    fn test_failure_reason_mapping() {
        let read: PipelineError =
            AssemblyError::from(ReaderError::from(storage(StorageAction::Read))).into();
        assert_eq!(read.failure_reason(), FailureReason::SourceRead);

        let write: PipelineError = storage(StorageAction::Write).into();
        assert_eq!(write.failure_reason(), FailureReason::StorageWrite);

        let clone: PipelineError = AssemblyError::from(ReaderError::from(GitError {
            operation: GitOperation::Clone,
            repository: "https://example.com/repo.git".into(),
            detail: "auth".into(),
        }))
        .into();
        assert_eq!(clone.failure_reason(), FailureReason::GitClone);

        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("{{ nope").unwrap_err();
        let parse: PipelineError = AssemblyError::from(YamlError {
            path: "x.yaml".into(),
            source: yaml_err,
        })
        .into();
        assert_eq!(parse.failure_reason(), FailureReason::YamlParse);

        let unmatched: PipelineError = ReaderMatchError {
            source_id: "s1".into(),
            kind: "git".into(),
        }
        .into();
        assert_eq!(unmatched.failure_reason(), FailureReason::ReaderMatch);
    }

    #[test]
    fn test_storage_error_names_path_and_action() {
        let err = storage(StorageAction::Remove);
        let rendered = err.to_string();
        assert!(rendered.contains("remove"));
        assert!(rendered.contains("a/b.yaml"));
    }
}
