//! Core data models for sources, suites, and serialized suites.
//!
//! These types represent the persisted entities the two state-machine
//! handlers operate on, plus the in-memory artifacts produced by the
//! assembly pipeline.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Free-form string parameters attached to an entity (git ref, runner
/// options). Ordered so JSON round-trips are stable.
pub type Parameters = BTreeMap<String, String>;

/// Storage backend kind of a source. Closed set: every source is either a
/// set of uploaded files in the file store or a git checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Git,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Git => "git",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "file" => Some(SourceKind::File),
            "git" => Some(SourceKind::Git),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state shared by source preparation and suite serialization.
///
/// Transitions: `requested` → `preparing-running` → `prepared` or
/// `preparing-halted`; a halted run may re-enter `preparing-running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Requested,
    Running,
    Prepared,
    Halted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Requested => "requested",
            RunState::Running => "preparing-running",
            RunState::Prepared => "prepared",
            RunState::Halted => "preparing-halted",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "requested" => Some(RunState::Requested),
            "preparing-running" => Some(RunState::Running),
            "prepared" => Some(RunState::Prepared),
            "preparing-halted" => Some(RunState::Halted),
            _ => None,
        }
    }

    /// Whether a handler may pick this entity up for processing.
    pub fn is_processable(&self) -> bool {
        matches!(self, RunState::Requested | RunState::Halted)
    }
}

/// Why a serialization run halted. Persisted verbatim and surfaced to the
/// read path without summarizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    SourceRead,
    StorageWrite,
    YamlParse,
    GitClone,
    GitCheckout,
    ReaderMatch,
    Unknown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::SourceRead => "source/read",
            FailureReason::StorageWrite => "storage/write",
            FailureReason::YamlParse => "yaml/parse",
            FailureReason::GitClone => "git/clone",
            FailureReason::GitCheckout => "git/checkout",
            FailureReason::ReaderMatch => "reader/none",
            FailureReason::Unknown => "unknown",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "source/read" => Some(FailureReason::SourceRead),
            "storage/write" => Some(FailureReason::StorageWrite),
            "yaml/parse" => Some(FailureReason::YamlParse),
            "git/clone" => Some(FailureReason::GitClone),
            "git/checkout" => Some(FailureReason::GitCheckout),
            "reader/none" => Some(FailureReason::ReaderMatch),
            "unknown" => Some(FailureReason::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An origin of test content, or a derived (prepared) copy of one.
///
/// A derived source always references exactly one parent; only derived
/// sources move through the preparation lifecycle.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub kind: SourceKind,
    /// Base storage path, relative to the file store root (for file-backed
    /// sources) or the git cache root (for checkouts).
    pub path: String,
    pub state: RunState,
    pub parent_id: Option<String>,
    pub parameters: Parameters,
    pub created_at: i64,
}

impl Source {
    pub fn is_derived(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// A named, ordered selection of test files within a source. An empty
/// selector list means "all files".
#[derive(Debug, Clone)]
pub struct Suite {
    pub id: String,
    pub source_id: String,
    pub label: String,
    pub tests: Vec<String>,
    pub created_at: i64,
}

/// A materialized, validated bundle of a suite's content.
///
/// Created in `requested` state by the request layer and mutated only by
/// the suite serialization handler.
#[derive(Debug, Clone)]
pub struct SerializedSuite {
    pub id: String,
    pub suite_id: String,
    pub parameters: Parameters,
    pub state: RunState,
    pub failure_reason: Option<FailureReason>,
    pub failure_message: Option<String>,
    pub created_at: i64,
}

/// One entry of a raw recursive directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Store-relative path.
    pub path: String,
    pub is_dir: bool,
}

impl ListingEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// A single assembled file: source-relative path plus raw content.
/// Produced by the collection assembler, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlFile {
    pub path: String,
    pub content: String,
}

/// Manifest header for one document block: the file's source-relative path
/// and the SHA-256 hash of its content. Lets a downstream consumer map a
/// document back to its source file and detect content changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePathIdentifier {
    pub path: String,
    pub hash: String,
}

impl FilePathIdentifier {
    pub fn for_content(path: &str, content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self {
            path: path.to_string(),
            hash: format!("{:x}", hasher.finalize()),
        }
    }
}

impl std::fmt::Display for FilePathIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let line = serde_json::json!({ "path": self.path, "hash": self.hash });
        f.write_str(&line.to_string())
    }
}
