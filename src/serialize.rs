//! Suite serialization handler.
//!
//! Same transition shape as source preparation, applied to a
//! [`SerializedSuite`](crate::models::SerializedSuite), with a broader
//! catch: any pipeline failure, including a missing referenced entity,
//! halts the run and is persisted as a failure reason plus message for the
//! read path to surface verbatim.

use tracing::{debug, error, info};

use crate::assembler::{concatenate, YamlFileStream, MANIFEST_FILENAME};
use crate::error::{AssemblyError, PipelineError, SerializeSuiteError};
use crate::listing::filter_listing;
use crate::messages::SerializeSuiteMessage;
use crate::models::{RunState, SerializedSuite};
use crate::persistence::Persistence;
use crate::reader::ReaderProvider;
use crate::store::FileStore;

/// Name of the concatenated multi-document artifact written next to the
/// collection records.
pub const SERIALIZED_FILENAME: &str = "serialized.yaml";

/// Handle one `SerializeSuite` message: write the suite's validated file
/// collection (manifest first) and the concatenated document stream under
/// the serialized suite's storage prefix.
pub async fn serialize_suite(
    persistence: &dyn Persistence,
    readers: &ReaderProvider,
    store: &FileStore,
    extensions: &[String],
    message: &SerializeSuiteMessage,
) -> Result<(), SerializeSuiteError> {
    let Some(mut serialized) = persistence
        .find_serialized_suite(&message.serialized_suite_id)
        .await?
    else {
        debug!(
            serialized_suite_id = %message.serialized_suite_id,
            "serialize: unknown serialized suite, ignoring"
        );
        return Ok(());
    };

    if !serialized.state.is_processable() {
        debug!(
            serialized_suite_id = %serialized.id,
            state = serialized.state.as_str(),
            "serialize: state not processable, ignoring"
        );
        return Ok(());
    }

    if !message.parameters.is_empty() {
        serialized.parameters.extend(message.parameters.clone());
    }
    serialized.state = RunState::Running;
    serialized.failure_reason = None;
    serialized.failure_message = None;
    persistence.save_serialized_suite(&serialized).await?;
    info!(serialized_suite_id = %serialized.id, suite_id = %serialized.suite_id, "serializing suite");

    match build_bundle(persistence, readers, store, extensions, &serialized).await {
        Ok(written) => {
            serialized.state = RunState::Prepared;
            persistence.save_serialized_suite(&serialized).await?;
            info!(serialized_suite_id = %serialized.id, files = written, "suite serialized");
            Ok(())
        }
        Err(cause) => {
            let reason = cause.failure_reason();
            let detail = cause.to_string();
            serialized.state = RunState::Halted;
            serialized.failure_reason = Some(reason);
            serialized.failure_message = Some(detail.clone());
            persistence.save_serialized_suite(&serialized).await?;
            error!(
                serialized_suite_id = %serialized.id,
                reason = %reason,
                error = %detail,
                "suite serialization halted"
            );
            Err(SerializeSuiteError::Halted {
                serialized_suite_id: serialized.id.clone(),
                reason,
                message: detail,
                cause,
            })
        }
    }
}

async fn build_bundle(
    persistence: &dyn Persistence,
    readers: &ReaderProvider,
    store: &FileStore,
    extensions: &[String],
    serialized: &SerializedSuite,
) -> Result<usize, PipelineError> {
    let suite = persistence
        .find_suite(&serialized.suite_id)
        .await?
        .ok_or_else(|| PipelineError::MissingDependency {
            kind: "suite",
            id: serialized.suite_id.clone(),
        })?;
    let source = persistence
        .find_source(&suite.source_id)
        .await?
        .ok_or_else(|| PipelineError::MissingDependency {
            kind: "source",
            id: suite.source_id.clone(),
        })?;

    let reader = readers.find(&source)?;
    let base = reader.base_path(&source);
    let listing = reader.list(&source).map_err(AssemblyError::from)?;
    let available = filter_listing(&listing, &base, extensions);

    // An empty selector set means "all files"; otherwise the suite's own
    // ordering governs the bundle.
    let paths = if suite.tests.is_empty() {
        available
    } else {
        suite.tests.clone()
    };

    store.remove(&serialized.id)?;

    let mut documents = Vec::new();
    let mut written = 0;
    for item in YamlFileStream::new(reader.as_ref(), base, paths.clone(), Some(paths)) {
        let file = item.map_err(PipelineError::from)?;
        store.write(&format!("{}/{}", serialized.id, file.path), &file.content)?;
        if file.path != MANIFEST_FILENAME {
            documents.push(file);
        }
        written += 1;
    }

    store.write(
        &format!("{}/{}", serialized.id, SERIALIZED_FILENAME),
        &concatenate(&documents),
    )?;

    Ok(written)
}
