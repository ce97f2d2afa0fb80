//! Source preparation handler.
//!
//! Drives a derived source through `requested` → `preparing-running` →
//! `prepared` or `preparing-halted`, persisting after every transition.
//! Re-invocation on a halted source re-runs the full copy; any other state
//! is ignored, which makes message redelivery safe. Two handlers racing on
//! the same id can both observe a processable state: the persisted state
//! field is a convergence guard, not a lock.

use tracing::{debug, error, info, warn};

use crate::assembler::YamlFileStream;
use crate::error::{AssemblyError, PipelineError, PrepareError};
use crate::listing::filter_listing;
use crate::messages::PrepareMessage;
use crate::models::{RunState, Source};
use crate::persistence::Persistence;
use crate::reader::ReaderProvider;
use crate::store::FileStore;

/// Handle one `Prepare` message: materialize the parent source's YAML
/// files into the file store under the derived source's path.
pub async fn prepare_source(
    persistence: &dyn Persistence,
    readers: &ReaderProvider,
    store: &FileStore,
    extensions: &[String],
    message: &PrepareMessage,
) -> Result<(), PrepareError> {
    let Some(mut source) = persistence.find_source(&message.source_id).await? else {
        debug!(source_id = %message.source_id, "prepare: unknown source, ignoring");
        return Ok(());
    };

    let Some(parent_id) = source.parent_id.clone() else {
        debug!(source_id = %source.id, "prepare: source has no parent, ignoring");
        return Ok(());
    };

    if !source.state.is_processable() {
        debug!(
            source_id = %source.id,
            state = source.state.as_str(),
            "prepare: state not processable, ignoring"
        );
        return Ok(());
    }

    let Some(parent) = persistence.find_source(&parent_id).await? else {
        warn!(source_id = %source.id, parent_id = %parent_id, "prepare: parent row missing, ignoring");
        return Ok(());
    };

    if !message.parameters.is_empty() {
        source.parameters.extend(message.parameters.clone());
    }
    source.state = RunState::Running;
    persistence.save_source(&source).await?;
    info!(source_id = %source.id, parent_id = %parent.id, "preparing source");

    match copy_parent_files(readers, store, extensions, &source, &parent) {
        Ok(written) => {
            source.state = RunState::Prepared;
            persistence.save_source(&source).await?;
            info!(source_id = %source.id, files = written, "source prepared");
            Ok(())
        }
        Err(cause) => {
            source.state = RunState::Halted;
            persistence.save_source(&source).await?;
            error!(source_id = %source.id, error = %cause, "source preparation halted");
            Err(PrepareError::Halted {
                source_id: source.id.clone(),
                cause,
            })
        }
    }
}

/// List, filter, validate, and copy the parent's files. The derived
/// source's parameters overlay the parent's, so a per-run git ref wins
/// over the origin's default.
fn copy_parent_files(
    readers: &ReaderProvider,
    store: &FileStore,
    extensions: &[String],
    derived: &Source,
    parent: &Source,
) -> Result<usize, PipelineError> {
    let mut origin = parent.clone();
    for (key, value) in &derived.parameters {
        origin.parameters.insert(key.clone(), value.clone());
    }

    let reader = readers.find(&origin)?;
    let base = reader.base_path(&origin);
    let listing = reader.list(&origin).map_err(AssemblyError::from)?;
    let paths = filter_listing(&listing, &base, extensions);

    store.remove(&derived.path)?;

    let mut written = 0;
    for item in YamlFileStream::new(reader.as_ref(), base, paths, None) {
        let file = item.map_err(PipelineError::from)?;
        store.write(&format!("{}/{}", derived.path, file.path), &file.content)?;
        written += 1;
    }

    Ok(written)
}
