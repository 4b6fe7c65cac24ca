//! Apply a parsed [`ChangeSet`] to the project store.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::types::ChangeSet;
use crate::io::store::ProjectStore;

/// What a successful application touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub written: Vec<String>,
    pub deleted: Vec<String>,
}

/// Apply deletes (in order), then writes (in order).
///
/// Deleting first lets one change-set replace a path with a different kind of
/// entry (file to directory or back). Entries naming the manifest are skipped.
/// The first failure stops the remaining operations; earlier operations stay
/// applied.
#[instrument(skip_all, fields(files = change_set.files.len(), deletes = change_set.deletes.len()))]
pub fn apply(store: &ProjectStore, change_set: &ChangeSet) -> Result<ApplySummary> {
    let mut summary = ApplySummary::default();

    for path in &change_set.deletes {
        if store.is_reserved(path) {
            warn!(path = %path, "skipping delete of reserved file");
            continue;
        }
        store
            .delete(path)
            .with_context(|| format!("apply delete '{path}'"))?;
        debug!(path = %path, "deleted");
        summary.deleted.push(path.clone());
    }

    for file in &change_set.files {
        if store.is_reserved(&file.path) {
            warn!(path = %file.path, "skipping write of reserved file");
            continue;
        }
        store
            .write(&file.path, &file.content)
            .with_context(|| format!("apply write '{}'", file.path))?;
        summary.written.push(file.path.clone());
    }

    info!(
        written = summary.written.len(),
        deleted = summary.deleted.len(),
        "change set applied"
    );
    Ok(summary)
}
