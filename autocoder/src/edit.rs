//! Instruction-driven edits for `autocoder edit`.

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::core::parse::parse_response;
use crate::core::types::ExecutionResult;
use crate::create::install_requirements;
use crate::io::config::AutocoderConfig;
use crate::io::handoff::append_note;
use crate::io::installer::Installer;
use crate::io::materialize::{ApplySummary, apply};
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptEngine;
use crate::io::runner::Runner;
use crate::io::snapshot::snapshot;
use crate::io::store::ProjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub entrypoint: String,
    pub applied: ApplySummary,
    /// Result of running the project once after the edit.
    pub result: ExecutionResult,
}

/// Apply one model-proposed edit, then run the project once.
///
/// An edit that proposes nothing is an error: the caller asked for a change.
#[instrument(skip_all, fields(root = %store.root().display()))]
pub fn edit_project<R: Runner, O: Oracle, I: Installer>(
    store: &ProjectStore,
    runner: &R,
    oracle: &O,
    installer: &I,
    config: &AutocoderConfig,
    instruction: &str,
) -> Result<EditOutcome> {
    let manifest = store.load_manifest_or_default();
    let entrypoint = manifest
        .entrypoint()
        .unwrap_or(&config.default_entry)
        .to_string();

    let snapshot_text = snapshot(store, config.snapshot_limit_bytes)?;
    let prompt = PromptEngine::new().render_edit(instruction, &snapshot_text)?;
    let response = oracle.generate(&config.model, &prompt)?;
    let change_set = parse_response(&response, &config.parse_options());
    if change_set.is_empty() {
        bail!("edit produced no changes");
    }

    let applied = apply(store, &change_set)?;
    if config.auto_install {
        install_requirements(store, installer, config);
    }
    append_note(
        store,
        "Edit Applied",
        &format!("Instruction:\n\n{}\n", instruction.trim()),
    );

    let result = runner.run(store, &entrypoint)?;
    info!(exit_code = result.exit_code, "project ran after edit");
    Ok(EditOutcome {
        entrypoint,
        applied,
        result,
    })
}
