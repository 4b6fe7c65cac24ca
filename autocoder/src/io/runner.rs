//! Entrypoint execution.
//!
//! The [`Runner`] trait decouples the fix loop from process spawning. Tests
//! use scripted runners that return predetermined results.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ENTRYPOINT_NOT_EXECUTABLE, ENTRYPOINT_NOT_FOUND, ExecutionResult};
use crate::io::config::AutocoderConfig;
use crate::io::process::run_captured;
use crate::io::store::ProjectStore;

/// Abstraction over how a project's entrypoint is executed.
pub trait Runner {
    /// Run `entrypoint` (relative to the store root) to completion.
    fn run(&self, store: &ProjectStore, entrypoint: &str) -> Result<ExecutionResult>;
}

/// Runner that spawns the entrypoint with a launcher picked by extension.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    launchers: BTreeMap<String, Vec<String>>,
}

impl ProcessRunner {
    pub fn new(launchers: BTreeMap<String, Vec<String>>) -> Self {
        Self { launchers }
    }

    pub fn from_config(config: &AutocoderConfig) -> Self {
        Self::new(config.launchers.clone())
    }

    fn command_for(&self, target: &Path) -> Command {
        let launcher = target
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.launchers.get(ext))
            .and_then(|argv| argv.split_first());
        match launcher {
            Some((program, args)) => {
                let mut cmd = Command::new(program);
                cmd.args(args).arg(target);
                cmd
            }
            None => Command::new(target),
        }
    }
}

impl Runner for ProcessRunner {
    #[instrument(skip_all, fields(entrypoint = %entrypoint))]
    fn run(&self, store: &ProjectStore, entrypoint: &str) -> Result<ExecutionResult> {
        let target = store.resolve(entrypoint)?;
        if !target.is_file() {
            warn!(path = %target.display(), "entrypoint not found");
            return Ok(ExecutionResult::not_found(entrypoint));
        }

        let mut cmd = self.command_for(&target);
        cmd.current_dir(store.root());
        debug!(program = ?cmd.get_program(), "launching entrypoint");

        let output = match run_captured(cmd, None) {
            Ok(output) => output,
            Err(err) => return spawn_failure(entrypoint, err),
        };

        let result = ExecutionResult {
            exit_code: output.exit_code(),
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        };
        info!(exit_code = result.exit_code, "entrypoint finished");
        Ok(result)
    }
}

/// Map launch failures the project can fix into synthetic results.
fn spawn_failure(entrypoint: &str, err: anyhow::Error) -> Result<ExecutionResult> {
    let kind = err.downcast_ref::<std::io::Error>().map(std::io::Error::kind);
    let exit_code = match kind {
        Some(ErrorKind::NotFound) => ENTRYPOINT_NOT_FOUND,
        Some(ErrorKind::PermissionDenied) => ENTRYPOINT_NOT_EXECUTABLE,
        _ => return Err(err.context(format!("run entrypoint '{entrypoint}'"))),
    };
    warn!(exit_code, err = %format!("{err:#}"), "entrypoint could not be launched");
    Ok(ExecutionResult {
        exit_code,
        stdout: String::new(),
        stderr: format!("failed to launch {entrypoint}: {err:#}"),
    })
}
