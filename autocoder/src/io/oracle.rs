//! Language-model invocation.
//!
//! The oracle is opaque text-in/text-out. [`CommandOracle`] shells out to a
//! local model CLI (`ollama run <model>` by default) with the prompt on stdin.

use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::error::ProjectError;
use crate::io::config::AutocoderConfig;
use crate::io::process::run_captured;

/// Abstraction over model backends.
pub trait Oracle {
    fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

/// Oracle that runs `<command...> <model>` and reads the reply from stdout.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    command: Vec<String>,
}

impl CommandOracle {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn from_config(config: &AutocoderConfig) -> Self {
        Self::new(config.oracle.command.clone())
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(model = %model, prompt_bytes = prompt.len()))]
    fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ProjectError::Oracle("oracle command is empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(model);

        info!(program = %program, "querying model");
        let output = run_captured(cmd, Some(prompt.as_bytes()))
            .with_context(|| format!("run oracle command '{program}'"))?;

        if !output.status.success() {
            let stderr = output.stderr_lossy();
            let detail = if stderr.trim().is_empty() {
                output.stdout_lossy().trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            warn!(exit_code = output.exit_code(), "oracle command failed");
            return Err(ProjectError::Oracle(detail).into());
        }

        let reply = output.stdout_lossy();
        debug!(reply_bytes = reply.len(), "model replied");
        Ok(reply)
    }
}
