//! Scripted collaborators and scratch projects for tests.
//!
//! Exposed to integration tests through the `test-support` feature.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::types::ExecutionResult;
use crate::error::ProjectError;
use crate::io::config::AutocoderConfig;
use crate::io::installer::Installer;
use crate::io::oracle::Oracle;
use crate::io::runner::Runner;
use crate::io::store::ProjectStore;

/// Successful run with the given stdout.
pub fn exec_ok(stdout: &str) -> ExecutionResult {
    ExecutionResult {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Failed run (exit 1) with the given stderr.
pub fn exec_fail(stderr: &str) -> ExecutionResult {
    ExecutionResult {
        exit_code: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Failed run carrying a Python missing-module traceback.
pub fn exec_missing_module(module: &str) -> ExecutionResult {
    exec_fail(&format!(
        "Traceback (most recent call last):\n  File \"main.py\", line 1, in <module>\n    import {module}\nModuleNotFoundError: No module named '{module}'\n"
    ))
}

/// Runner that replays queued results, then repeats an optional fallback.
pub struct ScriptedRunner {
    results: RefCell<VecDeque<ExecutionResult>>,
    fallback: Option<ExecutionResult>,
    entrypoints: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            fallback: None,
            entrypoints: RefCell::new(Vec::new()),
        }
    }

    pub fn always(result: ExecutionResult) -> Self {
        Self {
            fallback: Some(result),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.entrypoints.borrow().len()
    }

    /// Entrypoints passed to each call, in order.
    pub fn entrypoints(&self) -> Vec<String> {
        self.entrypoints.borrow().clone()
    }
}

impl Runner for ScriptedRunner {
    fn run(&self, _store: &ProjectStore, entrypoint: &str) -> Result<ExecutionResult> {
        self.entrypoints.borrow_mut().push(entrypoint.to_string());
        match self.results.borrow_mut().pop_front() {
            Some(result) => Ok(result),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted runner exhausted")),
        }
    }
}

/// Oracle that replays queued replies (or failures) and records prompts.
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<Result<String, String>>>,
    fallback: Option<Result<String, String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            fallback: None,
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self {
            fallback: Some(Ok(reply.to_string())),
            ..Self::new(Vec::new())
        }
    }

    /// Every call fails with an oracle error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Some(Err(message.to_string())),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn generate(&self, _model: &str, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let reply = match self.replies.borrow_mut().pop_front() {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted oracle exhausted"))?,
        };
        reply.map_err(|message| ProjectError::Oracle(message).into())
    }
}

/// Installer that records requests and reports a fixed result.
pub struct ScriptedInstaller {
    succeed: bool,
    installed: RefCell<Vec<Vec<String>>>,
    requirements: RefCell<Vec<PathBuf>>,
}

impl ScriptedInstaller {
    pub fn succeeding() -> Self {
        Self::with_result(true)
    }

    pub fn failing() -> Self {
        Self::with_result(false)
    }

    fn with_result(succeed: bool) -> Self {
        Self {
            succeed,
            installed: RefCell::new(Vec::new()),
            requirements: RefCell::new(Vec::new()),
        }
    }

    /// Package lists passed to `install`, one entry per call.
    pub fn installed(&self) -> Vec<Vec<String>> {
        self.installed.borrow().clone()
    }

    /// Requirements files that existed when `install_requirements` was called.
    pub fn requirements(&self) -> Vec<PathBuf> {
        self.requirements.borrow().clone()
    }
}

impl Installer for ScriptedInstaller {
    fn install(&self, packages: &[String]) -> Result<bool> {
        self.installed.borrow_mut().push(packages.to_vec());
        if packages.iter().all(|name| name.trim().is_empty()) {
            return Ok(true);
        }
        Ok(self.succeed)
    }

    fn install_requirements(&self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            return Ok(true);
        }
        self.requirements.borrow_mut().push(path.to_path_buf());
        Ok(self.succeed)
    }
}

/// Project store rooted in a temp directory that lives as long as this value.
pub struct TestProject {
    _temp: TempDir,
    store: ProjectStore,
    config: AutocoderConfig,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Self::with_config(AutocoderConfig::default())
    }

    pub fn with_config(config: AutocoderConfig) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let store = ProjectStore::open(&temp.path().join("project"), &config)?;
        Ok(Self {
            _temp: temp,
            store,
            config,
        })
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn config(&self) -> &AutocoderConfig {
        &self.config
    }

    pub fn write(&self, path: &str, content: &str) -> Result<()> {
        self.store.write(path, content)
    }
}
