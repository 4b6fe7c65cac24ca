//! Project manifest stored at the project root (`.autocoder_manifest.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Persisted record of how a project was created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Manifest {
    /// Model that generated the project.
    pub model: String,
    /// Entrypoint relative to the project root.
    pub entrypoint: String,
    /// Natural-language task the project was created from.
    pub task: String,
}

impl Manifest {
    pub fn new(model: &str, entrypoint: &str, task: &str) -> Self {
        Self {
            model: model.to_string(),
            entrypoint: entrypoint.to_string(),
            task: task.to_string(),
        }
    }

    /// Entrypoint recorded in the manifest, if any.
    pub fn entrypoint(&self) -> Option<&str> {
        let entry = self.entrypoint.trim();
        (!entry.is_empty()).then_some(entry)
    }
}

/// Read and parse the manifest.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    debug!(path = %path.display(), "loading manifest");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&contents)
        .with_context(|| format!("parse manifest {}", path.display()))?;
    Ok(manifest)
}

/// Atomically write the manifest (temp file + rename).
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    debug!(path = %path.display(), entrypoint = %manifest.entrypoint, "writing manifest");
    let mut buf = serde_json::to_string_pretty(manifest)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("manifest path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp manifest {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace manifest {}", path.display()))?;
    Ok(())
}
