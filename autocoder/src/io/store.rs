//! Project root ownership: contained writes, deletes, reads and discovery.
//!
//! Every path handed to the store is model-supplied and untrusted. Paths are
//! normalized lexically, joined to the canonical root, and checked against
//! symlinked ancestors before anything on disk is touched. A containment
//! failure never mutates the filesystem.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::path::{is_descendant, normalize_relative, to_posix_relative};
use crate::error::ProjectError;
use crate::io::config::AutocoderConfig;
use crate::io::manifest::{Manifest, read_manifest, write_manifest};

/// On-disk project rooted at one canonical directory.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
    manifest_name: String,
    handoff_name: String,
}

impl ProjectStore {
    /// Open (creating if needed) the project root.
    pub fn open(root: &Path, config: &AutocoderConfig) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("create project root {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve project root {}", root.display()))?;
        debug!(root = %root.display(), "opened project store");
        Ok(Self {
            root,
            manifest_name: config.manifest_name.clone(),
            handoff_name: config.handoff_name.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.manifest_name)
    }

    pub fn handoff_path(&self) -> PathBuf {
        self.root.join(&self.handoff_name)
    }

    /// Resolve `path` to an absolute location strictly inside the root.
    ///
    /// Relative paths are normalized first; absolute paths are accepted only
    /// when they already point below the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ProjectError> {
        let containment = || ProjectError::Containment {
            path: path.to_string(),
            root: self.root.clone(),
        };

        let relative = if Path::new(path).is_absolute() {
            let absolute = Path::new(path);
            let rel = absolute
                .strip_prefix(&self.root)
                .map_err(|_| containment())?;
            rel.to_string_lossy().into_owned()
        } else {
            path.to_string()
        };
        let normalized = normalize_relative(&relative).ok_or_else(containment)?;
        if normalized.is_empty() {
            return Err(containment());
        }

        let target = self.root.join(&normalized);
        if !is_descendant(&target, &self.root) {
            return Err(containment());
        }
        if !self.existing_ancestor_is_contained(&target) {
            return Err(containment());
        }
        Ok(target)
    }

    /// True when `path` resolves to the manifest, which only `save_manifest` may change.
    pub fn is_reserved(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|target| target == self.manifest_path())
    }

    fn resolve_mutable(&self, path: &str) -> Result<PathBuf, ProjectError> {
        let target = self.resolve(path)?;
        if target == self.manifest_path() {
            return Err(ProjectError::Reserved(path.to_string()));
        }
        Ok(target)
    }

    /// Follow symlinks on the deepest existing path among `target` and its
    /// ancestors and confirm it stays under the root.
    fn existing_ancestor_is_contained(&self, target: &Path) -> bool {
        let mut current = Some(target);
        while let Some(dir) = current {
            if dir == self.root {
                return true;
            }
            if fs::symlink_metadata(dir).is_ok() {
                return match dir.canonicalize() {
                    Ok(real) => real.starts_with(&self.root),
                    Err(_) => false,
                };
            }
            current = dir.parent();
        }
        false
    }

    /// Write `content` to `path`, creating parents and replacing any existing file.
    #[instrument(skip_all, fields(path = %path, bytes = content.len()))]
    pub fn write(&self, path: &str, content: &str) -> Result<()> {
        let target = self.resolve_mutable(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&target, content).with_context(|| format!("write {}", target.display()))?;
        debug!("file written");
        Ok(())
    }

    /// Remove a file or a whole directory tree. Missing paths are a no-op.
    #[instrument(skip_all, fields(path = %path))]
    pub fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve_mutable(path)?;
        let metadata = match fs::symlink_metadata(&target) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("delete target missing, nothing to do");
                return Ok(());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("stat {}", target.display()));
            }
        };
        if metadata.is_dir() {
            fs::remove_dir_all(&target)
                .with_context(|| format!("remove directory {}", target.display()))?;
        } else {
            fs::remove_file(&target).with_context(|| format!("remove {}", target.display()))?;
        }
        debug!(was_dir = metadata.is_dir(), "deleted");
        Ok(())
    }

    /// Read a project file as UTF-8 text.
    pub fn read(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;
        match fs::read_to_string(&target) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ProjectError::NotFound(path.to_string()).into())
            }
            Err(err) => Err(err).with_context(|| format!("read {}", target.display())),
        }
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.exists())
    }

    /// Every file under the root except the manifest, sorted by relative path.
    pub fn discover_all(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        self.collect_files(&self.root, &mut files)?;
        files.retain(|path| path != &self.manifest_name);
        files.sort();
        Ok(files)
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .with_context(|| format!("stat {}", path.display()))?;
            if file_type.is_dir() {
                self.collect_files(&path, out)?;
            } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
                match to_posix_relative(&path, &self.root) {
                    Some(rel) => out.push(rel),
                    None => warn!(path = %path.display(), "skipping file outside root"),
                }
            }
        }
        Ok(())
    }

    /// Load the manifest, surfacing parse failures to the caller.
    pub fn load_manifest(&self) -> Result<Manifest> {
        read_manifest(&self.manifest_path())
    }

    /// Load the manifest, degrading to the default record when absent or malformed.
    pub fn load_manifest_or_default(&self) -> Manifest {
        let path = self.manifest_path();
        if !path.exists() {
            return Manifest::default();
        }
        self.load_manifest().unwrap_or_else(|err| {
            warn!(err = %format!("{err:#}"), path = %path.display(), "ignoring unreadable manifest");
            Manifest::default()
        })
    }

    /// Overwrite the manifest wholesale.
    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        write_manifest(&self.manifest_path(), manifest)
    }
}
