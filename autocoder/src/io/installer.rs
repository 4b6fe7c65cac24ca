//! Package installation.
//!
//! Installs are side effects on the host environment, not on the project
//! root. Output is inherited so the user sees installer progress directly.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::io::config::AutocoderConfig;

pub trait Installer {
    /// Install the named packages. Returns whether the installer succeeded.
    fn install(&self, packages: &[String]) -> Result<bool>;

    /// Install everything listed in a requirements file.
    fn install_requirements(&self, path: &Path) -> Result<bool>;
}

/// Installer that runs `python3 -m pip install ...` (configurable).
#[derive(Debug, Clone)]
pub struct PipInstaller {
    command: Vec<String>,
}

impl PipInstaller {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn from_config(config: &AutocoderConfig) -> Self {
        Self::new(config.installer.command.clone())
    }

    fn run(&self, extra: &[&str]) -> Result<bool> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("installer command is empty"))?;
        println!("install: {}", extra.join(" "));
        let status = Command::new(program)
            .args(args)
            .args(extra)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("spawn installer '{program}'"))?;
        if !status.success() {
            warn!(exit_code = ?status.code(), "installer failed");
        }
        Ok(status.success())
    }
}

impl Installer for PipInstaller {
    #[instrument(skip_all, fields(packages = ?packages))]
    fn install(&self, packages: &[String]) -> Result<bool> {
        let names: Vec<&str> = packages
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Ok(true);
        }
        info!("installing packages");
        self.run(&names)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn install_requirements(&self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            return Ok(true);
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("requirements path is not UTF-8: {}", path.display()))?;
        info!("installing requirements");
        self.run(&["-r", path_str])
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn recording_installer(log: &Path) -> PipInstaller {
        // `sh -c <script> <argv0> <args...>`: "$@" is everything after argv0.
        PipInstaller::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("echo \"$@\" >> '{}'", log.display()),
            "pip".to_string(),
        ])
    }

    #[test]
    fn empty_package_list_succeeds_without_spawning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("log");
        let installer = recording_installer(&log);

        assert!(installer.install(&[]).expect("install"));
        assert!(installer.install(&["  ".to_string()]).expect("install"));
        assert!(!log.exists());
    }

    #[test]
    fn packages_are_passed_as_arguments() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("log");
        let installer = recording_installer(&log);

        let ok = installer
            .install(&["requests".to_string(), " rich ".to_string()])
            .expect("install");
        assert!(ok);
        assert_eq!(
            std::fs::read_to_string(&log).expect("read log"),
            "requests rich\n"
        );
    }

    #[test]
    fn missing_requirements_file_is_success() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("log");
        let installer = recording_installer(&log);

        let ok = installer
            .install_requirements(&temp.path().join("requirements.txt"))
            .expect("install");
        assert!(ok);
        assert!(!log.exists());
    }

    #[test]
    fn failing_installer_reports_false() {
        let installer = PipInstaller::new(vec!["false".to_string()]);
        assert!(!installer.install(&["x".to_string()]).expect("install"));
    }
}
