//! Autocoder configuration (`autocoder.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::classify::{DependencySignature, SignatureTable, default_signatures};
use crate::core::parse::ParseOptions;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "autocoder.toml";

/// Immutable settings passed into every component.
///
/// Missing fields default to the values the tool ships with, so an empty
/// file (or no file at all) is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutocoderConfig {
    /// Model id handed to the oracle.
    pub model: String,

    /// Entrypoint used when neither the model nor the manifest names one.
    pub default_entry: String,

    /// Reserved manifest file at the project root.
    pub manifest_name: String,

    /// Reserved handoff note at the project root.
    pub handoff_name: String,

    /// Per-project connector definitions.
    pub connectors_name: String,

    /// Requirements file installed after create/edit.
    pub requirements_file: String,

    /// Snapshot ceiling in bytes.
    pub snapshot_limit_bytes: usize,

    /// Fix loop iteration budget.
    pub max_iterations: u32,

    /// Install missing dependencies without asking the model.
    pub auto_install: bool,

    /// Extensions that mark a generated file as a runnable script.
    pub script_extensions: Vec<String>,

    pub oracle: CommandConfig,

    pub installer: CommandConfig,

    /// File extension (without dot) -> argv prefix used to launch the entrypoint.
    ///
    /// Entries from a config file are merged over the built-in `py` and `sh`
    /// launchers. Extensions with no launcher are executed directly.
    #[serde(deserialize_with = "merge_launchers")]
    pub launchers: BTreeMap<String, Vec<String>>,

    pub dependency_signatures: Vec<DependencySignature>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandConfig {
    /// Program followed by leading arguments.
    pub command: Vec<String>,
}

impl CommandConfig {
    fn new(argv: &[&str]) -> Self {
        Self {
            command: argv.iter().map(|arg| (*arg).to_string()).collect(),
        }
    }
}

fn default_launchers() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("py".to_string(), vec!["python3".to_string()]),
        ("sh".to_string(), vec!["sh".to_string()]),
    ])
}

fn merge_launchers<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, Vec<String>>::deserialize(deserializer)?;
    let mut launchers = default_launchers();
    launchers.extend(overrides);
    Ok(launchers)
}

impl Default for AutocoderConfig {
    fn default() -> Self {
        Self {
            model: "qwen3-coder:480b-cloud".to_string(),
            default_entry: "main.py".to_string(),
            manifest_name: ".autocoder_manifest.json".to_string(),
            handoff_name: ".autocoder_handoff.md".to_string(),
            connectors_name: "connectors.yaml".to_string(),
            requirements_file: "requirements.txt".to_string(),
            snapshot_limit_bytes: 200_000,
            max_iterations: 6,
            auto_install: true,
            script_extensions: vec![".py".to_string(), ".sh".to_string(), ".bat".to_string()],
            oracle: CommandConfig::new(&["ollama", "run"]),
            installer: CommandConfig::new(&["python3", "-m", "pip", "install"]),
            launchers: default_launchers(),
            dependency_signatures: default_signatures(),
        }
    }
}

impl AutocoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.default_entry.trim().is_empty() {
            return Err(anyhow!("default_entry must be non-empty"));
        }
        if self.manifest_name.trim().is_empty() || self.manifest_name.contains('/') {
            return Err(anyhow!("manifest_name must be a plain file name"));
        }
        if self.handoff_name.trim().is_empty() || self.handoff_name.contains('/') {
            return Err(anyhow!("handoff_name must be a plain file name"));
        }
        if self.snapshot_limit_bytes == 0 {
            return Err(anyhow!("snapshot_limit_bytes must be > 0"));
        }
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if is_empty_command(&self.oracle.command) {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        if is_empty_command(&self.installer.command) {
            return Err(anyhow!("installer.command must be a non-empty array"));
        }
        for (ext, argv) in &self.launchers {
            if is_empty_command(argv) {
                return Err(anyhow!("launchers.{ext} must be a non-empty array"));
            }
        }
        SignatureTable::compile(&self.dependency_signatures)?;
        Ok(())
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            default_entry: self.default_entry.clone(),
            script_extensions: self.script_extensions.clone(),
        }
    }

    pub fn signature_table(&self) -> Result<SignatureTable> {
        SignatureTable::compile(&self.dependency_signatures)
    }
}

fn is_empty_command(argv: &[String]) -> bool {
    argv.first().is_none_or(|program| program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AutocoderConfig::default()`.
pub fn load_config(path: &Path) -> Result<AutocoderConfig> {
    if !path.exists() {
        let cfg = AutocoderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AutocoderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AutocoderConfig::default());
        assert_eq!(cfg.snapshot_limit_bytes, 200_000);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autocoder.toml");
        fs::write(
            &path,
            "model = \"codellama\"\nmax_iterations = 3\n[oracle]\ncommand = [\"llm\", \"-m\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.model, "codellama");
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.oracle.command, vec!["llm", "-m"]);
        assert_eq!(cfg.installer, AutocoderConfig::default().installer);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autocoder.toml");
        fs::write(&path, "max_iterations = 2\n[launchers]\njs = [\"node\"]\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_iterations, 2);
        assert_eq!(cfg.default_entry, "main.py");
        assert_eq!(cfg.launchers.get("js"), Some(&vec!["node".to_string()]));
        assert_eq!(cfg.launchers.get("py"), Some(&vec!["python3".to_string()]));
        assert_eq!(cfg.launchers.get("sh"), Some(&vec!["sh".to_string()]));
    }

    #[test]
    fn file_launcher_replaces_builtin_for_same_extension() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autocoder.toml");
        fs::write(&path, "[launchers]\npy = [\"python3.12\", \"-u\"]\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(
            cfg.launchers.get("py"),
            Some(&vec!["python3.12".to_string(), "-u".to_string()])
        );
        assert_eq!(cfg.launchers.len(), 2);
    }

    #[test]
    fn invalid_signature_pattern_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autocoder.toml");
        fs::write(
            &path,
            "[[dependency_signatures]]\nname = \"bad\"\npattern = \"(unclosed\"\n",
        )
        .expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad"));
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let cfg = AutocoderConfig {
            max_iterations: 0,
            ..AutocoderConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
