//! Deterministic classification of execution output.
//!
//! A failed run is checked against a table of "missing dependency" signatures.
//! Each signature is a named regex whose first capture group is the module the
//! runtime could not resolve. A match drives the install fast path in the fix
//! loop instead of a model call.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One configurable missing-dependency signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySignature {
    /// Stable key for logs and config overrides.
    pub name: String,
    /// Regex with one capture group for the missing module name.
    pub pattern: String,
}

impl DependencySignature {
    pub fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// Built-in signatures for the Python runtime.
pub fn default_signatures() -> Vec<DependencySignature> {
    vec![
        DependencySignature::new(
            "python-module-not-found",
            r"ModuleNotFoundError:\s+No module named '([^']+)'",
        ),
        DependencySignature::new(
            "python-import-error",
            r"ImportError:\s+No module named '?([A-Za-z0-9_.\-]+)'?",
        ),
    ]
}

/// A recognized missing dependency in execution output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Name of the signature that matched.
    pub signature: String,
    /// Module name as reported by the runtime.
    pub module: String,
    /// Package name to hand to the installer.
    pub package: String,
}

/// Compiled signature table, checked in declaration order.
#[derive(Debug, Clone)]
pub struct SignatureTable {
    entries: Vec<(String, Regex)>,
}

impl SignatureTable {
    pub fn compile(signatures: &[DependencySignature]) -> Result<Self> {
        let entries = signatures
            .iter()
            .map(|sig| {
                let regex = Regex::new(&sig.pattern)
                    .with_context(|| format!("compile dependency signature '{}'", sig.name))?;
                Ok((sig.name.clone(), regex))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Return the first signature match in `output`, if any.
    pub fn classify(&self, output: &str) -> Option<MissingDependency> {
        self.entries.iter().find_map(|(name, regex)| {
            let caps = regex.captures(output)?;
            let module = caps.get(1)?.as_str().trim().to_string();
            if module.is_empty() {
                return None;
            }
            Some(MissingDependency {
                signature: name.clone(),
                package: package_for_module(&module),
                module,
            })
        })
    }
}

/// Map a module path to an installable package name.
///
/// Uses the top-level module and swaps `_` for `-` (`foo_bar.baz` -> `foo-bar`).
pub fn package_for_module(module: &str) -> String {
    let top = module.split('.').next().unwrap_or(module);
    top.replace('_', "-")
}
