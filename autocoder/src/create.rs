//! Project creation for `autocoder new`.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::parse::{parse_package_plan, parse_response};
use crate::io::config::AutocoderConfig;
use crate::io::handoff::append_note;
use crate::io::installer::Installer;
use crate::io::manifest::Manifest;
use crate::io::materialize::{ApplySummary, apply};
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptEngine;
use crate::io::store::ProjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    /// Entrypoint recorded in the manifest.
    pub entrypoint: String,
    pub applied: ApplySummary,
    /// Packages installed by the dependency preflight.
    pub preflight_packages: Vec<String>,
}

/// Generate a project for `task` into `store` and record its manifest.
///
/// Entrypoint precedence: the model's answer, then `entry_hint`, then the
/// configured default.
#[instrument(skip_all, fields(root = %store.root().display(), model = %config.model))]
pub fn create_project<O: Oracle, I: Installer>(
    store: &ProjectStore,
    oracle: &O,
    installer: &I,
    config: &AutocoderConfig,
    task: &str,
    entry_hint: Option<&str>,
) -> Result<CreateOutcome> {
    let prompts = PromptEngine::new();

    let preflight_packages = if config.auto_install {
        dependency_preflight(oracle, installer, &prompts, &config.model, task)
    } else {
        Vec::new()
    };

    let prompt = prompts.render_create(task, entry_hint)?;
    let response = oracle
        .generate(&config.model, &prompt)
        .context("generate project")?;
    let change_set = parse_response(&response, &config.parse_options());
    if change_set.is_empty() {
        warn!("model returned no files for the new project");
    }

    let entrypoint = change_set
        .entrypoint
        .clone()
        .or_else(|| entry_hint.map(str::to_string))
        .unwrap_or_else(|| config.default_entry.clone());
    let applied = apply(store, &change_set)?;

    if config.auto_install {
        install_requirements(store, installer, config);
    }

    store.save_manifest(&Manifest::new(&config.model, &entrypoint, task))?;
    append_note(
        store,
        "Project Created",
        &format!("Entry: `{entrypoint}`\n\nUse the CLI (run/fix/edit/agent/fleet) as needed."),
    );
    info!(entrypoint = %entrypoint, files = applied.written.len(), "project created");

    Ok(CreateOutcome {
        entrypoint,
        applied,
        preflight_packages,
    })
}

/// Ask the model which packages the task needs and install them.
///
/// Any failure here is logged and skipped; creation proceeds regardless.
fn dependency_preflight<O: Oracle, I: Installer>(
    oracle: &O,
    installer: &I,
    prompts: &PromptEngine,
    model: &str,
    task: &str,
) -> Vec<String> {
    let plan = prompts
        .render_dep_plan(task)
        .and_then(|prompt| oracle.generate(model, &prompt))
        .and_then(|reply| parse_package_plan(&reply).map_err(anyhow::Error::from));
    let packages = match plan {
        Ok(packages) => packages,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "dependency preflight failed");
            return Vec::new();
        }
    };
    if packages.is_empty() {
        return packages;
    }

    info!(packages = ?packages, "preflight dependency plan");
    match installer.install(&packages) {
        Ok(true) => packages,
        Ok(false) => {
            warn!("preflight install failed");
            Vec::new()
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "preflight install failed");
            Vec::new()
        }
    }
}

/// Install the project's requirements file when it exists. Failures are logged.
pub(crate) fn install_requirements<I: Installer>(
    store: &ProjectStore,
    installer: &I,
    config: &AutocoderConfig,
) {
    let path = match store.resolve(&config.requirements_file) {
        Ok(path) => path,
        Err(err) => {
            warn!(err = %err, "requirements file path rejected");
            return;
        }
    };
    if !path.is_file() {
        return;
    }
    match installer.install_requirements(&path) {
        Ok(true) => info!(path = %path.display(), "requirements installed"),
        Ok(false) => warn!(path = %path.display(), "requirements install failed"),
        Err(err) => warn!(err = %format!("{err:#}"), "requirements install failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedInstaller, ScriptedOracle, TestProject};

    const PROJECT: &str = r#"{"entrypoint":"app.py","files":[
        {"path":"app.py","content":"import requests\n"},
        {"path":"requirements.txt","content":"requests\n"}]}"#;

    #[test]
    fn creates_files_manifest_and_note() {
        let project = TestProject::new().expect("project");
        let oracle = ScriptedOracle::new(vec![r#"{"packages": ["requests"]}"#, PROJECT]);
        let installer = ScriptedInstaller::succeeding();

        let outcome = create_project(
            project.store(),
            &oracle,
            &installer,
            project.config(),
            "fetch a page",
            None,
        )
        .expect("create");

        assert_eq!(outcome.entrypoint, "app.py");
        assert_eq!(outcome.preflight_packages, vec!["requests"]);
        assert_eq!(oracle.calls(), 2);
        assert_eq!(installer.installed(), vec![vec!["requests".to_string()]]);
        assert_eq!(installer.requirements().len(), 1);

        let manifest = project.store().load_manifest().expect("manifest");
        assert_eq!(manifest, Manifest::new(&project.config().model, "app.py", "fetch a page"));
        let note = std::fs::read_to_string(project.store().handoff_path()).expect("note");
        assert!(note.contains("# Project Created"));
        assert!(note.contains("Entry: `app.py`"));
    }

    #[test]
    fn broken_preflight_is_ignored() {
        let project = TestProject::new().expect("project");
        let oracle = ScriptedOracle::new(vec!["no json here", PROJECT]);
        let installer = ScriptedInstaller::succeeding();

        let outcome = create_project(
            project.store(),
            &oracle,
            &installer,
            project.config(),
            "task",
            None,
        )
        .expect("create");

        assert!(outcome.preflight_packages.is_empty());
        assert!(installer.installed().is_empty());
        assert_eq!(outcome.applied.written, vec!["app.py", "requirements.txt"]);
    }

    #[test]
    fn entry_hint_then_default_fill_missing_entrypoint() {
        let config = AutocoderConfig {
            auto_install: false,
            ..AutocoderConfig::default()
        };
        let fenced = "```text notes.txt\nhello\n```";

        let project = TestProject::with_config(config.clone()).expect("project");
        let oracle = ScriptedOracle::new(vec![fenced]);
        let outcome = create_project(
            project.store(),
            &oracle,
            &ScriptedInstaller::succeeding(),
            &config,
            "task",
            Some("run.sh"),
        )
        .expect("create");
        assert_eq!(outcome.entrypoint, "run.sh");

        let project = TestProject::with_config(config.clone()).expect("project");
        let oracle = ScriptedOracle::new(vec![fenced]);
        let outcome = create_project(
            project.store(),
            &oracle,
            &ScriptedInstaller::succeeding(),
            &config,
            "task",
            None,
        )
        .expect("create");
        assert_eq!(outcome.entrypoint, "main.py");
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn oracle_failure_aborts_before_writing_manifest() {
        let config = AutocoderConfig {
            auto_install: false,
            ..AutocoderConfig::default()
        };
        let project = TestProject::with_config(config.clone()).expect("project");
        let oracle = ScriptedOracle::failing("connection refused");

        let err = create_project(
            project.store(),
            &oracle,
            &ScriptedInstaller::succeeding(),
            &config,
            "task",
            None,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("connection refused"));
        assert!(!project.store().manifest_path().exists());
    }
}
