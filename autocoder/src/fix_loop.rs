//! Bounded run → classify → repair loop for `autocoder fix` and `autocoder new`.
//!
//! Each iteration runs the entrypoint once. A failure is first matched
//! against the dependency-signature table; a recognized missing package is
//! installed without consulting the model. Otherwise the model is asked for a
//! patch, which is materialized before the next run.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::classify::SignatureTable;
use crate::core::parse::{ParseOptions, parse_response};
use crate::core::types::ExecutionResult;
use crate::io::config::AutocoderConfig;
use crate::io::installer::Installer;
use crate::io::materialize::apply;
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptEngine;
use crate::io::runner::Runner;
use crate::io::snapshot::snapshot;
use crate::io::store::ProjectStore;

/// Loop position. `Running(n)` is about to start iteration `n` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running(u32),
    Succeeded,
    FailedExhausted,
    FailedNoChanges,
}

/// Terminal state of a fix loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixStop {
    /// The entrypoint exited 0.
    Succeeded,
    /// Every iteration ran and the entrypoint still fails.
    FailedExhausted,
    /// The model answered a failure with an empty change-set.
    FailedNoChanges,
}

impl FixStop {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::FailedExhausted => "failed_exhausted",
            Self::FailedNoChanges => "failed_no_changes",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// What the loop did after observing one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationAction {
    Passed,
    Installed { package: String },
    Patched { written: usize, deleted: usize },
    NoChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    pub iteration: u32,
    pub exit_code: i32,
    pub action: IterationAction,
}

/// Summary of one fix loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOutcome {
    pub stop: FixStop,
    /// Number of entrypoint runs.
    pub iterations: u32,
    pub oracle_calls: u32,
    /// Packages installed through the signature fast path, in order.
    pub installed: Vec<String>,
    pub last_result: Option<ExecutionResult>,
}

/// Per-invocation settings, derived from [`AutocoderConfig`] plus CLI overrides.
#[derive(Debug, Clone)]
pub struct FixSettings {
    pub model: String,
    pub entrypoint: String,
    pub max_iterations: u32,
    pub auto_install: bool,
    pub snapshot_limit_bytes: usize,
    pub parse_options: ParseOptions,
    pub signatures: SignatureTable,
}

impl FixSettings {
    pub fn from_config(config: &AutocoderConfig, entrypoint: &str) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            entrypoint: entrypoint.to_string(),
            max_iterations: config.max_iterations,
            auto_install: config.auto_install,
            snapshot_limit_bytes: config.snapshot_limit_bytes,
            parse_options: config.parse_options(),
            signatures: config.signature_table()?,
        })
    }
}

/// Drive the project toward a clean run.
///
/// Stops on the first terminal state. Oracle failures, containment
/// violations and I/O errors abort with `Err`; changes applied by earlier
/// iterations stay on disk.
#[instrument(
    skip_all,
    fields(entrypoint = %settings.entrypoint, max_iterations = settings.max_iterations)
)]
pub fn run_fix_loop<R, O, I, F>(
    store: &ProjectStore,
    runner: &R,
    oracle: &O,
    installer: &I,
    settings: &FixSettings,
    mut on_iteration: F,
) -> Result<FixOutcome>
where
    R: Runner,
    O: Oracle,
    I: Installer,
    F: FnMut(&IterationReport),
{
    let prompts = PromptEngine::new();
    let mut state = LoopState::Running(1);
    let mut runs = 0u32;
    let mut oracle_calls = 0u32;
    let mut installed: Vec<String> = Vec::new();
    let mut last_result: Option<ExecutionResult> = None;

    let stop = loop {
        let iteration = match state {
            LoopState::Running(iteration) => iteration,
            LoopState::Succeeded => break FixStop::Succeeded,
            LoopState::FailedExhausted => break FixStop::FailedExhausted,
            LoopState::FailedNoChanges => break FixStop::FailedNoChanges,
        };
        if iteration > settings.max_iterations {
            state = LoopState::FailedExhausted;
            continue;
        }

        let result = runner.run(store, &settings.entrypoint)?;
        runs += 1;
        debug!(iteration, exit_code = result.exit_code, "entrypoint ran");

        if result.success() {
            on_iteration(&IterationReport {
                iteration,
                exit_code: result.exit_code,
                action: IterationAction::Passed,
            });
            last_result = Some(result);
            state = LoopState::Succeeded;
            continue;
        }

        let error_text = result.combined_output();
        let exit_code = result.exit_code;
        last_result = Some(result);

        let fast_path = if settings.auto_install {
            try_install(settings, installer, &installed, &error_text)
        } else {
            None
        };
        if let Some(package) = fast_path {
            on_iteration(&IterationReport {
                iteration,
                exit_code,
                action: IterationAction::Installed {
                    package: package.clone(),
                },
            });
            installed.push(package);
            state = LoopState::Running(iteration + 1);
            continue;
        }

        let snapshot_text = snapshot(store, settings.snapshot_limit_bytes)?;
        let prompt = prompts.render_fix(&error_text, &snapshot_text, &settings.entrypoint)?;
        oracle_calls += 1;
        let response = oracle.generate(&settings.model, &prompt)?;

        let mut change_set = parse_response(&response, &settings.parse_options);
        // The entrypoint is fixed for the lifetime of the loop.
        change_set.entrypoint = None;
        if change_set.is_empty() {
            warn!(iteration, "model proposed no changes");
            on_iteration(&IterationReport {
                iteration,
                exit_code,
                action: IterationAction::NoChanges,
            });
            state = LoopState::FailedNoChanges;
            continue;
        }

        let summary = apply(store, &change_set)?;
        on_iteration(&IterationReport {
            iteration,
            exit_code,
            action: IterationAction::Patched {
                written: summary.written.len(),
                deleted: summary.deleted.len(),
            },
        });
        state = LoopState::Running(iteration + 1);
    };

    info!(
        stop = stop.as_str(),
        iterations = runs,
        oracle_calls,
        "fix loop finished"
    );
    Ok(FixOutcome {
        stop,
        iterations: runs,
        oracle_calls,
        installed,
        last_result,
    })
}

/// Install the package behind a recognized missing-dependency failure.
///
/// Returns the installed package name, or `None` when the failure is not a
/// known signature, the package was already tried, or the install failed.
fn try_install<I: Installer>(
    settings: &FixSettings,
    installer: &I,
    installed: &[String],
    error_text: &str,
) -> Option<String> {
    let missing = settings.signatures.classify(error_text)?;
    if installed.contains(&missing.package) {
        debug!(package = %missing.package, "already installed this loop, asking the model");
        return None;
    }
    info!(
        module = %missing.module,
        package = %missing.package,
        signature = %missing.signature,
        "missing dependency detected"
    );
    match installer.install(std::slice::from_ref(&missing.package)) {
        Ok(true) => Some(missing.package),
        Ok(false) => {
            warn!(package = %missing.package, "install failed, asking the model");
            None
        }
        Err(err) => {
            warn!(
                package = %missing.package,
                err = %format!("{err:#}"),
                "installer error, asking the model"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProjectError;
    use crate::test_support::{
        ScriptedInstaller, ScriptedOracle, ScriptedRunner, TestProject, exec_fail,
        exec_missing_module, exec_ok,
    };

    fn settings(max_iterations: u32) -> FixSettings {
        let config = AutocoderConfig {
            max_iterations,
            ..AutocoderConfig::default()
        };
        FixSettings::from_config(&config, "main.py").expect("settings")
    }

    const PATCH: &str = r#"{"files":[{"path":"main.py","content":"print('fixed')"}]}"#;

    #[test]
    fn passing_run_succeeds_without_oracle() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::always(exec_ok("hi"));
        let oracle = ScriptedOracle::new(Vec::<&str>::new());
        let installer = ScriptedInstaller::succeeding();

        let outcome = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |_| {},
        )
        .expect("loop");

        assert_eq!(outcome.stop, FixStop::Succeeded);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.oracle_calls, 0);
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn empty_response_stops_with_no_changes_after_one_call() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::always(exec_fail("Traceback: boom"));
        let oracle = ScriptedOracle::always("I could not find anything to change.");
        let installer = ScriptedInstaller::succeeding();

        let outcome = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |_| {},
        )
        .expect("loop");

        assert_eq!(outcome.stop, FixStop::FailedNoChanges);
        assert_eq!(outcome.oracle_calls, 1);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(runner.calls(), 1);
    }

    #[test]
    fn non_converging_loop_exhausts_budget() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::always(exec_fail("still broken"));
        let oracle = ScriptedOracle::always(PATCH);
        let installer = ScriptedInstaller::succeeding();
        let mut reports = Vec::new();

        let outcome = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(3),
            |report| reports.push(report.clone()),
        )
        .expect("loop");

        assert_eq!(outcome.stop, FixStop::FailedExhausted);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(runner.calls(), 3);
        assert!(outcome.oracle_calls <= 3);
        assert_eq!(
            reports.iter().map(|r| r.iteration).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            project.store().read("main.py").expect("read"),
            "print('fixed')"
        );
    }

    #[test]
    fn missing_module_is_installed_before_asking_model() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::new(vec![
            exec_missing_module("yaml_loader"),
            exec_ok("done"),
        ]);
        let oracle = ScriptedOracle::new(Vec::<&str>::new());
        let installer = ScriptedInstaller::succeeding();

        let outcome = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |_| {},
        )
        .expect("loop");

        assert_eq!(outcome.stop, FixStop::Succeeded);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.oracle_calls, 0);
        assert_eq!(outcome.installed, vec!["yaml-loader"]);
        assert_eq!(installer.installed(), vec![vec!["yaml-loader".to_string()]]);
    }

    #[test]
    fn same_missing_package_falls_through_to_model() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::new(vec![
            exec_missing_module("requests"),
            exec_missing_module("requests"),
            exec_ok(""),
        ]);
        let oracle = ScriptedOracle::always(PATCH);
        let installer = ScriptedInstaller::succeeding();

        let outcome = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |_| {},
        )
        .expect("loop");

        assert_eq!(outcome.stop, FixStop::Succeeded);
        assert_eq!(installer.installed().len(), 1);
        assert_eq!(outcome.oracle_calls, 1);
    }

    #[test]
    fn auto_install_disabled_goes_straight_to_model() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::new(vec![exec_missing_module("requests"), exec_ok("")]);
        let oracle = ScriptedOracle::always(PATCH);
        let installer = ScriptedInstaller::succeeding();
        let mut settings = settings(6);
        settings.auto_install = false;

        let outcome = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings,
            |_| {},
        )
        .expect("loop");

        assert_eq!(outcome.stop, FixStop::Succeeded);
        assert!(installer.installed().is_empty());
        assert_eq!(outcome.oracle_calls, 1);
    }

    #[test]
    fn failed_install_asks_model_in_same_iteration() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::new(vec![exec_missing_module("numpy"), exec_ok("")]);
        let oracle = ScriptedOracle::always(PATCH);
        let installer = ScriptedInstaller::failing();
        let mut reports = Vec::new();

        let outcome = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |report| reports.push(report.clone()),
        )
        .expect("loop");

        assert_eq!(outcome.stop, FixStop::Succeeded);
        assert!(outcome.installed.is_empty());
        assert_eq!(
            reports[0].action,
            IterationAction::Patched {
                written: 1,
                deleted: 0
            }
        );
    }

    #[test]
    fn response_entrypoint_is_ignored() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::new(vec![exec_fail("boom"), exec_ok("")]);
        let oracle = ScriptedOracle::always(
            r#"{"entrypoint":"other.py","files":[{"path":"main.py","content":"ok"}]}"#,
        );
        let installer = ScriptedInstaller::succeeding();

        run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |_| {},
        )
        .expect("loop");

        assert_eq!(runner.entrypoints(), vec!["main.py", "main.py"]);
    }

    #[test]
    fn fix_prompt_carries_error_and_snapshot() {
        let project = TestProject::new().expect("project");
        project.write("main.py", "import broken").expect("seed");
        let runner = ScriptedRunner::always(exec_fail("NameError: name 'x' is not defined"));
        let oracle = ScriptedOracle::always("");
        let installer = ScriptedInstaller::succeeding();

        run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |_| {},
        )
        .expect("loop");

        let prompts = oracle.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("NameError: name 'x' is not defined"));
        assert!(prompts[0].contains("===== main.py =====\nimport broken"));
        assert!(prompts[0].contains("same entrypoint: main.py"));
    }

    #[test]
    fn oracle_failure_aborts_loop() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::always(exec_fail("boom"));
        let oracle = ScriptedOracle::failing("model not pulled");
        let installer = ScriptedInstaller::succeeding();

        let err = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ProjectError>(),
            Some(ProjectError::Oracle(msg)) if msg == "model not pulled"
        ));
    }

    #[test]
    fn containment_violation_aborts_loop_after_partial_apply() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::always(exec_fail("boom"));
        let oracle = ScriptedOracle::always(
            r#"{"files":[{"path":"ok.py","content":"1"},{"path":"../evil.py","content":"2"}]}"#,
        );
        let installer = ScriptedInstaller::succeeding();

        let err = run_fix_loop(
            project.store(),
            &runner,
            &oracle,
            &installer,
            &settings(6),
            |_| {},
        )
        .unwrap_err();

        assert!(
            err.downcast_ref::<ProjectError>()
                .is_some_and(ProjectError::is_containment)
        );
        assert_eq!(project.store().read("ok.py").expect("read"), "1");
    }
}
