//! Agent-driven project synthesis and self-repair CLI.
//!
//! `autocoder new` asks a local model for a complete project, writes it under
//! `--dir`, then runs the fix loop until the entrypoint exits 0 or the
//! iteration budget is spent. The remaining commands operate on an existing
//! project root.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use autocoder::core::types::ExecutionResult;
use autocoder::create::create_project;
use autocoder::edit::edit_project;
use autocoder::exit_codes;
use autocoder::fix_loop::{
    FixOutcome, FixSettings, IterationAction, IterationReport, run_fix_loop,
};
use autocoder::fleet::{AgentOutcome, delegate, load_plan, run_agent, run_fleet};
use autocoder::io::config::{AutocoderConfig, DEFAULT_CONFIG_FILE, load_config};
use autocoder::io::connectors::call_tool;
use autocoder::io::installer::PipInstaller;
use autocoder::io::oracle::CommandOracle;
use autocoder::io::process::{shell_command, stream_command};
use autocoder::io::runner::{ProcessRunner, Runner};
use autocoder::io::store::ProjectStore;
use autocoder::logging;

#[derive(Parser)]
#[command(
    name = "autocoder",
    version,
    about = "Generate, run and self-repair multi-file projects with a local model"
)]
struct Cli {
    /// Config file (defaults to ./autocoder.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a project from a task description, then fix until it runs.
    New {
        /// Natural-language task.
        task: String,
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        fix: FixArgs,
        /// Entrypoint to use when the model does not name one.
        #[arg(long)]
        entry: Option<String>,
    },
    /// Run the fix loop on an existing project.
    Fix {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        fix: FixArgs,
        /// Override the manifest entrypoint.
        #[arg(long)]
        entry: Option<String>,
    },
    /// Apply an instruction-driven edit, then run once.
    Edit {
        instruction: String,
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long)]
        no_auto_install: bool,
    },
    /// Run the entrypoint once and exit with its code.
    Run {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long)]
        entry: Option<String>,
    },
    /// Run a shell command in the project root, streaming its output.
    Exec {
        #[command(flatten)]
        project: ProjectArgs,
        /// Command string passed to the shell as one argument (quote it).
        #[arg(allow_hyphen_values = true)]
        command: String,
    },
    /// Single-agent operations.
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Multi-agent plans.
    Fleet {
        #[command(subcommand)]
        command: FleetCommand,
    },
    /// Hand a task from one agent to another.
    Delegate {
        from: String,
        to: String,
        context: String,
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Project connectors (`connectors.yaml`).
    Connector {
        #[command(subcommand)]
        command: ConnectorCommand,
    },
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Run one named agent toward a goal.
    Run {
        name: String,
        goal: String,
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Subcommand)]
enum FleetCommand {
    /// Run every agent in a JSON plan, in order.
    Run {
        plan: PathBuf,
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Subcommand)]
enum ConnectorCommand {
    /// Invoke a connector tool with an optional argument.
    Call {
        tool: String,
        arg: Option<String>,
        #[command(flatten)]
        project: ProjectArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct ProjectArgs {
    /// Project root.
    #[arg(long, default_value = ".")]
    dir: PathBuf,
}

#[derive(Args, Debug, Clone, Default)]
struct ModelArgs {
    /// Model id passed to the oracle.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
struct FixArgs {
    /// Fix loop iteration budget.
    #[arg(long = "max-iters")]
    max_iters: Option<u32>,
    /// Never install missing dependencies.
    #[arg(long)]
    no_auto_install: bool,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let base = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Command::New {
            task,
            project,
            model,
            fix,
            entry,
        } => {
            let config = with_overrides(&base, &model, &fix)?;
            cmd_new(&config, &project.dir, &task, entry.as_deref())
        }
        Command::Fix {
            project,
            model,
            fix,
            entry,
        } => {
            let config = with_overrides(&base, &model, &fix)?;
            cmd_fix(&config, &project.dir, entry.as_deref())
        }
        Command::Edit {
            instruction,
            project,
            model,
            no_auto_install,
        } => {
            let fix = FixArgs {
                max_iters: None,
                no_auto_install,
            };
            let config = with_overrides(&base, &model, &fix)?;
            cmd_edit(&config, &project.dir, &instruction)
        }
        Command::Run { project, entry } => cmd_run(&base, &project.dir, entry.as_deref()),
        Command::Exec { project, command } => cmd_exec(&base, &project.dir, &command),
        Command::Agent {
            command:
                AgentCommand::Run {
                    name,
                    goal,
                    project,
                    model,
                },
        } => {
            let config = with_overrides(&base, &model, &FixArgs::default())?;
            cmd_agent(&config, &project.dir, &name, &goal)
        }
        Command::Fleet {
            command:
                FleetCommand::Run {
                    plan,
                    project,
                    model,
                },
        } => {
            let config = with_overrides(&base, &model, &FixArgs::default())?;
            cmd_fleet(&config, &project.dir, &plan)
        }
        Command::Delegate {
            from,
            to,
            context,
            project,
            model,
        } => {
            let config = with_overrides(&base, &model, &FixArgs::default())?;
            cmd_delegate(&config, &project.dir, &from, &to, &context)
        }
        Command::Connector {
            command: ConnectorCommand::Call { tool, arg, project },
        } => cmd_connector(&base, &project.dir, &tool, arg.as_deref()),
    }
}

/// Explicit `--config` must exist; the implicit default file is optional.
fn resolve_config(explicit: Option<&Path>) -> Result<AutocoderConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            load_config(path)
        }
        None => load_config(Path::new(DEFAULT_CONFIG_FILE)),
    }
}

fn with_overrides(
    base: &AutocoderConfig,
    model: &ModelArgs,
    fix: &FixArgs,
) -> Result<AutocoderConfig> {
    let mut config = base.clone();
    if let Some(model) = &model.model {
        config.model = model.clone();
    }
    if let Some(max_iters) = fix.max_iters {
        config.max_iterations = max_iters;
    }
    if fix.no_auto_install {
        config.auto_install = false;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_new(config: &AutocoderConfig, dir: &Path, task: &str, entry: Option<&str>) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    let oracle = CommandOracle::from_config(config);
    let installer = PipInstaller::from_config(config);

    let created = create_project(&store, &oracle, &installer, config, task, entry)?;
    println!(
        "new: root={} entrypoint={} files={}",
        store.root().display(),
        created.entrypoint,
        created.applied.written.len()
    );

    let outcome = fix_with(&store, config, &created.entrypoint, &oracle, &installer)?;
    Ok(report_fix(&outcome))
}

fn cmd_fix(config: &AutocoderConfig, dir: &Path, entry: Option<&str>) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    let entrypoint = project_entrypoint(&store, config, entry);
    let oracle = CommandOracle::from_config(config);
    let installer = PipInstaller::from_config(config);

    let outcome = fix_with(&store, config, &entrypoint, &oracle, &installer)?;
    Ok(report_fix(&outcome))
}

fn fix_with(
    store: &ProjectStore,
    config: &AutocoderConfig,
    entrypoint: &str,
    oracle: &CommandOracle,
    installer: &PipInstaller,
) -> Result<FixOutcome> {
    let settings = FixSettings::from_config(config, entrypoint)?;
    let runner = ProcessRunner::from_config(config);
    run_fix_loop(store, &runner, oracle, installer, &settings, print_iteration)
}

fn print_iteration(report: &IterationReport) {
    let action = match &report.action {
        IterationAction::Passed => "passed".to_string(),
        IterationAction::Installed { package } => format!("installed package={package}"),
        IterationAction::Patched { written, deleted } => {
            format!("patched written={written} deleted={deleted}")
        }
        IterationAction::NoChanges => "no_changes".to_string(),
    };
    println!(
        "fix: iteration={} exit_code={} action={}",
        report.iteration, report.exit_code, action
    );
}

fn report_fix(outcome: &FixOutcome) -> i32 {
    println!(
        "fix: state={} iterations={} oracle_calls={}",
        outcome.stop.as_str(),
        outcome.iterations,
        outcome.oracle_calls
    );
    if let Some(result) = &outcome.last_result {
        print_result(result);
    }
    if outcome.stop.is_success() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    }
}

fn print_result(result: &ExecutionResult) {
    if !result.stdout.trim().is_empty() {
        print!("{}", result.stdout);
    }
    if !result.success() && !result.stderr.trim().is_empty() {
        eprint!("{}", result.stderr);
    }
}

/// Entrypoint precedence: CLI flag, then manifest, then configured default.
fn project_entrypoint(
    store: &ProjectStore,
    config: &AutocoderConfig,
    entry: Option<&str>,
) -> String {
    if let Some(entry) = entry {
        return entry.to_string();
    }
    let manifest = store.load_manifest_or_default();
    manifest
        .entrypoint()
        .unwrap_or(&config.default_entry)
        .to_string()
}

fn cmd_edit(config: &AutocoderConfig, dir: &Path, instruction: &str) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    let outcome = edit_project(
        &store,
        &ProcessRunner::from_config(config),
        &CommandOracle::from_config(config),
        &PipInstaller::from_config(config),
        config,
        instruction,
    )?;
    println!(
        "edit: written={} deleted={} exit_code={}",
        outcome.applied.written.len(),
        outcome.applied.deleted.len(),
        outcome.result.exit_code
    );
    print_result(&outcome.result);
    if !outcome.result.success() {
        println!("edit: project fails after edit; run `autocoder fix` to repair");
    }
    Ok(exit_codes::OK)
}

fn cmd_run(config: &AutocoderConfig, dir: &Path, entry: Option<&str>) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    let entrypoint = project_entrypoint(&store, config, entry);
    let result = ProcessRunner::from_config(config).run(&store, &entrypoint)?;
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    Ok(result.exit_code)
}

fn cmd_exec(config: &AutocoderConfig, dir: &Path, command: &str) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    println!("exec: {command}");
    let mut out = std::io::stdout();
    let mut err = std::io::stderr();
    stream_command(shell_command(command, store.root()), &mut out, &mut err, true)
}

fn print_agent(name: &str, outcome: &AgentOutcome) {
    match outcome {
        AgentOutcome::Applied { files, deletes } => {
            println!("agent: name={name} state=applied files={files} deletes={deletes}");
        }
        AgentOutcome::NoChanges => println!("agent: name={name} state=no_changes"),
    }
}

fn cmd_agent(config: &AutocoderConfig, dir: &Path, name: &str, goal: &str) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    let outcome = run_agent(&store, &CommandOracle::from_config(config), config, name, goal)?;
    print_agent(name, &outcome);
    Ok(exit_codes::OK)
}

fn cmd_fleet(config: &AutocoderConfig, dir: &Path, plan_path: &Path) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    let plan = load_plan(plan_path)?;
    if plan.agents.is_empty() {
        println!("fleet: plan has no agents");
        return Ok(exit_codes::OK);
    }
    let reports = run_fleet(
        &store,
        &CommandOracle::from_config(config),
        config,
        &plan,
        |report| print_agent(&report.name, &report.outcome),
    )?;
    println!("fleet: state=completed agents={}", reports.len());
    Ok(exit_codes::OK)
}

fn cmd_delegate(
    config: &AutocoderConfig,
    dir: &Path,
    from: &str,
    to: &str,
    context: &str,
) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    let outcome = delegate(
        &store,
        &CommandOracle::from_config(config),
        config,
        from,
        to,
        context,
    )?;
    print_agent(to, &outcome);
    Ok(exit_codes::OK)
}

fn cmd_connector(
    config: &AutocoderConfig,
    dir: &Path,
    tool: &str,
    arg: Option<&str>,
) -> Result<i32> {
    let store = ProjectStore::open(dir, config)?;
    let output = call_tool(&store, &config.connectors_name, tool, arg)?;
    println!("{output}");
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_new_with_overrides() {
        let cli = Cli::parse_from([
            "autocoder",
            "new",
            "build a todo cli",
            "--dir",
            "out",
            "--model",
            "codellama",
            "--max-iters",
            "3",
            "--no-auto-install",
        ]);
        match cli.command {
            Command::New {
                task,
                project,
                model,
                fix,
                entry,
            } => {
                assert_eq!(task, "build a todo cli");
                assert_eq!(project.dir, PathBuf::from("out"));
                assert_eq!(model.model.as_deref(), Some("codellama"));
                assert_eq!(fix.max_iters, Some(3));
                assert!(fix.no_auto_install);
                assert_eq!(entry, None);
            }
            _ => panic!("expected new"),
        }
    }

    #[test]
    fn parse_fix_defaults_to_current_dir() {
        let cli = Cli::parse_from(["autocoder", "fix"]);
        assert!(matches!(
            cli.command,
            Command::Fix { ref project, .. } if project.dir == Path::new(".")
        ));
    }

    #[test]
    fn parse_exec_keeps_command_string_verbatim() {
        let line = r#"python3 -c "print('a b')""#;
        let cli = Cli::parse_from(["autocoder", "exec", "--dir", "p", line]);
        match cli.command {
            Command::Exec { command, .. } => assert_eq!(command, line),
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn parse_exec_rejects_unquoted_word_list() {
        assert!(Cli::try_parse_from(["autocoder", "exec", "--dir", "p", "ls", "-la"]).is_err());
    }

    #[test]
    fn parse_nested_subcommands() {
        let cli = Cli::parse_from(["autocoder", "agent", "run", "tester", "add tests"]);
        assert!(matches!(
            cli.command,
            Command::Agent {
                command: AgentCommand::Run { ref name, .. }
            } if name == "tester"
        ));

        let cli = Cli::parse_from(["autocoder", "--config", "c.toml", "fleet", "run", "plan.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(cli.command, Command::Fleet { .. }));

        let cli = Cli::parse_from(["autocoder", "connector", "call", "db.count"]);
        assert!(matches!(
            cli.command,
            Command::Connector {
                command: ConnectorCommand::Call { arg: None, .. }
            }
        ));
    }

    #[test]
    fn overrides_produce_new_config() {
        let base = AutocoderConfig::default();
        let config = with_overrides(
            &base,
            &ModelArgs {
                model: Some("m2".to_string()),
            },
            &FixArgs {
                max_iters: Some(2),
                no_auto_install: true,
            },
        )
        .expect("overrides");

        assert_eq!(config.model, "m2");
        assert_eq!(config.max_iterations, 2);
        assert!(!config.auto_install);
        assert_eq!(base, AutocoderConfig::default());
    }

    #[test]
    fn zero_max_iters_is_rejected() {
        let fix = FixArgs {
            max_iters: Some(0),
            no_auto_install: false,
        };
        assert!(with_overrides(&AutocoderConfig::default(), &ModelArgs::default(), &fix).is_err());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(resolve_config(Some(&temp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn entrypoint_precedence_flag_manifest_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = AutocoderConfig::default();
        let store = ProjectStore::open(temp.path(), &config).expect("open");

        assert_eq!(project_entrypoint(&store, &config, None), "main.py");
        store
            .save_manifest(&autocoder::io::manifest::Manifest::new("m", "app.py", "t"))
            .expect("manifest");
        assert_eq!(project_entrypoint(&store, &config, None), "app.py");
        assert_eq!(project_entrypoint(&store, &config, Some("cli.py")), "cli.py");
    }
}
