//! Named agents, fleet plans and delegation.
//!
//! An agent is one goal-driven model interaction against the current
//! project snapshot. A fleet runs a list of agents in order; delegation is an
//! agent run whose goal records who handed it over.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::core::parse::parse_response;
use crate::io::config::AutocoderConfig;
use crate::io::handoff::append_note;
use crate::io::materialize::apply;
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptEngine;
use crate::io::snapshot::snapshot;
use crate::io::store::ProjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Applied { files: usize, deletes: usize },
    NoChanges,
}

/// Fleet plan file:
///
/// ```json
/// {"entrypoint": "main.py", "agents": [{"name": "planner", "goal": "draft design"}]}
/// ```
///
/// Keys other than `agents` (such as `entrypoint`) are accepted and ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FleetPlan {
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AgentSpec {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default)]
    pub goal: String,
}

fn default_agent_name() -> String {
    "agent".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetReport {
    pub name: String,
    pub outcome: AgentOutcome,
}

pub fn load_plan(path: &Path) -> Result<FleetPlan> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse fleet plan {}", path.display()))
}

/// Run agent `name` toward `goal` and apply whatever it proposes.
#[instrument(skip_all, fields(agent = %name))]
pub fn run_agent<O: Oracle>(
    store: &ProjectStore,
    oracle: &O,
    config: &AutocoderConfig,
    name: &str,
    goal: &str,
) -> Result<AgentOutcome> {
    let snapshot_text = snapshot(store, config.snapshot_limit_bytes)?;
    let prompt = PromptEngine::new().render_agent(name, goal, &snapshot_text)?;
    let response = oracle
        .generate(&config.model, &prompt)
        .with_context(|| format!("agent '{name}'"))?;
    let change_set = parse_response(&response, &config.parse_options());
    if change_set.is_empty() {
        warn!("agent produced no changes");
        return Ok(AgentOutcome::NoChanges);
    }

    let applied = apply(store, &change_set).with_context(|| format!("agent '{name}'"))?;
    append_note(
        store,
        &format!("Agent {name} Change"),
        &format!("Goal:\n\n{goal}\n"),
    );
    info!(
        files = applied.written.len(),
        deletes = applied.deleted.len(),
        "agent applied changes"
    );
    Ok(AgentOutcome::Applied {
        files: applied.written.len(),
        deletes: applied.deleted.len(),
    })
}

/// Run every agent in `plan` sequentially, reporting each as it finishes.
///
/// An empty agent list is not an error; it yields no reports.
pub fn run_fleet<O: Oracle, F: FnMut(&FleetReport)>(
    store: &ProjectStore,
    oracle: &O,
    config: &AutocoderConfig,
    plan: &FleetPlan,
    mut on_agent: F,
) -> Result<Vec<FleetReport>> {
    if plan.agents.is_empty() {
        warn!("fleet plan has no agents");
    }
    let mut reports = Vec::with_capacity(plan.agents.len());
    for agent in &plan.agents {
        let outcome = run_agent(store, oracle, config, &agent.name, &agent.goal)?;
        let report = FleetReport {
            name: agent.name.clone(),
            outcome,
        };
        on_agent(&report);
        reports.push(report);
    }
    Ok(reports)
}

pub fn delegation_goal(from: &str, to: &str, context: &str) -> String {
    format!("Delegated by {from} to {to}: {context}")
}

/// Hand `context` from agent `from` to agent `to` and run `to`.
pub fn delegate<O: Oracle>(
    store: &ProjectStore,
    oracle: &O,
    config: &AutocoderConfig,
    from: &str,
    to: &str,
    context: &str,
) -> Result<AgentOutcome> {
    run_agent(store, oracle, config, to, &delegation_goal(from, to, context))
}
