//! Prompt rendering for every model interaction.
//!
//! Templates are compiled into the binary and rendered with minijinja. Inputs
//! are trimmed before rendering so blank context never produces dangling
//! headers.

use anyhow::Result;
use minijinja::{Environment, context};

const CREATE_TEMPLATE: &str = include_str!("prompts/create.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const EDIT_TEMPLATE: &str = include_str!("prompts/edit.md");
const AGENT_TEMPLATE: &str = include_str!("prompts/agent.md");
const DEP_PLAN_TEMPLATE: &str = include_str!("prompts/dep_plan.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("create", CREATE_TEMPLATE)
            .expect("create template should be valid");
        env.add_template("fix", FIX_TEMPLATE)
            .expect("fix template should be valid");
        env.add_template("edit", EDIT_TEMPLATE)
            .expect("edit template should be valid");
        env.add_template("agent", AGENT_TEMPLATE)
            .expect("agent template should be valid");
        env.add_template("dep_plan", DEP_PLAN_TEMPLATE)
            .expect("dep_plan template should be valid");
        Self { env }
    }

    /// Prompt for generating a brand new project from a task description.
    pub fn render_create(&self, task: &str, entry_hint: Option<&str>) -> Result<String> {
        let template = self.env.get_template("create")?;
        Ok(template.render(context! {
            task => task.trim(),
            entry_hint => entry_hint.map(str::trim).filter(|s| !s.is_empty()),
        })?)
    }

    /// Prompt for repairing a failing run.
    pub fn render_fix(&self, error: &str, snapshot: &str, entry: &str) -> Result<String> {
        let template = self.env.get_template("fix")?;
        Ok(template.render(context! {
            error => error.trim(),
            snapshot => snapshot,
            entry => entry,
        })?)
    }

    pub fn render_edit(&self, instruction: &str, snapshot: &str) -> Result<String> {
        let template = self.env.get_template("edit")?;
        Ok(template.render(context! {
            instruction => instruction.trim(),
            snapshot => snapshot,
        })?)
    }

    pub fn render_agent(&self, name: &str, goal: &str, snapshot: &str) -> Result<String> {
        let template = self.env.get_template("agent")?;
        Ok(template.render(context! {
            name => (!name.trim().is_empty()).then(|| name.trim()),
            goal => goal.trim(),
            snapshot => snapshot,
        })?)
    }

    /// Prompt asking for the package list a task needs.
    pub fn render_dep_plan(&self, task: &str) -> Result<String> {
        let template = self.env.get_template("dep_plan")?;
        Ok(template.render(context! { task => task.trim() })?)
    }
}
