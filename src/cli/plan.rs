//! `stackwright plan`: show what an update would change.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::common::{OutputFormat, load_state, local_registry, parameter_values, parse_parameter};
use crate::config::EngineConfig;
use crate::engine::{PatchOp, Plan, ResourceOperation, Stack};
use crate::template::Template;

/// Plan an update without applying it.
#[derive(Args, Debug)]
pub struct PlanCommand {
    /// Template file (JSON or YAML)
    #[arg(short, long, value_name = "FILE")]
    pub template: PathBuf,

    /// Previously recorded stack state (JSON); omitted means a new stack
    #[arg(short, long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Parameter value, repeatable
    #[arg(short = 'p', long = "parameter", value_name = "KEY=VALUE", value_parser = parse_parameter)]
    pub parameters: Vec<(String, String)>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl PlanCommand {
    /// Run the command.
    pub async fn execute(self, config: &EngineConfig) -> Result<()> {
        let template = Template::load(&self.template).await?;
        let state = load_state(self.state.as_deref()).await?;
        let stack = Stack::new(local_registry(), config.clone()).with_state(state);
        let plan = stack.plan_update_stack(&template, &parameter_values(&self.parameters))?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            OutputFormat::Text => print_plan(&plan),
        }
        Ok(())
    }
}

fn print_plan(plan: &Plan) {
    if !plan.conditions.is_empty() {
        println!("{}", "Conditions:".bold());
        for (name, value) in &plan.conditions {
            let value = if *value { "true".green() } else { "false".dimmed() };
            println!("  {name}: {value}");
        }
    }

    if !plan.assets.is_empty() {
        println!("{}", "Assets:".bold());
        for (asset_id, exists) in &plan.assets {
            let status = if *exists { "published".green() } else { "missing".yellow() };
            println!("  {asset_id}: {status}");
        }
    }

    if plan.is_empty() {
        println!("{}", "No changes.".green());
        return;
    }

    if !plan.changes.is_empty() {
        println!("{}", "Changes:".bold());
        for change in &plan.changes {
            let line = format!("{} ({})", change.logical_id, change.resource_type);
            match change.operation {
                ResourceOperation::Create => println!("  {} {line}", "+".green()),
                ResourceOperation::MaybeUpdate => {
                    println!("  {} {line} {}", "?".yellow(), "(depends on changed resources)".dimmed());
                }
                _ => println!("  {} {line}", "~".yellow()),
            }
            for op in &change.patch {
                let (verb, path) = match op {
                    PatchOp::Add { path, .. } => ("add", path),
                    PatchOp::Remove { path } => ("remove", path),
                    PatchOp::Replace { path, .. } => ("replace", path),
                };
                println!("      {verb} {path}");
            }
        }
    }

    if !plan.deletions.is_empty() {
        println!("{}", "Deletions:".bold());
        for logical_id in &plan.deletions {
            println!("  {} {logical_id}", "-".red());
        }
    }
}
