//! `stackwright graph`: print logical ids by dependency level.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use indexmap::IndexMap;
use std::path::PathBuf;

use super::common::OutputFormat;
use crate::graph::{DependencyGraph, level_graph};
use crate::template::Template;

/// Show the dependency levels of a template.
#[derive(Args, Debug)]
pub struct GraphCommand {
    /// Template file (JSON or YAML)
    #[arg(short, long, value_name = "FILE")]
    pub template: PathBuf,

    /// Keep dependencies close to their dependents in the listing
    #[arg(long)]
    pub improved: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl GraphCommand {
    /// Run the command.
    pub async fn execute(self) -> Result<()> {
        let template = Template::load(&self.template).await?;
        let graph = DependencyGraph::from_template(&template)?;
        let leveling = level_graph(&graph, self.improved)?;

        match self.format {
            OutputFormat::Json => {
                let levels: IndexMap<String, Vec<&str>> = leveling
                    .levels()
                    .into_iter()
                    .enumerate()
                    .map(|(i, ids)| (format!("{}", i + 1), ids))
                    .collect();
                let report = serde_json::json!({
                    "levels": levels,
                    "dependencies": graph.adjacency(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Text => {
                for (i, ids) in leveling.levels().into_iter().enumerate() {
                    println!("{} {}", format!("Level {}:", i + 1).bold(), ids.join(", "));
                }
            }
        }
        Ok(())
    }
}
