//! `stackwright validate`: check a template without planning or applying it.
//!
//! Validation builds the dependency graph (cycles, dangling references),
//! validates supplied parameters against their constraints, evaluates every
//! condition and checks every rule. No provider is contacted.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::common::{OutputFormat, parameter_values, parse_parameter};
use crate::config::EngineConfig;
use crate::engine::validate_inputs;
use crate::graph::DependencyGraph;
use crate::resolver::PseudoParameters;
use crate::template::Template;

/// Validate a template and parameter values.
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Template file (JSON or YAML)
    #[arg(short, long, value_name = "FILE")]
    pub template: PathBuf,

    /// Parameter value, repeatable
    #[arg(short = 'p', long = "parameter", value_name = "KEY=VALUE", value_parser = parse_parameter)]
    pub parameters: Vec<(String, String)>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Default, Serialize)]
struct ValidationReport {
    valid: bool,
    resources: usize,
    parameters: usize,
    conditions: usize,
    rules: usize,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidateCommand {
    /// Run the command.
    pub async fn execute(self, config: &EngineConfig) -> Result<()> {
        let template = Template::load(&self.template).await?;
        let mut report = ValidationReport {
            resources: template.resources.len(),
            parameters: template.parameters.len(),
            conditions: template.conditions.len(),
            rules: template.rules.len(),
            ..ValidationReport::default()
        };
        if template.resources.is_empty() {
            report.warnings.push("Template declares no resources".to_string());
        }

        let pseudo = PseudoParameters::from_config(config);
        let result = DependencyGraph::from_template(&template).and_then(|_| {
            validate_inputs(&template, &parameter_values(&self.parameters), &pseudo)
        });
        if let Err(error) = &result {
            report.errors.push(error.to_string());
        }
        report.valid = report.errors.is_empty();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => {
                for warning in &report.warnings {
                    println!("{} {warning}", "⚠".yellow());
                }
                if report.valid {
                    println!(
                        "{} {} is valid: {} resource(s), {} parameter(s), {} condition(s), {} rule(s)",
                        "✓".green(),
                        self.template.display(),
                        report.resources,
                        report.parameters,
                        report.conditions,
                        report.rules
                    );
                }
            }
        }

        result?;
        Ok(())
    }
}
