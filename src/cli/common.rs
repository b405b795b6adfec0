//! Helpers shared by the CLI commands.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::provider::{InMemoryProvider, ProviderRegistry, ResourceProvider};
use crate::state::StackState;
use crate::template::ParameterValues;

/// Output format for command results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with colors
    Text,
    /// Structured JSON for automation
    Json,
}

/// Parse a `KEY=VALUE` parameter argument.
///
/// Only the first `=` separates key from value, so values may contain `=`.
pub fn parse_parameter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Collect parsed parameter pairs; later values for the same key win.
#[must_use]
pub fn parameter_values(pairs: &[(String, String)]) -> ParameterValues {
    pairs.iter().cloned().collect()
}

/// Read a persisted stack state, or an empty state without a path.
pub async fn load_state(path: Option<&Path>) -> Result<StackState> {
    let Some(path) = path else {
        return Ok(StackState::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read stack state: {}", path.display()))?;
    StackState::from_json_str(&text)
        .with_context(|| format!("Failed to parse stack state: {}", path.display()))
}

/// A registry that handles every resource type in memory.
///
/// The CLI never applies changes, so the registry only answers questions such
/// as which attribute `Ref` returns.
#[must_use]
pub fn local_registry() -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::new().with_default(|_: &str| {
        Arc::new(InMemoryProvider::new()) as Arc<dyn ResourceProvider>
    }))
}
