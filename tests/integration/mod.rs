//! Integration test suite for stackwright
//!
//! End-to-end tests driving `Stack` through the recording provider, plus CLI
//! tests against the built binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration --features test-utils
//! ```
//!
//! # Test Organization
//!
//! - **update**: creation, idempotence, updates, conditions, outputs, failures
//! - **delete**: orphan removal, deletion policies, `delete_stack`
//! - **retry**: retry budgets, backoff timing and padding on a paused clock
//! - **plan**: dry-run planning through `Stack`
//! - **cli**: the `plan`, `graph` and `validate` commands

mod cli;
mod delete;
mod plan;
mod retry;
mod update;

use serde_json::Value;
use stackwright::template::{ParameterValues, Template};

/// Parse a template from inline JSON.
pub fn template(value: Value) -> Template {
    Template::from_value(value).expect("valid template")
}

/// Parameter values from `(key, value)` pairs.
pub fn params(pairs: &[(&str, &str)]) -> ParameterValues {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}
