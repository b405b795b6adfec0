//! Deciding what to do with a resource, and which previous resources are orphaned.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use super::diff::{PatchOp, diff};
use crate::resolver::{ResolveError, Resolution};
use crate::state::PhysicalResource;
use crate::template::{Expression, Template};

/// What reconciliation will do with one logical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceOperation {
    /// No previous resource exists
    Create,
    /// The previous resource differs from the desired properties
    Update,
    /// The previous resource already matches
    Skip,
    /// Dependencies are still unresolved but the logical properties are
    /// unchanged; decide again once they resolve
    MaybeUpdate,
}

impl fmt::Display for ResourceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Skip => write!(f, "SKIP"),
            Self::MaybeUpdate => write!(f, "MAYBE_UPDATE"),
        }
    }
}

/// The operation decided for a resource plus the patch that justified it.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDecision {
    /// The decided operation
    pub operation: ResourceOperation,
    /// Differences between previous input properties and resolved desired
    /// properties; empty unless fully resolved
    pub patch: Vec<PatchOp>,
}

/// Content hash (`sha256:<hex>`) of a resource's unevaluated properties.
///
/// Keys are sorted before hashing so that key order does not matter.
#[must_use]
pub fn properties_hash(properties: Option<&Expression>) -> String {
    let value = properties.map_or(Value::Null, Expression::to_value);
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(item, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Decide between CREATE, UPDATE, SKIP and MAYBE_UPDATE.
///
/// * no previous resource: CREATE
/// * unresolved dependencies: compare the logical properties hash with the
///   previous one; equal means MAYBE_UPDATE, different means UPDATE
/// * fully resolved: diff against the previous input properties; an empty
///   patch means SKIP, anything else UPDATE
pub fn compute_resource_operation(
    previous: Option<&PhysicalResource>,
    desired_hash: &str,
    resolution: &Resolution,
) -> Result<OperationDecision, ResolveError> {
    let Some(previous) = previous else {
        return Ok(OperationDecision {
            operation: ResourceOperation::Create,
            patch: Vec::new(),
        });
    };

    if !resolution.is_resolved() {
        let operation = if previous.properties_hash.as_deref() == Some(desired_hash) {
            ResourceOperation::MaybeUpdate
        } else {
            ResourceOperation::Update
        };
        return Ok(OperationDecision {
            operation,
            patch: Vec::new(),
        });
    }

    let desired = resolution.realize()?;
    let patch = diff(&previous.input_properties, &desired);
    let operation = if patch.is_empty() {
        ResourceOperation::Skip
    } else {
        ResourceOperation::Update
    };
    Ok(OperationDecision { operation, patch })
}

/// Logical ids recorded in the previous state that the desired template no
/// longer declares, in previous-state order.
#[must_use]
pub fn discover_orphaned_dependencies(
    previous: &IndexMap<String, PhysicalResource>,
    desired: &Template,
) -> Vec<String> {
    previous.keys().filter(|id| !desired.is_resource(id)).cloned().collect()
}
