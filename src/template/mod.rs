//! Desired-state templates.
//!
//! A [`Template`] maps logical ids to [`LogicalResource`]s whose properties are
//! unevaluated [`Expression`] trees, plus optional `Parameters`, `Conditions`,
//! `Mappings`, `Rules` and `Outputs` sections. Templates are immutable once a
//! reconciliation run starts.
//!
//! # Template format
//!
//! ```yaml
//! Parameters:
//!   Env:
//!     Type: String
//!     AllowedValues: [dev, prod]
//! Conditions:
//!   IsProd: {"Fn::Equals": [{"Ref": Env}, prod]}
//! Resources:
//!   Topic:
//!     Type: Test::Topic
//!   Queue:
//!     Type: Test::Queue
//!     Properties:
//!       TopicArn: {"Fn::GetAtt": [Topic, Arn]}
//!     DependsOn: Topic
//!     DeletionPolicy: Retain
//! Outputs:
//!   QueueUrl:
//!     Value: {"Ref": Queue}
//! ```

pub mod expression;
pub mod parameters;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::core::StackError;

pub use expression::{ConditionRef, Expression, ExpressionParseError, Intrinsic, Reference};
pub use parameters::{ParameterDefinition, ParameterType, ParameterValues, ResolvedParameters};

/// Prefix shared by every pseudo-parameter name.
pub const PSEUDO_PARAMETER_PREFIX: &str = "AWS::";

/// Second-level mapping table: `Mappings.<map>.<top>.<second>`.
pub type Mapping = IndexMap<String, IndexMap<String, Value>>;

/// What happens to a resource's physical counterpart when it leaves the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Delete the physical resource (default)
    #[default]
    Delete,
    /// Leave it in place and stop managing it
    Retain,
    /// Snapshot before deleting; not supported by the engine
    Snapshot,
}

impl DeletionPolicy {
    fn is_default(&self) -> bool {
        *self == Self::Delete
    }
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "Delete"),
            Self::Retain => write!(f, "Retain"),
            Self::Snapshot => write!(f, "Snapshot"),
        }
    }
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogicalResource {
    /// Resource type name used to look up the provider
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Unevaluated properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Expression>,
    /// Explicit ordering hints
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Name of a condition gating this resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Deletion behaviour
    #[serde(default, skip_serializing_if = "DeletionPolicy::is_default")]
    pub deletion_policy: DeletionPolicy,
    /// Preserved verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
    /// Preserved verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl LogicalResource {
    /// A resource of the given type with no properties.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: None,
            depends_on: Vec::new(),
            condition: None,
            deletion_policy: DeletionPolicy::Delete,
            update_replace_policy: None,
            metadata: None,
        }
    }

    /// Set the properties expression.
    #[must_use]
    pub fn with_properties(mut self, properties: Expression) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Add an explicit dependency.
    #[must_use]
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(single) => vec![single],
        OneOrMany::Many(many) => many,
    })
}

/// A single assertion inside a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Assertion {
    /// Boolean expression that must hold
    pub assert: Expression,
    /// Message reported when it does not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assert_description: Option<String>,
}

/// A template rule: assertions over parameter values checked before any operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rule {
    /// When present and false, the rule is skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_condition: Option<Expression>,
    /// Assertions that must all hold
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

/// Export settings of an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    /// Export name expression
    pub name: Expression,
}

/// A declared stack output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Value expression
    pub value: Expression,
    /// Condition gating the output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Export settings, preserved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

/// The desired state of a stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// `AWSTemplateFormatVersion`, preserved
    #[serde(
        rename = "AWSTemplateFormatVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub format_version: Option<String>,
    /// Free-form description, preserved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared parameters
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ParameterDefinition>,
    /// Named boolean conditions
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub conditions: IndexMap<String, Expression>,
    /// Lookup tables for `Fn::FindInMap`
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mappings: IndexMap<String, Mapping>,
    /// Pre-flight assertions
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub rules: IndexMap<String, Rule>,
    /// Declared resources keyed by logical id
    pub resources: IndexMap<String, LogicalResource>,
    /// Declared outputs
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Output>,
}

impl Template {
    /// An empty template.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, builder style.
    #[must_use]
    pub fn with_resource(mut self, logical_id: impl Into<String>, resource: LogicalResource) -> Self {
        self.resources.insert(logical_id.into(), resource);
        self
    }

    /// Parse a template from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, StackError> {
        serde_json::from_value(value).map_err(|e| StackError::TemplateParse {
            reason: e.to_string(),
        })
    }

    /// Parse a template from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, StackError> {
        serde_json::from_str(text).map_err(|e| StackError::TemplateParse {
            reason: e.to_string(),
        })
    }

    /// Parse a template from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, StackError> {
        serde_yaml::from_str(text).map_err(|e| StackError::TemplateParse {
            reason: e.to_string(),
        })
    }

    /// Load a template from disk. `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as JSON.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read template from {}", path.display()))?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let template = if is_yaml {
            Self::from_yaml_str(&text)
        } else {
            Self::from_json_str(&text)
        };
        template.with_context(|| format!("Failed to parse template {}", path.display()))
    }

    /// Whether `name` is a declared parameter.
    #[must_use]
    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Whether `name` is a declared resource.
    #[must_use]
    pub fn is_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Serialize to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Whether `name` names a pseudo-parameter such as `AWS::Region`.
#[must_use]
pub fn is_pseudo_parameter(name: &str) -> bool {
    name.starts_with(PSEUDO_PARAMETER_PREFIX)
}
