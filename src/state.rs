//! Physical resources and the persisted stack state.
//!
//! The engine never writes state to disk itself: callers hand a previous
//! [`StackState`] to [`crate::engine::Stack`] and receive the new one back.
//! The JSON layout is `{ template, resources: { [logicalId]: PhysicalResource }, outputs }`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::StackError;
use crate::template::Template;

/// The materialized counterpart of a logical resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalResource {
    /// Resource type name
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Opaque id assigned by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
    /// The resolved properties last applied
    #[serde(default)]
    pub input_properties: Value,
    /// Provider-exposed outputs, e.g. generated ARNs or URLs
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
    /// Content hash of the logical (unevaluated) properties last applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties_hash: Option<String>,
}

impl PhysicalResource {
    /// A physical resource with no id, properties or attributes.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            physical_id: None,
            input_properties: Value::Null,
            attributes: IndexMap::new(),
            properties_hash: None,
        }
    }

    /// Set the physical id.
    #[must_use]
    pub fn with_physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_id = Some(physical_id.into());
        self
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute, first by its exact name, then as a dotted path
    /// into nested objects (`Endpoint.Address`).
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value);
        }
        let mut parts = name.split('.');
        let first = parts.next()?;
        let mut current = self.attributes.get(first)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }
}

/// The persisted record of one deployed stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackState {
    /// The template last applied
    pub template: Template,
    /// Physical resources keyed by logical id
    #[serde(default)]
    pub resources: IndexMap<String, PhysicalResource>,
    /// Resolved output values
    #[serde(default)]
    pub outputs: IndexMap<String, Value>,
}

impl StackState {
    /// Parse a state document.
    pub fn from_json_str(text: &str) -> Result<Self, StackError> {
        serde_json::from_str(text).map_err(|e| StackError::TemplateParse {
            reason: format!("invalid stack state: {e}"),
        })
    }

    /// Render the state as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, StackError> {
        serde_json::to_string_pretty(self).map_err(|e| StackError::TemplateParse {
            reason: format!("stack state is not serializable: {e}"),
        })
    }

    /// The physical resource recorded for a logical id.
    #[must_use]
    pub fn resource(&self, logical_id: &str) -> Option<&PhysicalResource> {
        self.resources.get(logical_id)
    }
}
