//! Pseudo-parameter values (`AWS::Region`, `AWS::StackId`, ...).

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::PseudoParameterResolver;
use crate::config::{EngineConfig, PseudoParameterConfig};

/// The sentinel reference that removes the enclosing property.
pub const NO_VALUE: &str = "AWS::NoValue";

/// Concrete pseudo-parameter values for one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoParameters {
    /// `AWS::AccountId`
    pub account_id: String,
    /// `AWS::Region`
    pub region: String,
    /// `AWS::Partition`
    pub partition: String,
    /// `AWS::URLSuffix`
    pub url_suffix: String,
    /// `AWS::StackName`
    pub stack_name: String,
    /// `AWS::StackId`
    pub stack_id: String,
    /// `AWS::NotificationARNs`
    pub notification_arns: Vec<String>,
}

impl PseudoParameters {
    /// Build the values for a stack from the engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.stack_name, &config.pseudo)
    }

    /// Build the values for a named stack.
    #[must_use]
    pub fn new(stack_name: &str, pseudo: &PseudoParameterConfig) -> Self {
        Self {
            account_id: pseudo.account_id.clone(),
            region: pseudo.region.clone(),
            partition: pseudo.partition.clone(),
            url_suffix: pseudo.url_suffix.clone(),
            stack_name: stack_name.to_string(),
            stack_id: stack_id(pseudo, stack_name),
            notification_arns: pseudo.notification_arns.clone(),
        }
    }
}

impl Default for PseudoParameters {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// A stable stack ARN: the same stack name in the same account and region
/// always yields the same id.
fn stack_id(pseudo: &PseudoParameterConfig, stack_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pseudo.partition.as_bytes());
    hasher.update(b"/");
    hasher.update(pseudo.region.as_bytes());
    hasher.update(b"/");
    hasher.update(pseudo.account_id.as_bytes());
    hasher.update(b"/");
    hasher.update(stack_name.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    let id: Uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();

    format!(
        "arn:{}:cloudformation:{}:{}:stack/{}/{}",
        pseudo.partition, pseudo.region, pseudo.account_id, stack_name, id
    )
}

impl PseudoParameterResolver for PseudoParameters {
    fn pseudo_parameter(&self, name: &str) -> Option<Value> {
        let value = match name {
            "AWS::AccountId" => Value::String(self.account_id.clone()),
            "AWS::Region" => Value::String(self.region.clone()),
            "AWS::Partition" => Value::String(self.partition.clone()),
            "AWS::URLSuffix" => Value::String(self.url_suffix.clone()),
            "AWS::StackName" => Value::String(self.stack_name.clone()),
            "AWS::StackId" => Value::String(self.stack_id.clone()),
            "AWS::NotificationARNs" => Value::Array(
                self.notification_arns.iter().cloned().map(Value::String).collect(),
            ),
            _ => return None,
        };
        Some(value)
    }
}
