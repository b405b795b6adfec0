//! A provider that keeps resources in memory.
//!
//! Used as the default handler for local dry runs and in tests. Every
//! resource receives a generated physical id plus `Arn` and `Id` attributes;
//! top-level scalar properties are echoed back as attributes too, so
//! `Fn::GetAtt` against them works.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use super::{
    CreateRequest, DeleteOutcome, DeleteRequest, ProviderOutcome, ResourceProvider, RetryPolicy,
    UpdateRequest,
};
use crate::state::PhysicalResource;

/// In-memory resource store keyed by physical id.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    resources: DashMap<String, PhysicalResource>,
    padding: Option<Duration>,
    retry_policy: RetryPolicy,
    ref_attribute: Option<String>,
}

impl InMemoryProvider {
    /// A provider with no padding and no retries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this padding after every operation.
    #[must_use]
    pub const fn with_padding(mut self, padding: Duration) -> Self {
        self.padding = Some(padding);
        self
    }

    /// Declare a retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Make `Ref` project this attribute instead of the physical id.
    #[must_use]
    pub fn with_ref_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.ref_attribute = Some(attribute.into());
        self
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether no resources are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The live resource with this physical id.
    #[must_use]
    pub fn get(&self, physical_id: &str) -> Option<PhysicalResource> {
        self.resources.get(physical_id).map(|r| r.value().clone())
    }

    fn materialize(
        &self,
        physical_id: String,
        resource_type: &str,
        properties: &Value,
    ) -> PhysicalResource {
        let mut resource = PhysicalResource::new(resource_type)
            .with_physical_id(physical_id.clone())
            .with_attribute("Id", physical_id.clone())
            .with_attribute(
                "Arn",
                format!("arn:stackwright:{}:{physical_id}", resource_type.to_lowercase().replace("::", ":")),
            );
        if let Value::Object(map) = properties {
            for (key, value) in map {
                if !value.is_object() && !value.is_array() && !resource.attributes.contains_key(key) {
                    resource.attributes.insert(key.clone(), value.clone());
                }
            }
        }
        resource.input_properties = properties.clone();
        self.resources.insert(physical_id, resource.clone());
        resource
    }

    fn outcome(&self, resource: PhysicalResource) -> ProviderOutcome {
        let outcome = ProviderOutcome::new(resource);
        match self.padding {
            Some(padding) => outcome.with_padding(padding),
            None => outcome,
        }
    }
}

#[async_trait]
impl ResourceProvider for InMemoryProvider {
    async fn create(&self, request: &CreateRequest) -> anyhow::Result<ProviderOutcome> {
        let physical_id = format!("{}-{}", request.logical_id.to_lowercase(), Uuid::new_v4().simple());
        let resource = self.materialize(physical_id, &request.resource_type, &request.properties);
        Ok(self.outcome(resource))
    }

    async fn update(&self, request: &UpdateRequest) -> anyhow::Result<ProviderOutcome> {
        let physical_id = request.previous.physical_id.clone().ok_or_else(|| {
            anyhow::anyhow!("resource '{}' has no physical id to update", request.logical_id)
        })?;
        let resource = self.materialize(physical_id, &request.resource_type, &request.properties);
        Ok(self.outcome(resource))
    }

    async fn delete(&self, request: &DeleteRequest) -> anyhow::Result<DeleteOutcome> {
        if let Some(physical_id) = &request.previous.physical_id {
            self.resources.remove(physical_id);
        }
        Ok(DeleteOutcome {
            padding: self.padding,
        })
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone()
    }

    fn ref_attribute(&self, _resource_type: &str) -> Option<String> {
        self.ref_attribute.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_update_delete() {
        let provider = InMemoryProvider::new().with_padding(Duration::from_secs(3));
        let created = provider
            .create(&CreateRequest {
                logical_id: "Queue".to_string(),
                resource_type: "Test::Queue".to_string(),
                properties: json!({"Name": "orders", "Tags": ["a"]}),
            })
            .await
            .unwrap();
        assert_eq!(created.padding, Some(Duration::from_secs(3)));
        let resource = created.resource;
        let physical_id = resource.physical_id.clone().unwrap();
        assert!(physical_id.starts_with("queue-"));
        assert_eq!(resource.attribute("Name"), Some(&json!("orders")));
        assert!(resource.attribute("Tags").is_none());
        assert!(resource.attribute("Arn").unwrap().as_str().unwrap().starts_with("arn:stackwright:test:queue:"));
        assert_eq!(provider.len(), 1);

        let updated = provider
            .update(&UpdateRequest {
                logical_id: "Queue".to_string(),
                resource_type: "Test::Queue".to_string(),
                properties: json!({"Name": "orders-v2"}),
                previous: resource.clone(),
            })
            .await
            .unwrap()
            .resource;
        assert_eq!(updated.physical_id, resource.physical_id);
        assert_eq!(provider.get(&physical_id).unwrap().input_properties, json!({"Name": "orders-v2"}));

        provider
            .delete(&DeleteRequest {
                logical_id: "Queue".to_string(),
                resource_type: "Test::Queue".to_string(),
                previous: updated,
            })
            .await
            .unwrap();
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_update_without_physical_id_fails() {
        let provider = InMemoryProvider::new();
        let err = provider
            .update(&UpdateRequest {
                logical_id: "Queue".to_string(),
                resource_type: "Test::Queue".to_string(),
                properties: json!({}),
                previous: PhysicalResource::new("Test::Queue"),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no physical id"));
    }
}
