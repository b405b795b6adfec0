//! Resource providers and the registry that dispatches to them by type name.
//!
//! A provider performs create/update/delete for one or more resource types
//! and declares which operation kinds may be retried. The registry constructs
//! providers lazily from registered factories, caches one instance per type
//! name for its lifetime, and falls back to a single default factory when no
//! type-specific one exists.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stackwright::provider::{InMemoryProvider, ProviderRegistry, ResourceProvider};
//!
//! let registry = ProviderRegistry::new()
//!     .with_provider("Test::Queue", Arc::new(InMemoryProvider::new()))
//!     .with_default(|_| Arc::new(InMemoryProvider::new()) as Arc<dyn ResourceProvider>);
//!
//! assert!(registry.get("Test::Queue").is_ok());
//! assert!(registry.get("Anything::Else").is_ok());
//! ```

pub mod memory;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::StackError;
use crate::state::PhysicalResource;

pub use memory::InMemoryProvider;

/// The provider operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Create a new physical resource
    Create,
    /// Update an existing physical resource in place
    Update,
    /// Delete a physical resource
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Which operations a provider allows the engine to retry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// A single attempt for every operation
    #[default]
    Never,
    /// Every operation may be retried
    Always,
    /// Only the listed operation kinds may be retried
    Only(Vec<OperationKind>),
}

impl RetryPolicy {
    /// Whether failures of this operation kind may be retried.
    #[must_use]
    pub fn can_retry(&self, kind: OperationKind) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Only(kinds) => kinds.contains(&kind),
        }
    }
}

/// A request to create a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    /// Template-scoped name
    pub logical_id: String,
    /// Resource type name
    pub resource_type: String,
    /// Fully resolved properties
    pub properties: Value,
}

/// A request to update a resource in place.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Template-scoped name
    pub logical_id: String,
    /// Resource type name
    pub resource_type: String,
    /// Fully resolved desired properties
    pub properties: Value,
    /// The resource as recorded in the previous state
    pub previous: PhysicalResource,
}

/// A request to delete a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    /// Template-scoped name
    pub logical_id: String,
    /// Resource type name
    pub resource_type: String,
    /// The resource as recorded in the previous state
    pub previous: PhysicalResource,
}

/// Result of a successful create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutcome {
    /// The materialized resource
    pub resource: PhysicalResource,
    /// Minimum wait before the run may be considered complete
    pub padding: Option<Duration>,
}

impl ProviderOutcome {
    /// An outcome without padding.
    #[must_use]
    pub const fn new(resource: PhysicalResource) -> Self {
        Self {
            resource,
            padding: None,
        }
    }

    /// Attach a padding duration.
    #[must_use]
    pub const fn with_padding(mut self, padding: Duration) -> Self {
        self.padding = Some(padding);
        self
    }
}

/// Result of a successful delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Minimum wait before the run may be considered complete
    pub padding: Option<Duration>,
}

/// Performs operations for resource types.
///
/// Implementations must tolerate concurrent calls for distinct logical ids.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Create a resource from resolved properties.
    async fn create(&self, request: &CreateRequest) -> anyhow::Result<ProviderOutcome>;

    /// Update an existing resource in place.
    async fn update(&self, request: &UpdateRequest) -> anyhow::Result<ProviderOutcome>;

    /// Delete an existing resource.
    async fn delete(&self, request: &DeleteRequest) -> anyhow::Result<DeleteOutcome>;

    /// Which operations may be retried.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::Never
    }

    /// The attribute `Ref` projects for this provider's resources. `None`
    /// means `Ref` yields the physical id.
    fn ref_attribute(&self, _resource_type: &str) -> Option<String> {
        None
    }
}

/// Builds a provider for a resource type name.
pub type ProviderFactory = Arc<dyn Fn(&str) -> Arc<dyn ResourceProvider> + Send + Sync>;

/// Type-name keyed provider lookup with lazy construction and a fallback.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    default_factory: Option<ProviderFactory>,
    cache: DashMap<String, Arc<dyn ResourceProvider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("ProviderRegistry")
            .field("types", &types)
            .field("has_default", &self.default_factory.is_some())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl ProviderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for one resource type.
    #[must_use]
    pub fn with_factory(
        mut self,
        resource_type: impl Into<String>,
        factory: impl Fn(&str) -> Arc<dyn ResourceProvider> + Send + Sync + 'static,
    ) -> Self {
        self.factories.insert(resource_type.into(), Arc::new(factory));
        self
    }

    /// Register an already-built provider for one resource type.
    #[must_use]
    pub fn with_provider(
        self,
        resource_type: impl Into<String>,
        provider: Arc<dyn ResourceProvider>,
    ) -> Self {
        self.with_factory(resource_type, move |_| Arc::clone(&provider))
    }

    /// Register the fallback factory used for unregistered types.
    #[must_use]
    pub fn with_default(
        mut self,
        factory: impl Fn(&str) -> Arc<dyn ResourceProvider> + Send + Sync + 'static,
    ) -> Self {
        self.default_factory = Some(Arc::new(factory));
        self
    }

    /// Whether a type-specific or default handler exists for the type.
    #[must_use]
    pub fn handles(&self, resource_type: &str) -> bool {
        self.factories.contains_key(resource_type) || self.default_factory.is_some()
    }

    /// The provider for a resource type, constructing it on first use.
    ///
    /// Fails with [`StackError::ProviderNotFound`] when neither a type-specific
    /// nor a default handler is registered. That failure is never retried.
    pub fn get(&self, resource_type: &str) -> Result<Arc<dyn ResourceProvider>, StackError> {
        if let Some(provider) = self.cache.get(resource_type) {
            return Ok(Arc::clone(provider.value()));
        }

        let factory = self.factories.get(resource_type).or(self.default_factory.as_ref()).ok_or_else(|| {
            StackError::ProviderNotFound {
                resource_type: resource_type.to_string(),
            }
        })?;

        let provider = match self.cache.entry(resource_type.to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                tracing::debug!("Constructing provider for {resource_type}");
                let provider = factory(resource_type);
                entry.insert(Arc::clone(&provider));
                provider
            }
        };
        Ok(provider)
    }
}
