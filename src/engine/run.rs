//! Per-run reconciliation context.
//!
//! [`UpdateState`] lives for exactly one `update_stack` or `delete_stack`
//! call and is shared behind an `Arc` by every task of that run. Its
//! memo tables hold one shared future per logical id. The first request for
//! an id inserts the task atomically through the map's entry API, and every
//! later request (from the top-level scheduler, from a dependent resolving
//! a reference, or from an explicit `DependsOn`) awaits that same future. A
//! provider operation therefore starts at most once per logical id per run.
//!
//! Resolving a resource's properties may discover references to resources
//! that are not materialized yet. Reconciliation then awaits those
//! resources' tasks and resolves again, so dependency order falls out of the
//! references themselves.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Instant;
use tokio_retry::RetryIf;

use super::metrics::MetricsCollector;
use super::operation::{ResourceOperation, compute_resource_operation, properties_hash};
use super::padding::PaddingTracker;
use super::validation::ValidatedInputs;
use crate::config::RetryConfig;
use crate::core::{ResourceFailure, StackError};
use crate::graph::DependencyGraph;
use crate::provider::{
    CreateRequest, DeleteRequest, OperationKind, ProviderRegistry, RetryPolicy, UpdateRequest,
};
use crate::resolver::{
    PseudoParameters, Resolution, ResourceLookup, ResourceResolver, TemplateResolver,
};
use crate::state::{PhysicalResource, StackState};
use crate::template::{DeletionPolicy, Expression, LogicalResource, Template};
use crate::utils::DoublingBackoff;

/// What happened to one logical id during an update.
#[derive(Debug, Clone)]
pub enum ResourceOutcome {
    /// The resource exists with these values after the run
    Applied {
        /// The recorded physical resource
        resource: PhysicalResource,
        /// What was done to reach it
        operation: ResourceOperation,
    },
    /// The resource's condition is false; nothing was done
    Excluded,
}

/// What happened to one logical id during a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// The provider deleted it
    Deleted,
    /// `DeletionPolicy: Retain`; left in place and dropped from the stack
    Retained,
    /// Nothing was recorded for this id
    Absent,
}

type TaskResult = Result<ResourceOutcome, Arc<StackError>>;
type SharedTask = Shared<BoxFuture<'static, TaskResult>>;
type DeleteResult = Result<DeletionOutcome, Arc<StackError>>;
type SharedDeleteTask = Shared<BoxFuture<'static, DeleteResult>>;

/// Context of one reconciliation run.
pub struct UpdateState {
    previous: StackState,
    previous_graph: DependencyGraph,
    desired: Template,
    inputs: ValidatedInputs,
    pseudo: PseudoParameters,
    registry: Arc<ProviderRegistry>,
    retry: RetryConfig,
    padding: PaddingTracker,
    metrics: MetricsCollector,
    updates: DashMap<String, SharedTask>,
    deletions: DashMap<String, SharedDeleteTask>,
    completed: DashMap<String, PhysicalResource>,
    removed: DashMap<String, DeletionOutcome>,
}

impl UpdateState {
    /// Set up a run from the previous state toward `desired`.
    pub fn new(
        previous: StackState,
        desired: Template,
        inputs: ValidatedInputs,
        pseudo: PseudoParameters,
        registry: Arc<ProviderRegistry>,
        retry: RetryConfig,
    ) -> Self {
        let previous_graph = previous_graph(&previous);
        Self {
            previous,
            previous_graph,
            desired,
            inputs,
            pseudo,
            registry,
            retry,
            padding: PaddingTracker::new(),
            metrics: MetricsCollector::new(),
            updates: DashMap::new(),
            deletions: DashMap::new(),
            completed: DashMap::new(),
            removed: DashMap::new(),
        }
    }

    /// The previous state this run started from.
    pub const fn previous(&self) -> &StackState {
        &self.previous
    }

    /// The template this run reconciles toward.
    pub const fn desired(&self) -> &Template {
        &self.desired
    }

    /// Validated parameters and conditions.
    pub const fn inputs(&self) -> &ValidatedInputs {
        &self.inputs
    }

    /// Pseudo-parameter values of the run.
    pub const fn pseudo(&self) -> &PseudoParameters {
        &self.pseudo
    }

    /// Padding deadline tracker.
    pub const fn padding(&self) -> &PaddingTracker {
        &self.padding
    }

    /// Metrics accumulated so far.
    pub const fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// The materialized resource of a logical id, if reconciled successfully.
    pub fn completed(&self, logical_id: &str) -> Option<PhysicalResource> {
        self.completed.get(logical_id).map(|r| r.value().clone())
    }

    /// The deletion outcome of a logical id, if it was removed from the stack.
    pub fn removal(&self, logical_id: &str) -> Option<DeletionOutcome> {
        self.removed.get(logical_id).map(|r| *r.value())
    }

    /// Reconcile a logical id, or join the reconciliation already under way.
    pub fn update_resource(self: &Arc<Self>, logical_id: &str) -> SharedTask {
        match self.updates.entry(logical_id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let state = Arc::clone(self);
                let id = logical_id.to_string();
                let task = async move {
                    let result = state.reconcile(&id).await;
                    if let Err(error) = &result {
                        tracing::error!("{id}: {error}");
                    }
                    result.map_err(Arc::new)
                }
                .boxed()
                .shared();
                entry.insert(task.clone());
                task
            }
        }
    }

    /// Delete a logical id recorded in the previous state, after every
    /// dependent of it within `allowed`.
    pub fn delete_resource(self: &Arc<Self>, logical_id: &str, allowed: Arc<HashSet<String>>) -> SharedDeleteTask {
        match self.deletions.entry(logical_id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let state = Arc::clone(self);
                let id = logical_id.to_string();
                let task = async move {
                    let result = state.remove(&id, allowed).await;
                    if let Err(error) = &result {
                        tracing::error!("{id}: {error}");
                    }
                    result.map_err(Arc::new)
                }
                .boxed()
                .shared();
                entry.insert(task.clone());
                task
            }
        }
    }

    /// Reconcile every listed logical id concurrently and collect failures.
    pub async fn update_all(self: &Arc<Self>, logical_ids: &[String]) -> Vec<ResourceFailure> {
        let results = join_all(logical_ids.iter().map(|id| self.update_resource(id))).await;
        collect_failures(logical_ids, results)
    }

    /// Delete every listed logical id, dependents first, and collect failures.
    pub async fn delete_all(self: &Arc<Self>, logical_ids: &[String]) -> Vec<ResourceFailure> {
        let allowed: Arc<HashSet<String>> = Arc::new(logical_ids.iter().cloned().collect());
        let results = join_all(
            logical_ids.iter().map(|id| self.delete_resource(id, Arc::clone(&allowed))),
        )
        .await;
        collect_failures(logical_ids, results)
    }

    /// Await every task that was scheduled during the run.
    pub async fn drain(&self) {
        let updates: Vec<SharedTask> = self.updates.iter().map(|e| e.value().clone()).collect();
        let deletions: Vec<SharedDeleteTask> =
            self.deletions.iter().map(|e| e.value().clone()).collect();
        join_all(updates).await;
        join_all(deletions).await;
    }

    async fn reconcile(self: Arc<Self>, logical_id: &str) -> Result<ResourceOutcome, StackError> {
        let resource = self.desired.resources.get(logical_id).ok_or_else(|| {
            StackError::TemplateParse {
                reason: format!("resource '{logical_id}' is not declared"),
            }
        })?;

        let active = self
            .inputs
            .conditions
            .is_active(resource.condition.as_deref())
            .map_err(|source| StackError::Resolution {
                logical_id: logical_id.to_string(),
                source,
            })?;
        if !active {
            tracing::debug!(
                "{logical_id}: condition {} is false, skipping",
                resource.condition.as_deref().unwrap_or_default()
            );
            return Ok(ResourceOutcome::Excluded);
        }

        self.await_dependencies(logical_id, &resource.depends_on).await?;

        let resolution = self.resolve_until_ready(logical_id, resource).await?;
        let to_resolution_error = |source| StackError::Resolution {
            logical_id: logical_id.to_string(),
            source,
        };
        let properties = resolution.realize().map_err(to_resolution_error)?;
        let hash = properties_hash(resource.properties.as_ref());
        let previous = self.previous.resources.get(logical_id);
        let decision =
            compute_resource_operation(previous, &hash, &resolution).map_err(to_resolution_error)?;

        let mut physical = match (decision.operation, previous) {
            (ResourceOperation::Skip, Some(previous)) => {
                tracing::debug!("{logical_id}: no changes");
                previous.clone()
            }
            (ResourceOperation::Create, _) | (_, None) => {
                tracing::info!("Creating {logical_id} ({})", resource.resource_type);
                self.create(logical_id, resource, properties.clone()).await?
            }
            (_, Some(previous)) => {
                tracing::info!(
                    "Updating {logical_id} ({}): {} change(s)",
                    resource.resource_type,
                    decision.patch.len()
                );
                self.update(logical_id, resource, properties.clone(), previous.clone()).await?
            }
        };

        physical.input_properties = properties;
        physical.properties_hash = Some(hash);
        self.completed.insert(logical_id.to_string(), physical.clone());
        Ok(ResourceOutcome::Applied {
            resource: physical,
            operation: decision.operation,
        })
    }

    async fn await_dependencies(self: &Arc<Self>, logical_id: &str, dependencies: &[String]) -> Result<(), StackError> {
        if dependencies.is_empty() {
            return Ok(());
        }
        let results = join_all(dependencies.iter().map(|dependency| self.update_resource(dependency))).await;
        for (dependency, result) in dependencies.iter().zip(results) {
            if result.is_err() {
                return Err(StackError::DependencyFailed {
                    logical_id: logical_id.to_string(),
                    dependency: dependency.clone(),
                });
            }
        }
        Ok(())
    }

    async fn resolve_until_ready(
        self: &Arc<Self>,
        logical_id: &str,
        resource: &LogicalResource,
    ) -> Result<Resolution, StackError> {
        let mut awaited: HashSet<String> = HashSet::new();
        loop {
            let resolution = self.resolve_properties(logical_id, resource)?;
            let pending: Vec<String> = resolution
                .unresolved_resources()
                .filter(|id| !awaited.contains(*id))
                .map(str::to_string)
                .collect();
            if pending.is_empty() {
                return Ok(resolution);
            }

            tracing::debug!("{logical_id}: waiting on {}", pending.join(", "));
            self.await_dependencies(logical_id, &pending).await?;
            awaited.extend(pending);
        }
    }

    fn resolve_properties(&self, logical_id: &str, resource: &LogicalResource) -> Result<Resolution, StackError> {
        let empty = Expression::Object(IndexMap::new());
        TemplateResolver::new(&self.desired)
            .with_parameters(&self.inputs.parameters)
            .with_conditions(&self.inputs.conditions)
            .with_pseudo_parameters(&self.pseudo)
            .with_resources(self)
            .evaluate(resource.properties.as_ref().unwrap_or(&empty))
            .map_err(|source| StackError::Resolution {
                logical_id: logical_id.to_string(),
                source,
            })
    }

    async fn create(
        &self,
        logical_id: &str,
        resource: &LogicalResource,
        properties: Value,
    ) -> Result<PhysicalResource, StackError> {
        let provider = self.registry.get(&resource.resource_type)?;
        let request = CreateRequest {
            logical_id: logical_id.to_string(),
            resource_type: resource.resource_type.clone(),
            properties,
        };
        let outcome = self
            .call_provider(logical_id, &resource.resource_type, OperationKind::Create, &provider.retry_policy(), || {
                provider.create(&request)
            })
            .await?;
        if let Some(padding) = outcome.padding {
            self.padding.register(padding);
        }
        Ok(outcome.resource)
    }

    async fn update(
        &self,
        logical_id: &str,
        resource: &LogicalResource,
        properties: Value,
        previous: PhysicalResource,
    ) -> Result<PhysicalResource, StackError> {
        let provider = self.registry.get(&resource.resource_type)?;
        let request = UpdateRequest {
            logical_id: logical_id.to_string(),
            resource_type: resource.resource_type.clone(),
            properties,
            previous,
        };
        let outcome = self
            .call_provider(logical_id, &resource.resource_type, OperationKind::Update, &provider.retry_policy(), || {
                provider.update(&request)
            })
            .await?;
        if let Some(padding) = outcome.padding {
            self.padding.register(padding);
        }
        Ok(outcome.resource)
    }

    async fn remove(self: Arc<Self>, logical_id: &str, allowed: Arc<HashSet<String>>) -> Result<DeletionOutcome, StackError> {
        let Some(previous) = self.previous.resources.get(logical_id) else {
            return Ok(DeletionOutcome::Absent);
        };
        let policy = self
            .previous
            .template
            .resources
            .get(logical_id)
            .map(|definition| definition.deletion_policy)
            .unwrap_or_default();

        match policy {
            DeletionPolicy::Retain => {
                tracing::info!("Retaining {logical_id} ({})", previous.resource_type);
                self.removed.insert(logical_id.to_string(), DeletionOutcome::Retained);
                return Ok(DeletionOutcome::Retained);
            }
            DeletionPolicy::Snapshot => {
                return Err(StackError::UnsupportedDeletionPolicy {
                    logical_id: logical_id.to_string(),
                    policy: policy.to_string(),
                });
            }
            DeletionPolicy::Delete => {}
        }

        let dependents: Vec<String> = self
            .previous_graph
            .dependents(logical_id)
            .into_iter()
            .filter(|dependent| allowed.contains(*dependent))
            .map(str::to_string)
            .collect();
        let results = join_all(
            dependents.iter().map(|dependent| self.delete_resource(dependent, Arc::clone(&allowed))),
        )
        .await;
        for (dependent, result) in dependents.iter().zip(results) {
            if result.is_err() {
                return Err(StackError::DependentNotDeleted {
                    logical_id: logical_id.to_string(),
                    dependent: dependent.clone(),
                });
            }
        }

        tracing::info!("Deleting {logical_id} ({})", previous.resource_type);
        let provider = self.registry.get(&previous.resource_type)?;
        let request = DeleteRequest {
            logical_id: logical_id.to_string(),
            resource_type: previous.resource_type.clone(),
            previous: previous.clone(),
        };
        let outcome = self
            .call_provider(logical_id, &previous.resource_type, OperationKind::Delete, &provider.retry_policy(), || {
                provider.delete(&request)
            })
            .await?;
        if let Some(padding) = outcome.padding {
            self.padding.register(padding);
        }
        self.removed.insert(logical_id.to_string(), DeletionOutcome::Deleted);
        Ok(DeletionOutcome::Deleted)
    }

    /// Invoke a provider operation under the configured retry schedule.
    async fn call_provider<T, F, Fut>(
        &self,
        logical_id: &str,
        resource_type: &str,
        operation: OperationKind,
        policy: &RetryPolicy,
        mut call: F,
    ) -> Result<T, StackError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let retryable = policy.can_retry(operation);
        let max_attempts = self.retry.max_attempts;
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result = RetryIf::start(
            DoublingBackoff::from_config(&self.retry),
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > 1 {
                    tracing::warn!("Retrying {operation} of {logical_id} (attempt {attempt}/{max_attempts})");
                }
                call()
            },
            |_: &anyhow::Error| retryable,
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        self.metrics.record(resource_type, attempts, started.elapsed(), result.is_ok());
        result.map_err(|cause| StackError::ProviderFailed {
            logical_id: logical_id.to_string(),
            operation,
            attempts,
            cause: Arc::new(cause),
        })
    }
}

impl ResourceResolver for UpdateState {
    fn lookup(&self, logical_id: &str) -> ResourceLookup {
        if let Some(resource) = self.completed.get(logical_id) {
            return ResourceLookup::Available(resource.value().clone());
        }
        let excluded = self
            .desired
            .resources
            .get(logical_id)
            .and_then(|resource| resource.condition.as_deref())
            .is_some_and(|condition| self.inputs.conditions.get(condition) == Some(false));
        if excluded {
            ResourceLookup::Excluded
        } else {
            ResourceLookup::Pending
        }
    }

    fn ref_attribute(&self, resource_type: &str) -> Option<String> {
        self.registry.get(resource_type).ok()?.ref_attribute(resource_type)
    }
}

/// The dependency graph of a previous state's template. A template that no
/// longer builds still yields its nodes, without edges.
fn previous_graph(previous: &StackState) -> DependencyGraph {
    DependencyGraph::build(&previous.template).unwrap_or_else(|error| {
        tracing::warn!("Previous template does not build a dependency graph: {error}");
        let mut graph = DependencyGraph::new();
        for logical_id in previous.resources.keys() {
            graph.add_node(logical_id);
        }
        graph
    })
}

fn collect_failures<T>(logical_ids: &[String], results: Vec<Result<T, Arc<StackError>>>) -> Vec<ResourceFailure> {
    logical_ids
        .iter()
        .zip(results)
        .filter_map(|(logical_id, result)| {
            result.err().map(|error| ResourceFailure {
                logical_id: logical_id.clone(),
                error,
            })
        })
        .collect()
}
