//! Stack reconciliation.
//!
//! A [`Stack`] holds the last known [`StackState`] and a shared
//! [`ProviderRegistry`]. [`Stack::update_stack`] drives the recorded state
//! toward a desired template:
//!
//! 1. Build the dependency graph and reject cycles or dangling references.
//! 2. Validate parameters, evaluate conditions and check rules.
//! 3. Reconcile every logical id concurrently; a resource waits only for the
//!    resources its properties or `DependsOn` actually need.
//! 4. On full success, delete orphans (resources the template dropped or
//!    whose condition turned false), dependents first.
//! 5. Evaluate outputs, wait out any provider padding and log metrics.
//!
//! Any failure is collected rather than short-circuiting, so independent
//! resources still converge. The resulting state records every resource that
//! exists afterwards, including those left behind by a failed run.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stackwright::config::EngineConfig;
//! use stackwright::engine::Stack;
//! use stackwright::provider::{InMemoryProvider, ProviderRegistry, ResourceProvider};
//! use stackwright::template::Template;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = ProviderRegistry::new().with_default(|_: &str| {
//!     Arc::new(InMemoryProvider::new()) as Arc<dyn ResourceProvider>
//! });
//! let mut stack = Stack::new(Arc::new(registry), EngineConfig::for_stack("demo"));
//! let template = Template::from_yaml_str("Resources:\n  Topic:\n    Type: Test::Topic\n")?;
//! let state = stack.update_stack(template, &Default::default()).await?;
//! assert!(state.resource("Topic").is_some());
//! # Ok(())
//! # }
//! ```

pub mod diff;
pub mod metrics;
pub mod operation;
pub mod padding;
pub mod plan;
pub mod run;
pub mod validation;

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

pub use diff::{PatchOp, diff};
pub use metrics::{MetricsCollector, RunMetrics, TypeMetrics};
pub use operation::{
    OperationDecision, ResourceOperation, compute_resource_operation,
    discover_orphaned_dependencies, properties_hash,
};
pub use padding::PaddingTracker;
pub use plan::{Plan, PlannedChange};
pub use run::{DeletionOutcome, ResourceOutcome, UpdateState};
pub use validation::{ValidatedInputs, validate_inputs};

use crate::config::EngineConfig;
use crate::core::{ResourceFailure, StackError};
use crate::graph::DependencyGraph;
use crate::provider::ProviderRegistry;
use crate::resolver::{PseudoParameters, TemplateResolver};
use crate::state::{PhysicalResource, StackState};
use crate::template::{ParameterValues, Template};

/// Source of asset existence for planning.
pub trait AssetStore: Send + Sync {
    /// Every asset the stack knows about.
    fn asset_ids(&self) -> Vec<String>;

    /// Whether an asset is already published.
    fn exists(&self, asset_id: &str) -> bool;
}

/// A deployed stack and the means to change it.
pub struct Stack {
    registry: Arc<ProviderRegistry>,
    config: EngineConfig,
    state: StackState,
    assets: Option<Arc<dyn AssetStore>>,
    metrics: RunMetrics,
}

impl Stack {
    /// A stack with no recorded resources.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            state: StackState::default(),
            assets: None,
            metrics: RunMetrics::new(),
        }
    }

    /// Start from a previously persisted state.
    #[must_use]
    pub fn with_state(mut self, state: StackState) -> Self {
        self.state = state;
        self
    }

    /// Report asset existence in plans.
    #[must_use]
    pub fn with_asset_store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.assets = Some(store);
        self
    }

    /// The current recorded state.
    #[must_use]
    pub const fn state(&self) -> &StackState {
        &self.state
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Metrics of the most recent run.
    #[must_use]
    pub const fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Drive the stack toward `template`.
    ///
    /// Pre-flight errors (graph, parameters, rules) are returned as they are
    /// and leave the state untouched. Failures during reconciliation are
    /// collected into [`StackError::UpdateFailed`]; the state then still
    /// records everything that succeeded.
    pub async fn update_stack(
        &mut self,
        template: Template,
        parameters: &ParameterValues,
    ) -> Result<StackState, StackError> {
        let pseudo = PseudoParameters::from_config(&self.config);
        DependencyGraph::from_template(&template)?;
        let inputs = validate_inputs(&template, parameters, &pseudo)?;

        let logical_ids: Vec<String> = template.resources.keys().cloned().collect();
        let excluded: Vec<String> = template
            .resources
            .iter()
            .filter(|(_, resource)| {
                !inputs.conditions.is_active(resource.condition.as_deref()).unwrap_or(true)
            })
            .map(|(logical_id, _)| logical_id.clone())
            .collect();

        tracing::info!(
            "Updating stack {} ({} resource(s))",
            self.config.stack_name,
            logical_ids.len()
        );
        let run = Arc::new(UpdateState::new(
            self.state.clone(),
            template,
            inputs,
            pseudo,
            Arc::clone(&self.registry),
            self.config.retry,
        ));

        let mut failures = run.update_all(&logical_ids).await;
        if failures.is_empty() {
            let removals = plan::deletion_order(run.previous(), run.desired(), &excluded);
            if !removals.is_empty() {
                tracing::info!("Removing {} resource(s) no longer in the stack", removals.len());
            }
            failures.extend(run.delete_all(&removals).await);
        } else {
            tracing::warn!("Update incomplete, keeping resources the template no longer declares");
        }
        run.drain().await;

        let (outputs, output_failures) = evaluate_outputs(&run);
        if failures.is_empty() {
            failures.extend(output_failures);
        }

        self.finish(&run).await;
        self.state = recorded_state(&run, outputs);

        if failures.is_empty() {
            tracing::info!("Stack {} is up to date", self.config.stack_name);
            Ok(self.state.clone())
        } else {
            tracing::error!(
                "Stack {} update failed for {} logical id(s)",
                self.config.stack_name,
                failures.len()
            );
            Err(StackError::UpdateFailed { failures })
        }
    }

    /// Delete every recorded resource, dependents first.
    ///
    /// Resources with `DeletionPolicy: Retain` are dropped from the state but
    /// left in place.
    pub async fn delete_stack(&mut self) -> Result<(), StackError> {
        let pseudo = PseudoParameters::from_config(&self.config);
        let order = plan::deletion_order(&self.state, &Template::new(), &[]);
        tracing::info!("Deleting stack {} ({} resource(s))", self.config.stack_name, order.len());

        let run = Arc::new(UpdateState::new(
            self.state.clone(),
            Template::new(),
            ValidatedInputs::default(),
            pseudo,
            Arc::clone(&self.registry),
            self.config.retry,
        ));
        let failures = run.delete_all(&order).await;
        run.drain().await;
        self.finish(&run).await;

        if failures.is_empty() {
            tracing::info!("Stack {} deleted", self.config.stack_name);
            self.state = StackState::default();
            Ok(())
        } else {
            self.state.resources.retain(|logical_id, _| run.removal(logical_id).is_none());
            Err(StackError::DeleteFailed { failures })
        }
    }

    /// Report what [`Stack::update_stack`] would do, without calling providers.
    pub fn plan_update_stack(&self, template: &Template, parameters: &ParameterValues) -> Result<Plan, StackError> {
        let pseudo = PseudoParameters::from_config(&self.config);
        let graph = DependencyGraph::from_template(template)?;
        let inputs = validate_inputs(template, parameters, &pseudo)?;
        let mut plan = plan::plan_update(&self.state, template, &graph, &inputs, &pseudo, &self.registry)?;
        if let Some(store) = &self.assets {
            plan.assets = store
                .asset_ids()
                .into_iter()
                .map(|asset_id| {
                    let exists = store.exists(&asset_id);
                    (asset_id, exists)
                })
                .collect();
        }
        Ok(plan)
    }

    async fn finish(&mut self, run: &UpdateState) {
        run.padding().wait().await;
        run.metrics().log_summary();
        self.metrics = run.metrics().snapshot();
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("stack_name", &self.config.stack_name)
            .field("resources", &self.state.resources.len())
            .field("has_asset_store", &self.assets.is_some())
            .finish_non_exhaustive()
    }
}

/// Evaluate declared outputs against the resources reconciled in `run`.
///
/// Outputs whose condition is false are omitted. Outputs that cannot be
/// resolved are reported and omitted.
fn evaluate_outputs(run: &UpdateState) -> (IndexMap<String, Value>, Vec<ResourceFailure>) {
    let inputs = run.inputs();
    let resolver = TemplateResolver::new(run.desired())
        .with_parameters(&inputs.parameters)
        .with_conditions(&inputs.conditions)
        .with_pseudo_parameters(run.pseudo())
        .with_resources(run);

    let mut outputs = IndexMap::new();
    let mut failures = Vec::new();
    for (name, output) in &run.desired().outputs {
        let result = inputs
            .conditions
            .is_active(output.condition.as_deref())
            .and_then(|active| {
                if active {
                    resolver.evaluate(&output.value)?.realize().map(Some)
                } else {
                    Ok(None)
                }
            });
        match result {
            Ok(Some(value)) => {
                outputs.insert(name.clone(), value);
            }
            Ok(None) => tracing::debug!("Output {name} omitted: condition is false"),
            Err(source) => {
                tracing::warn!("Output {name} could not be resolved: {source}");
                failures.push(ResourceFailure {
                    logical_id: format!("Outputs.{name}"),
                    error: Arc::new(StackError::Resolution {
                        logical_id: name.clone(),
                        source,
                    }),
                });
            }
        }
    }
    (outputs, failures)
}

/// The state after a run: every desired resource that exists, plus previous
/// resources that were not removed. Definitions of leftover previous resources
/// are kept in the recorded template so that a later run can still delete them.
fn recorded_state(run: &UpdateState, outputs: IndexMap<String, Value>) -> StackState {
    let previous = run.previous();
    let mut template = run.desired().clone();
    let mut resources: IndexMap<String, PhysicalResource> = IndexMap::new();

    for logical_id in template.resources.keys() {
        if let Some(resource) = run.completed(logical_id) {
            resources.insert(logical_id.clone(), resource);
        } else if run.removal(logical_id).is_none()
            && let Some(resource) = previous.resources.get(logical_id)
        {
            resources.insert(logical_id.clone(), resource.clone());
        }
    }
    for (logical_id, resource) in &previous.resources {
        if resources.contains_key(logical_id) || run.removal(logical_id).is_some() {
            continue;
        }
        resources.insert(logical_id.clone(), resource.clone());
        if let Some(definition) = previous.template.resources.get(logical_id) {
            template
                .resources
                .entry(logical_id.clone())
                .or_insert_with(|| definition.clone());
        }
    }

    StackState {
        template,
        resources,
        outputs,
    }
}
