//! Dry-run planning: what an update would do, without calling providers.
//!
//! Resources are decided in dependency order. A dependency that is planned to
//! stay untouched resolves to its previous physical resource; anything that
//! will be created or updated stays unresolved, so its dependents fall back to
//! comparing logical property hashes. A dependent whose logical properties are
//! unchanged is listed as `MAYBE_UPDATE`: whether it changes depends on values
//! only known once its dependencies are applied.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

use super::diff::PatchOp;
use super::operation::{
    ResourceOperation, compute_resource_operation, discover_orphaned_dependencies,
    properties_hash,
};
use super::validation::ValidatedInputs;
use crate::core::StackError;
use crate::graph::{DependencyGraph, level_graph};
use crate::provider::ProviderRegistry;
use crate::resolver::{PseudoParameters, ResourceLookup, ResourceResolver, TemplateResolver};
use crate::state::StackState;
use crate::template::{Expression, Template};

/// A resource the update would create or modify.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedChange {
    /// Logical id
    pub logical_id: String,
    /// Resource type
    pub resource_type: String,
    /// `CREATE`, `UPDATE` or `MAYBE_UPDATE`
    pub operation: ResourceOperation,
    /// Property differences, when they could be resolved
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patch: Vec<PatchOp>,
}

/// The outcome of planning an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    /// Whether each known asset is already uploaded
    pub assets: IndexMap<String, bool>,
    /// Evaluated condition values
    pub conditions: IndexMap<String, bool>,
    /// Creates and possible updates, dependencies first
    pub changes: Vec<PlannedChange>,
    /// Logical ids that would be deleted, dependents first
    pub deletions: Vec<String>,
}

impl Plan {
    /// Whether the update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.deletions.is_empty()
    }

    /// The planned change for a logical id.
    #[must_use]
    pub fn change(&self, logical_id: &str) -> Option<&PlannedChange> {
        self.changes.iter().find(|change| change.logical_id == logical_id)
    }
}

struct PlannedResources<'a> {
    previous: &'a StackState,
    desired: &'a Template,
    inputs: &'a ValidatedInputs,
    registry: &'a ProviderRegistry,
    unchanged: &'a HashSet<String>,
}

impl ResourceResolver for PlannedResources<'_> {
    fn lookup(&self, logical_id: &str) -> ResourceLookup {
        let excluded = self
            .desired
            .resources
            .get(logical_id)
            .and_then(|resource| resource.condition.as_deref())
            .is_some_and(|condition| self.inputs.conditions.get(condition) == Some(false));
        if excluded {
            return ResourceLookup::Excluded;
        }
        match self.previous.resources.get(logical_id) {
            Some(previous) if self.unchanged.contains(logical_id) => {
                ResourceLookup::Available(previous.clone())
            }
            _ => ResourceLookup::Pending,
        }
    }

    fn ref_attribute(&self, resource_type: &str) -> Option<String> {
        self.registry.get(resource_type).ok()?.ref_attribute(resource_type)
    }
}

/// Plan an update of `previous` toward `desired`.
///
/// `graph` must be the desired template's validated dependency graph.
pub fn plan_update(
    previous: &StackState,
    desired: &Template,
    graph: &DependencyGraph,
    inputs: &ValidatedInputs,
    pseudo: &PseudoParameters,
    registry: &ProviderRegistry,
) -> Result<Plan, StackError> {
    let mut unchanged: HashSet<String> = HashSet::new();
    let mut excluded: Vec<String> = Vec::new();
    let mut decided: IndexMap<String, PlannedChange> = IndexMap::new();
    let empty = Expression::Object(IndexMap::new());

    for logical_id in graph.topological_order()? {
        let Some(resource) = desired.resources.get(&logical_id) else {
            continue;
        };
        let to_resolution_error = |source| StackError::Resolution {
            logical_id: logical_id.clone(),
            source,
        };

        let active = inputs
            .conditions
            .is_active(resource.condition.as_deref())
            .map_err(to_resolution_error)?;
        if !active {
            excluded.push(logical_id);
            continue;
        }

        let resolution = {
            let resources = PlannedResources {
                previous,
                desired,
                inputs,
                registry,
                unchanged: &unchanged,
            };
            TemplateResolver::new(desired)
                .with_parameters(&inputs.parameters)
                .with_conditions(&inputs.conditions)
                .with_pseudo_parameters(pseudo)
                .with_resources(&resources)
                .evaluate(resource.properties.as_ref().unwrap_or(&empty))
                .map_err(to_resolution_error)?
        };
        let hash = properties_hash(resource.properties.as_ref());
        let decision =
            compute_resource_operation(previous.resources.get(&logical_id), &hash, &resolution)
                .map_err(to_resolution_error)?;

        match decision.operation {
            ResourceOperation::Skip => {
                unchanged.insert(logical_id);
            }
            operation @ (ResourceOperation::Create
            | ResourceOperation::Update
            | ResourceOperation::MaybeUpdate) => {
                if operation == ResourceOperation::MaybeUpdate {
                    tracing::debug!("{logical_id}: may update once its dependencies are applied");
                }
                decided.insert(
                    logical_id.clone(),
                    PlannedChange {
                        logical_id,
                        resource_type: resource.resource_type.clone(),
                        operation,
                        patch: decision.patch,
                    },
                );
            }
        }
    }

    let leveling = level_graph(graph, true)?;
    let changes = leveling
        .ordered()
        .into_iter()
        .filter_map(|(logical_id, _)| decided.shift_remove(logical_id))
        .collect();

    Ok(Plan {
        assets: IndexMap::new(),
        conditions: inputs.conditions.iter().map(|(name, value)| (name.to_string(), value)).collect(),
        changes,
        deletions: deletion_order(previous, desired, &excluded),
    })
}

/// Previous resources the update would remove: orphans plus resources whose
/// condition turned false. Dependents come before their dependencies.
pub fn deletion_order(previous: &StackState, desired: &Template, excluded: &[String]) -> Vec<String> {
    let mut targets: HashSet<String> =
        discover_orphaned_dependencies(&previous.resources, desired).into_iter().collect();
    targets.extend(
        excluded
            .iter()
            .filter(|logical_id| previous.resources.contains_key(*logical_id))
            .cloned(),
    );
    if targets.is_empty() {
        return Vec::new();
    }

    let order = DependencyGraph::build(&previous.template)
        .and_then(|graph| graph.topological_order())
        .unwrap_or_else(|_| previous.resources.keys().cloned().collect());
    let mut ordered: Vec<String> =
        order.into_iter().rev().filter(|logical_id| targets.remove(logical_id)).collect();
    // Recorded but absent from the previous template
    ordered.extend(previous.resources.keys().filter(|id| targets.contains(*id)).cloned());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::validation::validate_inputs;
    use crate::provider::InMemoryProvider;
    use crate::state::PhysicalResource;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new().with_default(|_: &str| {
            Arc::new(InMemoryProvider::new()) as Arc<dyn crate::provider::ResourceProvider>
        })
    }

    fn plan(previous: &StackState, desired: &Template) -> Plan {
        let pseudo = PseudoParameters::default();
        let inputs = validate_inputs(desired, &IndexMap::new(), &pseudo).unwrap();
        let graph = DependencyGraph::from_template(desired).unwrap();
        plan_update(previous, desired, &graph, &inputs, &pseudo, &registry()).unwrap()
    }

    fn recorded(template: &Template, id: &str, properties: serde_json::Value) -> PhysicalResource {
        let definition = &template.resources[id];
        let mut resource = PhysicalResource::new(definition.resource_type.clone())
            .with_physical_id(format!("{}-1", id.to_lowercase()))
            .with_attribute("Arn", format!("arn:{id}"));
        resource.input_properties = properties;
        resource.properties_hash = Some(properties_hash(definition.properties.as_ref()));
        resource
    }

    #[test]
    fn test_fresh_stack_creates_everything_in_dependency_order() {
        let desired = Template::from_value(json!({
            "Resources": {
                "Queue": {"Type": "Test::Queue", "Properties": {"Topic": {"Fn::GetAtt": ["Topic", "Arn"]}}},
                "Topic": {"Type": "Test::Topic", "Properties": {"Name": "t"}}
            }
        }))
        .unwrap();
        let plan = plan(&StackState::default(), &desired);
        let ids: Vec<&str> = plan.changes.iter().map(|c| c.logical_id.as_str()).collect();
        assert_eq!(ids, vec!["Topic", "Queue"]);
        assert!(plan.changes.iter().all(|c| c.operation == ResourceOperation::Create));
        assert!(plan.deletions.is_empty());
    }

    #[test]
    fn test_unchanged_resources_are_omitted() {
        let desired = Template::from_value(json!({
            "Resources": {
                "Topic": {"Type": "Test::Topic", "Properties": {"Name": "t"}},
                "Queue": {"Type": "Test::Queue", "Properties": {"Topic": {"Fn::GetAtt": ["Topic", "Arn"]}}}
            }
        }))
        .unwrap();
        let mut previous = StackState {
            template: desired.clone(),
            ..StackState::default()
        };
        previous.resources.insert("Topic".into(), recorded(&desired, "Topic", json!({"Name": "t"})));
        previous
            .resources
            .insert("Queue".into(), recorded(&desired, "Queue", json!({"Topic": "arn:Topic"})));

        assert!(plan(&previous, &desired).is_empty());
    }

    #[test]
    fn test_update_propagates_as_maybe_update() {
        let previous_template = Template::from_value(json!({
            "Resources": {
                "Topic": {"Type": "Test::Topic", "Properties": {"Name": "t"}},
                "Queue": {"Type": "Test::Queue", "Properties": {"Topic": {"Fn::GetAtt": ["Topic", "Arn"]}}}
            }
        }))
        .unwrap();
        let mut previous = StackState {
            template: previous_template.clone(),
            ..StackState::default()
        };
        previous
            .resources
            .insert("Topic".into(), recorded(&previous_template, "Topic", json!({"Name": "t"})));
        previous
            .resources
            .insert("Queue".into(), recorded(&previous_template, "Queue", json!({"Topic": "arn:Topic"})));

        let mut desired = previous_template;
        desired.resources["Topic"].properties = Some(Expression::parse(json!({"Name": "t2"})).unwrap());

        let plan = plan(&previous, &desired);
        let changes: Vec<(&str, ResourceOperation)> =
            plan.changes.iter().map(|c| (c.logical_id.as_str(), c.operation)).collect();
        assert_eq!(
            changes,
            vec![("Topic", ResourceOperation::Update), ("Queue", ResourceOperation::MaybeUpdate)]
        );
        assert_eq!(plan.change("Topic").unwrap().patch.len(), 1);
        assert!(plan.change("Queue").unwrap().patch.is_empty());
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_deletions_list_dependents_first() {
        let previous_template = Template::from_value(json!({
            "Resources": {
                "B": {"Type": "T"},
                "A": {"Type": "T", "Properties": {"B": {"Ref": "B"}}},
                "Keep": {"Type": "T"}
            }
        }))
        .unwrap();
        let mut previous = StackState {
            template: previous_template.clone(),
            ..StackState::default()
        };
        for id in ["B", "A", "Keep"] {
            previous.resources.insert(id.into(), recorded(&previous_template, id, json!({})));
        }
        let desired = Template::from_value(json!({"Resources": {"Keep": {"Type": "T"}}})).unwrap();
        let plan = plan(&previous, &desired);
        assert_eq!(plan.deletions, vec!["A".to_string(), "B".to_string()]);
    }
}
