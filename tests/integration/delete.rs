use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

use stackwright::core::StackError;
use stackwright::provider::OperationKind;
use stackwright::test_utils::{RecordingProvider, test_stack};

use super::{params, template};

#[tokio::test]
async fn test_orphans_are_deleted_dependents_first() {
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));
    stack
        .update_stack(
            template(json!({
                "Resources": {
                    "B": {"Type": "Test::Thing"},
                    "A": {"Type": "Test::Thing", "Properties": {"B": {"Ref": "B"}}},
                    "Keep": {"Type": "Test::Thing"}
                }
            })),
            &params(&[]),
        )
        .await
        .unwrap();

    let state = stack
        .update_stack(template(json!({"Resources": {"Keep": {"Type": "Test::Thing"}}})), &params(&[]))
        .await
        .unwrap();

    assert_eq!(provider.logical_ids(OperationKind::Delete), vec!["A", "B"]);
    assert_eq!(state.resources.keys().collect::<Vec<_>>(), vec!["Keep"]);
    assert_eq!(state.template.resources.keys().collect::<Vec<_>>(), vec!["Keep"]);
}

#[tokio::test]
async fn test_deletion_policies() {
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));
    stack
        .update_stack(
            template(json!({
                "Resources": {
                    "Kept": {"Type": "Test::Thing", "DeletionPolicy": "Retain"},
                    "Snap": {"Type": "Test::Thing", "DeletionPolicy": "Snapshot"},
                    "Plain": {"Type": "Test::Thing"}
                }
            })),
            &params(&[]),
        )
        .await
        .unwrap();

    let err = stack
        .update_stack(template(json!({"Resources": {}})), &params(&[]))
        .await
        .unwrap_err();

    assert_eq!(err.failures().len(), 1);
    assert!(matches!(err.failure_for("Snap"),
        Some(StackError::UnsupportedDeletionPolicy { policy, .. }) if policy == "Snapshot"));
    assert_eq!(provider.logical_ids(OperationKind::Delete), vec!["Plain"]);

    let state = stack.state();
    assert_eq!(state.resources.keys().collect::<Vec<_>>(), vec!["Snap"]);
    assert!(state.template.resources.contains_key("Snap"), "definition kept for a later retry");
}

#[tokio::test]
async fn test_failed_update_keeps_orphans_until_a_successful_run() {
    let provider = Arc::new(RecordingProvider::new().fail_times(OperationKind::Update, "Topic", 1));
    let mut stack = test_stack(Arc::clone(&provider));
    stack
        .update_stack(
            template(json!({
                "Resources": {
                    "Old": {"Type": "Test::Thing"},
                    "Topic": {"Type": "Test::Topic", "Properties": {"Name": "v1"}}
                }
            })),
            &params(&[]),
        )
        .await
        .unwrap();

    let desired = template(json!({
        "Resources": {"Topic": {"Type": "Test::Topic", "Properties": {"Name": "v2"}}}
    }));
    let err = stack.update_stack(desired.clone(), &params(&[])).await.unwrap_err();
    assert!(matches!(err.failure_for("Topic"), Some(StackError::ProviderFailed { .. })));
    assert_eq!(provider.count(OperationKind::Delete, "Old"), 0);
    assert!(stack.state().resource("Old").is_some());
    assert_eq!(stack.state().resource("Topic").unwrap().input_properties, json!({"Name": "v1"}));

    let state = stack.update_stack(desired, &params(&[])).await.unwrap();
    assert_eq!(provider.count(OperationKind::Delete, "Old"), 1);
    assert!(state.resource("Old").is_none());
    assert_eq!(state.resource("Topic").unwrap().input_properties, json!({"Name": "v2"}));
}

#[tokio::test]
async fn test_delete_stack_orders_by_dependents() {
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));
    stack
        .update_stack(
            template(json!({
                "Resources": {
                    "B": {"Type": "Test::Thing"},
                    "A": {"Type": "Test::Thing", "Properties": {"B": {"Fn::GetAtt": ["B", "Arn"]}}},
                    "C": {"Type": "Test::Thing", "DependsOn": ["A"]}
                }
            })),
            &params(&[]),
        )
        .await
        .unwrap();

    stack.delete_stack().await.unwrap();
    assert_eq!(provider.logical_ids(OperationKind::Delete), vec!["C", "A", "B"]);
    assert!(stack.state().resources.is_empty());
    assert!(provider.inner().is_empty());
}

#[tokio::test]
async fn test_failed_delete_keeps_dependencies() {
    let provider = Arc::new(RecordingProvider::new().fail_always(OperationKind::Delete, "A"));
    let mut stack = test_stack(Arc::clone(&provider));
    stack
        .update_stack(
            template(json!({
                "Resources": {
                    "B": {"Type": "Test::Thing"},
                    "A": {"Type": "Test::Thing", "Properties": {"B": {"Ref": "B"}}},
                    "Solo": {"Type": "Test::Thing"}
                }
            })),
            &params(&[]),
        )
        .await
        .unwrap();

    let err = stack.delete_stack().await.unwrap_err();
    assert!(matches!(err, StackError::DeleteFailed { .. }));
    assert!(matches!(err.failure_for("A"), Some(StackError::ProviderFailed { attempts: 1, .. })));
    assert!(matches!(err.failure_for("B"),
        Some(StackError::DependentNotDeleted { dependent, .. }) if dependent == "A"));
    assert_eq!(provider.count(OperationKind::Delete, "B"), 0);

    let mut remaining: Vec<&String> = stack.state().resources.keys().collect();
    remaining.sort();
    assert_eq!(remaining, vec!["A", "B"]);
}
