use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use stackwright::core::StackError;
use stackwright::provider::{InMemoryProvider, OperationKind, ProviderRegistry, ResourceProvider};
use stackwright::test_utils::{RecordingProvider, TemplateFixture, init_test_logging, test_stack};

use super::{params, template};

#[tokio::test]
async fn test_fresh_stack_is_created_and_rerun_is_a_no_op() {
    init_test_logging(None);
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));
    let fixture = TemplateFixture::basic().template().unwrap();

    let state = stack.update_stack(fixture.clone(), &params(&[])).await.unwrap();
    assert_eq!(provider.logical_ids(OperationKind::Create), vec!["Topic", "Queue"]);
    assert!(state.resource("Alarm").is_none());

    let topic = state.resource("Topic").unwrap();
    assert_eq!(topic.input_properties, json!({"Name": "test-topic"}));
    assert!(topic.properties_hash.as_deref().is_some_and(|h| h.starts_with("sha256:")));
    let queue = state.resource("Queue").unwrap();
    assert_eq!(queue.input_properties["TopicArn"], topic.attributes["Arn"]);
    assert_eq!(state.outputs["TopicArn"], topic.attributes["Arn"]);

    let again = stack.update_stack(fixture, &params(&[])).await.unwrap();
    assert_eq!(provider.calls().len(), 2, "second run must not call the provider");
    assert_eq!(again.resources, state.resources);
    assert_eq!(stack.state(), &again);
}

#[tokio::test]
async fn test_each_logical_id_is_reconciled_once_under_concurrency() {
    let provider = Arc::new(RecordingProvider::new().with_delay(Duration::from_millis(20)));
    let mut stack = test_stack(Arc::clone(&provider));
    let diamond = template(json!({
        "Resources": {
            "D": {"Type": "Test::Thing", "Properties": {"B": {"Ref": "B"}, "C": {"Fn::GetAtt": ["C", "Arn"]}}},
            "B": {"Type": "Test::Thing", "Properties": {"A": {"Ref": "A"}}},
            "C": {"Type": "Test::Thing", "Properties": {"A": {"Fn::GetAtt": ["A", "Arn"]}}},
            "A": {"Type": "Test::Thing"}
        }
    }));

    stack.update_stack(diamond, &params(&[])).await.unwrap();

    for id in ["A", "B", "C", "D"] {
        assert_eq!(provider.count(OperationKind::Create, id), 1, "{id} created once");
    }
    let order = provider.logical_ids(OperationKind::Create);
    assert_eq!(order.first().map(String::as_str), Some("A"));
    assert_eq!(order.last().map(String::as_str), Some("D"));
    assert_eq!(provider.max_concurrency(), 2, "B and C run side by side");
}

#[tokio::test]
async fn test_explicit_depends_on_orders_creation() {
    let provider = Arc::new(RecordingProvider::new().with_delay(Duration::from_millis(5)));
    let mut stack = test_stack(Arc::clone(&provider));
    let ordered = template(json!({
        "Resources": {
            "Second": {"Type": "Test::Thing", "DependsOn": "First"},
            "First": {"Type": "Test::Thing"}
        }
    }));

    stack.update_stack(ordered, &params(&[])).await.unwrap();
    assert_eq!(provider.logical_ids(OperationKind::Create), vec!["First", "Second"]);
}

#[tokio::test]
async fn test_changed_property_updates_only_that_resource() {
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));
    let mut desired = TemplateFixture::basic().template().unwrap();
    let before = stack.update_stack(desired.clone(), &params(&[])).await.unwrap();

    desired.resources["Topic"].properties = Some(
        stackwright::template::Expression::parse(json!({"Name": "renamed"})).unwrap(),
    );
    let after = stack.update_stack(desired, &params(&[])).await.unwrap();

    assert_eq!(provider.logical_ids(OperationKind::Update), vec!["Topic"]);
    assert_eq!(after.resource("Topic").unwrap().input_properties, json!({"Name": "renamed"}));
    assert_eq!(
        after.resource("Topic").unwrap().physical_id,
        before.resource("Topic").unwrap().physical_id
    );
    assert_eq!(after.resource("Queue"), before.resource("Queue"));
}

#[tokio::test]
async fn test_condition_switch_creates_then_removes() {
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));
    let fixture = TemplateFixture::basic().template().unwrap();

    let prod = stack.update_stack(fixture.clone(), &params(&[("Env", "prod")])).await.unwrap();
    let alarm = prod.resource("Alarm").unwrap();
    assert_eq!(alarm.input_properties["Queue"], json!(prod.resource("Queue").unwrap().physical_id));

    let dev = stack.update_stack(fixture, &params(&[("Env", "dev")])).await.unwrap();
    assert!(dev.resource("Alarm").is_none());
    assert_eq!(provider.logical_ids(OperationKind::Delete), vec!["Alarm"]);
    assert_eq!(provider.count(OperationKind::Create, "Queue"), 1);
}

#[tokio::test]
async fn test_preflight_errors_touch_nothing() {
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));

    let err = stack
        .update_stack(TemplateFixture::cyclic().template().unwrap(), &params(&[]))
        .await
        .unwrap_err();
    match err {
        StackError::CircularDependency { logical_ids } => assert_eq!(logical_ids, vec!["A", "B"]),
        other => panic!("unexpected error: {other}"),
    }

    let err = stack
        .update_stack(TemplateFixture::missing_reference().template().unwrap(), &params(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err, StackError::MissingReference { ref suggestion, .. }
        if suggestion.as_deref() == Some("Topic")));

    let err = stack
        .update_stack(TemplateFixture::with_rule().template().unwrap(), &params(&[("Size", "large")]))
        .await
        .unwrap_err();
    assert!(matches!(err, StackError::RuleAssertion { ref description, .. }
        if description == "only small stacks are supported"));

    let err = stack
        .update_stack(TemplateFixture::basic().template().unwrap(), &params(&[("Env", "qa")]))
        .await
        .unwrap_err();
    assert!(matches!(err, StackError::ParameterValidation { ref parameter, .. } if parameter == "Env"));

    assert!(provider.calls().is_empty());
    assert!(stack.state().resources.is_empty());
}

#[tokio::test]
async fn test_failure_aborts_dependents_but_not_independent_resources() {
    let provider = Arc::new(RecordingProvider::new().fail_times(OperationKind::Create, "Topic", 1));
    let mut stack = test_stack(Arc::clone(&provider));
    let desired = template(json!({
        "Resources": {
            "Topic": {"Type": "Test::Topic"},
            "Queue": {"Type": "Test::Queue", "Properties": {"Topic": {"Ref": "Topic"}}},
            "Bucket": {"Type": "Test::Bucket"}
        }
    }));

    let err = stack.update_stack(desired.clone(), &params(&[])).await.unwrap_err();
    assert!(!err.is_preflight());
    assert_eq!(err.failures().len(), 2);
    assert!(matches!(err.failure_for("Topic"),
        Some(StackError::ProviderFailed { attempts: 1, operation: OperationKind::Create, .. })));
    assert!(matches!(err.failure_for("Queue"),
        Some(StackError::DependencyFailed { dependency, .. }) if dependency == "Topic"));
    assert_eq!(provider.count(OperationKind::Create, "Queue"), 0);
    assert!(stack.state().resource("Bucket").is_some());
    assert!(stack.state().resource("Topic").is_none());

    // The scripted failure is spent; a rerun converges without recreating Bucket.
    let state = stack.update_stack(desired, &params(&[])).await.unwrap();
    assert_eq!(state.resources.len(), 3);
    assert_eq!(provider.count(OperationKind::Create, "Bucket"), 1);
    assert_eq!(provider.count(OperationKind::Create, "Topic"), 2);
}

#[tokio::test]
async fn test_missing_provider_is_reported_per_resource() {
    let provider: Arc<dyn ResourceProvider> = Arc::new(InMemoryProvider::new());
    let registry = ProviderRegistry::new().with_provider("Test::Known", provider);
    let mut stack = stackwright::engine::Stack::new(
        Arc::new(registry),
        stackwright::config::EngineConfig::for_stack("test"),
    );
    let desired = template(json!({
        "Resources": {
            "Known": {"Type": "Test::Known"},
            "Unknown": {"Type": "Test::Unknown"}
        }
    }));

    let err = stack.update_stack(desired, &params(&[])).await.unwrap_err();
    assert!(matches!(err.failure_for("Unknown"),
        Some(StackError::ProviderNotFound { resource_type }) if resource_type == "Test::Unknown"));
    assert!(stack.state().resource("Known").is_some());
}

#[tokio::test]
async fn test_ref_uses_provider_declared_attribute_and_metrics_are_kept() {
    let provider = Arc::new(RecordingProvider::wrapping(
        InMemoryProvider::new().with_ref_attribute("Arn"),
    ));
    let mut stack = test_stack(Arc::clone(&provider));
    let desired = template(json!({
        "Resources": {
            "Topic": {"Type": "Test::Topic"},
            "Queue": {"Type": "Test::Queue", "Properties": {"Topic": {"Ref": "Topic"}}}
        },
        "Outputs": {
            "QueueId": {"Value": {"Ref": "Queue"}},
            "Never": {"Value": "x", "Condition": "Off"}
        },
        "Conditions": {"Off": {"Fn::Equals": ["a", "b"]}}
    }));

    let state = stack.update_stack(desired, &params(&[])).await.unwrap();
    let topic_arn = &state.resource("Topic").unwrap().attributes["Arn"];
    assert_eq!(&state.resource("Queue").unwrap().input_properties["Topic"], topic_arn);
    assert!(state.outputs.contains_key("QueueId"));
    assert!(!state.outputs.contains_key("Never"));

    let metrics = stack.metrics();
    assert_eq!(metrics["Test::Topic"].operations, 1);
    assert_eq!(metrics["Test::Queue"].attempts, 1);
    assert_eq!(metrics["Test::Queue"].retries, 0);
}
