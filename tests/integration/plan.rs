use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

use stackwright::engine::{AssetStore, ResourceOperation};
use stackwright::provider::OperationKind;
use stackwright::test_utils::{RecordingProvider, TemplateFixture, test_stack};

use super::{params, template};

struct Assets;

impl AssetStore for Assets {
    fn asset_ids(&self) -> Vec<String> {
        vec!["lambda.zip".to_string(), "site.tar".to_string()]
    }

    fn exists(&self, asset_id: &str) -> bool {
        asset_id == "lambda.zip"
    }
}

#[tokio::test]
async fn test_plan_for_a_fresh_stack() {
    let provider = Arc::new(RecordingProvider::new());
    let stack = test_stack(Arc::clone(&provider)).with_asset_store(Arc::new(Assets));
    let fixture = TemplateFixture::basic().template().unwrap();

    let plan = stack.plan_update_stack(&fixture, &params(&[("Env", "prod")])).unwrap();

    let changes: Vec<(&str, ResourceOperation)> = plan
        .changes
        .iter()
        .map(|change| (change.logical_id.as_str(), change.operation))
        .collect();
    assert_eq!(
        changes,
        vec![
            ("Topic", ResourceOperation::Create),
            ("Queue", ResourceOperation::Create),
            ("Alarm", ResourceOperation::Create),
        ]
    );
    assert_eq!(plan.conditions.get("IsProd"), Some(&true));
    assert_eq!(plan.assets.get("lambda.zip"), Some(&true));
    assert_eq!(plan.assets.get("site.tar"), Some(&false));
    assert!(plan.deletions.is_empty());
    assert!(provider.calls().is_empty(), "planning never calls providers");
}

#[tokio::test]
async fn test_plan_after_deploy() {
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));
    let fixture = TemplateFixture::basic().template().unwrap();
    stack.update_stack(fixture.clone(), &params(&[("Env", "prod")])).await.unwrap();
    let calls = provider.calls().len();

    let unchanged = stack.plan_update_stack(&fixture, &params(&[("Env", "prod")])).unwrap();
    assert!(unchanged.is_empty(), "unexpected plan: {unchanged:?}");

    let switched = stack.plan_update_stack(&fixture, &params(&[("Env", "dev")])).unwrap();
    assert!(switched.changes.is_empty());
    assert_eq!(switched.deletions, vec!["Alarm".to_string()]);
    assert_eq!(switched.conditions.get("IsProd"), Some(&false));

    assert_eq!(provider.calls().len(), calls);
}

#[tokio::test]
async fn test_plan_lists_dependents_that_the_update_changes() {
    let provider = Arc::new(RecordingProvider::new());
    let mut stack = test_stack(Arc::clone(&provider));
    let named = |name: &str| {
        template(json!({
            "Resources": {
                "Topic": {"Type": "Test::Topic", "Properties": {"Name": name}},
                "Queue": {"Type": "Test::Queue", "Properties": {"TopicName": {"Fn::GetAtt": ["Topic", "Name"]}}}
            }
        }))
    };
    stack.update_stack(named("a"), &params(&[])).await.unwrap();

    let renamed = named("b");
    let plan = stack.plan_update_stack(&renamed, &params(&[])).unwrap();
    let planned: Vec<(&str, ResourceOperation)> = plan
        .changes
        .iter()
        .map(|change| (change.logical_id.as_str(), change.operation))
        .collect();
    assert_eq!(
        planned,
        vec![("Topic", ResourceOperation::Update), ("Queue", ResourceOperation::MaybeUpdate)]
    );

    stack.update_stack(renamed, &params(&[])).await.unwrap();
    let updated = provider.logical_ids(OperationKind::Update);
    for change in &plan.changes {
        assert!(updated.contains(&change.logical_id), "{} planned but not updated", change.logical_id);
    }
    assert_eq!(updated, vec!["Topic", "Queue"]);
}
