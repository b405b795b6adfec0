use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use stackwright::config::{EngineConfig, RetryConfig};
use stackwright::core::StackError;
use stackwright::engine::Stack;
use stackwright::provider::{InMemoryProvider, OperationKind, RetryPolicy};
use stackwright::test_utils::{RecordingProvider, registry_with};

use super::{params, template};

fn stack(provider: &Arc<RecordingProvider>, retry: RetryConfig) -> Stack {
    let mut config = EngineConfig::for_stack("test");
    config.retry = retry;
    Stack::new(registry_with(Arc::clone(provider)), config)
}

fn retrying(policy: RetryPolicy) -> RecordingProvider {
    RecordingProvider::wrapping(InMemoryProvider::new().with_retry_policy(policy))
}

fn single_topic() -> stackwright::template::Template {
    template(json!({"Resources": {"Topic": {"Type": "Test::Topic"}}}))
}

#[tokio::test(start_paused = true)]
async fn test_retries_back_off_by_doubling() {
    let provider = Arc::new(retrying(RetryPolicy::Always).fail_times(OperationKind::Create, "Topic", 2));
    let mut stack = stack(&provider, RetryConfig::default());

    let start = Instant::now();
    stack.update_stack(single_topic(), &params(&[])).await.unwrap();
    let elapsed = start.elapsed();

    // 1s then 2s
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
    assert_eq!(provider.count(OperationKind::Create, "Topic"), 3);

    let metrics = stack.metrics()["Test::Topic"];
    assert_eq!(metrics.operations, 1);
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.retries, 2);
    assert_eq!(metrics.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_is_bounded() {
    let provider = Arc::new(retrying(RetryPolicy::Always).fail_always(OperationKind::Create, "Topic"));
    let retry = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 100,
        max_delay_ms: 150,
    };
    let mut stack = stack(&provider, retry);

    let start = Instant::now();
    let err = stack.update_stack(single_topic(), &params(&[])).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err.failure_for("Topic"), Some(StackError::ProviderFailed { attempts: 3, .. })));
    assert_eq!(provider.count(OperationKind::Create, "Topic"), 3);
    // 100ms then the 150ms cap
    assert!(elapsed >= Duration::from_millis(250), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
    assert_eq!(stack.metrics()["Test::Topic"].failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_policy_limits_retries_to_listed_operations() {
    let provider = Arc::new(
        retrying(RetryPolicy::Only(vec![OperationKind::Update]))
            .fail_times(OperationKind::Create, "Topic", 1),
    );
    let mut stack = stack(&provider, RetryConfig::default());

    let err = stack.update_stack(single_topic(), &params(&[])).await.unwrap_err();
    assert!(matches!(err.failure_for("Topic"), Some(StackError::ProviderFailed { attempts: 1, .. })));
    assert_eq!(provider.count(OperationKind::Create, "Topic"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_padding_is_a_floor_not_a_sum() {
    let provider = Arc::new(RecordingProvider::wrapping(
        InMemoryProvider::new().with_padding(Duration::from_secs(30)),
    ));
    let mut stack = stack(&provider, RetryConfig::immediate(1));
    let desired = template(json!({
        "Resources": {
            "A": {"Type": "Test::Thing"},
            "B": {"Type": "Test::Thing", "Properties": {"A": {"Ref": "A"}}}
        }
    }));

    let start = Instant::now();
    stack.update_stack(desired, &params(&[])).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(30), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(60), "elapsed {elapsed:?}");

    let start = Instant::now();
    stack.delete_stack().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(30));
}
