//! A provider that records every call and can be scripted to fail.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::provider::{
    CreateRequest, DeleteOutcome, DeleteRequest, InMemoryProvider, OperationKind, ProviderOutcome,
    ResourceProvider, RetryPolicy, UpdateRequest,
};

/// One provider invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    /// The operation
    pub operation: OperationKind,
    /// The logical id it was invoked for
    pub logical_id: String,
}

/// How many more times a scripted call should fail. `None` means forever.
type Script = Option<u32>;

/// Wraps an [`InMemoryProvider`], recording calls in invocation order.
///
/// ```rust,no_run
/// use stackwright::provider::OperationKind;
/// use stackwright::test_utils::RecordingProvider;
///
/// let provider = RecordingProvider::new().fail_times(OperationKind::Create, "Queue", 2);
/// assert_eq!(provider.count(OperationKind::Create, "Queue"), 0);
/// ```
#[derive(Debug, Default)]
pub struct RecordingProvider {
    inner: InMemoryProvider,
    calls: Mutex<Vec<ProviderCall>>,
    scripts: DashMap<(OperationKind, String), Script>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingProvider {
    /// A provider that succeeds immediately and never retries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a configured in-memory provider.
    #[must_use]
    pub fn wrapping(inner: InMemoryProvider) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Sleep this long inside every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `times` calls of `operation` for `logical_id`.
    #[must_use]
    pub fn fail_times(self, operation: OperationKind, logical_id: &str, times: u32) -> Self {
        self.scripts.insert((operation, logical_id.to_string()), Some(times));
        self
    }

    /// Fail every call of `operation` for `logical_id`.
    #[must_use]
    pub fn fail_always(self, operation: OperationKind, logical_id: &str) -> Self {
        self.scripts.insert((operation, logical_id.to_string()), None);
        self
    }

    /// Every call so far, in invocation order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Logical ids of every call of `operation`, in invocation order.
    #[must_use]
    pub fn logical_ids(&self, operation: OperationKind) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .map(|call| call.logical_id)
            .collect()
    }

    /// How often `operation` was invoked for `logical_id`.
    #[must_use]
    pub fn count(&self, operation: OperationKind, logical_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.operation == operation && call.logical_id == logical_id)
            .count()
    }

    /// The largest number of calls that were running at the same time.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// The wrapped in-memory provider.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryProvider {
        &self.inner
    }

    async fn record(&self, operation: OperationKind, logical_id: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(ProviderCall {
            operation,
            logical_id: logical_id.to_string(),
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let key = (operation, logical_id.to_string());
        if let Some(mut script) = self.scripts.get_mut(&key) {
            match script.value_mut() {
                None => anyhow::bail!("scripted {operation} failure for {logical_id}"),
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    anyhow::bail!("scripted {operation} failure for {logical_id}");
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for RecordingProvider {
    async fn create(&self, request: &CreateRequest) -> anyhow::Result<ProviderOutcome> {
        self.record(OperationKind::Create, &request.logical_id).await?;
        self.inner.create(request).await
    }

    async fn update(&self, request: &UpdateRequest) -> anyhow::Result<ProviderOutcome> {
        self.record(OperationKind::Update, &request.logical_id).await?;
        self.inner.update(request).await
    }

    async fn delete(&self, request: &DeleteRequest) -> anyhow::Result<DeleteOutcome> {
        self.record(OperationKind::Delete, &request.logical_id).await?;
        self.inner.delete(request).await
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry_policy()
    }

    fn ref_attribute(&self, resource_type: &str) -> Option<String> {
        self.inner.ref_attribute(resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PhysicalResource;
    use serde_json::json;

    fn create(logical_id: &str) -> CreateRequest {
        CreateRequest {
            logical_id: logical_id.to_string(),
            resource_type: "Test::Thing".to_string(),
            properties: json!({}),
        }
    }

    #[tokio::test]
    async fn test_scripted_failures_run_out() {
        let provider = RecordingProvider::new().fail_times(OperationKind::Create, "A", 2);
        assert!(provider.create(&create("A")).await.is_err());
        assert!(provider.create(&create("A")).await.is_err());
        assert!(provider.create(&create("A")).await.is_ok());
        assert!(provider.create(&create("B")).await.is_ok());
        assert_eq!(provider.count(OperationKind::Create, "A"), 3);
        assert_eq!(provider.logical_ids(OperationKind::Create), vec!["A", "A", "A", "B"]);
    }

    #[tokio::test]
    async fn test_fail_always() {
        let provider = RecordingProvider::new().fail_always(OperationKind::Delete, "A");
        let request = DeleteRequest {
            logical_id: "A".to_string(),
            resource_type: "Test::Thing".to_string(),
            previous: PhysicalResource::new("Test::Thing"),
        };
        for _ in 0..3 {
            let err = provider.delete(&request).await.unwrap_err();
            assert!(err.to_string().contains("scripted DELETE failure for A"));
        }
    }
}
