//! Test utilities
//!
//! Shared helpers for unit and integration tests: a recording provider,
//! sample templates, registry builders and logging setup. Available with the
//! `test-utils` feature.

pub mod fixtures;
pub mod provider;

pub use fixtures::TemplateFixture;
pub use provider::{ProviderCall, RecordingProvider};

use std::sync::{Arc, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::{EngineConfig, RetryConfig};
use crate::engine::Stack;
use crate::provider::{ProviderRegistry, ResourceProvider};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```rust,no_run
/// use tracing::Level;
///
/// stackwright::test_utils::init_test_logging(Some(Level::DEBUG));
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// A registry where every resource type is handled by `provider`.
pub fn registry_with(provider: Arc<RecordingProvider>) -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::new().with_default(move |_: &str| {
        Arc::clone(&provider) as Arc<dyn ResourceProvider>
    }))
}

/// A stack named `test` that retries without delays.
pub fn test_stack(provider: Arc<RecordingProvider>) -> Stack {
    let mut config = EngineConfig::for_stack("test");
    config.retry = RetryConfig::immediate(3);
    Stack::new(registry_with(provider), config)
}
