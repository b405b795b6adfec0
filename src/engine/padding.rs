//! Minimum post-operation waits.
//!
//! Providers may ask for a padding duration after an operation to absorb
//! eventually-consistent side effects. The tracker keeps a single deadline:
//! the furthest one ever requested. Registrations never add up.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// The furthest padding deadline registered so far.
#[derive(Debug, Default)]
pub struct PaddingTracker {
    deadline: Mutex<Option<Instant>>,
}

impl PaddingTracker {
    /// An empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the run to last at least `padding` from now.
    pub fn register(&self, padding: Duration) {
        let candidate = Instant::now() + padding;
        let mut deadline = self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        if deadline.is_none_or(|current| candidate > current) {
            *deadline = Some(candidate);
        }
    }

    /// The current deadline, if any padding was registered.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep until the deadline, if it is still in the future.
    pub async fn wait(&self) {
        if let Some(deadline) = self.deadline() {
            if deadline > Instant::now() {
                tracing::info!(
                    "Waiting {:?} for resource padding",
                    deadline.saturating_duration_since(Instant::now())
                );
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}
