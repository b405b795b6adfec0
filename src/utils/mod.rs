//! Shared helpers.
//!
//! - [`backoff`] - Doubling retry schedule used for provider operations

pub mod backoff;

pub use backoff::DoublingBackoff;
