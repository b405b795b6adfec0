//! Core types and error handling for stackwright
//!
//! This module holds the error taxonomy shared by every other module:
//! - [`StackError`] - Enumerated error types covering every engine failure mode
//! - [`ResourceFailure`] - One logical id's failure inside an aggregate run error
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to the user-friendly format
//!
//! # Example
//!
//! ```rust
//! use stackwright::core::{StackError, user_friendly_error};
//!
//! fn example_operation() -> anyhow::Result<()> {
//!     Err(StackError::ProviderNotFound {
//!         resource_type: "Custom::Widget".to_string(),
//!     }
//!     .into())
//! }
//!
//! if let Err(e) = example_operation() {
//!     let friendly = user_friendly_error(e);
//!     assert!(friendly.suggestion.is_some());
//! }
//! ```

pub mod error;

pub use error::{ErrorContext, ResourceFailure, StackError, user_friendly_error};
