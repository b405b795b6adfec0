//! Error handling for stackwright
//!
//! This module provides the error taxonomy of the reconciliation engine and
//! user-friendly error reporting for the command-line shell.
//!
//! # Error Categories
//!
//! - **Structural**: [`StackError::CircularDependency`], [`StackError::MissingReference`],
//!   [`StackError::TemplateParse`]. Fatal, raised before any resource operation.
//! - **Validation**: [`StackError::ParameterValidation`], [`StackError::RuleAssertion`].
//!   Fatal, pre-flight.
//! - **Resolution**: [`StackError::Resolution`] wraps a [`ResolveError`] raised while
//!   evaluating one resource's properties. Terminal for that resource only.
//! - **Provider**: [`StackError::ProviderFailed`] once the retry budget is spent,
//!   [`StackError::ProviderNotFound`] when no handler exists (never retried).
//! - **Aggregate**: [`StackError::UpdateFailed`] / [`StackError::DeleteFailed`] list every
//!   logical id that failed during a run.
//!
//! Unresolved dependencies are not errors; they are reported through
//! [`crate::resolver::Resolution`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use stackwright::core::{StackError, user_friendly_error};
//!
//! let error = StackError::CircularDependency {
//!     logical_ids: vec!["Queue".to_string(), "Topic".to_string()],
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::provider::OperationKind;
use crate::resolver::ResolveError;

/// A single logical id that failed during a run, with the reason.
#[derive(Debug, Clone)]
pub struct ResourceFailure {
    /// Logical id of the failed resource (or `Outputs.<name>` for outputs).
    pub logical_id: String,
    /// Why it failed.
    pub error: Arc<StackError>,
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.logical_id, self.error)
    }
}

fn format_failures(failures: &[ResourceFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// The main error type for stackwright operations.
///
/// Every variant is `Clone` so that the outcome of a memoized reconciliation
/// task can be observed by any number of dependents.
#[derive(Error, Debug, Clone)]
pub enum StackError {
    /// The template's reference graph contains one or more cycles.
    ///
    /// `logical_ids` lists every resource that participates in a cycle, not just
    /// the first one found.
    #[error("Circular dependency detected between resources: {}", logical_ids.join(", "))]
    CircularDependency {
        /// All logical ids that are part of a cycle, sorted.
        logical_ids: Vec<String>,
    },

    /// A resource references a name that is not a resource, parameter or pseudo-parameter.
    #[error("Resource '{logical_id}' references undeclared name '{reference}'")]
    MissingReference {
        /// The resource holding the reference
        logical_id: String,
        /// The name that could not be found
        reference: String,
        /// Closest declared name, if any is similar enough
        suggestion: Option<String>,
    },

    /// The template document is malformed.
    #[error("Invalid template: {reason}")]
    TemplateParse {
        /// What was wrong with the document
        reason: String,
    },

    /// A parameter value violates its declared type or constraints.
    #[error("Parameter '{parameter}' is invalid: {reason}")]
    ParameterValidation {
        /// Name of the offending parameter
        parameter: String,
        /// Which constraint was violated
        reason: String,
    },

    /// A template rule assertion evaluated to false.
    #[error("Rule '{rule}' failed: {description}")]
    RuleAssertion {
        /// Name of the rule
        rule: String,
        /// The assertion description, or a generated one
        description: String,
    },

    /// Evaluating an expression for this logical id failed terminally.
    #[error("Failed to resolve '{logical_id}': {source}")]
    Resolution {
        /// Logical id (or `Outputs.<name>`, `Rules.<name>`) being evaluated
        logical_id: String,
        /// The evaluation failure
        source: ResolveError,
    },

    /// A dependency of this resource failed, so no operation was attempted.
    #[error("Resource '{logical_id}' was not attempted because dependency '{dependency}' failed")]
    DependencyFailed {
        /// The resource that was aborted
        logical_id: String,
        /// The dependency that failed
        dependency: String,
    },

    /// A resource could not be deleted because a resource depending on it was not deleted.
    #[error("Resource '{logical_id}' was not deleted because dependent '{dependent}' could not be deleted")]
    DependentNotDeleted {
        /// The resource whose deletion was aborted
        logical_id: String,
        /// The dependent whose deletion failed
        dependent: String,
    },

    /// No handler exists for a resource type and no default handler is configured.
    #[error(
        "No resource provider registered for type '{resource_type}' and no default provider is configured"
    )]
    ProviderNotFound {
        /// The resource type that has no handler
        resource_type: String,
    },

    /// A provider create/update/delete call failed after exhausting its retry budget.
    #[error("{operation} of '{logical_id}' failed after {attempts} attempt(s): {cause:#}")]
    ProviderFailed {
        /// The logical id being operated on
        logical_id: String,
        /// Which provider operation failed
        operation: OperationKind,
        /// How many attempts were made
        attempts: u32,
        /// The last error reported by the provider
        cause: Arc<anyhow::Error>,
    },

    /// The resource declares a deletion policy the engine cannot honour.
    #[error("Resource '{logical_id}' uses DeletionPolicy '{policy}', which is not supported")]
    UnsupportedDeletionPolicy {
        /// The logical id being deleted
        logical_id: String,
        /// The declared policy
        policy: String,
    },

    /// Engine configuration could not be loaded or is invalid.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// One or more resources failed during `update_stack`.
    #[error("Stack update failed for {} resource(s): {}", failures.len(), format_failures(failures))]
    UpdateFailed {
        /// Every failure of the run
        failures: Vec<ResourceFailure>,
    },

    /// One or more resources failed during `delete_stack`.
    #[error("Stack deletion failed for {} resource(s): {}", failures.len(), format_failures(failures))]
    DeleteFailed {
        /// Every failure of the run
        failures: Vec<ResourceFailure>,
    },
}

impl StackError {
    /// Whether this error was raised before any resource operation was attempted.
    #[must_use]
    pub const fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. }
                | Self::MissingReference { .. }
                | Self::TemplateParse { .. }
                | Self::ParameterValidation { .. }
                | Self::RuleAssertion { .. }
                | Self::ConfigError { .. }
        )
    }

    /// The per-resource failures of an aggregate error, empty for other variants.
    #[must_use]
    pub fn failures(&self) -> &[ResourceFailure] {
        match self {
            Self::UpdateFailed { failures } | Self::DeleteFailed { failures } => failures,
            _ => &[],
        }
    }

    /// Look up the failure recorded for a logical id in an aggregate error.
    #[must_use]
    pub fn failure_for(&self, logical_id: &str) -> Option<&StackError> {
        self.failures().iter().find(|f| f.logical_id == logical_id).map(|f| f.error.as_ref())
    }
}

/// Error wrapper that adds user-facing details and suggestions.
///
/// Details are shown in yellow, suggestions in green, the error itself in red.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: StackError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no details or suggestion.
    #[must_use]
    pub const fn new(error: StackError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.error.to_string().red());

        for failure in self.error.failures() {
            eprintln!("  {} {}", "-".red(), failure);
        }

        if let Some(details) = &self.details {
            eprintln!("{} {}", "details:".yellow(), details.yellow());
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{} {}", "suggestion:".green(), suggestion.green());
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

fn create_error_context(error: StackError) -> ErrorContext {
    match &error {
        StackError::CircularDependency { .. } => {
            let ctx = ErrorContext::new(error);
            ctx.with_suggestion("Break the cycle by removing a Ref/Fn::GetAtt/DependsOn between the listed resources")
                .with_details("Resources are created in dependency order, which is impossible when they reference each other")
        }
        StackError::MissingReference { suggestion, .. } => {
            let hint = suggestion.as_ref().map(|s| format!("Did you mean '{s}'?"));
            let ctx = ErrorContext::new(error);
            match hint {
                Some(hint) => ctx.with_suggestion(hint),
                None => ctx.with_suggestion(
                    "Declare the referenced name under Resources or Parameters",
                ),
            }
        }
        StackError::ParameterValidation { .. } => ErrorContext::new(error)
            .with_suggestion("Pass a value that satisfies the parameter's Type, AllowedValues and AllowedPattern")
            .with_details("Parameters are validated before any resource is touched"),
        StackError::RuleAssertion { .. } => ErrorContext::new(error)
            .with_suggestion("Adjust the parameter values so that every rule assertion holds"),
        StackError::ProviderNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Register a provider for this resource type or configure a default provider")
            .with_details("Missing providers are configuration errors and are never retried"),
        StackError::UnsupportedDeletionPolicy { .. } => ErrorContext::new(error)
            .with_suggestion("Use DeletionPolicy 'Delete' or 'Retain'"),
        StackError::UpdateFailed { .. } => ErrorContext::new(error)
            .with_details("Resources that succeeded were recorded in the stack state; rerun to retry the failed ones"),
        StackError::DeleteFailed { .. } => ErrorContext::new(error)
            .with_details("Resources that were not deleted remain in the stack state"),
        _ => ErrorContext::new(error),
    }
}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// [`StackError`]s get tailored suggestions; template and configuration parse
/// failures are mapped to [`StackError::TemplateParse`] / [`StackError::ConfigError`].
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(stack_error) = error.downcast_ref::<StackError>() {
        return create_error_context(stack_error.clone());
    }

    if let Some(json_error) = error.downcast_ref::<serde_json::Error>() {
        return ErrorContext::new(StackError::TemplateParse {
            reason: json_error.to_string(),
        })
        .with_suggestion("Check the JSON syntax of the template or state file");
    }

    if let Some(yaml_error) = error.downcast_ref::<serde_yaml::Error>() {
        return ErrorContext::new(StackError::TemplateParse {
            reason: yaml_error.to_string(),
        })
        .with_suggestion("Check the YAML syntax and indentation of the template");
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(StackError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of the configuration file");
    }

    ErrorContext::new(StackError::ConfigError {
        message: format!("{error:#}"),
    })
}
