//! Stackwright - declarative infrastructure reconciliation
//!
//! Stackwright takes a *template* describing the desired resources of a stack
//! (their types, properties and references to each other) and a recorded
//! *state* of what was deployed before, and drives the world toward the
//! template through pluggable resource providers.
//!
//! # Architecture Overview
//!
//! - Templates use the CloudFormation layout: `Parameters`, `Conditions`,
//!   `Mappings`, `Rules`, `Resources` and `Outputs`, with intrinsic functions
//!   (`Ref`, `Fn::GetAtt`, `Fn::Sub`, `Fn::If`, ...) inside property values.
//! - References between resources form a dependency graph. Cycles and
//!   dangling references are rejected before anything is touched.
//! - Reconciliation runs every logical id concurrently. A resource waits only
//!   for the resources its properties actually need, and each provider
//!   operation runs at most once per logical id per run.
//! - Providers decide which failures are retryable; retries follow a doubling
//!   backoff schedule.
//! - Failures are collected per logical id and reported together. The state
//!   always records what succeeded.
//!
//! # Core Modules
//!
//! - [`template`] - Template data model, expressions and parameters
//! - [`graph`] - Dependency graph, cycle detection and leveling
//! - [`resolver`] - Two-phase expression resolution, conditions, pseudo-parameters
//! - [`provider`] - Resource provider trait, retry policy and registry
//! - [`engine`] - Stack update, delete and planning
//! - [`state`] - Persisted physical resources and stack state
//! - [`config`] - Engine configuration (`~/.stackwright/config.toml`)
//! - [`core`] - Error types and user-friendly error rendering
//! - [`utils`] - Backoff schedule
//! - [`cli`] - Command-line interface
//!
//! # Template Example
//!
//! ```yaml
//! Parameters:
//!   Env:
//!     Type: String
//!     AllowedValues: [dev, prod]
//! Conditions:
//!   IsProd: {"Fn::Equals": [{"Ref": Env}, prod]}
//! Resources:
//!   Topic:
//!     Type: Test::Topic
//!   Queue:
//!     Type: Test::Queue
//!     Condition: IsProd
//!     Properties:
//!       TopicArn: {"Fn::GetAtt": [Topic, Arn]}
//! Outputs:
//!   TopicArn:
//!     Value: {"Fn::GetAtt": [Topic, Arn]}
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod graph;
pub mod provider;
pub mod resolver;
pub mod state;
pub mod template;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
