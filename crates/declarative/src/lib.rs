//! # Declarative
//!
//! Declarative reconciliation of Azure Resource Manager resources.
//!
//! A resource kind declares its schema and five lifecycle hooks; this crate
//! turns configuration plus recorded state into a diff, validates it, and
//! drives the hooks to converge the remote object.
//!
//! ## Core Concepts
//!
//! - **Schema**: typed fields with required/optional/computed/sensitive/force-new flags and validators
//! - **ResourceData**: prior state, raw configuration and working values of one resource
//! - **ResourceDiff**: the proposed change, checked by `customize_diff` before any remote call
//! - **ResourceKind**: the contract a resource implements (create, read, update, delete, import)
//! - **Engine**: runs the hooks with deadlines, requires-import checks and re-reads
//! - **ExecutionPlan**: planned diffs, applied in parallel by [`execute`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Change, Engine, ExecuteOptions, ExecutionPlan, execute_simple};
//!
//! let engine = Engine::new(client, "00000000-0000-0000-0000-000000000000");
//! let kind = registry.get("azurerm_quota").unwrap().clone();
//!
//! let diff = engine.plan(kind.as_ref(), "azurerm_quota.cores", None, Some(&config), &kind.timeouts())?;
//! let mut plan = ExecutionPlan::new();
//! plan.push(Change::new(kind, diff));
//!
//! let report = execute_simple(&engine, &plan, ExecuteOptions::default())?;
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod data;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod locks;
pub mod mapping;
pub mod planner;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, OperationContext, ProgressCallback,
};
pub use data::{Raw, ResourceData};
pub use diff::{DiffSummary, FieldChange, ResourceDiff, group_by_type};
pub use engine::{Engine, Outcome};
pub use error::{Error, ErrorCategory, HookError, Result, Violation};
pub use executor::{ExecuteReport, execute, execute_simple};
pub use locks::{NamedLockGuard, lock_by_name};
pub use planner::{Change, ExecutionPlan};
pub use registry::{Registry, RegistryBuilder};
pub use resource::{BoxedKind, ResourceKind};
pub use schema::{Field, FieldType, Primitive, Schema, Validator};
pub use types::{
    Action, ApplyResult, ExecuteOptions, ExecuteSummary, Hook, InstanceState, LifecycleState,
    Timeouts,
};
