//! Core types for resource reconciliation

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Lifecycle hook of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    /// Pre-apply validation of the proposed diff.
    Diff,
    /// Create a new remote object.
    Create,
    /// Refresh state from the remote object.
    Read,
    /// Update the remote object in place.
    Update,
    /// Delete the remote object.
    Delete,
    /// Adopt an existing remote object.
    Import,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Diff => "diff",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        write!(f, "{s}")
    }
}

/// Per-hook deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
    pub diff: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
            diff: Duration::from_secs(5 * 60),
        }
    }
}

impl Timeouts {
    /// Deadline for a hook. Import runs under the read deadline.
    pub fn for_hook(&self, hook: Hook) -> Duration {
        match hook {
            Hook::Diff => self.diff,
            Hook::Create => self.create,
            Hook::Read | Hook::Import => self.read,
            Hook::Update => self.update,
            Hook::Delete => self.delete,
        }
    }
}

/// Where a resource is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Absent,
    Creating,
    CreateFailed,
    Present,
    Updating,
    UpdateFailed,
    Deleting,
}

impl LifecycleState {
    /// Whether the state is at rest.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Absent | Self::Present)
    }

    /// Move to `to`, rejecting transitions the lifecycle does not allow.
    ///
    /// Staying in the same state is always allowed.
    pub fn transition(self, to: Self) -> Result<Self> {
        use LifecycleState::{
            Absent, CreateFailed, Creating, Deleting, Present, UpdateFailed, Updating,
        };

        let allowed = self == to
            || matches!(
                (self, to),
                (Absent | CreateFailed, Creating)
                    | (Creating, Present | CreateFailed)
                    | (Present | UpdateFailed, Updating | Deleting | Absent)
                    | (Updating, Present | UpdateFailed)
                    | (UpdateFailed, Present)
                    | (Deleting, Absent | Present)
            );

        if allowed {
            log::debug!("lifecycle {self} -> {to}");
            Ok(to)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// What a plan will do to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    NoOp,
    Create,
    Update,
    Replace,
    Delete,
}

impl Action {
    /// Plan symbol, terraform style.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Persisted state of one resource: its id and attribute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Fully qualified remote id.
    pub id: String,
    /// Attribute values keyed by schema field.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl InstanceState {
    /// Create a state entry.
    pub fn new(id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was destroyed and created again
    Replaced,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Modified | Self::Replaced | Self::Removed
        )
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub replaced: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.replaced + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Replaced => self.replaced += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of resources reconciled in parallel
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_display() {
        assert_eq!(Hook::Diff.to_string(), "diff");
        assert_eq!(Hook::Delete.to_string(), "delete");
    }

    #[test]
    fn test_default_timeouts() {
        let t = Timeouts::default();
        assert_eq!(t.for_hook(Hook::Create), Duration::from_secs(1800));
        assert_eq!(t.for_hook(Hook::Read), Duration::from_secs(300));
        assert_eq!(t.for_hook(Hook::Import), Duration::from_secs(300));
        assert_eq!(t.for_hook(Hook::Diff), Duration::from_secs(300));
    }

    #[test]
    fn test_lifecycle_happy_paths() {
        let s = LifecycleState::Absent;
        let s = s.transition(LifecycleState::Creating).unwrap();
        let s = s.transition(LifecycleState::Present).unwrap();
        let s = s.transition(LifecycleState::Updating).unwrap();
        let s = s.transition(LifecycleState::UpdateFailed).unwrap();
        let s = s.transition(LifecycleState::Present).unwrap();
        let s = s.transition(LifecycleState::Deleting).unwrap();
        let s = s.transition(LifecycleState::Absent).unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn test_lifecycle_rejects_illegal_transition() {
        let err = LifecycleState::Absent
            .transition(LifecycleState::Updating)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid lifecycle transition from Absent to Updating"
        );
        assert!(
            LifecycleState::Creating
                .transition(LifecycleState::Deleting)
                .is_err()
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::Replaced);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Failed {
            error: "boom".into(),
        });
        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());
    }
}
