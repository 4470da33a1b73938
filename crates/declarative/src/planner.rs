//! Execution planner - collects planned diffs for the executor

use crate::diff::{DiffSummary, ResourceDiff};
use crate::resource::BoxedKind;
use crate::types::{Action, Timeouts};

/// One resource's planned diff and the kind that applies it.
#[derive(Clone)]
pub struct Change {
    /// Address in the configuration, `type.name`
    pub address: String,
    pub kind: BoxedKind,
    pub diff: ResourceDiff,
    pub timeouts: Timeouts,
}

impl Change {
    /// Create a change, using the kind's default timeouts.
    pub fn new(kind: BoxedKind, diff: ResourceDiff) -> Self {
        let timeouts = kind.timeouts();
        Self {
            address: diff.address.clone(),
            kind,
            diff,
            timeouts,
        }
    }

    /// Override the kind's timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn action(&self) -> Action {
        self.diff.action()
    }

    /// Human-readable description for progress output
    pub fn description(&self) -> String {
        format!("{} {}", self.action(), self.address)
    }
}

impl std::fmt::Debug for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Change")
            .field("address", &self.address)
            .field("action", &self.action())
            .finish_non_exhaustive()
    }
}

/// The diffs of one run, in configuration order
#[derive(Debug, Default, Clone)]
pub struct ExecutionPlan {
    /// Every planned resource, including those without changes
    pub changes: Vec<Change>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change to the plan
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Changes that do something when applied
    pub fn pending(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(|c| c.action() != Action::NoOp)
    }

    /// Filter plan to only include changes matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Change) -> bool,
    {
        Self {
            changes: self.changes.into_iter().filter(|c| predicate(c)).collect(),
        }
    }

    /// Filter plan to only include changes matching a target pattern
    ///
    /// Target format: "type" or "type.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.filter(|c| matches_filter(&c.address, resource_type.as_deref(), name.as_deref()))
            }
        }
    }

    /// Number of changes that do something
    pub fn total_changes(&self) -> usize {
        self.pending().count()
    }

    /// Check if plan has nothing to apply
    pub fn is_empty(&self) -> bool {
        self.pending().next().is_none()
    }

    /// Count of changes by action
    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(self.changes.iter().map(|c| &c.diff))
    }
}

/// Parse a target string like "type.name" into (type, name)
pub fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = target.split('.').collect();
    match parts.len() {
        1 => (Some(parts[0].to_string()), None),
        2 => (Some(parts[0].to_string()), Some(parts[1].to_string())),
        _ => (None, Some(target.to_string())),
    }
}

/// Check if an address matches the filter criteria
pub fn matches_filter(address: &str, resource_type: Option<&str>, name: Option<&str>) -> bool {
    let (addr_type, addr_name) = address.split_once('.').unwrap_or((address, ""));

    if let Some(rt) = resource_type
        && addr_type != rt
    {
        return false;
    }

    if let Some(n) = name
        && addr_name != n
    {
        return false;
    }

    true
}
