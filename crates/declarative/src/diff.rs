//! Diff computation for resources

use crate::data::{Raw, field_eq, planned_values};
use crate::mapping::lookup_in;
use crate::schema::Schema;
use crate::types::{Action, InstanceState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One changed top-level field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    /// The new value is only known after apply.
    pub computed: bool,
    pub sensitive: bool,
    pub force_new: bool,
}

/// The proposed change to one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Address in the configuration, `type.name`
    pub address: String,
    /// Type of the resource
    pub resource_type: String,
    /// Remote id, when the resource is in state
    pub id: Option<String>,
    /// Recorded attributes
    pub prior: Option<Map<String, Value>>,
    /// Attributes after apply; `None` when the resource is being destroyed
    pub planned: Option<Map<String, Value>>,
    /// Normalized raw configuration
    pub config: Option<Map<String, Value>>,
    /// Changed fields, in schema order
    pub changes: Vec<FieldChange>,
}

impl ResourceDiff {
    /// Compute the diff between recorded state and configuration.
    ///
    /// `config` must be normalized; `None` means the resource is no longer
    /// configured.
    pub fn compute(
        address: &str,
        resource_type: &str,
        schema: &Schema,
        prior: Option<&InstanceState>,
        config: Option<&Map<String, Value>>,
    ) -> Self {
        let prior_attrs = prior.map(|p| &p.attributes);
        let planned = config.map(|c| planned_values(schema, prior_attrs, c));

        let mut changes = Vec::new();
        for field in schema.fields() {
            let old = prior_attrs.and_then(|p| p.get(field.name));
            let new = planned.as_ref().and_then(|p| p.get(field.name));

            let unknown = field.computed
                && prior.is_none()
                && planned.is_some()
                && new.is_none();

            if unknown || !field_eq(field, old, new) {
                changes.push(FieldChange {
                    path: field.name.to_string(),
                    old: old.cloned(),
                    new: new.cloned(),
                    computed: unknown,
                    sensitive: field.sensitive,
                    force_new: field.force_new && prior.is_some() && planned.is_some(),
                });
            }
        }

        Self {
            address: address.to_string(),
            resource_type: resource_type.to_string(),
            id: prior.map(|p| p.id.clone()),
            prior: prior_attrs.cloned(),
            planned,
            config: config.cloned(),
            changes,
        }
    }

    /// What applying this diff does.
    pub fn action(&self) -> Action {
        match (&self.prior, &self.planned) {
            (None, None) => Action::NoOp,
            (None, Some(_)) => Action::Create,
            (Some(_), None) => Action::Delete,
            (Some(_), Some(_)) if self.requires_replace() => Action::Replace,
            (Some(_), Some(_)) if self.changes.iter().any(|c| !c.computed) => Action::Update,
            (Some(_), Some(_)) => Action::NoOp,
        }
    }

    /// The recorded state this diff starts from.
    pub fn prior_state(&self) -> Option<InstanceState> {
        let id = self.id.as_ref()?;
        Some(InstanceState::new(id, self.prior.clone().unwrap_or_default()))
    }

    /// Whether a force-new field changes.
    pub fn requires_replace(&self) -> bool {
        self.changes.iter().any(|c| c.force_new)
    }

    /// The change to a top-level field, if any.
    pub fn change(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.path == field)
    }

    /// Whether the value at `path` changes.
    pub fn has_change(&self, path: &str) -> bool {
        let old = self.prior.as_ref().and_then(|p| lookup_in(p, path));
        let new = self.planned.as_ref().and_then(|p| lookup_in(p, path));
        old != new
    }

    /// Planned value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.planned
            .as_ref()
            .and_then(|p| lookup_in(p, path))
            .filter(|v| !v.is_null())
    }

    /// Planned string at a dotted path, empty when unset.
    pub fn get_str(&self, path: &str) -> &str {
        self.get(path).and_then(Value::as_str).unwrap_or_default()
    }

    /// What the user wrote at a dotted path.
    pub fn get_raw(&self, path: &str) -> Raw<'_> {
        match self
            .config
            .as_ref()
            .and_then(|c| lookup_in(c, path))
            .filter(|v| !v.is_null())
        {
            Some(v) => Raw::Present(v),
            None => Raw::Absent,
        }
    }

    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        self.action() == Action::Create
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        self.action() == Action::Delete
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        matches!(self.action(), Action::Update | Action::Replace)
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to update in place
    pub modifications: usize,
    /// Number of resources to destroy and re-create
    pub replacements: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a ResourceDiff>) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.action() {
                Action::Create => summary.additions += 1,
                Action::Delete => summary.removals += 1,
                Action::Update => summary.modifications += 1,
                Action::Replace => summary.replacements += 1,
                Action::NoOp => {}
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications + self.replacements
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource type
pub fn group_by_type<'a>(
    diffs: impl IntoIterator<Item = &'a ResourceDiff>,
) -> BTreeMap<String, Vec<&'a ResourceDiff>> {
    let mut groups: BTreeMap<String, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups
            .entry(diff.resource_type.clone())
            .or_default()
            .push(diff);
    }
    groups
}
