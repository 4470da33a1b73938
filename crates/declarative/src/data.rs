//! The per-reconciliation view of one resource.
//!
//! [`ResourceData`] carries three maps:
//!
//! - `prior`: the state recorded after the last successful step
//! - `planned`: what the configuration asks for (config plus defaults, with
//!   computed fields carried over from prior state)
//! - `values`: the working state the hooks write into
//!
//! plus the raw configuration, which is the only place that can tell "the
//! user left this out" from "the user wrote a zero value".

use crate::error::{Error, Result};
use crate::mapping::{is_empty_value, lookup_in};
use crate::schema::{Field, FieldType, Schema};
use crate::types::InstanceState;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A raw configuration value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Raw<'a> {
    /// The user did not write the field.
    Absent,
    /// The user wrote this value, which may be a zero value.
    Present(&'a Value),
}

impl<'a> Raw<'a> {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Self::Absent => None,
            Self::Present(v) => Some(v),
        }
    }
}

/// Values the configuration asks for.
///
/// Configured values win, then defaults; computed fields the user did not
/// set keep their prior value.
pub fn planned_values(
    schema: &Schema,
    prior: Option<&Map<String, Value>>,
    config: &Map<String, Value>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for field in schema.fields() {
        if let Some(value) = config.get(field.name).filter(|v| !v.is_null()) {
            out.insert(field.name.to_string(), value.clone());
        } else if field.computed
            && let Some(value) = prior.and_then(|p| p.get(field.name))
        {
            out.insert(field.name.to_string(), value.clone());
        }
    }
    schema.with_defaults(&out)
}

/// Drop zero values from objects, at any depth.
fn prune(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), prune(v)))
                .filter(|(_, v)| !is_empty_value(v))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(prune).collect()),
        other => other.clone(),
    }
}

/// Compare two field values, treating a missing value as the zero value
/// (inside blocks too) and sets as unordered.
pub fn field_eq(field: &Field, a: Option<&Value>, b: Option<&Value>) -> bool {
    let a = a.map(prune).filter(|v| !is_empty_value(v));
    let b = b.map(prune).filter(|v| !is_empty_value(v));
    match (a.as_ref(), b.as_ref()) {
        (None, None) => true,
        (Some(a), Some(b)) => match (&field.ty, a, b) {
            (FieldType::Set(_), Value::Array(x), Value::Array(y)) => {
                let mut x: Vec<String> = x.iter().map(Value::to_string).collect();
                let mut y: Vec<String> = y.iter().map(Value::to_string).collect();
                x.sort();
                y.sort();
                x == y
            }
            _ => a == b,
        },
        _ => false,
    }
}

/// Prior state, raw configuration and working values of one resource.
#[derive(Debug, Clone)]
pub struct ResourceData {
    schema: &'static Schema,
    id: Option<String>,
    prior: Map<String, Value>,
    config: Option<Map<String, Value>>,
    planned: Map<String, Value>,
    values: Map<String, Value>,
    gone: bool,
}

impl ResourceData {
    /// Data for a create or update: `config` must already be normalized.
    pub fn new(
        schema: &'static Schema,
        prior: Option<&InstanceState>,
        config: Map<String, Value>,
    ) -> Self {
        let prior_attrs = prior.map(|p| p.attributes.clone()).unwrap_or_default();
        let planned = planned_values(schema, prior.map(|p| &p.attributes), &config);
        Self {
            schema,
            id: prior.map(|p| p.id.clone()),
            prior: prior_attrs,
            config: Some(config),
            values: planned.clone(),
            planned,
            gone: false,
        }
    }

    /// Data for a read or delete of a recorded resource.
    pub fn from_state(schema: &'static Schema, state: &InstanceState) -> Self {
        Self {
            schema,
            id: Some(state.id.clone()),
            prior: state.attributes.clone(),
            config: None,
            planned: state.attributes.clone(),
            values: state.attributes.clone(),
            gone: false,
        }
    }

    /// Data for an import: only the id is known.
    pub fn for_import(schema: &'static Schema, id: impl Into<String>) -> Self {
        Self {
            schema,
            id: Some(id.into()),
            prior: Map::new(),
            config: None,
            planned: Map::new(),
            values: Map::new(),
            gone: false,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The id, or an error naming the missing id.
    pub fn require_id(&self) -> Result<&str> {
        self.id()
            .ok_or_else(|| Error::decode("resource data", "no id recorded"))
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Record that the remote object is gone. The resource leaves state.
    pub fn mark_gone(&mut self) {
        log::info!("{} no longer exists remotely", self.id().unwrap_or("resource"));
        self.gone = true;
        self.id = None;
    }

    pub fn is_gone(&self) -> bool {
        self.gone
    }

    /// Working value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_in(&self.values, path).filter(|v| !v.is_null())
    }

    /// Working string at a dotted path, empty when unset.
    pub fn get_str(&self, path: &str) -> &str {
        self.get(path).and_then(Value::as_str).unwrap_or_default()
    }

    /// Working value, only when it is not the zero value of its type.
    pub fn get_ok(&self, path: &str) -> Option<&Value> {
        self.get(path).filter(|v| !is_empty_value(v))
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

    /// Whether a raw configuration is available (create/update only).
    pub fn has_config(&self) -> bool {
        self.config.is_some()
    }

    /// Prior and planned value of a top-level field or a nested path.
    pub fn get_change(&self, path: &str) -> (Option<&Value>, Option<&Value>) {
        (lookup_in(&self.prior, path), lookup_in(&self.planned, path))
    }

    /// Whether the plan changes the value at `path`.
    pub fn has_change(&self, path: &str) -> bool {
        let (old, new) = self.get_change(path);
        match self.schema.lookup(path) {
            Some(field) if !path.contains('.') => !field_eq(field, old, new),
            _ => {
                let old = old.filter(|v| !is_empty_value(v));
                let new = new.filter(|v| !is_empty_value(v));
                old != new
            }
        }
    }

    /// Whether any of `paths` changes.
    pub fn has_changes(&self, paths: &[&str]) -> bool {
        paths.iter().any(|p| self.has_change(p))
    }

    /// Set a top-level working value.
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::decode(key, e))?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Decode the working values into a typed model.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.values.clone()))
            .map_err(|e| Error::decode(std::any::type_name::<T>(), e))
    }

    /// Write a flattened model into the working values.
    ///
    /// Only schema fields are written. Sensitive fields, at any depth, keep
    /// their current working value: the remote view of a secret is never
    /// authoritative.
    pub fn encode<T: Serialize>(&mut self, model: &T) -> Result<()> {
        let Value::Object(map) =
            serde_json::to_value(model).map_err(|e| Error::decode("flattened model", e))?
        else {
            return Err(Error::decode("flattened model", "expected an object"));
        };

        for (key, mut value) in map {
            let Some(field) = self.schema.field(&key) else {
                continue;
            };
            if field.sensitive {
                continue;
            }
            if let Some(nested) = field.block_schema() {
                preserve_sensitive(nested, &mut value, self.values.get(&key));
            }
            self.values.insert(key, value);
        }
        Ok(())
    }

    /// Current working values.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The state to persist, or `None` when the resource is gone.
    pub fn into_state(self) -> Option<InstanceState> {
        if self.gone {
            return None;
        }
        self.id.map(|id| InstanceState::new(id, self.values))
    }
}

/// Copy sensitive sub-fields of a block from `old` into `new`, by index.
fn preserve_sensitive(schema: &Schema, new: &mut Value, old: Option<&Value>) {
    let Value::Array(items) = new else {
        return;
    };
    for (i, item) in items.iter_mut().enumerate() {
        let Value::Object(obj) = item else {
            continue;
        };
        let old_obj = old
            .and_then(|o| o.get(i))
            .and_then(Value::as_object);
        for field in schema.fields() {
            if field.sensitive {
                match old_obj.and_then(|o| o.get(field.name)) {
                    Some(previous) => {
                        obj.insert(field.name.to_string(), previous.clone());
                    }
                    None => {
                        obj.remove(field.name);
                    }
                }
            } else if let Some(nested) = field.block_schema()
                && let Some(child) = obj.get_mut(field.name)
            {
                preserve_sensitive(nested, child, old_obj.and_then(|o| o.get(field.name)));
            }
        }
    }
}
