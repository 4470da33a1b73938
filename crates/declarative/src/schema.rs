//! Typed resource schemas.
//!
//! A [`Schema`] lists the user-visible fields of a resource kind. Nested
//! blocks are lists of objects with their own schema, so a path into a
//! value looks like `virtual_machine_profile.0.os_profile.0.admin_password`.
//!
//! ```
//! use declarative::schema::{Field, FieldType, Schema};
//! use declarative::validation;
//!
//! let schema = Schema::new(vec![
//!     Field::string("name").required().force_new(),
//!     Field::int("limit_value").required().validate(validation::int_at_least(0)),
//!     Field::set("protocols", FieldType::String).optional(),
//! ]);
//!
//! let config = serde_json::json!({"name": "cores", "limit_value": -1});
//! let violations = schema.validate(config.as_object().unwrap());
//! assert_eq!(violations.len(), 1);
//! assert_eq!(violations[0].field_path, "limit_value");
//! ```

use crate::error::Violation;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Primitive value kinds a validator can check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Int,
    Float,
    Bool,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        };
        write!(f, "{s}")
    }
}

type Check = dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync;

/// A per-field value check.
///
/// Validators declare the primitive kind they accept; attaching one to a
/// field of another type is a definition error.
#[derive(Clone)]
pub struct Validator {
    name: &'static str,
    accepts: Primitive,
    check: Arc<Check>,
}

impl Validator {
    /// Build a validator.
    pub fn new(
        name: &'static str,
        accepts: Primitive,
        check: impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            accepts,
            check: Arc::new(check),
        }
    }

    /// Validator name, used in definition errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Primitive kind this validator accepts.
    pub fn accepts(&self) -> Primitive {
        self.accepts
    }

    /// Run the check.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        (self.check)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("name", &self.name)
            .field("accepts", &self.accepts)
            .finish_non_exhaustive()
    }
}

/// Type of a schema field.
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// Ordered list.
    List(Box<FieldType>),
    /// Unordered, duplicate-free collection.
    Set(Box<FieldType>),
    /// String-keyed map.
    Map(Box<FieldType>),
    /// Nested block: a list of objects.
    Block(Schema),
}

impl FieldType {
    /// The primitive kind, for scalar types.
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Self::String => Some(Primitive::String),
            Self::Int => Some(Primitive::Int),
            Self::Float => Some(Primitive::Float),
            Self::Bool => Some(Primitive::Bool),
            _ => None,
        }
    }

    /// The primitive a validator sees for this type: the scalar itself or
    /// the element of a scalar collection.
    fn validated_primitive(&self) -> Option<Primitive> {
        match self {
            Self::List(elem) | Self::Set(elem) | Self::Map(elem) => elem.primitive(),
            other => other.primitive(),
        }
    }

    /// Human-readable type name, e.g. `list of string`.
    pub fn describe(&self) -> String {
        match self {
            Self::String => "string".into(),
            Self::Int => "int".into(),
            Self::Float => "float".into(),
            Self::Bool => "bool".into(),
            Self::List(e) => format!("list of {}", e.describe()),
            Self::Set(e) => format!("set of {}", e.describe()),
            Self::Map(e) => format!("map of {}", e.describe()),
            Self::Block(_) => "block".into(),
        }
    }
}

/// One field of a schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub force_new: bool,
    pub default: Option<Value>,
    pub max_items: Option<usize>,
    pub min_items: Option<usize>,
    pub conflicts_with: Vec<&'static str>,
    pub required_with: Vec<&'static str>,
    pub validator: Option<Validator>,
}

impl Field {
    /// A field of any type. Mark it required, optional or computed.
    pub fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            force_new: false,
            default: None,
            max_items: None,
            min_items: None,
            conflicts_with: Vec::new(),
            required_with: Vec::new(),
            validator: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn int(name: &'static str) -> Self {
        Self::new(name, FieldType::Int)
    }

    pub fn float(name: &'static str) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn bool(name: &'static str) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn list(name: &'static str, elem: FieldType) -> Self {
        Self::new(name, FieldType::List(Box::new(elem)))
    }

    pub fn set(name: &'static str, elem: FieldType) -> Self {
        Self::new(name, FieldType::Set(Box::new(elem)))
    }

    pub fn map(name: &'static str, elem: FieldType) -> Self {
        Self::new(name, FieldType::Map(Box::new(elem)))
    }

    pub fn block(name: &'static str, schema: Schema) -> Self {
        Self::new(name, FieldType::Block(schema))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn conflicts_with(mut self, names: &[&'static str]) -> Self {
        self.conflicts_with.extend_from_slice(names);
        self
    }

    pub fn required_with(mut self, names: &[&'static str]) -> Self {
        self.required_with.extend_from_slice(names);
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Whether the user may not set this field.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    /// Nested schema of a block field.
    pub fn block_schema(&self) -> Option<&Schema> {
        match &self.ty {
            FieldType::Block(schema) => Some(schema),
            _ => None,
        }
    }
}

/// The field list of a resource kind or nested block.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a dotted path, skipping numeric block indices.
    pub fn lookup(&self, path: &str) -> Option<&Field> {
        let mut schema = self;
        let mut found = None;
        for segment in path.split('.') {
            if segment.parse::<usize>().is_ok() {
                continue;
            }
            let field = schema.field(segment)?;
            found = Some(field);
            if let Some(nested) = field.block_schema() {
                schema = nested;
            }
        }
        found
    }

    /// Whether the field at `path` is sensitive.
    pub fn is_sensitive(&self, path: &str) -> bool {
        self.lookup(path).is_some_and(|f| f.sensitive)
    }

    /// Problems with the schema itself.
    pub fn definition_errors(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        self.check_definition("", &mut out);
        out
    }

    fn check_definition(&self, prefix: &str, out: &mut Vec<Violation>) {
        for field in &self.fields {
            let path = join_path(prefix, field.name);
            let modes = [field.required, field.optional, field.computed && !field.optional];
            if !modes.iter().any(|m| *m) {
                out.push(Violation::new(&path, "must be required, optional or computed"));
            }
            if field.required && (field.optional || field.computed) {
                out.push(Violation::new(&path, "required conflicts with optional/computed"));
            }
            if field.required && field.default.is_some() {
                out.push(Violation::new(&path, "a required field cannot have a default"));
            }
            if let Some(validator) = &field.validator
                && field.ty.validated_primitive() != Some(validator.accepts())
            {
                out.push(Violation::new(
                    &path,
                    format!(
                        "validator {} expects {} values but the field is a {}",
                        validator.name(),
                        validator.accepts(),
                        field.ty.describe()
                    ),
                ));
            }
            for other in field.conflicts_with.iter().chain(&field.required_with) {
                if self.field(other).is_none() {
                    out.push(Violation::new(&path, format!("references unknown field {other}")));
                }
            }
            if let Some(nested) = field.block_schema() {
                nested.check_definition(&path, out);
            }
        }
    }

    /// Canonical form of a raw configuration.
    ///
    /// A block written as a single object becomes a one-element list, set
    /// elements are de-duplicated and nulls are dropped. Unknown keys are
    /// kept so that validation can report them.
    pub fn normalize(&self, config: &Map<String, Value>) -> Map<String, Value> {
        config
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(key, value)| {
                let value = match self.field(key) {
                    Some(field) => normalize_value(&field.ty, value),
                    None => value.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Apply field defaults, recursively inside blocks.
    pub fn with_defaults(&self, values: &Map<String, Value>) -> Map<String, Value> {
        let mut out = values.clone();
        for field in &self.fields {
            match out.get_mut(field.name) {
                Some(Value::Array(items)) => {
                    if let Some(nested) = field.block_schema() {
                        for item in items.iter_mut() {
                            if let Value::Object(obj) = item {
                                *obj = nested.with_defaults(obj);
                            }
                        }
                    }
                }
                Some(_) => {}
                None => {
                    if let Some(default) = &field.default {
                        out.insert(field.name.to_string(), default.clone());
                    }
                }
            }
        }
        out
    }

    /// Check a normalized configuration. Every violation is reported; values
    /// never appear in the reasons.
    pub fn validate(&self, config: &Map<String, Value>) -> Vec<Violation> {
        let mut out = self.definition_errors();
        self.validate_object(config, "", &mut out);
        out
    }

    fn validate_object(&self, obj: &Map<String, Value>, prefix: &str, out: &mut Vec<Violation>) {
        for key in obj.keys() {
            if self.field(key).is_none() {
                out.push(Violation::new(join_path(prefix, key), "unsupported argument"));
            }
        }

        let is_set = |name: &str| obj.get(name).is_some_and(|v| !v.is_null());

        for field in &self.fields {
            let path = join_path(prefix, field.name);
            let Some(value) = obj.get(field.name).filter(|v| !v.is_null()) else {
                if field.required {
                    out.push(Violation::new(path, "is required"));
                }
                continue;
            };

            if field.is_computed_only() {
                out.push(Violation::new(&path, "cannot be set; the value is computed"));
                continue;
            }

            for other in &field.conflicts_with {
                if is_set(other) {
                    out.push(Violation::new(&path, format!("conflicts with {other}")));
                }
            }
            for other in &field.required_with {
                if !is_set(other) {
                    out.push(Violation::new(
                        &path,
                        format!("{other} must also be set"),
                    ));
                }
            }

            check_value(field, &field.ty, value, &path, out);
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn normalize_value(ty: &FieldType, value: &Value) -> Value {
    match (ty, value) {
        (FieldType::Block(schema), Value::Object(obj)) => {
            Value::Array(vec![Value::Object(schema.normalize(obj))])
        }
        (FieldType::Block(schema), Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(obj) => Value::Object(schema.normalize(obj)),
                    other => other.clone(),
                })
                .collect(),
        ),
        (FieldType::Set(_), Value::Array(items)) => {
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.contains(item) {
                    unique.push(item.clone());
                }
            }
            Value::Array(unique)
        }
        _ => value.clone(),
    }
}

fn matches_primitive(primitive: Primitive, value: &Value) -> bool {
    match primitive {
        Primitive::String => value.is_string(),
        Primitive::Int => value.is_i64() || value.is_u64(),
        Primitive::Float => value.is_number(),
        Primitive::Bool => value.is_boolean(),
    }
}

fn check_value(field: &Field, ty: &FieldType, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let type_error = || Violation::new(path, format!("expected a {}", ty.describe()));

    match ty {
        FieldType::String | FieldType::Int | FieldType::Float | FieldType::Bool => {
            let Some(primitive) = ty.primitive() else {
                return;
            };
            if !matches_primitive(primitive, value) {
                out.push(type_error());
                return;
            }
            if let Some(validator) = &field.validator
                && validator.accepts() == primitive
                && let Err(reason) = validator.check(value)
            {
                out.push(Violation::new(path, reason));
            }
        }
        FieldType::List(elem) | FieldType::Set(elem) => {
            let Some(items) = value.as_array() else {
                out.push(type_error());
                return;
            };
            check_count(field, items.len(), path, out);
            for (i, item) in items.iter().enumerate() {
                check_value(field, elem, item, &format!("{path}.{i}"), out);
            }
        }
        FieldType::Map(elem) => {
            let Some(map) = value.as_object() else {
                out.push(type_error());
                return;
            };
            for (key, item) in map {
                check_value(field, elem, item, &format!("{path}.{key}"), out);
            }
        }
        FieldType::Block(schema) => {
            let Some(items) = value.as_array() else {
                out.push(type_error());
                return;
            };
            check_count(field, items.len(), path, out);
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}.{i}");
                match item.as_object() {
                    Some(obj) => schema.validate_object(obj, &item_path, out),
                    None => out.push(Violation::new(item_path, "expected an object")),
                }
            }
        }
    }
}

fn check_count(field: &Field, len: usize, path: &str, out: &mut Vec<Violation>) {
    if let Some(max) = field.max_items
        && len > max
    {
        out.push(Violation::new(path, format!("at most {max} item(s) allowed, got {len}")));
    }
    if let Some(min) = field.min_items
        && len < min
    {
        out.push(Violation::new(path, format!("at least {min} item(s) required, got {len}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::string("name").required().force_new(),
            Field::string("version").optional().required_with(&["version_set_id"]),
            Field::string("version_set_id").optional(),
            Field::string("source_image_id").optional().conflicts_with(&["source_image_reference"]),
            Field::block(
                "source_image_reference",
                Schema::new(vec![
                    Field::string("publisher").required(),
                    Field::string("sku").required(),
                ]),
            )
            .optional()
            .max_items(1),
            Field::set("protocols", FieldType::String)
                .optional()
                .validate(validation::string_in_slice(&["http", "https"], false)),
            Field::bool("subscription_required").optional().default(true),
            Field::bool("is_current").computed(),
            Field::string("password").optional().sensitive(),
        ])
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_config() {
        let config = schema().normalize(&obj(json!({
            "name": "api1",
            "protocols": ["https"],
            "source_image_reference": {"publisher": "p", "sku": "s"}
        })));
        assert!(schema().validate(&config).is_empty());
    }

    #[test]
    fn test_reports_every_violation() {
        let violations = schema().validate(&obj(json!({
            "unknown": 1,
            "is_current": true,
            "protocols": ["ftp"],
            "version": "v1"
        })));
        let paths: Vec<&str> = violations.iter().map(|v| v.field_path.as_str()).collect();
        assert!(paths.contains(&"unknown"));
        assert!(paths.contains(&"name"));
        assert!(paths.contains(&"is_current"));
        assert!(paths.contains(&"protocols.0"));
        assert!(paths.contains(&"version"));
    }

    #[test]
    fn test_conflicts_with() {
        let config = schema().normalize(&obj(json!({
            "name": "x",
            "source_image_id": "/subscriptions/s/x",
            "source_image_reference": [{"publisher": "p", "sku": "s"}]
        })));
        let violations = schema().validate(&config);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].reason, "conflicts with source_image_reference");
    }

    #[test]
    fn test_nested_required_and_max_items() {
        let config = obj(json!({
            "name": "x",
            "source_image_reference": [{"publisher": "p"}, {"publisher": "q", "sku": "s"}]
        }));
        let violations = schema().validate(&config);
        let paths: Vec<&str> = violations.iter().map(|v| v.field_path.as_str()).collect();
        assert!(paths.contains(&"source_image_reference"));
        assert!(paths.contains(&"source_image_reference.0.sku"));
    }

    #[test]
    fn test_type_mismatch_does_not_leak_value() {
        let violations = schema().validate(&obj(json!({"name": "x", "password": 12345})));
        assert_eq!(violations.len(), 1);
        assert!(!violations[0].to_string().contains("12345"));
    }

    #[test]
    fn test_normalize_wraps_blocks_and_dedups_sets() {
        let config = schema().normalize(&obj(json!({
            "source_image_reference": {"publisher": "p", "sku": "s"},
            "protocols": ["https", "https", "http"],
            "version": null
        })));
        assert_eq!(config["source_image_reference"], json!([{"publisher": "p", "sku": "s"}]));
        assert_eq!(config["protocols"], json!(["https", "http"]));
        assert!(!config.contains_key("version"));
    }

    #[test]
    fn test_with_defaults() {
        let values = schema().with_defaults(&obj(json!({"name": "x"})));
        assert_eq!(values["subscription_required"], json!(true));
        assert!(!values.contains_key("version"));
    }

    #[test]
    fn test_validator_type_mismatch_is_a_definition_error() {
        let schema = Schema::new(vec![
            Field::bool("enabled")
                .optional()
                .validate(validation::string_in_slice(&["Allow", "Deny"], false)),
        ]);
        let errors = schema.definition_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.contains("expects string values but the field is a bool"));

        let violations = schema.validate(&obj(json!({"enabled": true})));
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_lookup_nested() {
        let schema = Schema::new(vec![
            Field::block(
                "os_profile",
                Schema::new(vec![Field::string("admin_password").optional().sensitive()]),
            )
            .optional(),
        ]);
        assert!(schema.is_sensitive("os_profile.0.admin_password"));
        assert!(!schema.is_sensitive("os_profile"));
        assert!(schema.lookup("os_profile.0.missing").is_none());
    }
}
