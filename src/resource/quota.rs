//! `azurerm_quota`: a quota limit of one resource provider in one location.
//!
//! Quotas always exist remotely, so create adopts the quota without the
//! requires-import check. There is no remote delete: deleting lowers the
//! limit to the current usage.

use super::fetch;
use declarative::mapping::{int_at, str_at};
use declarative::validation::{int_at_least, string_is_not_empty};
use declarative::{
    BoxedKind, Field, OperationContext, ResourceData, ResourceKind, Result, Schema,
};
use resourceid::{IdPattern, ResourceId, Segment};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};

const API_VERSION: &str = "2023-02-01";

pub static QUOTA_ID: IdPattern = IdPattern::new(
    "Quota",
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("providers"),
        Segment::Value("resourceProvider"),
        Segment::Static("locations"),
        Segment::Value("location"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.Quota"),
        Segment::Static("quotas"),
        Segment::Value("quotaName"),
    ],
);

static USAGE_ID: IdPattern = IdPattern::new(
    "Usage",
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("providers"),
        Segment::Value("resourceProvider"),
        Segment::Static("locations"),
        Segment::Value("location"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.Quota"),
        Segment::Static("usages"),
        Segment::Value("quotaName"),
    ],
);

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Field::string("name")
            .required()
            .force_new()
            .validate(string_is_not_empty()),
        Field::string("resource_provider")
            .required()
            .force_new()
            .validate(string_is_not_empty()),
        Field::string("location").required().force_new(),
        Field::int("limit_value").required().validate(int_at_least(0)),
        Field::string("resource_type").optional(),
        Field::int("current_usage").computed(),
    ])
});

pub fn kinds() -> Vec<BoxedKind> {
    vec![Arc::new(Quota)]
}

pub struct Quota;

impl Quota {
    fn usage_id(id: &ResourceId) -> Result<String> {
        let values: Vec<&str> = id.values().map(|(_, v)| v).collect();
        Ok(ResourceId::new(&USAGE_ID, &values)?.to_string())
    }

    fn current_usage(ctx: &OperationContext<'_>, id: &ResourceId) -> Result<i64> {
        let client = ctx.client(API_VERSION);
        let usage = fetch(&client, ctx, &Self::usage_id(id)?)?;
        Ok(int_at(&usage, "properties.usages.value"))
    }

    fn expand(id: &str, limit: i64, resource_type: &str) -> Value {
        let mut properties = json!({
            "limit": {"limitObjectType": "LimitValue", "value": limit},
            "name": {"value": id.rsplit('/').next().unwrap_or_default()},
        });
        if !resource_type.is_empty() {
            properties["resourceType"] = Value::String(resource_type.to_string());
        }
        json!({"properties": properties})
    }

    fn flatten(data: &ResourceData, id: &ResourceId, model: &Value, usage: i64) -> Value {
        let location = id.get("location").unwrap_or_default();
        json!({
            "name": id.name(),
            "resource_provider": id.get("resourceProvider"),
            "location": super::location_from(data, location),
            "limit_value": int_at(model, "properties.limit.value"),
            "resource_type": str_at(model, "properties.resourceType"),
            "current_usage": usage,
        })
    }

    fn set_limit(ctx: &OperationContext<'_>, id: &str, limit: i64, resource_type: &str) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let resp = client.update(ctx.context(), id, &Self::expand(id, limit, resource_type))?;
        ctx.wait(&client, &resp, id)
    }
}

impl ResourceKind for Quota {
    fn type_name(&self) -> &'static str {
        "azurerm_quota"
    }

    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn id_pattern(&self) -> &'static IdPattern {
        &QUOTA_ID
    }

    fn api_version(&self) -> &'static str {
        API_VERSION
    }

    fn description(&self) -> &'static str {
        "Quota limit of a resource provider in one location"
    }

    fn requires_import(&self) -> bool {
        false
    }

    fn resource_id(&self, subscription_id: &str, data: &ResourceData) -> Result<ResourceId> {
        Ok(ResourceId::new(
            &QUOTA_ID,
            &[
                subscription_id,
                data.get_str("resource_provider"),
                &super::normalize_location(data.get_str("location")),
                data.get_str("name"),
            ],
        )?)
    }

    fn create(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = self.resource_id(ctx.subscription_id(), data)?.to_string();
        let limit = data.get("limit_value").and_then(Value::as_i64).unwrap_or_default();
        Self::set_limit(ctx, &id, limit, data.get_str("resource_type"))?;
        data.set_id(id);
        Ok(())
    }

    fn read(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = ResourceId::parse(&QUOTA_ID, data.require_id()?)?;
        let client = ctx.client(API_VERSION);
        let model = fetch(&client, ctx, &id.to_string())?;
        let usage = match Self::current_usage(ctx, &id) {
            Ok(usage) => usage,
            Err(err) if err.is_not_found() => 0,
            Err(err) => return Err(err),
        };

        let flattened = Self::flatten(data, &id, &model, usage);
        data.encode(&flattened)
    }

    fn update(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        if !data.has_changes(&["limit_value", "resource_type"]) {
            return Ok(());
        }
        let id = data.require_id()?.to_string();
        let limit = data.get("limit_value").and_then(Value::as_i64).unwrap_or_default();
        Self::set_limit(ctx, &id, limit, data.get_str("resource_type"))
    }

    fn delete(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = ResourceId::parse(&QUOTA_ID, data.require_id()?)?;
        let usage = Self::current_usage(ctx, &id)?;
        log::info!("lowering {id} to its current usage {usage}");
        Self::set_limit(ctx, &id.to_string(), usage, data.get_str("resource_type"))
    }
}
