//! Test support: a small resource kind backed by a scripted transport.

use crate::context::OperationContext;
use crate::data::ResourceData;
use crate::diff::ResourceDiff;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::mapping::{clear_server_managed, int_at, str_at};
use crate::resource::ResourceKind;
use crate::schema::{Field, Schema};
use armclient::{Client, DEFAULT_ENDPOINT, MockTransport, RecordingWaiter};
use resourceid::{IdPattern, ResourceId, Segment};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};

pub const WIDGET_PATH: &str =
    "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Fake/widgets/w1";

static WIDGET_ID: IdPattern = IdPattern::new(
    "Widget",
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.Fake"),
        Segment::Static("widgets"),
        Segment::Value("widgetName"),
    ],
);

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Field::string("name").required().force_new(),
        Field::string("resource_group_name").required().force_new(),
        Field::int("size").optional(),
        Field::string("secret").optional().sensitive(),
        Field::string("status").computed(),
    ])
});

/// Engine over `mock` for subscription `s1`, never sleeping between polls.
pub fn engine(mock: &MockTransport) -> Engine {
    let client = Client::new(Arc::new(mock.clone()), DEFAULT_ENDPOINT);
    Engine::new(client, "s1").with_waiter(Arc::new(RecordingWaiter::new()))
}

pub struct FakeKind {
    name: &'static str,
}

impl FakeKind {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl ResourceKind for FakeKind {
    fn type_name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn id_pattern(&self) -> &'static IdPattern {
        &WIDGET_ID
    }

    fn api_version(&self) -> &'static str {
        "2024-01-01"
    }

    fn resource_id(&self, subscription_id: &str, data: &ResourceData) -> Result<ResourceId> {
        Ok(ResourceId::new(
            &WIDGET_ID,
            &[subscription_id, data.get_str("resource_group_name"), data.get_str("name")],
        )?)
    }

    fn customize_diff(&self, diff: &ResourceDiff) -> Result<()> {
        if diff.get("size").and_then(Value::as_i64).unwrap_or_default() > 100 {
            return Err(Error::diff("size", "must be at most 100"));
        }
        Ok(())
    }

    fn create(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(self.api_version());
        let id = self.resource_id(ctx.subscription_id(), data)?.to_string();
        let mut properties = serde_json::Map::new();
        if let Some(size) = data.get("size") {
            properties.insert("size".into(), size.clone());
        }
        if let Some(secret) = data.get("secret") {
            properties.insert("secret".into(), secret.clone());
        }
        let body = json!({"name": data.get_str("name"), "properties": properties});
        let resp = client.create_or_update(ctx.context(), &id, &body)?;
        ctx.wait(&client, &resp, &id)?;
        data.set_id(id);
        Ok(())
    }

    fn read(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(self.api_version());
        let id = ResourceId::parse(&WIDGET_ID, data.require_id()?)?;
        let model = client
            .get(ctx.context(), &id.to_string())?
            .model
            .unwrap_or_default();
        data.encode(&json!({
            "name": id.name(),
            "resource_group_name": id.get("resourceGroupName"),
            "size": int_at(&model, "properties.size"),
            "status": str_at(&model, "properties.status"),
        }))
    }

    fn update(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(self.api_version());
        let id = data.require_id()?.to_string();
        let mut model = client.get(ctx.context(), &id)?.model.unwrap_or_default();
        clear_server_managed(&mut model);
        if data.has_change("size") {
            model["properties"]["size"] = data.get("size").cloned().unwrap_or(Value::Null);
        }
        let resp = client.create_or_update(ctx.context(), &id, &model)?;
        ctx.wait(&client, &resp, &id)
    }

    fn delete(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(self.api_version());
        let id = data.require_id()?.to_string();
        let resp = client.delete(ctx.context(), &id)?;
        ctx.wait(&client, &resp, &id)
    }
}
