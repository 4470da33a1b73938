//! Test helpers shared by the resource modules.

use armclient::{Client, DEFAULT_ENDPOINT, MockTransport, RecordingWaiter};
use declarative::data::field_eq;
use declarative::{Engine, Field, ResourceData, ResourceKind};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

/// Engine over `mock` whose waits are recorded in `waiter`.
pub fn engine_with(mock: &MockTransport, waiter: &RecordingWaiter) -> Engine {
    let client = Client::new(Arc::new(mock.clone()), DEFAULT_ENDPOINT);
    Engine::new(client, SUBSCRIPTION).with_waiter(Arc::new(waiter.clone()))
}

pub fn engine(mock: &MockTransport) -> Engine {
    engine_with(mock, &RecordingWaiter::new())
}

pub fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// An `Azure-AsyncOperation` reply plus a succeeded status at `op`.
pub fn async_op(mock: &MockTransport, op: &str) -> armclient::MockReply {
    mock.reply(
        armclient::Method::Get,
        op,
        armclient::MockReply::json(200, serde_json::json!({"status": "Succeeded"})),
    );
    armclient::MockReply::empty(201).header(
        "Azure-AsyncOperation",
        &format!("https://management.azure.com{op}"),
    )
}

/// Working data for creating `config`, normalized as the engine does.
pub fn planned(kind: &dyn ResourceKind, config: &Map<String, Value>) -> ResourceData {
    ResourceData::new(kind.schema(), None, kind.schema().normalize(config))
}

/// Drop sensitive sub-fields of a block value.
fn without_secrets(field: &Field, value: &Value) -> Value {
    let (Some(block), Value::Array(items)) = (field.block_schema(), value) else {
        return value.clone();
    };
    let items = items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter_map(|(key, value)| {
                        let sub = block.field(key)?;
                        (!sub.sensitive).then(|| (key.clone(), without_secrets(sub, value)))
                    })
                    .collect(),
            ),
            other => other.clone(),
        })
        .collect();
    Value::Array(items)
}

/// Assert that `flattened`, read into fresh data, matches every configured
/// non-sensitive field except those in `unechoed`.
pub fn assert_reads_back<T: Serialize>(
    kind: &dyn ResourceKind,
    config: &Map<String, Value>,
    flattened: &T,
    unechoed: &[&str],
) {
    let schema = kind.schema();
    let mut read = ResourceData::for_import(schema, "imported");
    read.encode(flattened).unwrap();

    let expected = schema.with_defaults(&schema.normalize(config));
    for (key, value) in &expected {
        let Some(field) = schema.field(key) else {
            continue;
        };
        if field.sensitive || unechoed.contains(&key.as_str()) {
            continue;
        }
        let actual = read.values().get(key).map(|v| without_secrets(field, v));
        assert!(
            field_eq(field, Some(&without_secrets(field, value)), actual.as_ref()),
            "{key}: configured {value}, read back {actual:?}"
        );
    }
}
