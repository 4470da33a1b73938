//! `azurerm_mongo_cluster`: an Azure Cosmos DB for MongoDB (vCore) cluster.
//!
//! A cluster is either created fresh (`Default`) or as a geo replica of an
//! existing cluster (`GeoReplica`), which only accepts the replica source.
//! The administrator password is write-only and the connection strings
//! come from the `listConnectionStrings` action.

use super::{expand_tags, fetch, location_from};
use armclient::Client;
use declarative::mapping::{clear_server_managed, flatten_enum, int_at, set_path, str_at, strings_at};
use declarative::validation::{
    int_between, resource_id, string_in_slice, string_is_not_empty, string_matches,
};
use declarative::{
    BoxedKind, Error, Field, FieldType, OperationContext, ResourceData, ResourceDiff,
    ResourceKind, Result, Schema,
};
use resourceid::{IdPattern, ResourceId, Segment};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};

const API_VERSION: &str = "2024-07-01";

pub static MONGO_CLUSTER_ID: IdPattern = IdPattern::new(
    "MongoCluster",
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.DocumentDB"),
        Segment::Static("mongoClusters"),
        Segment::Value("mongoClusterName"),
    ],
);

const CREATE_MODES: &[&str] = &["Default", "GeoReplica"];
const COMPUTE_TIERS: &[&str] = &[
    "Free", "M10", "M20", "M25", "M30", "M40", "M50", "M60", "M80", "M200",
];
const HIGH_AVAILABILITY_MODES: &[&str] = &["Disabled", "SameZone", "ZoneRedundantPreferred"];
const NETWORK_ACCESS: &[&str] = &["Enabled", "Disabled"];
const PREVIEW_FEATURES: &[&str] = &["GeoReplicas"];

/// Fields a `Default` cluster cannot be created without.
const REQUIRED_FOR_DEFAULT: &[&str] = &[
    "administrator_username",
    "administrator_login_password",
    "compute_tier",
    "high_availability_mode",
    "storage_size_in_gb",
];

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Field::string("name")
            .required()
            .force_new()
            .validate(string_matches(
                "^[a-z0-9]([a-z0-9-]{1,38}[a-z0-9])?$",
                "must be 3 to 40 lower case letters, numbers or hyphens, and cannot start or end with a hyphen",
            )),
        Field::string("resource_group_name").required().force_new(),
        Field::string("location").required().force_new(),
        Field::string("create_mode")
            .optional()
            .force_new()
            .default("Default")
            .validate(string_in_slice(CREATE_MODES, false)),
        Field::string("source_server_id")
            .optional()
            .force_new()
            .validate(resource_id(&MONGO_CLUSTER_ID)),
        Field::string("source_location").optional().force_new(),
        Field::string("administrator_username")
            .optional()
            .force_new()
            .validate(string_is_not_empty()),
        Field::string("administrator_login_password")
            .optional()
            .sensitive()
            .validate(string_is_not_empty()),
        Field::string("server_version").optional().computed(),
        Field::string("compute_tier")
            .optional()
            .validate(string_in_slice(COMPUTE_TIERS, false)),
        Field::string("high_availability_mode")
            .optional()
            .validate(string_in_slice(HIGH_AVAILABILITY_MODES, false)),
        Field::int("shard_count")
            .optional()
            .force_new()
            .validate(int_between(1, 10)),
        Field::int("storage_size_in_gb")
            .optional()
            .validate(int_between(32, 16384)),
        Field::string("public_network_access")
            .optional()
            .default("Enabled")
            .validate(string_in_slice(NETWORK_ACCESS, false)),
        Field::list("preview_features", FieldType::String)
            .optional()
            .force_new()
            .validate(string_in_slice(PREVIEW_FEATURES, false)),
        Field::map("tags", FieldType::String).optional(),
        Field::block(
            "connection_strings",
            Schema::new(vec![
                Field::string("name").computed(),
                Field::string("value").computed(),
                Field::string("description").computed(),
            ]),
        )
        .computed()
        .sensitive(),
    ])
});

pub fn kinds() -> Vec<BoxedKind> {
    vec![Arc::new(MongoCluster)]
}

pub struct MongoCluster;

/// The user-facing model, as flattened from a remote cluster.
#[derive(Debug, Serialize)]
struct Flattened {
    name: String,
    resource_group_name: String,
    location: String,
    create_mode: String,
    source_server_id: String,
    source_location: String,
    administrator_username: String,
    server_version: String,
    compute_tier: String,
    high_availability_mode: String,
    shard_count: i64,
    storage_size_in_gb: i64,
    public_network_access: String,
    preview_features: Vec<String>,
    tags: Value,
}

impl MongoCluster {
    fn is_geo_replica(data: &ResourceData) -> bool {
        data.get_str("create_mode") == "GeoReplica"
    }

    /// Payload for a `Default` create.
    fn expand(data: &ResourceData) -> Value {
        let mut properties = Map::new();
        properties.insert("createMode".into(), json!("Default"));
        properties.insert(
            "administrator".into(),
            json!({
                "userName": data.get_str("administrator_username"),
                "password": data.get_str("administrator_login_password"),
            }),
        );
        if let Some(version) = data.get_ok("server_version") {
            properties.insert("serverVersion".into(), version.clone());
        }
        if let Some(tier) = data.get_ok("compute_tier") {
            properties.insert("compute".into(), json!({"tier": tier}));
        }
        if let Some(mode) = data.get_ok("high_availability_mode") {
            properties.insert("highAvailability".into(), json!({"targetMode": mode}));
        }
        if let Some(shards) = data.get("shard_count") {
            properties.insert("sharding".into(), json!({"shardCount": shards}));
        }
        if let Some(size) = data.get("storage_size_in_gb") {
            properties.insert("storage".into(), json!({"sizeGb": size}));
        }
        properties.insert(
            "publicNetworkAccess".into(),
            json!(data.get_str("public_network_access")),
        );
        if let Some(features) = data.get_ok("preview_features") {
            properties.insert("previewFeatures".into(), features.clone());
        }

        json!({
            "location": super::normalize_location(data.get_str("location")),
            "tags": expand_tags(data),
            "properties": properties,
        })
    }

    /// Payload for a `GeoReplica` create: the replica source only.
    fn expand_replica(data: &ResourceData) -> Value {
        json!({
            "location": super::normalize_location(data.get_str("location")),
            "tags": expand_tags(data),
            "properties": {
                "createMode": "GeoReplica",
                "replicaParameters": {
                    "sourceResourceId": data.get_str("source_server_id"),
                    "sourceLocation": super::normalize_location(data.get_str("source_location")),
                },
            },
        })
    }

    fn flatten(data: &ResourceData, id: &ResourceId, model: &Value) -> Flattened {
        // createMode and the replica source are not always echoed
        let remote_mode = str_at(model, "properties.createMode");
        let create_mode = if remote_mode.is_empty() {
            data.get_str("create_mode").to_string()
        } else {
            flatten_enum(Some(remote_mode.as_str()), CREATE_MODES, "create_mode")
        };
        let source_server_id = match str_at(model, "properties.replicaParameters.sourceResourceId") {
            s if s.is_empty() => data.get_str("source_server_id").to_string(),
            s => s,
        };
        let source_location = match str_at(model, "properties.replicaParameters.sourceLocation") {
            s if s.is_empty() => data.get_str("source_location").to_string(),
            s => s,
        };

        let shard_count = match int_at(model, "properties.sharding.shardCount") {
            0 => data.get("shard_count").and_then(Value::as_i64).unwrap_or_default(),
            n => n,
        };

        Flattened {
            name: id.name().to_string(),
            resource_group_name: id.get("resourceGroupName").unwrap_or_default().to_string(),
            location: location_from(data, &str_at(model, "location")),
            create_mode,
            source_server_id,
            source_location,
            administrator_username: str_at(model, "properties.administrator.userName"),
            server_version: str_at(model, "properties.serverVersion"),
            compute_tier: enum_at(model, "properties.compute.tier", COMPUTE_TIERS, "compute_tier"),
            high_availability_mode: enum_at(
                model,
                "properties.highAvailability.targetMode",
                HIGH_AVAILABILITY_MODES,
                "high_availability_mode",
            ),
            shard_count,
            storage_size_in_gb: int_at(model, "properties.storage.sizeGb"),
            public_network_access: enum_at(
                model,
                "properties.publicNetworkAccess",
                NETWORK_ACCESS,
                "public_network_access",
            ),
            preview_features: strings_at(model, "properties.previewFeatures"),
            tags: model.get("tags").cloned().unwrap_or_else(|| json!({})),
        }
    }

    fn connection_strings(client: &Client, ctx: &OperationContext<'_>, id: &str) -> Result<Value> {
        let response = client.list_secrets(ctx.context(), id, "listConnectionStrings")?;
        let model = response.model.unwrap_or_default();
        let items = model
            .get("connectionStrings")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        json!({
                            "name": str_at(item, "name"),
                            "value": str_at(item, "connectionString"),
                            "description": str_at(item, "description"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Array(items))
    }
}

fn enum_at(model: &Value, path: &str, allowed: &[&str], field: &str) -> String {
    let value = str_at(model, path);
    flatten_enum(Some(value.as_str()).filter(|s| !s.is_empty()), allowed, field)
}

impl ResourceKind for MongoCluster {
    fn type_name(&self) -> &'static str {
        "azurerm_mongo_cluster"
    }

    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn id_pattern(&self) -> &'static IdPattern {
        &MONGO_CLUSTER_ID
    }

    fn api_version(&self) -> &'static str {
        API_VERSION
    }

    fn description(&self) -> &'static str {
        "Azure Cosmos DB for MongoDB (vCore) cluster"
    }

    fn resource_id(&self, subscription_id: &str, data: &ResourceData) -> Result<ResourceId> {
        Ok(ResourceId::new(
            &MONGO_CLUSTER_ID,
            &[subscription_id, data.get_str("resource_group_name"), data.get_str("name")],
        )?)
    }

    fn customize_diff(&self, diff: &ResourceDiff) -> Result<()> {
        if diff.get_str("create_mode") == "GeoReplica" {
            for field in ["source_server_id", "source_location"] {
                if diff.get_str(field).is_empty() {
                    return Err(Error::diff(
                        field,
                        format!("`{field}` is required when `create_mode` is `GeoReplica`"),
                    ));
                }
            }
        } else {
            for field in REQUIRED_FOR_DEFAULT {
                if diff.get(field).is_none() {
                    return Err(Error::diff(
                        *field,
                        format!("`{field}` is required when `create_mode` is `Default`"),
                    ));
                }
            }
        }

        let tier = diff.get_str("compute_tier");
        if tier == "Free" || tier == "M25" {
            let ha = diff.get_str("high_availability_mode");
            if !ha.is_empty() && ha != "Disabled" {
                return Err(Error::diff(
                    "high_availability_mode",
                    "high availability is not supported for the `Free` and `M25` compute tiers, `high_availability_mode` must be `Disabled`",
                ));
            }
            if diff.get("shard_count").and_then(Value::as_i64).unwrap_or(1) > 1 {
                return Err(Error::diff(
                    "shard_count",
                    "sharding is not supported for the `Free` and `M25` compute tiers, `shard_count` must be 1",
                ));
            }
        }
        Ok(())
    }

    fn create(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = self.resource_id(ctx.subscription_id(), data)?.to_string();

        let body = if Self::is_geo_replica(data) {
            Self::expand_replica(data)
        } else {
            Self::expand(data)
        };
        let resp = client.create_or_update(ctx.context(), &id, &body)?;
        ctx.wait(&client, &resp, &id)?;

        data.set_id(id);
        Ok(())
    }

    fn read(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = ResourceId::parse(&MONGO_CLUSTER_ID, data.require_id()?)?;
        let model = fetch(&client, ctx, &id.to_string())?;

        let flattened = Self::flatten(data, &id, &model);
        data.encode(&flattened)?;

        let secrets = Self::connection_strings(&client, ctx, &id.to_string())?;
        data.set("connection_strings", secrets)
    }

    fn update(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = data.require_id()?.to_string();
        let mut model = fetch(&client, ctx, &id)?;
        clear_server_managed(&mut model);
        // read-only replica details are rejected on update
        if let Some(props) = model.get_mut("properties").and_then(Value::as_object_mut) {
            props.remove("replica");
            props.remove("connectionString");
            props.remove("clusterStatus");
            props.remove("infrastructureVersion");
        }

        let updates: &[(&str, &str)] = &[
            ("administrator_login_password", "properties.administrator.password"),
            ("server_version", "properties.serverVersion"),
            ("compute_tier", "properties.compute.tier"),
            ("high_availability_mode", "properties.highAvailability.targetMode"),
            ("storage_size_in_gb", "properties.storage.sizeGb"),
            ("public_network_access", "properties.publicNetworkAccess"),
            ("tags", "tags"),
        ];
        for (field, path) in updates {
            if data.has_change(field) {
                let value = data.get(field).cloned().unwrap_or(Value::Null);
                set_path(&mut model, path, value)?;
            }
        }

        let resp = client.create_or_update(ctx.context(), &id, &model)?;
        ctx.wait(&client, &resp, &id)
    }

    fn delete(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = data.require_id()?.to_string();
        let resp = client.delete(ctx.context(), &id)?;
        ctx.wait(&client, &resp, &id)
    }
}
