//! `azurerm_compute_fleet`: an Azure Compute Fleet of regular and spot
//! virtual machines sharing one base profile.

use super::{expand_tags, fetch, location_from};
use declarative::mapping::{bool_at, int_at, lookup, str_at};
use declarative::validation::{arm_id, int_at_least, string_in_slice, string_is_not_empty};
use declarative::{
    BoxedKind, Error, Field, FieldType, OperationContext, Raw, ResourceData, ResourceDiff,
    ResourceKind, Result, Schema,
};
use resourceid::{IdPattern, ResourceId, Segment};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};

const API_VERSION: &str = "2024-11-01";

pub static FLEET_ID: IdPattern = IdPattern::new(
    "Fleet",
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.AzureFleet"),
        Segment::Static("fleets"),
        Segment::Value("fleetName"),
    ],
);

const WINDOWS_PATCH_MODES: &[&str] = &["AutomaticByOS", "AutomaticByPlatform", "Manual"];
const LINUX_PATCH_MODES: &[&str] = &["AutomaticByPlatform", "ImageDefault"];
const ALLOCATION_STRATEGIES: &[&str] = &["LowestPrice", "Prioritized"];
const SPOT_ALLOCATION_STRATEGIES: &[&str] = &["CapacityOptimized", "LowestPrice", "PriceCapacityOptimized"];
const EVICTION_POLICIES: &[&str] = &["Deallocate", "Delete"];

const HOTPATCH_PUBLISHER: &str = "MicrosoftWindowsServer";
const HOTPATCH_OFFER: &str = "WindowsServer";
const HOTPATCH_SKUS: &[&str] = &[
    "2022-datacenter-azure-edition-core",
    "2022-datacenter-azure-edition-core-smalldisk",
    "2022-datacenter-azure-edition-hotpatch",
    "2022-datacenter-azure-edition-hotpatch-smalldisk",
    "2025-datacenter-azure-edition",
    "2025-datacenter-azure-edition-smalldisk",
    "2025-datacenter-azure-edition-core",
    "2025-datacenter-azure-edition-core-smalldisk",
];

const HEALTH_EXTENSION_PUBLISHER: &str = "Microsoft.ManagedServices";
const HEALTH_EXTENSION_TYPES: &[&str] = &["ApplicationHealthLinux", "ApplicationHealthWindows"];

const PROFILE: &str = "virtual_machine_profile.0";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Field::string("name").required().force_new().validate(string_is_not_empty()),
        Field::string("resource_group_name").required().force_new(),
        Field::string("location").required().force_new(),
        Field::block(
            "vm_sizes_profile",
            Schema::new(vec![
                Field::string("name").required().validate(string_is_not_empty()),
                Field::int("rank").optional().validate(int_at_least(0)),
            ]),
        )
        .required()
        .min_items(1),
        Field::block(
            "regular_priority_profile",
            Schema::new(vec![
                Field::int("capacity").optional().validate(int_at_least(0)),
                Field::int("min_capacity").optional().validate(int_at_least(0)),
                Field::string("allocation_strategy")
                    .optional()
                    .default("LowestPrice")
                    .validate(string_in_slice(ALLOCATION_STRATEGIES, false)),
            ]),
        )
        .optional()
        .max_items(1),
        Field::block(
            "spot_priority_profile",
            Schema::new(vec![
                Field::int("capacity").optional().validate(int_at_least(0)),
                Field::int("min_capacity").optional().validate(int_at_least(0)),
                Field::string("allocation_strategy")
                    .optional()
                    .default("PriceCapacityOptimized")
                    .validate(string_in_slice(SPOT_ALLOCATION_STRATEGIES, false)),
                Field::string("eviction_policy")
                    .optional()
                    .default("Delete")
                    .validate(string_in_slice(EVICTION_POLICIES, false)),
                Field::float("max_hourly_price_per_vm").optional(),
            ]),
        )
        .optional()
        .max_items(1),
        Field::block("virtual_machine_profile", vm_profile_schema())
            .required()
            .force_new()
            .max_items(1),
        Field::map("tags", FieldType::String).optional(),
        Field::string("unique_id").computed(),
        Field::string("time_created").computed(),
    ])
});

fn vm_profile_schema() -> Schema {
    Schema::new(vec![
        Field::string("source_image_id")
            .optional()
            .conflicts_with(&["source_image_reference"])
            .validate(arm_id()),
        Field::block(
            "source_image_reference",
            Schema::new(vec![
                Field::string("publisher").required(),
                Field::string("offer").required(),
                Field::string("sku").required(),
                Field::string("version").required(),
            ]),
        )
        .optional()
        .max_items(1),
        Field::block(
            "os_profile",
            Schema::new(vec![
                Field::string("computer_name_prefix").optional().computed(),
                Field::string("admin_username").required(),
                Field::string("admin_password").optional().sensitive(),
                Field::block(
                    "windows_configuration",
                    Schema::new(vec![
                        Field::string("patch_mode")
                            .optional()
                            .default("AutomaticByOS")
                            .validate(string_in_slice(WINDOWS_PATCH_MODES, false)),
                        Field::bool("hot_patching_enabled").optional().default(false),
                        Field::bool("provision_vm_agent_enabled").optional().default(true),
                    ]),
                )
                .optional()
                .max_items(1)
                .conflicts_with(&["linux_configuration"]),
                Field::block(
                    "linux_configuration",
                    Schema::new(vec![
                        Field::string("patch_mode")
                            .optional()
                            .default("ImageDefault")
                            .validate(string_in_slice(LINUX_PATCH_MODES, false)),
                        Field::bool("password_authentication_enabled").optional().default(false),
                    ]),
                )
                .optional()
                .max_items(1),
            ]),
        )
        .required()
        .max_items(1),
        Field::block(
            "extension",
            Schema::new(vec![
                Field::string("name").required(),
                Field::string("publisher").required(),
                Field::string("type").required(),
                Field::string("type_handler_version").required(),
            ]),
        )
        .optional(),
    ])
}

pub fn kinds() -> Vec<BoxedKind> {
    vec![Arc::new(ComputeFleet)]
}

pub struct ComputeFleet;

#[derive(Debug, Serialize)]
struct Flattened {
    name: String,
    resource_group_name: String,
    location: String,
    vm_sizes_profile: Vec<Value>,
    regular_priority_profile: Vec<Value>,
    spot_priority_profile: Vec<Value>,
    virtual_machine_profile: Vec<Value>,
    tags: Value,
    unique_id: String,
    time_created: String,
}

fn is_hotpatch_image(publisher: &str, offer: &str, sku: &str) -> bool {
    publisher.eq_ignore_ascii_case(HOTPATCH_PUBLISHER)
        && offer.eq_ignore_ascii_case(HOTPATCH_OFFER)
        && HOTPATCH_SKUS.iter().any(|s| s.eq_ignore_ascii_case(sku))
}

fn is_health_extension(extension: &Value) -> bool {
    str_at(extension, "publisher").eq_ignore_ascii_case(HEALTH_EXTENSION_PUBLISHER)
        && HEALTH_EXTENSION_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&str_at(extension, "type")))
}

/// Rules for hot patching, which needs both a capable image and a health
/// probe.
fn check_hotpatching(diff: &ResourceDiff) -> Result<()> {
    let image = format!("{PROFILE}.source_image_reference.0");
    let windows = format!("{PROFILE}.os_profile.0.windows_configuration.0");
    if diff.get(&windows).is_none() {
        return Ok(());
    }

    let hotpatch_image = is_hotpatch_image(
        diff.get_str(&format!("{image}.publisher")),
        diff.get_str(&format!("{image}.offer")),
        diff.get_str(&format!("{image}.sku")),
    );
    let patch_mode = diff.get_str(&format!("{windows}.patch_mode"));
    let hot_patching = diff
        .get(&format!("{windows}.hot_patching_enabled"))
        .and_then(Value::as_bool)
        .unwrap_or_default();
    let field = |name: &str| format!("{windows}.{name}");

    if hotpatch_image {
        if patch_mode != "AutomaticByPlatform" {
            return Err(Error::diff(
                field("patch_mode"),
                "when referencing a hot patching enabled image the 'patch_mode' field must always be set to AutomaticByPlatform",
            ));
        }
        let agent = diff
            .get(&format!("{windows}.provision_vm_agent_enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if !agent {
            return Err(Error::diff(
                field("provision_vm_agent_enabled"),
                "when referencing a hot patching enabled image the 'provision_vm_agent_enabled' field must always be set to true",
            ));
        }
    } else if hot_patching {
        return Err(Error::diff(
            field("hot_patching_enabled"),
            format!(
                "'hot_patching_enabled' is only supported on the hot patching enabled images: publisher {HOTPATCH_PUBLISHER}, offer {HOTPATCH_OFFER}, skus {}",
                HOTPATCH_SKUS.join(", ")
            ),
        ));
    }

    if hot_patching || patch_mode == "AutomaticByPlatform" {
        let has_health = diff
            .get(&format!("{PROFILE}.extension"))
            .and_then(Value::as_array)
            .is_some_and(|exts| exts.iter().any(is_health_extension));
        if !has_health {
            return Err(Error::diff(
                format!("{PROFILE}.extension"),
                "when 'patch_mode' is AutomaticByPlatform or 'hot_patching_enabled' is true an application health extension must be configured",
            ));
        }
    }
    Ok(())
}

fn expand_vm_sizes(sizes: Option<&Value>) -> Value {
    let items = sizes
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|s| {
                    let mut out = json!({"name": str_at(s, "name")});
                    if let Some(rank) = lookup(s, "rank").filter(|v| !v.is_null()) {
                        out["rank"] = rank.clone();
                    }
                    out
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(items)
}

fn expand_regular(block: &Value) -> Value {
    json!({
        "capacity": int_at(block, "capacity"),
        "minCapacity": int_at(block, "min_capacity"),
        "allocationStrategy": str_at(block, "allocation_strategy"),
    })
}

fn expand_spot(block: &Value) -> Value {
    let mut out = json!({
        "capacity": int_at(block, "capacity"),
        "minCapacity": int_at(block, "min_capacity"),
        "allocationStrategy": str_at(block, "allocation_strategy"),
        "evictionPolicy": str_at(block, "eviction_policy"),
    });
    if let Some(price) = lookup(block, "max_hourly_price_per_vm").and_then(Value::as_f64) {
        out["maxPricePerVM"] = json!(price);
    }
    out
}

fn expand_vm_profile(profile: &Value) -> Value {
    let image = match str_at(profile, "source_image_id") {
        id if !id.is_empty() => json!({"id": id}),
        _ => {
            let reference = lookup(profile, "source_image_reference.0").unwrap_or(&Value::Null);
            json!({
                "publisher": str_at(reference, "publisher"),
                "offer": str_at(reference, "offer"),
                "sku": str_at(reference, "sku"),
                "version": str_at(reference, "version"),
            })
        }
    };

    let os = lookup(profile, "os_profile.0").unwrap_or(&Value::Null);
    let mut os_profile = Map::new();
    let prefix = str_at(os, "computer_name_prefix");
    if !prefix.is_empty() {
        os_profile.insert("computerNamePrefix".into(), json!(prefix));
    }
    os_profile.insert("adminUsername".into(), json!(str_at(os, "admin_username")));
    let password = str_at(os, "admin_password");
    if !password.is_empty() {
        os_profile.insert("adminPassword".into(), json!(password));
    }
    if let Some(windows) = lookup(os, "windows_configuration.0") {
        os_profile.insert(
            "windowsConfiguration".into(),
            json!({
                "provisionVMAgent": lookup(windows, "provision_vm_agent_enabled").and_then(Value::as_bool).unwrap_or(true),
                "patchSettings": {
                    "patchMode": str_at(windows, "patch_mode"),
                    "enableHotpatching": bool_at(windows, "hot_patching_enabled"),
                },
            }),
        );
    }
    if let Some(linux) = lookup(os, "linux_configuration.0") {
        os_profile.insert(
            "linuxConfiguration".into(),
            json!({
                "disablePasswordAuthentication": !bool_at(linux, "password_authentication_enabled"),
                "patchSettings": {"patchMode": str_at(linux, "patch_mode")},
            }),
        );
    }

    let extensions: Vec<Value> = lookup(profile, "extension")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|e| {
                    json!({
                        "name": str_at(e, "name"),
                        "properties": {
                            "publisher": str_at(e, "publisher"),
                            "type": str_at(e, "type"),
                            "typeHandlerVersion": str_at(e, "type_handler_version"),
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "storageProfile": {"imageReference": image},
        "osProfile": os_profile,
        "extensionProfile": {"extensions": extensions},
    })
}

impl ComputeFleet {
    fn expand(data: &ResourceData) -> Value {
        let mut properties = Map::new();
        properties.insert("vmSizesProfile".into(), expand_vm_sizes(data.get("vm_sizes_profile")));
        if let Some(regular) = data.get("regular_priority_profile.0") {
            properties.insert("regularPriorityProfile".into(), expand_regular(regular));
        }
        if let Some(spot) = data.get("spot_priority_profile.0") {
            properties.insert("spotPriorityProfile".into(), expand_spot(spot));
        }
        let profile = data.get(PROFILE).cloned().unwrap_or(Value::Null);
        properties.insert(
            "computeProfile".into(),
            json!({"baseVirtualMachineProfile": expand_vm_profile(&profile)}),
        );

        json!({
            "location": super::normalize_location(data.get_str("location")),
            "tags": expand_tags(data),
            "properties": properties,
        })
    }

    /// The remote image, in whichever form the user wrote it.
    fn flatten_image(data: &ResourceData, image: &Value, out: &mut Map<String, Value>) {
        let id = str_at(image, "id");
        // an import has nothing authored yet: follow the remote
        let authored_id = match data.get_raw(&format!("{PROFILE}.source_image_id")) {
            Raw::Present(_) => true,
            Raw::Absent => {
                !data.get_str(&format!("{PROFILE}.source_image_id")).is_empty()
                    || (data.get(&format!("{PROFILE}.source_image_reference.0")).is_none()
                        && !id.is_empty())
            }
        };

        if authored_id {
            out.insert("source_image_id".into(), json!(id));
            out.insert("source_image_reference".into(), json!([]));
        } else {
            out.insert("source_image_id".into(), json!(""));
            out.insert(
                "source_image_reference".into(),
                json!([{
                    "publisher": str_at(image, "publisher"),
                    "offer": str_at(image, "offer"),
                    "sku": str_at(image, "sku"),
                    "version": str_at(image, "version"),
                }]),
            );
        }
    }

    fn flatten_vm_profile(data: &ResourceData, base: &Value) -> Value {
        let mut out = Map::new();
        Self::flatten_image(
            data,
            lookup(base, "storageProfile.imageReference").unwrap_or(&Value::Null),
            &mut out,
        );

        let os = lookup(base, "osProfile").unwrap_or(&Value::Null);
        let mut os_profile = json!({
            "computer_name_prefix": str_at(os, "computerNamePrefix"),
            "admin_username": str_at(os, "adminUsername"),
            "windows_configuration": [],
            "linux_configuration": [],
        });
        if let Some(windows) = lookup(os, "windowsConfiguration") {
            os_profile["windows_configuration"] = json!([{
                "patch_mode": str_at(windows, "patchSettings.patchMode"),
                "hot_patching_enabled": bool_at(windows, "patchSettings.enableHotpatching"),
                "provision_vm_agent_enabled": bool_at(windows, "provisionVMAgent"),
            }]);
        }
        if let Some(linux) = lookup(os, "linuxConfiguration") {
            os_profile["linux_configuration"] = json!([{
                "patch_mode": str_at(linux, "patchSettings.patchMode"),
                "password_authentication_enabled": !bool_at(linux, "disablePasswordAuthentication"),
            }]);
        }
        out.insert("os_profile".into(), json!([os_profile]));

        let extensions: Vec<Value> = lookup(base, "extensionProfile.extensions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|e| {
                        json!({
                            "name": str_at(e, "name"),
                            "publisher": str_at(e, "properties.publisher"),
                            "type": str_at(e, "properties.type"),
                            "type_handler_version": str_at(e, "properties.typeHandlerVersion"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.insert("extension".into(), Value::Array(extensions));

        Value::Object(out)
    }

    fn flatten(data: &ResourceData, id: &ResourceId, model: &Value) -> Flattened {
        let props = model.get("properties").unwrap_or(&Value::Null);

        let vm_sizes_profile = lookup(props, "vmSizesProfile")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|s| {
                        let mut size = json!({"name": str_at(s, "name")});
                        if let Some(rank) = lookup(s, "rank").filter(|v| !v.is_null()) {
                            size["rank"] = rank.clone();
                        }
                        size
                    })
                    .collect()
            })
            .unwrap_or_default();

        let regular_priority_profile = lookup(props, "regularPriorityProfile")
            .map(|r| {
                vec![json!({
                    "capacity": int_at(r, "capacity"),
                    "min_capacity": int_at(r, "minCapacity"),
                    "allocation_strategy": str_at(r, "allocationStrategy"),
                })]
            })
            .unwrap_or_default();

        let spot_priority_profile = lookup(props, "spotPriorityProfile")
            .map(|s| {
                let mut block = json!({
                    "capacity": int_at(s, "capacity"),
                    "min_capacity": int_at(s, "minCapacity"),
                    "allocation_strategy": str_at(s, "allocationStrategy"),
                    "eviction_policy": str_at(s, "evictionPolicy"),
                });
                if let Some(price) = lookup(s, "maxPricePerVM").and_then(Value::as_f64) {
                    block["max_hourly_price_per_vm"] = json!(price);
                }
                vec![block]
            })
            .unwrap_or_default();

        let base = lookup(props, "computeProfile.baseVirtualMachineProfile").unwrap_or(&Value::Null);

        Flattened {
            name: id.name().to_string(),
            resource_group_name: id.get("resourceGroupName").unwrap_or_default().to_string(),
            location: location_from(data, &str_at(model, "location")),
            vm_sizes_profile,
            regular_priority_profile,
            spot_priority_profile,
            virtual_machine_profile: vec![Self::flatten_vm_profile(data, base)],
            tags: model.get("tags").cloned().unwrap_or_else(|| json!({})),
            unique_id: str_at(props, "uniqueId"),
            time_created: str_at(props, "timeCreated"),
        }
    }
}

impl ResourceKind for ComputeFleet {
    fn type_name(&self) -> &'static str {
        "azurerm_compute_fleet"
    }

    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn id_pattern(&self) -> &'static IdPattern {
        &FLEET_ID
    }

    fn api_version(&self) -> &'static str {
        API_VERSION
    }

    fn description(&self) -> &'static str {
        "Azure Compute Fleet"
    }

    fn resource_id(&self, subscription_id: &str, data: &ResourceData) -> Result<ResourceId> {
        Ok(ResourceId::new(
            &FLEET_ID,
            &[subscription_id, data.get_str("resource_group_name"), data.get_str("name")],
        )?)
    }

    fn customize_diff(&self, diff: &ResourceDiff) -> Result<()> {
        let has_id = !diff.get_str(&format!("{PROFILE}.source_image_id")).is_empty();
        let has_reference = diff.get(&format!("{PROFILE}.source_image_reference.0")).is_some();
        if has_id == has_reference {
            return Err(Error::diff(
                PROFILE,
                "exactly one of 'source_image_id' or 'source_image_reference' must be specified",
            ));
        }

        if diff.get("regular_priority_profile.0").is_none() && diff.get("spot_priority_profile.0").is_none() {
            return Err(Error::diff(
                "regular_priority_profile",
                "at least one of 'regular_priority_profile' or 'spot_priority_profile' must be specified",
            ));
        }

        check_hotpatching(diff)
    }

    fn create(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = self.resource_id(ctx.subscription_id(), data)?.to_string();

        let resp = client.create_or_update(ctx.context(), &id, &Self::expand(data))?;
        ctx.wait(&client, &resp, &id)?;

        data.set_id(id);
        Ok(())
    }

    fn read(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = ResourceId::parse(&FLEET_ID, data.require_id()?)?;
        let model = fetch(&client, ctx, &id.to_string())?;

        let flattened = Self::flatten(data, &id, &model);
        data.encode(&flattened)
    }

    fn update(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = data.require_id()?.to_string();

        let mut patch = Map::new();
        let mut properties = Map::new();
        if data.has_change("tags") {
            patch.insert("tags".into(), expand_tags(data));
        }
        if data.has_change("vm_sizes_profile") {
            properties.insert("vmSizesProfile".into(), expand_vm_sizes(data.get("vm_sizes_profile")));
        }
        if data.has_change("regular_priority_profile") {
            let regular = data.get("regular_priority_profile.0").map_or(Value::Null, expand_regular);
            properties.insert("regularPriorityProfile".into(), regular);
        }
        if data.has_change("spot_priority_profile") {
            let spot = data.get("spot_priority_profile.0").map_or(Value::Null, expand_spot);
            properties.insert("spotPriorityProfile".into(), spot);
        }
        if !properties.is_empty() {
            patch.insert("properties".into(), Value::Object(properties));
        }
        if patch.is_empty() {
            return Ok(());
        }

        let resp = client.update(ctx.context(), &id, &Value::Object(patch))?;
        ctx.wait(&client, &resp, &id)
    }

    fn delete(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = data.require_id()?.to_string();
        let resp = client.delete(ctx.context(), &id)?;
        ctx.wait(&client, &resp, &id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{SUBSCRIPTION, assert_reads_back, async_op, engine, obj, planned};
    use armclient::{Method, MockReply, MockTransport};
    use declarative::{Hook, InstanceState, Timeouts};

    fn fleet_path() -> String {
        format!(
            "/subscriptions/{SUBSCRIPTION}/resourceGroups/example-rg/providers/Microsoft.AzureFleet/fleets/example-fleet"
        )
    }

    fn health_extension() -> Value {
        json!({
            "name": "HealthExtension",
            "publisher": "Microsoft.ManagedServices",
            "type": "ApplicationHealthWindows",
            "type_handler_version": "1.0"
        })
    }

    fn config(sku: &str, patch_mode: &str, hot_patching: bool, extensions: Value) -> Map<String, Value> {
        obj(json!({
            "name": "example-fleet",
            "resource_group_name": "example-rg",
            "location": "West Europe",
            "vm_sizes_profile": [{"name": "Standard_D2s_v3"}],
            "regular_priority_profile": [{"capacity": 1, "min_capacity": 1}],
            "virtual_machine_profile": [{
                "source_image_reference": [{
                    "publisher": "MicrosoftWindowsServer",
                    "offer": "WindowsServer",
                    "sku": sku,
                    "version": "latest"
                }],
                "os_profile": [{
                    "computer_name_prefix": "prefix",
                    "admin_username": "adminuser",
                    "admin_password": "P@ssw0rd1234!",
                    "windows_configuration": [{
                        "patch_mode": patch_mode,
                        "hot_patching_enabled": hot_patching
                    }]
                }],
                "extension": extensions
            }]
        }))
    }

    fn plan_error(config: &Map<String, Value>) -> String {
        let err = engine(&MockTransport::new())
            .plan(&ComputeFleet, "azurerm_compute_fleet.example", None, Some(config), &Timeouts::default())
            .unwrap_err();
        assert_eq!(err.hook, Hook::Diff);
        err.to_string()
    }

    fn remote() -> Value {
        json!({
            "location": "westeurope",
            "tags": {},
            "properties": {
                "vmSizesProfile": [{"name": "Standard_D2s_v3"}],
                "regularPriorityProfile": {"capacity": 1, "minCapacity": 1, "allocationStrategy": "LowestPrice"},
                "computeProfile": {"baseVirtualMachineProfile": {
                    "storageProfile": {"imageReference": {
                        "publisher": "MicrosoftWindowsServer",
                        "offer": "WindowsServer",
                        "sku": "2022-datacenter-azure-edition-hotpatch",
                        "version": "latest"
                    }},
                    "osProfile": {
                        "computerNamePrefix": "prefix",
                        "adminUsername": "adminuser",
                        "windowsConfiguration": {
                            "provisionVMAgent": true,
                            "patchSettings": {"patchMode": "AutomaticByPlatform", "enableHotpatching": true}
                        }
                    },
                    "extensionProfile": {"extensions": [{
                        "name": "HealthExtension",
                        "properties": {
                            "publisher": "Microsoft.ManagedServices",
                            "type": "ApplicationHealthWindows",
                            "typeHandlerVersion": "1.0"
                        }
                    }]}
                }},
                "uniqueId": "5e6b1b9c-0000-0000-0000-000000000000",
                "timeCreated": "2024-11-20T10:00:00Z",
                "provisioningState": "Succeeded"
            }
        })
    }

    #[test]
    fn test_hotpatch_image_requires_automatic_by_platform() {
        let config = config(
            "2022-datacenter-azure-edition-hotpatch",
            "AutomaticByOS",
            false,
            json!([health_extension()]),
        );
        let message = plan_error(&config);
        assert!(message.contains(
            "when referencing a hot patching enabled image the 'patch_mode' field must always be set to AutomaticByPlatform"
        ));
    }

    #[test]
    fn test_hot_patching_requires_capable_image() {
        let config = config("2019-datacenter", "AutomaticByPlatform", true, json!([health_extension()]));
        assert!(plan_error(&config).contains("'hot_patching_enabled' is only supported"));
    }

    #[test]
    fn test_platform_patching_requires_health_extension() {
        let config = config("2022-datacenter-azure-edition-hotpatch", "AutomaticByPlatform", true, json!([]));
        assert!(plan_error(&config).contains("application health extension"));
    }

    #[test]
    fn test_image_source_is_exclusive() {
        let mut config = config("2019-datacenter", "Manual", false, json!([]));
        let profile = config["virtual_machine_profile"][0].as_object_mut().unwrap();
        profile.remove("source_image_reference");
        assert!(plan_error(&config).contains("exactly one of 'source_image_id' or 'source_image_reference'"));
    }

    #[test]
    fn test_create_keeps_password_and_image_form() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, &fleet_path(), MockReply::not_found());
        mock.reply(Method::Put, &fleet_path(), async_op(&mock, "/operations/f1"));
        mock.reply(Method::Get, &fleet_path(), MockReply::json(200, remote()));

        let config = config(
            "2022-datacenter-azure-edition-hotpatch",
            "AutomaticByPlatform",
            true,
            json!([health_extension()]),
        );
        let created = engine(&mock)
            .create(&ComputeFleet, "azurerm_compute_fleet.example", &config, &Timeouts::default())
            .unwrap();

        let put = mock.requests_to(Method::Put, &fleet_path())[0].json().unwrap();
        let base = &put["properties"]["computeProfile"]["baseVirtualMachineProfile"];
        assert_eq!(base["osProfile"]["adminPassword"], "P@ssw0rd1234!");
        assert_eq!(base["osProfile"]["windowsConfiguration"]["patchSettings"]["enableHotpatching"], true);

        let profile = &created.attributes["virtual_machine_profile"][0];
        assert_eq!(profile["os_profile"][0]["admin_password"], "P@ssw0rd1234!");
        assert_eq!(profile["source_image_id"], "");
        assert_eq!(
            profile["source_image_reference"][0]["sku"],
            "2022-datacenter-azure-edition-hotpatch"
        );
        assert_eq!(created.attributes["unique_id"], "5e6b1b9c-0000-0000-0000-000000000000");
        assert_eq!(created.attributes["location"], "West Europe");
    }

    #[test]
    fn test_update_patches_changed_capacity_only() {
        let mock = MockTransport::new();
        mock.reply(Method::Patch, &fleet_path(), async_op(&mock, "/operations/f2"));
        mock.reply(Method::Get, &fleet_path(), MockReply::json(200, remote()));

        let prior_config = config(
            "2022-datacenter-azure-edition-hotpatch",
            "AutomaticByPlatform",
            true,
            json!([health_extension()]),
        );
        let prior = InstanceState::new(fleet_path(), prior_config.clone());
        let mut new_config = prior_config;
        new_config.insert("regular_priority_profile".into(), json!([{"capacity": 3, "min_capacity": 1}]));

        engine(&mock)
            .update(&ComputeFleet, &prior, &new_config, &Timeouts::default())
            .unwrap();

        let patch = mock.requests_to(Method::Patch, &fleet_path())[0].json().unwrap();
        assert_eq!(patch["properties"]["regularPriorityProfile"]["capacity"], 3);
        assert!(patch["properties"].get("computeProfile").is_none());
        assert!(patch.get("tags").is_none());
    }

    #[test]
    fn test_flatten_reads_back_expanded_config() {
        let mut config = config(
            "2022-datacenter-azure-edition-hotpatch",
            "AutomaticByPlatform",
            true,
            json!([health_extension()]),
        );
        config.insert(
            "spot_priority_profile".into(),
            json!([{"capacity": 2, "min_capacity": 0, "max_hourly_price_per_vm": 0.25}]),
        );
        config.insert("tags".into(), json!({"env": "test"}));

        let data = planned(&ComputeFleet, &config);
        let id = ComputeFleet.resource_id(SUBSCRIPTION, &data).unwrap();
        let model = ComputeFleet::expand(&data);
        let flattened = ComputeFleet::flatten(&data, &id, &model);
        assert_reads_back(&ComputeFleet, &config, &flattened, &[]);
    }
}
