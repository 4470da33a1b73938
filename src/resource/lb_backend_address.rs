//! `azurerm_lb_backend_address_pool_address`: one address inside a load
//! balancer backend pool.
//!
//! Addresses have no endpoint of their own. Every mutation rewrites the
//! parent pool, so all of them run under the pool's named lock.

use super::fetch;
use armclient::Client;
use declarative::mapping::{clear_server_managed, int_at, str_at};
use declarative::validation::{resource_id, string_is_not_empty};
use declarative::{
    BoxedKind, Error, Field, OperationContext, ResourceData, ResourceKind, Result, Schema,
    lock_by_name,
};
use resourceid::{IdPattern, ResourceId, Segment};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};

const API_VERSION: &str = "2023-09-01";

/// Lock kind shared by everything that rewrites a backend pool.
pub const POOL_LOCK_KIND: &str = "azurerm_lb_backend_address_pool";

pub static LOAD_BALANCER_ID: IdPattern = IdPattern::new(
    "LoadBalancer",
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.Network"),
        Segment::Static("loadBalancers"),
        Segment::Value("loadBalancerName"),
    ],
);

pub static BACKEND_POOL_ID: IdPattern = IdPattern::child_of(
    "LoadBalancerBackendAddressPool",
    &LOAD_BALANCER_ID,
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.Network"),
        Segment::Static("loadBalancers"),
        Segment::Value("loadBalancerName"),
        Segment::Static("backendAddressPools"),
        Segment::Value("backendAddressPoolName"),
    ],
);

pub static BACKEND_ADDRESS_ID: IdPattern = IdPattern::child_of(
    "BackendAddressPoolAddress",
    &BACKEND_POOL_ID,
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.Network"),
        Segment::Static("loadBalancers"),
        Segment::Value("loadBalancerName"),
        Segment::Static("backendAddressPools"),
        Segment::Value("backendAddressPoolName"),
        Segment::Static("addresses"),
        Segment::Value("addressName"),
    ],
);

static FRONTEND_IP_CONFIGURATION_ID: IdPattern = IdPattern::child_of(
    "LoadBalancerFrontendIPConfiguration",
    &LOAD_BALANCER_ID,
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.Network"),
        Segment::Static("loadBalancers"),
        Segment::Value("loadBalancerName"),
        Segment::Static("frontendIPConfigurations"),
        Segment::Value("frontendIPConfigurationName"),
    ],
);

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Field::string("name")
            .required()
            .force_new()
            .validate(string_is_not_empty()),
        Field::string("backend_address_pool_id")
            .required()
            .force_new()
            .validate(resource_id(&BACKEND_POOL_ID)),
        Field::string("backend_address_ip_configuration_id")
            .optional()
            .conflicts_with(&["ip_address", "virtual_network_id"])
            .validate(resource_id(&FRONTEND_IP_CONFIGURATION_ID)),
        Field::string("ip_address")
            .optional()
            .required_with(&["virtual_network_id"]),
        Field::string("virtual_network_id")
            .optional()
            .required_with(&["ip_address"]),
        Field::block(
            "inbound_nat_rule_port_mapping",
            Schema::new(vec![
                Field::string("inbound_nat_rule_name").computed(),
                Field::int("frontend_port").computed(),
                Field::int("backend_port").computed(),
            ]),
        )
        .computed(),
    ])
});

pub fn kinds() -> Vec<BoxedKind> {
    vec![Arc::new(BackendAddress)]
}

pub struct BackendAddress;

#[derive(Debug, Serialize)]
struct PortMapping {
    inbound_nat_rule_name: String,
    frontend_port: i64,
    backend_port: i64,
}

#[derive(Debug, Serialize)]
struct Flattened {
    name: String,
    backend_address_pool_id: String,
    backend_address_ip_configuration_id: String,
    ip_address: String,
    virtual_network_id: String,
    inbound_nat_rule_port_mapping: Vec<PortMapping>,
}

/// The addresses of a pool model, created on demand.
fn addresses_mut(pool: &mut Value) -> Result<&mut Vec<Value>> {
    let Some(pool) = pool.as_object_mut() else {
        return Err(Error::decode("backend address pool", "expected an object"));
    };
    let properties = pool
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(properties) = properties.as_object_mut() else {
        return Err(Error::decode("backend address pool", "properties is not an object"));
    };
    let addresses = properties
        .entry("loadBalancerBackendAddresses")
        .or_insert_with(|| Value::Array(Vec::new()));
    addresses
        .as_array_mut()
        .ok_or_else(|| Error::decode("backend address pool", "loadBalancerBackendAddresses is not a list"))
}

fn find<'a>(pool: &'a Value, name: &str) -> Option<&'a Value> {
    pool.pointer("/properties/loadBalancerBackendAddresses")?
        .as_array()?
        .iter()
        .find(|a| str_at(a, "name").eq_ignore_ascii_case(name))
}

impl BackendAddress {
    fn expand(data: &ResourceData) -> Value {
        let frontend = data.get_str("backend_address_ip_configuration_id");
        let properties = if frontend.is_empty() {
            json!({
                "ipAddress": data.get_str("ip_address"),
                "virtualNetwork": {"id": data.get_str("virtual_network_id")},
            })
        } else {
            json!({"loadBalancerFrontendIPConfiguration": {"id": frontend}})
        };
        json!({"name": data.get_str("name"), "properties": properties})
    }

    /// Overlay the configured target onto an existing address entry; the
    /// other target form is dropped, everything else is kept.
    fn merge(slot: &mut Value, updated: Value) -> Result<()> {
        let Some(slot) = slot.as_object_mut() else {
            return Err(Error::decode("backend address", "expected an object"));
        };
        let properties = slot
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(properties) = properties.as_object_mut() else {
            return Err(Error::decode("backend address", "properties is not an object"));
        };
        if let Some(Value::Object(target)) = updated.get("properties") {
            let replaced: &[&str] = if target.contains_key("loadBalancerFrontendIPConfiguration") {
                &["ipAddress", "virtualNetwork"]
            } else {
                &["loadBalancerFrontendIPConfiguration"]
            };
            for key in replaced {
                properties.remove(*key);
            }
            for (key, value) in target {
                properties.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn flatten(id: &ResourceId, address: &Value) -> Result<Flattened> {
        let pool = id
            .parent()
            .ok_or_else(|| Error::decode("backend address id", "missing pool"))?;
        let mappings = address
            .pointer("/properties/inboundNatRulesPortMapping")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|m| PortMapping {
                        inbound_nat_rule_name: str_at(m, "inboundNatRuleName"),
                        frontend_port: int_at(m, "frontendPort"),
                        backend_port: int_at(m, "backendPort"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Flattened {
            name: id.name().to_string(),
            backend_address_pool_id: pool.to_string(),
            backend_address_ip_configuration_id: str_at(
                address,
                "properties.loadBalancerFrontendIPConfiguration.id",
            ),
            ip_address: str_at(address, "properties.ipAddress"),
            virtual_network_id: str_at(address, "properties.virtualNetwork.id"),
            inbound_nat_rule_port_mapping: mappings,
        })
    }

    /// Reject pools of a Basic load balancer, which has no address API.
    fn check_sku(client: &Client, ctx: &OperationContext<'_>, pool: &ResourceId) -> Result<()> {
        let Some(lb) = pool.parent() else {
            return Ok(());
        };
        let model = fetch(client, ctx, &lb.to_string())?;
        if str_at(&model, "sku.name").eq_ignore_ascii_case("Basic") {
            return Err(Error::validation(
                "backend_address_pool_id",
                format!("backend addresses are not supported on Basic SKU load balancer {lb}"),
            ));
        }
        Ok(())
    }

    /// Rewrite the parent pool of `id` under its lock.
    fn mutate_pool<F>(ctx: &OperationContext<'_>, id: &ResourceId, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Value>) -> Result<bool>,
    {
        let client = ctx.client(API_VERSION);
        let pool_id = id
            .parent()
            .ok_or_else(|| Error::decode("backend address id", "missing pool"))?
            .to_string();

        let _guard = lock_by_name(&pool_id, POOL_LOCK_KIND)?;
        let mut pool = fetch(&client, ctx, &pool_id)?;
        if !mutate(addresses_mut(&mut pool)?)? {
            return Ok(());
        }
        clear_server_managed(&mut pool);

        let resp = client.create_or_update(ctx.context(), &pool_id, &pool)?;
        ctx.wait(&client, &resp, &pool_id)
    }

}

impl ResourceKind for BackendAddress {
    fn type_name(&self) -> &'static str {
        "azurerm_lb_backend_address_pool_address"
    }

    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn id_pattern(&self) -> &'static IdPattern {
        &BACKEND_ADDRESS_ID
    }

    fn api_version(&self) -> &'static str {
        API_VERSION
    }

    fn description(&self) -> &'static str {
        "Address in a load balancer backend pool"
    }

    /// Derived from the pool id, which may name another subscription.
    fn resource_id(&self, _subscription_id: &str, data: &ResourceData) -> Result<ResourceId> {
        let pool = ResourceId::parse(&BACKEND_POOL_ID, data.get_str("backend_address_pool_id"))?;
        Ok(pool.child(&BACKEND_ADDRESS_ID, &[data.get_str("name")])?)
    }

    fn exists(&self, ctx: &OperationContext<'_>, id: &ResourceId) -> Result<bool> {
        let Some(pool_id) = id.parent() else {
            return Ok(false);
        };
        let client = ctx.client(API_VERSION);
        match fetch(&client, ctx, &pool_id.to_string()) {
            Ok(pool) => Ok(find(&pool, id.name()).is_some()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn create(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = self.resource_id(ctx.subscription_id(), data)?;
        if let Some(pool) = id.parent() {
            Self::check_sku(&ctx.client(API_VERSION), ctx, &pool)?;
        }

        let address = Self::expand(data);
        let name = id.name().to_string();
        Self::mutate_pool(ctx, &id, |addresses| {
            // another writer may have added it since the existence check
            if addresses
                .iter()
                .any(|a| str_at(a, "name").eq_ignore_ascii_case(&name))
            {
                return Err(Error::AlreadyExists { id: id.to_string() });
            }
            addresses.push(address);
            Ok(true)
        })?;

        data.set_id(id.to_string());
        Ok(())
    }

    fn read(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = ResourceId::parse(&BACKEND_ADDRESS_ID, data.require_id()?)?;
        let pool_id = id
            .parent()
            .ok_or_else(|| Error::decode("backend address id", "missing pool"))?;
        let client = ctx.client(API_VERSION);
        let pool = fetch(&client, ctx, &pool_id.to_string())?;

        let Some(address) = find(&pool, id.name()) else {
            log::info!("{id} is no longer in its pool, removing from state");
            data.mark_gone();
            return Ok(());
        };
        data.encode(&Self::flatten(&id, address)?)
    }

    fn update(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = ResourceId::parse(&BACKEND_ADDRESS_ID, data.require_id()?)?;
        let updated = Self::expand(data);
        Self::mutate_pool(ctx, &id, |addresses| {
            let Some(slot) = addresses
                .iter_mut()
                .find(|a| str_at(a, "name").eq_ignore_ascii_case(id.name()))
            else {
                return Err(Error::GoneAfterWrite { id: id.to_string() });
            };
            Self::merge(slot, updated)?;
            Ok(true)
        })
    }

    fn delete(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = ResourceId::parse(&BACKEND_ADDRESS_ID, data.require_id()?)?;
        Self::mutate_pool(ctx, &id, |addresses| {
            let before = addresses.len();
            addresses.retain(|a| !str_at(a, "name").eq_ignore_ascii_case(id.name()));
            Ok(addresses.len() != before)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{SUBSCRIPTION, assert_reads_back, obj, planned};
    use armclient::{
        DEFAULT_ENDPOINT, Method, MockReply, MockTransport, RecordingWaiter, Request, Response,
        Transport,
    };
    use declarative::{Engine, InstanceState, Timeouts};
    use declarative::locks::is_locked;
    use std::sync::Mutex;

    fn lb_path() -> String {
        format!(
            "/subscriptions/{SUBSCRIPTION}/resourceGroups/example-rg/providers/Microsoft.Network/loadBalancers/example-lb"
        )
    }

    fn pool_path() -> String {
        format!("{}/backendAddressPools/backend", lb_path())
    }

    fn address_path(name: &str) -> String {
        format!("{}/addresses/{name}", pool_path())
    }

    fn vnet_id() -> String {
        format!(
            "/subscriptions/{SUBSCRIPTION}/resourceGroups/example-rg/providers/Microsoft.Network/virtualNetworks/example-vnet"
        )
    }

    fn pool_model(addresses: Value) -> Value {
        json!({
            "id": pool_path(),
            "name": "backend",
            "etag": "W/\"1\"",
            "systemData": {"createdBy": "ops@example.com"},
            "properties": {
                "loadBalancerBackendAddresses": addresses,
                "provisioningState": "Succeeded"
            }
        })
    }

    fn pool(addresses: Value) -> MockReply {
        MockReply::json(200, pool_model(addresses))
    }

    fn address(name: &str, ip: &str) -> Value {
        json!({
            "name": name,
            "properties": {
                "ipAddress": ip,
                "virtualNetwork": {"id": vnet_id()},
                "inboundNatRulesPortMapping": [
                    {"inboundNatRuleName": "ssh", "frontendPort": 2201, "backendPort": 22}
                ]
            }
        })
    }

    fn config(name: &str, ip: &str) -> Map<String, Value> {
        obj(json!({
            "name": name,
            "backend_address_pool_id": pool_path(),
            "ip_address": ip,
            "virtual_network_id": vnet_id()
        }))
    }

    fn assert_server_managed_cleared(put: &Value) {
        assert!(put.get("etag").is_none());
        assert!(put.get("systemData").is_none());
        assert!(put["properties"].get("provisioningState").is_none());
    }

    /// Records, for every PUT, whether the pool lock was held.
    #[derive(Clone)]
    struct LockRecorder {
        inner: MockTransport,
        held: Arc<Mutex<Vec<bool>>>,
    }

    impl Transport for LockRecorder {
        fn send(&self, request: &Request) -> armclient::Result<Response> {
            if request.method == Method::Put {
                let locked = is_locked(&pool_path(), POOL_LOCK_KIND);
                self.held.lock().unwrap().push(locked);
            }
            self.inner.send(request)
        }
    }

    fn engine_over(transport: Arc<dyn Transport>) -> Engine {
        let client = Client::new(transport, DEFAULT_ENDPOINT);
        Engine::new(client, SUBSCRIPTION).with_waiter(Arc::new(RecordingWaiter::new()))
    }

    #[test]
    fn test_create_holds_pool_lock_during_write() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, &lb_path(), MockReply::json(200, json!({"sku": {"name": "Standard"}})));
        mock.reply(Method::Get, &pool_path(), pool(json!([address("a1", "10.0.0.4")])));
        mock.reply(Method::Get, &pool_path(), pool(json!([address("a1", "10.0.0.4")])));
        mock.reply(
            Method::Get,
            &pool_path(),
            pool(json!([address("a1", "10.0.0.4"), address("a2", "10.0.0.5")])),
        );
        mock.reply(Method::Put, &pool_path(), MockReply::json(200, json!({})));

        let recorder = LockRecorder {
            inner: mock.clone(),
            held: Arc::new(Mutex::new(Vec::new())),
        };
        let created = engine_over(Arc::new(recorder.clone()))
            .create(
                &BackendAddress,
                "azurerm_lb_backend_address_pool_address.a2",
                &config("a2", "10.0.0.5"),
                &Timeouts::default(),
            )
            .unwrap();

        assert_eq!(*recorder.held.lock().unwrap(), vec![true]);

        let put = mock.requests_to(Method::Put, &pool_path())[0].json().unwrap();
        assert_server_managed_cleared(&put);
        let addresses = put["properties"]["loadBalancerBackendAddresses"].as_array().unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[1]["properties"]["ipAddress"], "10.0.0.5");

        assert_eq!(created.id, address_path("a2"));
        assert_eq!(created.attributes["inbound_nat_rule_port_mapping"][0]["frontend_port"], 2201);
    }

    #[test]
    fn test_create_existing_address_requires_import() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, &pool_path(), pool(json!([address("a1", "10.0.0.4")])));

        let err = engine_over(Arc::new(mock.clone()))
            .create(
                &BackendAddress,
                "azurerm_lb_backend_address_pool_address.a1",
                &config("a1", "10.0.0.4"),
                &Timeouts::default(),
            )
            .unwrap_err();
        assert!(matches!(err.source, Error::AlreadyExists { .. }));
        assert!(mock.requests_with(Method::Put).is_empty());
    }

    #[test]
    fn test_basic_sku_is_rejected() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, &pool_path(), pool(json!([])));
        mock.reply(Method::Get, &lb_path(), MockReply::json(200, json!({"sku": {"name": "Basic"}})));

        let err = engine_over(Arc::new(mock.clone()))
            .create(
                &BackendAddress,
                "azurerm_lb_backend_address_pool_address.a1",
                &config("a1", "10.0.0.4"),
                &Timeouts::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Basic SKU"));
        assert!(mock.requests_with(Method::Put).is_empty());
    }

    #[test]
    fn test_read_missing_address_clears_state() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, &pool_path(), pool(json!([address("a1", "10.0.0.4")])));

        let state = InstanceState::new(address_path("gone"), config("gone", "10.0.0.9"));
        let refreshed = engine_over(Arc::new(mock))
            .read(&BackendAddress, &state, &Timeouts::default())
            .unwrap();
        assert!(refreshed.is_none());
    }

    #[test]
    fn test_delete_removes_only_its_address() {
        let mock = MockTransport::new();
        mock.reply(
            Method::Get,
            &pool_path(),
            pool(json!([address("a1", "10.0.0.4"), address("a2", "10.0.0.5")])),
        );
        mock.reply(Method::Put, &pool_path(), MockReply::json(200, json!({})));

        let state = InstanceState::new(address_path("a2"), config("a2", "10.0.0.5"));
        engine_over(Arc::new(mock.clone()))
            .delete(&BackendAddress, &state, &Timeouts::default())
            .unwrap();

        let put = mock.requests_to(Method::Put, &pool_path())[0].json().unwrap();
        assert_server_managed_cleared(&put);
        let addresses = put["properties"]["loadBalancerBackendAddresses"].as_array().unwrap();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0]["name"], "a1");
    }

    #[test]
    fn test_ip_address_requires_virtual_network() {
        let mut config = config("a1", "10.0.0.4");
        config.remove("virtual_network_id");
        let err = engine_over(Arc::new(MockTransport::new()))
            .plan(
                &BackendAddress,
                "azurerm_lb_backend_address_pool_address.a1",
                None,
                Some(&config),
                &Timeouts::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("virtual_network_id"));
    }

    #[test]
    fn test_update_keeps_unmodelled_pool_and_address_fields() {
        let mut existing = address("a1", "10.0.0.4");
        existing["properties"]["adminState"] = json!("Up");
        let mut current = pool_model(json!([existing, address("a2", "10.0.0.5")]));
        current["properties"]["drainPeriodInSeconds"] = json!(30);

        let mock = MockTransport::new();
        mock.reply(Method::Get, &pool_path(), MockReply::json(200, current));
        mock.reply(Method::Put, &pool_path(), MockReply::json(200, json!({})));
        mock.reply(
            Method::Get,
            &pool_path(),
            pool(json!([address("a1", "10.0.0.6"), address("a2", "10.0.0.5")])),
        );

        let prior = InstanceState::new(address_path("a1"), config("a1", "10.0.0.4"));
        let updated = engine_over(Arc::new(mock.clone()))
            .update(&BackendAddress, &prior, &config("a1", "10.0.0.6"), &Timeouts::default())
            .unwrap();
        assert_eq!(updated.attributes["ip_address"], "10.0.0.6");

        let put = mock.requests_to(Method::Put, &pool_path())[0].json().unwrap();
        assert_server_managed_cleared(&put);
        assert_eq!(put["properties"]["drainPeriodInSeconds"], 30);
        let addresses = put["properties"]["loadBalancerBackendAddresses"].as_array().unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0]["properties"]["ipAddress"], "10.0.0.6");
        assert_eq!(addresses[0]["properties"]["adminState"], "Up");
        assert_eq!(addresses[0]["properties"]["virtualNetwork"]["id"], vnet_id());
        assert_eq!(addresses[1]["properties"]["ipAddress"], "10.0.0.5");
    }

    #[test]
    fn test_update_switches_target_form() {
        let mut slot = address("a1", "10.0.0.4");
        let frontend = format!("{}/frontendIPConfigurations/fe", lb_path());
        BackendAddress::merge(
            &mut slot,
            json!({"name": "a1", "properties": {"loadBalancerFrontendIPConfiguration": {"id": frontend}}}),
        )
        .unwrap();

        let props = &slot["properties"];
        assert_eq!(props["loadBalancerFrontendIPConfiguration"]["id"], frontend);
        assert!(props.get("ipAddress").is_none());
        assert!(props.get("virtualNetwork").is_none());
        assert!(props.get("inboundNatRulesPortMapping").is_some());
    }

    #[test]
    fn test_flatten_reads_back_expanded_config() {
        let config = config("a1", "10.0.0.4");
        let data = planned(&BackendAddress, &config);
        let id = BackendAddress.resource_id(SUBSCRIPTION, &data).unwrap();
        let flattened = BackendAddress::flatten(&id, &BackendAddress::expand(&data)).unwrap();
        assert_reads_back(&BackendAddress, &config, &flattened, &[]);
    }
}
