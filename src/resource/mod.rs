//! Resource kinds managed by armsync.
//!
//! Each module declares its id patterns, schema and lifecycle hooks and
//! exposes a `kinds()` list; [`registry`] appends those lists once at
//! start-up.

pub mod apim_workspace_api;
pub mod compute_fleet;
pub mod lb_backend_address;
pub mod mongo_cluster;
pub mod quota;

#[cfg(test)]
pub mod testing;

use anyhow::Result;
use armclient::Client;
use declarative::{OperationContext, Registry, ResourceData};
use serde_json::{Map, Value};
use std::sync::OnceLock;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Build the registry of every kind.
pub fn build_registry() -> declarative::Result<Registry> {
    Registry::builder()
        .extend(apim_workspace_api::kinds())
        .extend(compute_fleet::kinds())
        .extend(lb_backend_address::kinds())
        .extend(mongo_cluster::kinds())
        .extend(quota::kinds())
        .build()
}

/// The process-wide registry, built on first use.
pub fn registry() -> Result<&'static Registry> {
    if let Some(registry) = REGISTRY.get() {
        return Ok(registry);
    }
    let built = build_registry()?;
    Ok(REGISTRY.get_or_init(|| built))
}

/// `GET` a resource and return its model, or an empty object for an empty
/// body.
pub fn fetch(client: &Client, ctx: &OperationContext<'_>, id: &str) -> declarative::Result<Value> {
    let response = client.get(ctx.context(), id)?;
    Ok(response
        .model
        .unwrap_or_else(|| Value::Object(Map::new())))
}

/// Azure's canonical form of a location: lower case, no spaces.
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

/// The location to record: the configured spelling when it names the same
/// region as the remote one.
pub fn location_from(data: &ResourceData, remote: &str) -> String {
    let configured = data.get_str("location");
    if normalize_location(configured) == normalize_location(remote) {
        configured.to_string()
    } else {
        normalize_location(remote)
    }
}

/// Tags as written by the user, for the remote payload.
pub fn expand_tags(data: &ResourceData) -> Value {
    data.get("tags")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}
