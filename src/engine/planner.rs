//! Execution planner - turns configuration and recorded state into diffs

use crate::config::Config;
use crate::state::StateFile;
use declarative::planner::{matches_filter, parse_target};
use declarative::{Change, Engine, ExecutionPlan, Registry};

/// A plan plus the resources that could not be planned.
#[derive(Debug, Default)]
pub struct Planned {
    pub plan: ExecutionPlan,
    /// `(address, message)` for every resource that failed validation
    pub errors: Vec<(String, String)>,
}

impl Planned {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn reject(&mut self, address: &str, message: impl Into<String>) {
        self.errors.push((address.to_string(), message.into()));
    }
}

/// Check an address against a `type` or `type.name` target
pub fn target_matches(target: Option<&str>, address: &str) -> bool {
    match target {
        None => true,
        Some(target) => {
            let (resource_type, name) = parse_target(target);
            matches_filter(address, resource_type.as_deref(), name.as_deref())
        }
    }
}

/// Plan every configured resource, plus the removal of recorded resources
/// that are no longer configured.
pub fn plan_apply(
    engine: &Engine,
    registry: &Registry,
    config: &Config,
    state: &StateFile,
    target: Option<&str>,
) -> Planned {
    let mut planned = Planned::default();

    for resource in &config.resources {
        let address = resource.address();
        if !target_matches(target, &address) {
            continue;
        }
        let Some(kind) = registry.get(&resource.resource_type) else {
            planned.reject(&address, format!("unknown resource type: {}", resource.resource_type));
            continue;
        };

        let prior = state.instance(&address);
        if let Some(entry) = state.get(&address)
            && entry.resource_type != resource.resource_type
        {
            planned.reject(
                &address,
                format!("state records type {}, config says {}", entry.resource_type, resource.resource_type),
            );
            continue;
        }

        let timeouts = resource.timeouts.apply(kind.timeouts());
        match engine.plan(kind.as_ref(), &address, prior.as_ref(), Some(&resource.attributes), &timeouts) {
            Ok(diff) => planned.plan.push(Change::new(kind.clone(), diff).with_timeouts(timeouts)),
            Err(err) => planned.reject(&address, err.to_string()),
        }
    }

    let orphans: Vec<&String> = state
        .resources
        .keys()
        .filter(|address| config.resource(address).is_none())
        .collect();
    for address in orphans {
        plan_removal(&mut planned, engine, registry, config, state, address, target);
    }

    planned
}

/// Plan the removal of every recorded resource.
pub fn plan_destroy(
    engine: &Engine,
    registry: &Registry,
    config: &Config,
    state: &StateFile,
    target: Option<&str>,
) -> Planned {
    let mut planned = Planned::default();
    for address in state.resources.keys() {
        plan_removal(&mut planned, engine, registry, config, state, address, target);
    }
    planned
}

fn plan_removal(
    planned: &mut Planned,
    engine: &Engine,
    registry: &Registry,
    config: &Config,
    state: &StateFile,
    address: &str,
    target: Option<&str>,
) {
    if !target_matches(target, address) {
        return;
    }
    let Some(entry) = state.get(address) else {
        return;
    };
    let Some(kind) = registry.get(&entry.resource_type) else {
        planned.reject(address, format!("unknown resource type: {}", entry.resource_type));
        return;
    };

    let timeouts = config
        .resource(address)
        .map_or(kind.timeouts(), |r| r.timeouts.apply(kind.timeouts()));
    let prior = entry.instance();
    match engine.plan(kind.as_ref(), address, Some(&prior), None, &timeouts) {
        Ok(diff) => planned.plan.push(Change::new(kind.clone(), diff).with_timeouts(timeouts)),
        Err(err) => planned.reject(address, err.to_string()),
    }
}
