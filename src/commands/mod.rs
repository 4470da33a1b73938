//! Subcommands.
//!
//! Every command that touches remote resources opens a [`Session`]: the
//! loaded config, the recorded state and an engine for the configured
//! subscription.

pub mod apply;
pub mod destroy;
pub mod import;
pub mod plan;
pub mod refresh;
pub mod resources;

use crate::Context;
use crate::config::Config;
use crate::resource;
use crate::state::StateFile;
use anyhow::{Context as AnyhowContext, Result};
use declarative::{Engine, ExecuteReport, ExecutionPlan, Registry};
use std::path::PathBuf;

pub struct Session {
    pub config: Config,
    pub state: StateFile,
    pub state_path: PathBuf,
    pub engine: Engine,
    pub registry: &'static Registry,
}

impl Session {
    /// Load config and state and connect to the subscription.
    pub fn open(ctx: &Context) -> Result<Self> {
        let config_path = Config::resolve_path(ctx.config.as_deref())?;
        let config = Config::load(&config_path)?;
        let state_path = config.state_path();
        let state = StateFile::load(&state_path)?;
        let engine = config.engine()?;
        let registry = resource::registry().context("Failed to build resource registry")?;
        Ok(Self {
            config,
            state,
            state_path,
            engine,
            registry,
        })
    }

    /// Persist the recorded state.
    pub fn save(&mut self) -> Result<()> {
        self.state.save(&self.state_path)
    }

    /// Record every outcome of a run in state.
    pub fn record(&mut self, plan: &ExecutionPlan, report: &ExecuteReport) {
        for (address, outcome) in &report.outcomes {
            let Some(change) = plan.changes.iter().find(|c| &c.address == address) else {
                continue;
            };
            self.state
                .record(address, change.kind.type_name(), outcome.state.clone());
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::resource::testing::{SUBSCRIPTION, engine};
    use armclient::MockTransport;

    /// A session over `mock` whose state lives in `dir`.
    pub fn session(mock: &MockTransport, dir: &std::path::Path, resources: &str) -> Session {
        let mut config =
            Config::parse(&format!("[provider]\nsubscription_id = \"{SUBSCRIPTION}\"\n{resources}"))
                .unwrap();
        config.path = dir.join(crate::config::CONFIG_FILE);
        Session {
            state_path: config.state_path(),
            config,
            state: StateFile::default(),
            engine: engine(mock),
            registry: resource::registry().unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::session;
    use crate::engine::executor::{RunOptions, run};
    use crate::engine::planner::plan_apply;
    use crate::resource::testing::async_op;
    use crate::state::StateFile;
    use armclient::{Method, MockReply, MockTransport};
    use serde_json::json;

    const QUOTA_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/providers/Microsoft.Compute/locations/westeurope/providers/Microsoft.Quota/quotas/standardDSv3Family";
    const USAGE_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/providers/Microsoft.Compute/locations/westeurope/providers/Microsoft.Quota/usages/standardDSv3Family";

    const QUOTA: &str = r#"
[[resource]]
type = "azurerm_quota"
name = "cores"
[resource.attributes]
name = "standardDSv3Family"
resource_provider = "Microsoft.Compute"
location = "westeurope"
limit_value = 150
"#;

    #[test]
    fn test_apply_records_and_saves_state() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        mock.reply(Method::Patch, QUOTA_ID, async_op(&mock, "/operations/q1"));
        mock.reply(
            Method::Get,
            QUOTA_ID,
            MockReply::json(200, json!({ "properties": { "limit": { "value": 150 } } })),
        );
        mock.reply(
            Method::Get,
            USAGE_ID,
            MockReply::json(200, json!({ "properties": { "usages": { "value": 12 } } })),
        );

        let mut session = session(&mock, dir.path(), QUOTA);
        let planned = plan_apply(&session.engine, session.registry, &session.config, &session.state, None);
        assert!(planned.is_valid());

        let opts = RunOptions {
            yes: true,
            ..RunOptions::default()
        };
        let report = run(&session.engine, &planned.plan, &opts).unwrap().unwrap();
        assert_eq!(report.summary.created, 1);

        session.record(&planned.plan, &report);
        session.save().unwrap();

        let saved = StateFile::load(&dir.path().join(crate::config::STATE_FILE)).unwrap();
        let entry = saved.get("azurerm_quota.cores").unwrap();
        assert_eq!(entry.id, QUOTA_ID);
        assert_eq!(entry.attributes["current_usage"], 12);

        // A second plan against the saved state has nothing to do.
        session.state = saved;
        let again = plan_apply(&session.engine, session.registry, &session.config, &session.state, None);
        assert_eq!(again.plan.total_changes(), 0);
    }
}
