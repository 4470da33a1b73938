//! `refresh` - re-read recorded resources and update state

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::InstanceState;
use rayon::prelude::*;

use super::Session;
use crate::Context;
use crate::cli::TargetArgs;
use crate::engine::planner::target_matches;
use crate::ui;

/// What a refresh found.
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub refreshed: usize,
    /// Addresses whose remote object no longer exists
    pub gone: Vec<String>,
    /// `(address, message)` for reads that failed
    pub failed: Vec<(String, String)>,
}

enum ReadResult {
    Found(String, String, InstanceState),
    Gone(String),
    Failed(String, String),
}

pub fn run(ctx: &Context, args: TargetArgs) -> Result<()> {
    let mut session = Session::open(ctx)?;
    if session.state.resources.is_empty() {
        ui::info("No resources in state");
        return Ok(());
    }

    let summary = refresh_state(&mut session, args.target.as_deref());
    session.save()?;

    if !ctx.quiet {
        print_summary(&summary);
    }
    if !summary.failed.is_empty() {
        bail!("{} resources could not be refreshed", summary.failed.len());
    }
    Ok(())
}

/// Read every recorded resource matching `target` in parallel; resources
/// that disappeared are dropped from state.
pub fn refresh_state(session: &mut Session, target: Option<&str>) -> RefreshSummary {
    let entries: Vec<(String, String, InstanceState)> = session
        .state
        .resources
        .iter()
        .filter(|(address, _)| target_matches(target, address))
        .map(|(address, entry)| (address.clone(), entry.resource_type.clone(), entry.instance()))
        .collect();

    let engine = &session.engine;
    let registry = session.registry;
    let config = &session.config;
    let results: Vec<ReadResult> = entries
        .into_par_iter()
        .map(|(address, resource_type, prior)| {
            let Some(kind) = registry.get(&resource_type) else {
                return ReadResult::Failed(address, format!("unknown resource type: {resource_type}"));
            };
            let timeouts = config
                .resource(&address)
                .map_or(kind.timeouts(), |r| r.timeouts.apply(kind.timeouts()));
            match engine.read(kind.as_ref(), &prior, &timeouts) {
                Ok(Some(state)) => ReadResult::Found(address, resource_type, state),
                Ok(None) => ReadResult::Gone(address),
                Err(err) => ReadResult::Failed(address, err.to_string()),
            }
        })
        .collect();

    let mut summary = RefreshSummary::default();
    for result in results {
        match result {
            ReadResult::Found(address, resource_type, state) => {
                session.state.record(&address, &resource_type, Some(state));
                summary.refreshed += 1;
            }
            ReadResult::Gone(address) => {
                log::info!("{address} no longer exists, removing from state");
                session.state.record(&address, "", None);
                summary.gone.push(address);
            }
            ReadResult::Failed(address, message) => summary.failed.push((address, message)),
        }
    }
    summary
}

fn print_summary(summary: &RefreshSummary) {
    for address in &summary.gone {
        ui::warn(&format!("{} was deleted outside armsync", address.bold()));
    }
    for (address, message) in &summary.failed {
        ui::error(&format!("{}: {message}", address.bold()));
    }
    ui::success(&format!("Refreshed {} resources", summary.refreshed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::session;
    use armclient::{Method, MockReply, MockTransport};
    use serde_json::json;

    const CLUSTER_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DocumentDB/mongoClusters/mc";

    fn recorded(session: &mut Session) {
        let attributes = json!({
            "name": "mc",
            "resource_group_name": "rg",
            "location": "westeurope",
            "administrator_login_password": "s3cret!",
        });
        session.state.record(
            "azurerm_mongo_cluster.primary",
            "azurerm_mongo_cluster",
            Some(InstanceState::new(CLUSTER_ID, attributes.as_object().cloned().unwrap())),
        );
    }

    #[test]
    fn test_gone_resource_removed_from_state() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        mock.reply(
            Method::Get,
            CLUSTER_ID,
            MockReply::json(404, json!({"error": {"code": "ResourceNotFound", "message": "gone"}})),
        );
        let mut session = session(&mock, dir.path(), "");
        recorded(&mut session);

        let summary = refresh_state(&mut session, None);
        assert_eq!(summary.gone, vec!["azurerm_mongo_cluster.primary".to_string()]);
        assert!(session.state.resources.is_empty());
    }

    #[test]
    fn test_failed_read_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        mock.reply(
            Method::Get,
            CLUSTER_ID,
            MockReply::json(403, json!({"error": {"code": "AuthorizationFailed", "message": "denied"}})),
        );
        let mut session = session(&mock, dir.path(), "");
        recorded(&mut session);

        let summary = refresh_state(&mut session, None);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].1.contains("AuthorizationFailed"));
        assert!(session.state.get("azurerm_mongo_cluster.primary").is_some());
    }

    #[test]
    fn test_target_limits_reads() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        let mut session = session(&mock, dir.path(), "");
        recorded(&mut session);

        let summary = refresh_state(&mut session, Some("azurerm_quota"));
        assert_eq!(summary.refreshed, 0);
        assert!(mock.requests().is_empty());
        let entry = session.state.get("azurerm_mongo_cluster.primary").unwrap();
        assert_eq!(entry.attributes["administrator_login_password"], "s3cret!");
    }
}
