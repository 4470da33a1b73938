//! `import` - bring an existing remote resource under management

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, address: &str, id: &str) -> Result<()> {
    let mut session = Session::open(ctx)?;
    import_into(&mut session, address, id)?;
    session.save()?;

    if session.config.resource(address).is_none() {
        ui::warn(&format!(
            "{} is not in {}; the next apply will destroy it",
            address.bold(),
            session.config.path.display()
        ));
    }
    ui::success(&format!("Imported {}", address.bold()));
    ui::kv("id", id);
    Ok(())
}

/// Read `id` and record it under `address`.
pub fn import_into(session: &mut Session, address: &str, id: &str) -> Result<()> {
    let Some((resource_type, name)) = address.split_once('.') else {
        bail!("invalid address '{address}': expected type.name");
    };
    if name.is_empty() || name.contains('.') {
        bail!("invalid address '{address}': expected type.name");
    }
    let Some(kind) = session.registry.get(resource_type) else {
        bail!("unknown resource type: {resource_type}");
    };

    if session.state.get(address).is_some() {
        bail!("{address} is already managed; remove it from state before importing again");
    }
    if let Some(other) = session.state.address_of(id) {
        bail!("{id} is already managed as {other}");
    }

    let timeouts = session
        .config
        .resource(address)
        .map_or(kind.timeouts(), |r| r.timeouts.apply(kind.timeouts()));
    let state = session
        .engine
        .import(kind.as_ref(), id, &timeouts)
        .with_context(|| format!("Failed to import {address}"))?;

    log::info!("imported {address} as {}", state.id);
    session.state.record(address, resource_type, Some(state));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::session;
    use armclient::{Method, MockReply, MockTransport};
    use serde_json::json;

    const QUOTA_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/providers/Microsoft.Compute/locations/westeurope/providers/Microsoft.Quota/quotas/standardDSv3Family";
    const USAGE_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/providers/Microsoft.Compute/locations/westeurope/providers/Microsoft.Quota/usages/standardDSv3Family";

    fn quota_replies(mock: &MockTransport) {
        mock.reply(
            Method::Get,
            QUOTA_ID,
            MockReply::json(200, json!({
                "id": QUOTA_ID,
                "properties": { "limit": { "limitObjectType": "LimitValue", "value": 100 } }
            })),
        );
        mock.reply(
            Method::Get,
            USAGE_ID,
            MockReply::json(200, json!({ "properties": { "usages": { "value": 12 } } })),
        );
    }

    #[test]
    fn test_import_records_state() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        quota_replies(&mock);
        let mut session = session(&mock, dir.path(), "");

        import_into(&mut session, "azurerm_quota.cores", QUOTA_ID).unwrap();
        let entry = session.state.get("azurerm_quota.cores").unwrap();
        assert_eq!(entry.resource_type, "azurerm_quota");
        assert_eq!(entry.attributes["limit_value"], 100);
        assert_eq!(entry.attributes["location"], "westeurope");
    }

    #[test]
    fn test_import_rejects_invalid_address_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        let mut session = session(&mock, dir.path(), "");

        let err = import_into(&mut session, "azurerm_quota", QUOTA_ID).unwrap_err();
        assert!(err.to_string().contains("expected type.name"));

        let err = import_into(&mut session, "azurerm_widget.x", QUOTA_ID).unwrap_err();
        assert!(err.to_string().contains("unknown resource type"));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_import_rejects_mismatched_id() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        let mut session = session(&mock, dir.path(), "");

        let err = import_into(
            &mut session,
            "azurerm_mongo_cluster.primary",
            QUOTA_ID,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to import"));
        assert!(mock.requests().is_empty());
        assert!(session.state.resources.is_empty());
    }

    #[test]
    fn test_import_twice_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        quota_replies(&mock);
        let mut session = session(&mock, dir.path(), "");

        import_into(&mut session, "azurerm_quota.cores", QUOTA_ID).unwrap();
        let err = import_into(&mut session, "azurerm_quota.other", QUOTA_ID).unwrap_err();
        assert!(err.to_string().contains("already managed as azurerm_quota.cores"));
    }
}
