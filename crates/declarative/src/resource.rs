//! The contract a resource kind implements.
//!
//! A kind supplies its schema, id pattern and five lifecycle hooks. The
//! engine owns everything around them: validation, requires-import checks,
//! deadlines, error attribution and the re-read after a write.

use crate::context::OperationContext;
use crate::data::ResourceData;
use crate::diff::ResourceDiff;
use crate::error::Result;
use crate::schema::Schema;
use crate::types::Timeouts;
use resourceid::{IdPattern, ResourceId};
use std::sync::Arc;

/// Core trait for reconciled resource kinds
///
/// Hooks receive a [`ResourceData`] and write the outcome into it:
///
/// - `create` performs the remote writes; the engine records the id
///   returned by [`ResourceKind::resource_id`] unless the hook set one
/// - `read` flattens the remote object with [`ResourceData::encode`], or
///   calls [`ResourceData::mark_gone`] when it no longer exists
/// - `update` applies the changed fields to the fetched remote model
/// - `delete` removes the remote object; a 404 counts as success
pub trait ResourceKind: Send + Sync {
    /// Type name used in configuration, e.g. `azurerm_quota`.
    fn type_name(&self) -> &'static str;

    /// User-visible schema.
    fn schema(&self) -> &'static Schema;

    /// Pattern of the remote id.
    fn id_pattern(&self) -> &'static IdPattern;

    /// api-version of the kind's remote operations.
    fn api_version(&self) -> &'static str;

    /// One-line description, for listings.
    fn description(&self) -> &'static str {
        ""
    }

    /// Default hook deadlines.
    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Whether create must fail when the object already exists.
    fn requires_import(&self) -> bool {
        true
    }

    /// Validate an id given for import.
    fn validate_id(&self, id: &str) -> Result<ResourceId> {
        Ok(ResourceId::parse(self.id_pattern(), id)?)
    }

    /// The id a create will produce, derived from configuration.
    fn resource_id(&self, subscription_id: &str, data: &ResourceData) -> Result<ResourceId>;

    /// Whether the object already exists remotely.
    fn exists(&self, ctx: &OperationContext<'_>, id: &ResourceId) -> Result<bool> {
        let client = ctx.client(self.api_version());
        match client.get(ctx.context(), &id.to_string()) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Cross-field validation of a proposed diff.
    fn customize_diff(&self, _diff: &ResourceDiff) -> Result<()> {
        Ok(())
    }

    fn create(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()>;

    fn read(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()>;

    fn update(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()>;

    fn delete(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()>;
}

/// A shared, type-erased resource kind
pub type BoxedKind = Arc<dyn ResourceKind>;
