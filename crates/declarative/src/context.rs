//! Operation context and provider traits
//!
//! [`OperationContext`] is what a lifecycle hook gets: the remote client,
//! the hook's cancellation context (token plus deadline) and the waiter
//! used between polls. The callback traits let the executor report
//! progress without depending on a UI framework.

use crate::error::Result;
use crate::types::ApplyResult;
use armclient::{Client, Context, OperationResponse, Waiter};

/// Everything a hook needs to talk to the remote side.
pub struct OperationContext<'a> {
    client: &'a Client,
    subscription_id: &'a str,
    ctx: Context,
    waiter: &'a dyn Waiter,
}

impl<'a> OperationContext<'a> {
    /// Create an operation context
    pub fn new(
        client: &'a Client,
        subscription_id: &'a str,
        ctx: Context,
        waiter: &'a dyn Waiter,
    ) -> Self {
        Self {
            client,
            subscription_id,
            ctx,
            waiter,
        }
    }

    /// A client for one api-version. Build it once per hook.
    pub fn client(&self, api_version: &str) -> Client {
        self.client.for_api(api_version)
    }

    /// Subscription the engine manages.
    pub fn subscription_id(&self) -> &str {
        self.subscription_id
    }

    /// The hook's cancellation context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Drive the operation started by `initial` on `path` to completion.
    pub fn wait(&self, client: &Client, initial: &OperationResponse, path: &str) -> Result<()> {
        client.wait(&self.ctx, self.waiter, initial, path)?;
        Ok(())
    }
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when starting to apply a batch of resources
    fn on_batch_start(&mut self, count: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, address: &str, description: &str);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, address: &str, result: &ApplyResult);

    /// Called when a batch completes
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _address: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _address: &str, _result: &ApplyResult) {}
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}
