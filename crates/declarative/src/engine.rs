//! The reconciliation engine.
//!
//! The engine wraps a kind's hooks with everything that is the same for
//! every kind:
//!
//! - schema validation and `customize_diff` before any remote call
//! - the requires-import check before create
//! - one deadline per hook, derived from the engine's cancellation token
//! - a re-read after every successful create or update
//! - mark-gone when a read hits a 404, success when a delete does
//! - attribution of every failure to a hook and a resource id

use crate::context::OperationContext;
use crate::data::ResourceData;
use crate::diff::ResourceDiff;
use crate::error::{Error, HookError, Result};
use crate::resource::ResourceKind;
use crate::types::{Action, ApplyResult, Hook, InstanceState, LifecycleState, Timeouts};
use armclient::{CancellationToken, Client, Context, SleepWaiter, Waiter};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Result of applying one diff.
#[derive(Debug)]
pub struct Outcome {
    /// Where the resource ended up.
    pub lifecycle: LifecycleState,
    /// Summary for reporting.
    pub result: ApplyResult,
    /// State to persist; `None` removes the resource from state.
    pub state: Option<InstanceState>,
    /// The failure, if any.
    pub error: Option<HookError>,
}

impl Outcome {
    fn done(lifecycle: LifecycleState, result: ApplyResult, state: Option<InstanceState>) -> Self {
        Self {
            lifecycle,
            result,
            state,
            error: None,
        }
    }

    /// The diff was not applied; recorded state stays as it was.
    pub fn skipped(diff: &ResourceDiff, reason: impl Into<String>) -> Self {
        let state = diff.prior_state();
        let lifecycle = if state.is_some() {
            LifecycleState::Present
        } else {
            LifecycleState::Absent
        };
        Self::done(
            lifecycle,
            ApplyResult::Skipped {
                reason: reason.into(),
            },
            state,
        )
    }

    fn failed(lifecycle: LifecycleState, state: Option<InstanceState>, error: HookError) -> Self {
        Self {
            lifecycle,
            result: ApplyResult::Failed {
                error: error.to_string(),
            },
            state,
            error: Some(error),
        }
    }
}

/// Tracks one reconciliation through the lifecycle state machine.
struct Lifecycle {
    state: LifecycleState,
    id: String,
}

impl Lifecycle {
    fn new(state: LifecycleState, id: impl Into<String>) -> Self {
        Self {
            state,
            id: id.into(),
        }
    }

    fn to(&mut self, next: LifecycleState) -> Result<()> {
        self.state = self.state.transition(next)?;
        log::info!("{}: {next}", self.id);
        Ok(())
    }

    /// Record the state a failed hook leaves behind. The hook's own error is
    /// what gets reported, so an illegal transition here is only logged.
    fn settle(&mut self, next: LifecycleState) {
        if let Err(err) = self.to(next) {
            log::warn!("{}: {err}", self.id);
        }
    }
}

/// Runs lifecycle hooks against one subscription.
pub struct Engine {
    client: Client,
    subscription_id: String,
    waiter: Arc<dyn Waiter>,
    token: CancellationToken,
}

impl Engine {
    /// Create an engine. Polls wait with a [`SleepWaiter`].
    pub fn new(client: Client, subscription_id: impl Into<String>) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
            waiter: Arc::new(SleepWaiter),
            token: CancellationToken::new(),
        }
    }

    /// Use another waiter between polls.
    #[must_use]
    pub fn with_waiter(mut self, waiter: Arc<dyn Waiter>) -> Self {
        self.waiter = waiter;
        self
    }

    /// Share a cancellation token with the caller.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// The token that cancels every running hook.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    fn operation(&self, timeout: Duration) -> OperationContext<'_> {
        let ctx = Context::with_token(self.token.clone()).with_timeout(timeout);
        OperationContext::new(&self.client, &self.subscription_id, ctx, self.waiter.as_ref())
    }

    /// Validate configuration and compute the proposed diff.
    ///
    /// `config` is the raw configuration; `None` plans a destroy.
    pub fn plan(
        &self,
        kind: &dyn ResourceKind,
        address: &str,
        prior: Option<&InstanceState>,
        config: Option<&Map<String, Value>>,
        timeouts: &Timeouts,
    ) -> std::result::Result<ResourceDiff, HookError> {
        let id = prior.map_or(address, |p| p.id.as_str());
        let fail = |e| HookError::new(Hook::Diff, id, e);

        let config = config.map(|c| prepare(kind, c)).transpose().map_err(fail)?;
        let diff = ResourceDiff::compute(address, kind.type_name(), kind.schema(), prior, config.as_ref());

        if diff.planned.is_some() {
            let ctx = Context::with_token(self.token.clone()).with_timeout(timeouts.diff);
            ctx.check().map_err(|e| fail(e.into()))?;
            kind.customize_diff(&diff).map_err(fail)?;
        }

        log::debug!("{address}: {}", diff.action());
        Ok(diff)
    }

    /// Create a resource from raw configuration.
    pub fn create(
        &self,
        kind: &dyn ResourceKind,
        address: &str,
        config: &Map<String, Value>,
        timeouts: &Timeouts,
    ) -> std::result::Result<InstanceState, HookError> {
        let config = prepare(kind, config).map_err(|e| HookError::new(Hook::Create, address, e))?;
        let mut data = ResourceData::new(kind.schema(), None, config);

        let id = kind
            .resource_id(&self.subscription_id, &data)
            .map_err(|e| HookError::new(Hook::Create, address, e))?;
        let id_str = id.to_string();
        let fail = |e| HookError::new(Hook::Create, &id_str, e);

        let mut lifecycle = Lifecycle::new(LifecycleState::Absent, &id_str);
        lifecycle.to(LifecycleState::Creating).map_err(fail)?;

        let op = self.operation(timeouts.create);
        let created = (|| {
            if kind.requires_import() && kind.exists(&op, &id)? {
                return Err(Error::AlreadyExists { id: id_str.clone() });
            }
            kind.create(&op, &mut data)
        })();
        if let Err(err) = created {
            lifecycle.settle(LifecycleState::CreateFailed);
            return Err(fail(err));
        }

        if data.id().is_none() {
            data.set_id(&id_str);
        }
        lifecycle.to(LifecycleState::Present).map_err(fail)?;

        self.reread(kind, data, timeouts)
            .map_err(|e| HookError::new(Hook::Read, &id_str, e))
    }

    /// Refresh a recorded resource. `None` means it is gone.
    pub fn read(
        &self,
        kind: &dyn ResourceKind,
        state: &InstanceState,
        timeouts: &Timeouts,
    ) -> std::result::Result<Option<InstanceState>, HookError> {
        let mut data = ResourceData::from_state(kind.schema(), state);
        self.read_into(kind, &mut data, timeouts)
            .map_err(|e| HookError::new(Hook::Read, &state.id, e))?;
        Ok(data.into_state())
    }

    /// Update a recorded resource in place.
    pub fn update(
        &self,
        kind: &dyn ResourceKind,
        prior: &InstanceState,
        config: &Map<String, Value>,
        timeouts: &Timeouts,
    ) -> std::result::Result<InstanceState, HookError> {
        let fail = |e| HookError::new(Hook::Update, &prior.id, e);
        let config = prepare(kind, config).map_err(fail)?;
        let mut data = ResourceData::new(kind.schema(), Some(prior), config);

        let mut lifecycle = Lifecycle::new(LifecycleState::Present, &prior.id);
        lifecycle.to(LifecycleState::Updating).map_err(fail)?;

        let op = self.operation(timeouts.update);
        if let Err(err) = kind.update(&op, &mut data) {
            lifecycle.settle(LifecycleState::UpdateFailed);
            return Err(fail(err));
        }
        lifecycle.to(LifecycleState::Present).map_err(fail)?;

        self.reread(kind, data, timeouts)
            .map_err(|e| HookError::new(Hook::Read, &prior.id, e))
    }

    /// Delete a recorded resource. A resource that is already gone counts as
    /// deleted.
    pub fn delete(
        &self,
        kind: &dyn ResourceKind,
        state: &InstanceState,
        timeouts: &Timeouts,
    ) -> std::result::Result<(), HookError> {
        let fail = |e| HookError::new(Hook::Delete, &state.id, e);
        let mut data = ResourceData::from_state(kind.schema(), state);

        let mut lifecycle = Lifecycle::new(LifecycleState::Present, &state.id);
        lifecycle.to(LifecycleState::Deleting).map_err(fail)?;

        let op = self.operation(timeouts.delete);
        match kind.delete(&op, &mut data) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => log::info!("{} was already deleted", state.id),
            Err(err) => {
                lifecycle.settle(LifecycleState::Present);
                return Err(fail(err));
            }
        }
        lifecycle.to(LifecycleState::Absent).map_err(fail)
    }

    /// Adopt an existing remote object by id.
    pub fn import(
        &self,
        kind: &dyn ResourceKind,
        id: &str,
        timeouts: &Timeouts,
    ) -> std::result::Result<InstanceState, HookError> {
        let parsed = kind
            .validate_id(id)
            .map_err(|e| HookError::new(Hook::Import, id, e))?;
        let canonical = parsed.to_string();

        let mut data = ResourceData::for_import(kind.schema(), &canonical);
        self.read_into(kind, &mut data, timeouts)
            .map_err(|e| HookError::new(Hook::Import, &canonical, e))?;

        data.into_state().ok_or_else(|| {
            HookError::new(
                Hook::Import,
                &canonical,
                Error::ImportNotFound {
                    id: canonical.clone(),
                },
            )
        })
    }

    /// Apply a planned diff.
    pub fn apply(&self, kind: &dyn ResourceKind, diff: &ResourceDiff, timeouts: &Timeouts) -> Outcome {
        let prior = diff.prior_state();

        let action = diff.action();
        let empty = Map::new();
        let config = match (&diff.config, action) {
            (Some(config), _) => config,
            (None, Action::Delete | Action::NoOp) => &empty,
            (None, _) => {
                let err = HookError::new(
                    Hook::Diff,
                    &diff.address,
                    Error::decode(&diff.address, "planned without configuration"),
                );
                return Outcome::failed(LifecycleState::Absent, prior, err);
            }
        };

        match (action, prior) {
            (Action::NoOp, prior) => {
                let lifecycle = if prior.is_some() {
                    LifecycleState::Present
                } else {
                    LifecycleState::Absent
                };
                Outcome::done(lifecycle, ApplyResult::NoChange, prior)
            }
            (Action::Create, _) => self.apply_create(kind, diff, config, timeouts, ApplyResult::Created),
            (Action::Update, Some(prior)) => match self.update(kind, &prior, config, timeouts) {
                Ok(state) => Outcome::done(LifecycleState::Present, ApplyResult::Modified, Some(state)),
                Err(err) => {
                    let state = match self.read(kind, &prior, timeouts) {
                        Ok(state) => state,
                        Err(read_err) => {
                            log::warn!("re-read after failed update: {read_err}");
                            Some(prior)
                        }
                    };
                    Outcome::failed(LifecycleState::UpdateFailed, state, err)
                }
            },
            (Action::Replace, Some(prior)) => match self.delete(kind, &prior, timeouts) {
                Ok(()) => self.apply_create(kind, diff, config, timeouts, ApplyResult::Replaced),
                Err(err) => Outcome::failed(LifecycleState::Present, Some(prior), err),
            },
            (Action::Delete, Some(prior)) => match self.delete(kind, &prior, timeouts) {
                Ok(()) => Outcome::done(LifecycleState::Absent, ApplyResult::Removed, None),
                Err(err) => Outcome::failed(LifecycleState::Present, Some(prior), err),
            },
            (action, None) => {
                let err = HookError::new(
                    Hook::Diff,
                    &diff.address,
                    Error::decode(&diff.address, format!("cannot {action} a resource without state")),
                );
                Outcome::failed(LifecycleState::Absent, None, err)
            }
        }
    }

    fn apply_create(
        &self,
        kind: &dyn ResourceKind,
        diff: &ResourceDiff,
        config: &Map<String, Value>,
        timeouts: &Timeouts,
        result: ApplyResult,
    ) -> Outcome {
        match self.create(kind, &diff.address, config, timeouts) {
            Ok(state) => Outcome::done(LifecycleState::Present, result, Some(state)),
            Err(err) => Outcome::failed(LifecycleState::CreateFailed, None, err),
        }
    }

    fn read_into(&self, kind: &dyn ResourceKind, data: &mut ResourceData, timeouts: &Timeouts) -> Result<()> {
        let op = self.operation(timeouts.read);
        match kind.read(&op, data) {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                data.mark_gone();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn reread(
        &self,
        kind: &dyn ResourceKind,
        mut data: ResourceData,
        timeouts: &Timeouts,
    ) -> Result<InstanceState> {
        let id = data.require_id()?.to_string();
        self.read_into(kind, &mut data, timeouts)?;
        data.into_state().ok_or(Error::GoneAfterWrite { id })
    }
}

/// Normalize and validate raw configuration.
fn prepare(kind: &dyn ResourceKind, config: &Map<String, Value>) -> Result<Map<String, Value>> {
    let schema = kind.schema();
    let config = schema.normalize(config);
    let violations = schema.validate(&config);
    if violations.is_empty() {
        Ok(config)
    } else {
        Err(Error::Validation(violations))
    }
}
