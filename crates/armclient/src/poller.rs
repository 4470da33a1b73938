//! Long-running-operation pollers.
//!
//! A [`Poller`] turns the initial response of a mutating call into a
//! synchronous "done or failed" answer. It discovers where to poll from the
//! response headers:
//!
//! 1. `Azure-AsyncOperation`: poll the operation-status URL.
//! 2. `Location` carrying an `asyncId` query parameter: poll the target
//!    resource with that `asyncId`.
//! 3. `Location`: poll that URL.
//!
//! A response with none of these and a 200/201/204 status needs no polling.
//!
//! Statuses are monotonic: once a poll reaches a terminal status, every later
//! [`Poller::poll`] returns it again without touching the network.

use crate::backend::Transport;
use crate::cancel::{Context, Waiter};
use crate::error::{Error, RemoteFailure, Result};
use crate::types::{Method, PollResult, PollStatus, PollerConfig, Request, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Where the poller looks for progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    /// The operation completed synchronously.
    Done,
    /// Poll an `Azure-AsyncOperation` status URL.
    AsyncOperation(String),
    /// Poll a `Location` URL.
    Location(String),
    /// Poll the target resource with an `asyncId` query parameter.
    AsyncId {
        /// Absolute URL of the target resource, with api-version.
        target: String,
        /// The operation's async id.
        async_id: String,
    },
}

impl PollTarget {
    /// Discover the polling target from an initial response.
    ///
    /// `target_url` is the absolute URL of the resource the call addressed;
    /// it is used by the `asyncId` variant.
    pub fn discover(initial: &Response, target_url: &str) -> Result<Self> {
        if let Some(url) = initial.azure_async_operation() {
            return Ok(Self::AsyncOperation(absolute(url)?));
        }

        if let Some(url) = initial.location() {
            let url = absolute(url)?;
            if let Some(async_id) = query_param(&url, "asyncId") {
                return Ok(Self::AsyncId {
                    target: target_url.to_string(),
                    async_id,
                });
            }
            return Ok(Self::Location(url));
        }

        match initial.status {
            200 | 201 | 204 => Ok(Self::Done),
            status => Err(Error::MalformedPoller {
                reason: format!("status {status} without a polling endpoint"),
            }),
        }
    }

    fn url(&self) -> Option<String> {
        match self {
            Self::Done => None,
            Self::AsyncOperation(url) | Self::Location(url) => Some(url.clone()),
            Self::AsyncId { target, async_id } => {
                let sep = if target.contains('?') { '&' } else { '?' };
                Some(format!("{target}{sep}asyncId={async_id}"))
            }
        }
    }
}

/// Drives one long-running operation to a terminal state.
///
/// A poller is owned by the lifecycle step that created it and is used from
/// a single thread.
pub struct Poller {
    transport: Arc<dyn Transport>,
    target: PollTarget,
    config: PollerConfig,
    interval: Duration,
    terminal: Option<PollResult>,
}

impl Poller {
    /// Build a poller from the initial response of a mutating call.
    pub fn new(
        transport: Arc<dyn Transport>,
        initial: &Response,
        target_url: &str,
        config: PollerConfig,
    ) -> Result<Self> {
        let target = PollTarget::discover(initial, target_url)?;
        let interval = initial.retry_after().unwrap_or(config.default_interval);

        let terminal = (target == PollTarget::Done).then(|| PollResult {
            status: PollStatus::Succeeded,
            interval: Duration::ZERO,
            failure: None,
        });

        log::debug!("poller target: {target:?}");

        Ok(Self {
            transport,
            target,
            config,
            interval,
            terminal,
        })
    }

    /// The discovered polling target.
    pub fn target(&self) -> &PollTarget {
        &self.target
    }

    /// Whether the operation finished without needing any poll.
    pub fn is_done(&self) -> bool {
        self.terminal.is_some()
    }

    /// Issue one poll.
    pub fn poll(&mut self, ctx: &Context) -> Result<PollResult> {
        if let Some(terminal) = &self.terminal {
            return Ok(terminal.clone());
        }
        ctx.check()?;

        let Some(url) = self.target.url() else {
            return Err(Error::MalformedPoller {
                reason: "no polling URL".to_string(),
            });
        };

        let response = self.transport.send(&Request::new(Method::Get, url))?;
        let interval = response
            .retry_after()
            .unwrap_or(self.config.default_interval);
        self.interval = interval;

        let (status, failure) = interpret(&response);
        log::debug!("poll status {} -> {status}", response.status);

        let result = PollResult {
            status,
            interval,
            failure,
        };
        if status.is_terminal() {
            self.terminal = Some(result.clone());
        }
        Ok(result)
    }

    /// Poll until the operation succeeds, fails or the context ends.
    ///
    /// Up to `max_transport_failures` consecutive dropped connections are
    /// tolerated. Cancellation is local: nothing is sent to the service.
    pub fn poll_until_done(&mut self, ctx: &Context, waiter: &dyn Waiter) -> Result<()> {
        let mut failures = 0u32;
        loop {
            match self.poll(ctx) {
                Ok(result) => {
                    failures = 0;
                    match result.status {
                        PollStatus::Succeeded => return Ok(()),
                        PollStatus::Failed | PollStatus::Cancelled => {
                            let failure = result.failure.unwrap_or_default();
                            return Err(Error::Operation {
                                status: result.status,
                                code: failure.code,
                                message: failure.message,
                            });
                        }
                        PollStatus::InProgress => waiter.wait(ctx, result.interval)?,
                    }
                }
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    if failures > self.config.max_transport_failures {
                        return Err(err);
                    }
                    log::warn!(
                        "poll failed ({failures}/{}): {err}",
                        self.config.max_transport_failures
                    );
                    waiter.wait(ctx, self.interval)?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Map a poll response to a status.
fn interpret(response: &Response) -> (PollStatus, Option<RemoteFailure>) {
    match response.status {
        202 => (PollStatus::InProgress, None),
        204 => (PollStatus::Succeeded, None),
        200 | 201 => match response.json() {
            Ok(None) => (PollStatus::Succeeded, None),
            Ok(Some(body)) => {
                let status = body_status(&body);
                let failure = status.is_terminal().then(|| failure_from(&body));
                match status {
                    PollStatus::Failed | PollStatus::Cancelled => (status, failure),
                    _ => (status, None),
                }
            }
            Err(err) => (
                PollStatus::Failed,
                Some(RemoteFailure {
                    code: "InvalidResponse".to_string(),
                    message: err.to_string(),
                }),
            ),
        },
        _ => (
            PollStatus::Failed,
            Some(RemoteFailure::from_body(&response.body)),
        ),
    }
}

/// Status carried by a 200/201 body: operation-status `status`, else the
/// resource's `properties.provisioningState`, else done.
fn body_status(body: &Value) -> PollStatus {
    if let Some(status) = body.get("status").and_then(Value::as_str) {
        return PollStatus::from_remote(status);
    }
    if let Some(state) = body
        .pointer("/properties/provisioningState")
        .and_then(Value::as_str)
    {
        return PollStatus::from_remote(state);
    }
    PollStatus::Succeeded
}

fn failure_from(body: &Value) -> RemoteFailure {
    body.get("error")
        .and_then(|e| serde_json::from_value(e.clone()).ok())
        .unwrap_or_default()
}

fn absolute(url: &str) -> Result<String> {
    let is_absolute = url
        .split_once("://")
        .is_some_and(|(scheme, rest)| {
            matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https")
                && !rest.is_empty()
                && !rest.starts_with('/')
        });
    if is_absolute {
        Ok(url.to_string())
    } else {
        Err(Error::MalformedPoller {
            reason: format!("polling URL is not absolute: {url}"),
        })
    }
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|kv| {
        let (k, v) = kv.split_once('=')?;
        (k.eq_ignore_ascii_case(name) && !v.is_empty()).then(|| v.to_string())
    })
}
