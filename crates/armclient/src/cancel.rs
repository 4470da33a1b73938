//! Cancellation tokens, deadlines and interruptible waits.
//!
//! Every suspension point (an HTTP call, a poll step, the wait between
//! polls) takes a [`Context`]. Cancelling the token, or passing the
//! deadline, makes the next suspension point return
//! [`Error::Cancelled`](crate::Error::Cancelled). Calls already in flight
//! are allowed to finish.

use crate::error::{CancelReason, Error, Result};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A shareable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    /// Create a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake every waiter.
    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for up to `timeout`, returning early when cancelled.
    ///
    /// Returns `true` if the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// A cancellation token plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context driven by an existing token.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context sharing this token whose deadline is at most
    /// `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Why this context is done, if it is.
    pub fn done_reason(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Requested);
        }
        match self.remaining() {
            Some(left) if left.is_zero() => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fail with `Cancelled` if the context is done.
    pub fn check(&self) -> Result<()> {
        match self.done_reason() {
            Some(reason) => Err(Error::Cancelled { reason }),
            None => Ok(()),
        }
    }
}

/// Waits between poll steps.
pub trait Waiter: Send + Sync {
    /// Wait for `interval`, returning `Cancelled` as soon as the context is
    /// done.
    fn wait(&self, ctx: &Context, interval: Duration) -> Result<()>;
}

/// Real waiter: blocks on the context's token.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepWaiter;

impl Waiter for SleepWaiter {
    fn wait(&self, ctx: &Context, interval: Duration) -> Result<()> {
        ctx.check()?;
        let budget = match ctx.remaining() {
            Some(left) => interval.min(left),
            None => interval,
        };
        ctx.token().wait_timeout(budget);
        ctx.check()
    }
}

/// Waiter that returns immediately and records every requested interval.
///
/// Used by tests so polling loops run without sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingWaiter {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingWaiter {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intervals requested so far.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Waiter for RecordingWaiter {
    fn wait(&self, ctx: &Context, interval: Duration) -> Result<()> {
        ctx.check()?;
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interval);
        Ok(())
    }
}
