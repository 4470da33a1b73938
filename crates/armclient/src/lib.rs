//! # armclient
//!
//! Blocking Azure Resource Manager client with long-running-operation
//! pollers.
//!
//! This crate provides:
//! - A [`Client`] issuing `GET` / `PUT` / `PATCH` / `DELETE` and secrets
//!   `POST` calls, one request per call, never retrying
//! - A [`Poller`] that drives `Azure-AsyncOperation`, `Location` and
//!   `asyncId` operations to a terminal state
//! - Cancellation through a [`Context`] (token plus deadline) honoured at
//!   every request, every poll and every wait between polls
//! - A [`MockTransport`] for tests
//!
//! ## Example
//!
//! ```
//! use armclient::backend::{MockReply, MockTransport};
//! use armclient::{Client, Context, Method, RecordingWaiter};
//! use std::sync::Arc;
//!
//! let path = "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.AzureFleet/fleets/f1";
//! let mock = MockTransport::new();
//! mock.reply(
//!     Method::Put,
//!     path,
//!     MockReply::empty(201).header("Azure-AsyncOperation", "https://management.azure.com/ops/1"),
//! );
//! mock.reply(
//!     Method::Get,
//!     "/ops/1",
//!     MockReply::json(200, serde_json::json!({"status": "Succeeded"})),
//! );
//!
//! let client = Client::new(Arc::new(mock.clone()), armclient::DEFAULT_ENDPOINT).for_api("2024-11-01");
//! let ctx = Context::background();
//! let initial = client.create_or_update(&ctx, path, &serde_json::json!({})).unwrap();
//! client.wait(&ctx, &RecordingWaiter::new(), &initial, path).unwrap();
//!
//! assert_eq!(mock.requests().len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod cancel;
pub mod client;
pub mod error;
pub mod poller;
pub mod types;

pub use backend::http::{Authorizer, HttpTransport, StaticToken};
pub use backend::{MockReply, MockTransport, Transport};
pub use cancel::{CancellationToken, Context, RecordingWaiter, SleepWaiter, Waiter};
pub use client::{Client, DEFAULT_ENDPOINT};
pub use error::{CancelReason, Error, ErrorCategory, RemoteFailure, Result};
pub use poller::{PollTarget, Poller};
pub use types::{
    Headers, Method, OperationResponse, PollResult, PollStatus, PollerConfig, Request, Response,
};
