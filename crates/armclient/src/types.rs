//! Request/response envelopes and poller types.

use crate::error::{RemoteFailure, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// HTTP methods used against the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// POST
    Post,
    /// DELETE
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

/// Case-insensitive header map. Keys are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Look up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Method.
    pub method: Method,
    /// Absolute URL including query string.
    pub url: String,
    /// Extra headers (authorization is added by the transport).
    pub headers: Headers,
    /// JSON body for mutating calls.
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request without a body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: &Value) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers.insert("content-type", "application/json");
        Ok(self)
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Body parsed as JSON, if any.
    pub fn json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// An HTTP-style response envelope.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Raw body.
    pub body: Vec<u8>,
}

impl Response {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `Location` header.
    pub fn location(&self) -> Option<&str> {
        self.headers.get("location")
    }

    /// The `Azure-AsyncOperation` header.
    pub fn azure_async_operation(&self) -> Option<&str> {
        self.headers.get("azure-asyncoperation")
    }

    /// The `Retry-After` header, when it holds an integer number of seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Whether the body is empty or whitespace.
    pub fn is_body_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// Body parsed as JSON; `None` when empty.
    pub fn json(&self) -> Result<Option<Value>> {
        if self.is_body_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&self.body)?))
    }
}

/// Result of a single remote operation: decoded model plus raw envelope.
#[derive(Debug, Clone)]
pub struct OperationResponse {
    /// Decoded JSON body, if the response carried one.
    pub model: Option<Value>,
    /// The raw response.
    pub response: Response,
}

/// Status reported by one poll step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Still running.
    InProgress,
    /// Finished successfully (terminal).
    Succeeded,
    /// Finished with an error (terminal).
    Failed,
    /// Cancelled by the service (terminal).
    Cancelled,
}

impl PollStatus {
    /// Whether no further polling may change this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Map a service status string. Unknown values mean the operation is
    /// still running.
    pub fn from_remote(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Cancelled,
            _ => Self::InProgress,
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a single poll step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    /// Reported status.
    pub status: PollStatus,
    /// How long to wait before the next poll.
    pub interval: Duration,
    /// Remote failure details for `Failed`/`Cancelled`.
    pub failure: Option<RemoteFailure>,
}

/// Poller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Interval used when the service sends no `Retry-After`.
    pub default_interval: Duration,
    /// Consecutive transport failures tolerated before giving up.
    pub max_transport_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(10),
            max_transport_failures: 5,
        }
    }
}
