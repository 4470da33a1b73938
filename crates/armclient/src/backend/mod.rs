//! Transport trait and implementations.
//!
//! [`http::HttpTransport`] talks to a real endpoint. [`MockTransport`]
//! answers from scripted replies and records every request, for testing
//! without network access:
//!
//! ```
//! use armclient::backend::{MockReply, MockTransport, Transport};
//! use armclient::{Method, Request};
//!
//! let mock = MockTransport::new();
//! mock.reply(Method::Get, "/subscriptions/s1/resourceGroups/rg", MockReply::json(200, serde_json::json!({"name": "rg"})));
//!
//! let request = Request::new(
//!     Method::Get,
//!     "https://management.azure.com/subscriptions/s1/resourceGroups/rg?api-version=2021-04-01",
//! );
//! let response = mock.send(&request).unwrap();
//! assert_eq!(response.status, 200);
//! assert_eq!(mock.requests().len(), 1);
//! ```

pub mod http;

use crate::error::{Error, Result};
use crate::types::{Headers, Method, Request, Response};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Sends one request and returns the raw response.
///
/// Implementations perform exactly one HTTP exchange per call and never
/// retry. Any HTTP status is a successful `send`; only failures to obtain a
/// response are errors.
pub trait Transport: Send + Sync {
    /// Send a request.
    fn send(&self, request: &Request) -> Result<Response>;
}

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this response.
    Respond(Response),
    /// Fail as if the connection dropped.
    Drop(String),
}

impl MockReply {
    /// A response with a JSON body.
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type", "application/json");
        Self::Respond(Response {
            status,
            headers,
            body: body.to_string().into_bytes(),
        })
    }

    /// A response with no body.
    pub fn empty(status: u16) -> Self {
        Self::Respond(Response {
            status,
            ..Default::default()
        })
    }

    /// A 404 with an ARM error body.
    pub fn not_found() -> Self {
        Self::json(
            404,
            serde_json::json!({
                "error": {"code": "ResourceNotFound", "message": "The resource was not found."}
            }),
        )
    }

    /// A dropped connection.
    pub fn dropped() -> Self {
        Self::Drop("connection reset by peer".to_string())
    }

    /// Add a header to a response reply.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Self::Respond(ref mut response) = self {
            response.headers.insert(name, value);
        }
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<(Method, String), VecDeque<MockReply>>,
    requests: Vec<Request>,
}

/// In-memory transport for tests.
///
/// Replies are keyed by method and by the request path plus query string,
/// with scheme, host and `api-version` stripped. Replies for a key are used
/// in order; the last one is repeated once the queue is down to it.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a transport with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method` on `path`.
    pub fn reply(&self, method: Method, path: &str, reply: MockReply) {
        let key = (method, normalize(path));
        self.lock().replies.entry(key).or_default().push_back(reply);
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Requests sent with `method` to `path` (normalized like reply keys).
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Request> {
        let wanted = normalize(path);
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && normalize(&r.url) == wanted)
            .cloned()
            .collect()
    }

    /// Requests sent with `method`, any path.
    pub fn requests_with(&self, method: Method) -> Vec<Request> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        let key = (request.method, normalize(&request.url));
        let reply = match state.replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Drop(message)) => Err(Error::transport(message)),
            None => Err(Error::transport(format!(
                "no mock reply for {} {}",
                key.0, key.1
            ))),
        }
    }
}

/// Strip scheme, host and `api-version` from a URL.
fn normalize(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path_and_query = if url.contains("://") {
        without_scheme
            .find('/')
            .map_or("/", |idx| &without_scheme[idx..])
    } else {
        without_scheme
    };

    let (path, query) = match path_and_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_and_query, None),
    };

    let kept: Vec<&str> = query
        .map(|q| {
            q.split('&')
                .filter(|kv| !kv.is_empty() && !kv.starts_with("api-version="))
                .collect()
        })
        .unwrap_or_default();

    if kept.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", kept.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize("https://management.azure.com/subscriptions/s1?api-version=2023-01-01"),
            "/subscriptions/s1"
        );
        assert_eq!(
            normalize("https://host/a/b?api-version=1&asyncId=abc"),
            "/a/b?asyncId=abc"
        );
        assert_eq!(normalize("/a/b?asyncId=abc"), "/a/b?asyncId=abc");
    }

    #[test]
    fn test_mock_replies_in_order_then_repeat_last() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, "/r", MockReply::empty(202));
        mock.reply(Method::Get, "/r", MockReply::empty(200));

        let request = Request::new(Method::Get, "https://host/r?api-version=1");
        assert_eq!(mock.send(&request).unwrap().status, 202);
        assert_eq!(mock.send(&request).unwrap().status, 200);
        assert_eq!(mock.send(&request).unwrap().status, 200);
        assert_eq!(mock.requests_to(Method::Get, "/r").len(), 3);
    }

    #[test]
    fn test_mock_dropped_connection() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, "/r", MockReply::dropped());
        let err = mock
            .send(&Request::new(Method::Get, "https://host/r"))
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_mock_unscripted_request_fails() {
        let mock = MockTransport::new();
        let err = mock
            .send(&Request::new(Method::Delete, "https://host/r"))
            .unwrap_err();
        assert!(err.to_string().contains("no mock reply for DELETE /r"));
    }

    #[test]
    fn test_mock_reply_header() {
        let reply = MockReply::empty(202).header("Retry-After", "5");
        match reply {
            MockReply::Respond(response) => {
                assert_eq!(response.headers.get("retry-after"), Some("5"));
            }
            MockReply::Drop(_) => panic!("expected a response"),
        }
    }
}
