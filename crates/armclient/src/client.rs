//! Resource manager client.
//!
//! Every operation issues exactly one request and never retries. The
//! context is checked before the request goes out; a request already in
//! flight is allowed to complete.

use crate::backend::Transport;
use crate::cancel::{Context, Waiter};
use crate::error::{Error, Result};
use crate::poller::Poller;
use crate::types::{Method, OperationResponse, PollerConfig, Request, Response};
use serde_json::Value;
use std::sync::Arc;

/// Default resource manager endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Client for one resource provider api-version.
///
/// Cloning is cheap; clones share the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    endpoint: String,
    api_version: String,
    poller_config: PollerConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("poller_config", &self.poller_config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client talking to `endpoint` through `transport`.
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_version: String::new(),
            poller_config: PollerConfig::default(),
        }
    }

    /// Use these poller settings for [`Client::wait`].
    #[must_use]
    pub fn with_poller_config(mut self, config: PollerConfig) -> Self {
        self.poller_config = config;
        self
    }

    /// A client for `api_version`, sharing this client's transport.
    #[must_use]
    pub fn for_api(&self, api_version: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            ..self.clone()
        }
    }

    /// The endpoint base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The api-version sent with every request.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// The poller settings.
    pub fn poller_config(&self) -> PollerConfig {
        self.poller_config
    }

    /// Absolute URL for a resource path.
    pub fn url(&self, path: &str) -> String {
        if self.api_version.is_empty() {
            format!("{}{path}", self.endpoint)
        } else {
            format!("{}{path}?api-version={}", self.endpoint, self.api_version)
        }
    }

    /// `GET` a resource.
    pub fn get(&self, ctx: &Context, path: &str) -> Result<OperationResponse> {
        self.execute(ctx, path, Request::new(Method::Get, self.url(path)))
    }

    /// `PUT` a resource.
    pub fn create_or_update(
        &self,
        ctx: &Context,
        path: &str,
        body: &Value,
    ) -> Result<OperationResponse> {
        let request = Request::new(Method::Put, self.url(path)).with_json(body)?;
        self.execute(ctx, path, request)
    }

    /// `PATCH` a resource.
    pub fn update(&self, ctx: &Context, path: &str, body: &Value) -> Result<OperationResponse> {
        let request = Request::new(Method::Patch, self.url(path)).with_json(body)?;
        self.execute(ctx, path, request)
    }

    /// `DELETE` a resource. A 404 is reported as [`Error::NotFound`].
    pub fn delete(&self, ctx: &Context, path: &str) -> Result<OperationResponse> {
        self.execute(ctx, path, Request::new(Method::Delete, self.url(path)))
    }

    /// `POST` to a secrets action such as `listKeys`.
    pub fn list_secrets(
        &self,
        ctx: &Context,
        path: &str,
        action: &str,
    ) -> Result<OperationResponse> {
        let action_path = format!("{path}/{action}");
        let request = Request::new(Method::Post, self.url(&action_path));
        self.execute(ctx, &action_path, request)
    }

    /// Build a poller for the initial response of a mutating call on `path`.
    pub fn poller(&self, initial: &OperationResponse, path: &str) -> Result<Poller> {
        Poller::new(
            Arc::clone(&self.transport),
            &initial.response,
            &self.url(path),
            self.poller_config,
        )
    }

    /// Drive the operation started by `initial` to completion.
    pub fn wait(
        &self,
        ctx: &Context,
        waiter: &dyn Waiter,
        initial: &OperationResponse,
        path: &str,
    ) -> Result<()> {
        self.poller(initial, path)?.poll_until_done(ctx, waiter)
    }

    fn execute(&self, ctx: &Context, path: &str, request: Request) -> Result<OperationResponse> {
        ctx.check()?;
        let response = self.transport.send(&request)?;
        classify(path, response)
    }
}

fn classify(path: &str, response: Response) -> Result<OperationResponse> {
    match response.status {
        404 => Err(Error::NotFound {
            url: path.to_string(),
        }),
        status if status >= 400 => Err(Error::remote(status, &response.body)),
        _ => Ok(OperationResponse {
            model: response.json()?,
            response,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockReply, MockTransport};
    use crate::cancel::RecordingWaiter;
    use serde_json::json;

    const PATH: &str = "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.DocumentDB/mongoClusters/mc1";

    fn client(mock: &MockTransport) -> Client {
        Client::new(Arc::new(mock.clone()), "https://management.azure.com/").for_api("2024-07-01")
    }

    #[test]
    fn test_url_includes_api_version() {
        let c = client(&MockTransport::new());
        assert_eq!(
            c.url(PATH),
            format!("https://management.azure.com{PATH}?api-version=2024-07-01")
        );
    }

    #[test]
    fn test_get_decodes_model() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, PATH, MockReply::json(200, json!({"name": "mc1"})));

        let result = client(&mock).get(&Context::background(), PATH).unwrap();
        assert_eq!(result.model.unwrap()["name"], "mc1");
        assert_eq!(result.response.status, 200);
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_get_not_found() {
        let mock = MockTransport::new();
        mock.reply(Method::Get, PATH, MockReply::not_found());

        let err = client(&mock).get(&Context::background(), PATH).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remote_error_carries_code_and_status() {
        let mock = MockTransport::new();
        mock.reply(
            Method::Put,
            PATH,
            MockReply::json(400, json!({"error": {"code": "InvalidParameter", "message": "bad tier"}})),
        );

        let err = client(&mock)
            .create_or_update(&Context::background(), PATH, &json!({}))
            .unwrap_err();
        match err {
            Error::Remote {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "InvalidParameter");
                assert_eq!(message, "bad tier");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_put_sends_body_once() {
        let mock = MockTransport::new();
        mock.reply(Method::Put, PATH, MockReply::json(200, json!({"name": "mc1"})));

        client(&mock)
            .create_or_update(&Context::background(), PATH, &json!({"location": "westeurope"}))
            .unwrap();

        let puts = mock.requests_with(Method::Put);
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].json().unwrap()["location"], "westeurope");
        assert_eq!(puts[0].headers.get("content-type"), Some("application/json"));
    }

    #[test]
    fn test_cancelled_context_sends_nothing() {
        let mock = MockTransport::new();
        let ctx = Context::background();
        ctx.token().cancel();

        let err = client(&mock).get(&ctx, PATH).unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_transport_error_is_not_retried() {
        let mock = MockTransport::new();
        mock.reply(Method::Delete, PATH, MockReply::dropped());

        let err = client(&mock)
            .delete(&Context::background(), PATH)
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_list_secrets_posts_action() {
        let mock = MockTransport::new();
        let action = format!("{PATH}/listConnectionStrings");
        mock.reply(
            Method::Post,
            &action,
            MockReply::json(200, json!({"connectionStrings": []})),
        );

        let result = client(&mock)
            .list_secrets(&Context::background(), PATH, "listConnectionStrings")
            .unwrap();
        assert!(result.model.unwrap()["connectionStrings"].is_array());
    }

    #[test]
    fn test_create_then_wait_via_async_id() {
        let mock = MockTransport::new();
        mock.reply(
            Method::Put,
            PATH,
            MockReply::empty(201).header("Location", "https://management.azure.com/op?asyncId=abc"),
        );
        let poll = format!("{PATH}?asyncId=abc");
        mock.reply(Method::Get, &poll, MockReply::empty(202));
        mock.reply(Method::Get, &poll, MockReply::empty(202).header("Retry-After", "5"));
        mock.reply(Method::Get, &poll, MockReply::empty(200));

        let c = client(&mock);
        let ctx = Context::background();
        let waiter = RecordingWaiter::new();
        let initial = c.create_or_update(&ctx, PATH, &json!({})).unwrap();
        c.wait(&ctx, &waiter, &initial, PATH).unwrap();

        assert_eq!(mock.requests_to(Method::Get, &poll).len(), 3);
        assert_eq!(
            waiter.waits(),
            vec![std::time::Duration::from_secs(10), std::time::Duration::from_secs(5)]
        );
    }
}
