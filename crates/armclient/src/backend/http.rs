//! Blocking HTTP transport.
//!
//! Statuses are never turned into errors here: 4xx/5xx come back as
//! responses so the client can classify them.

use crate::backend::Transport;
use crate::error::{Error, Result};
use crate::types::{Headers, Method, Request, Response};
use std::time::Duration;

/// Maximum response body size.
const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Supplies bearer tokens for outgoing requests.
///
/// Token acquisition is the host's concern; this trait only hands a
/// ready-made token to the transport.
pub trait Authorizer: Send + Sync {
    /// A bearer token valid for the resource manager audience.
    fn token(&self) -> Result<String>;
}

/// A fixed token, e.g. read from the environment.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

impl Authorizer for StaticToken {
    fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Transport backed by a blocking HTTP agent.
pub struct HttpTransport {
    agent: ureq::Agent,
    authorizer: Box<dyn Authorizer>,
    user_agent: String,
}

impl HttpTransport {
    /// Create a transport that authorizes every request with `authorizer`.
    pub fn new(authorizer: Box<dyn Authorizer>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            authorizer,
            user_agent: format!("armsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Override the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn headers(&self, request: &Request) -> Result<Vec<(String, String)>> {
        let mut headers = vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.authorizer.token()?),
            ),
            ("Accept".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ];
        headers.extend(
            request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        Ok(headers)
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let headers = self.headers(request)?;
        let body = request.body.as_deref().unwrap_or_default();
        let url = request.url.as_str();

        log::debug!(
            "{} {} ({} byte body)",
            request.method,
            url,
            request.body.as_ref().map_or(0, Vec::len)
        );

        let result = match request.method {
            Method::Get => with_headers(self.agent.get(url), &headers).call(),
            Method::Delete => with_headers(self.agent.delete(url), &headers).call(),
            Method::Put => with_headers(self.agent.put(url), &headers).send(body),
            Method::Patch => with_headers(self.agent.patch(url), &headers).send(body),
            Method::Post => with_headers(self.agent.post(url), &headers).send(body),
        };
        let mut response = result?;

        let status = response.status().as_u16();
        let mut response_headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.insert(name.as_str(), value);
            }
        }

        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| Error::transport(format!("reading response body: {e}")))?;

        log::debug!("{} {} -> {}", request.method, url, status);

        Ok(Response {
            status,
            headers: response_headers,
            body,
        })
    }
}
