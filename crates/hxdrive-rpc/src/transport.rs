//! HTTP exchange for built requests.

use crate::buffer::ResponseBuffer;
use crate::error::{ConfigError, RpcResult, TransportError};
use crate::request::RpcRequest;
use crate::session::Session;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};
use ureq::Agent;
use ureq::http::{self, HeaderName, HeaderValue, Method, Uri};

/// Size of the scratch buffer used while streaming a response body.
const READ_CHUNK: usize = 16 * 1024;

/// Performs one request/response exchange.
///
/// Implementations fill a [`ResponseBuffer`] bounded by the request's
/// ceiling and report failures through the uniform error categories.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &RpcRequest<'_>) -> RpcResult<ResponseBuffer>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &RpcRequest<'_>) -> RpcResult<ResponseBuffer> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &RpcRequest<'_>) -> RpcResult<ResponseBuffer> {
        (**self).execute(request)
    }
}

/// Blocking HTTP transport backed by a `ureq` agent.
///
/// The agent keeps a connection pool, so consecutive calls reuse the
/// same connection to the endpoint.
pub struct HttpTransport {
    agent: Agent,
    endpoint: String,
    debug: bool,
}

impl HttpTransport {
    pub fn new(session: &Session) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(session.timeout()))
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .build()
            .into();

        Self {
            agent,
            endpoint: session.endpoint().to_string(),
            debug: session.debug(),
        }
    }

    fn build_http_request<'b>(&self, request: &RpcRequest<'b>) -> RpcResult<http::Request<&'b [u8]>> {
        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|_| ConfigError::InvalidMethod(request.method().to_string()))?;
        let uri: Uri = self.endpoint.parse().map_err(|e: http::uri::InvalidUri| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            detail: e.to_string(),
        })?;

        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in request.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ConfigError::InvalidHeader(name.to_string()))?;
            builder = builder.header(name, value);
        }

        let body: &'b [u8] = request.body().unwrap_or(&[]);
        builder
            .body(body)
            .map_err(|e| TransportError::local(format!("building request: {e}")).into())
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &RpcRequest<'_>) -> RpcResult<ResponseBuffer> {
        let http_request = self.build_http_request(request)?;

        if self.debug {
            let names: Vec<&str> = request
                .headers()
                .iter()
                .map(|(n, _)| n.as_str())
                .collect();
            debug!(
                method = request.method(),
                headers = ?names,
                upload = request.body().map_or(0, <[u8]>::len),
                limit = request.limit(),
                "sending request"
            );
        }

        let response = self.agent.run(http_request).map_err(|e| {
            warn!(method = request.method(), error = %e, "request failed");
            TransportError::local(e.to_string())
        })?;

        let status = response.status();
        if self.debug {
            debug!(method = request.method(), status = status.as_u16(), "response received");
        }
        if status == http::StatusCode::FORBIDDEN {
            warn!("Invalid access token");
            return Err(TransportError::auth_rejected().into());
        }
        if !status.is_success() {
            warn!(method = request.method(), status = status.as_u16(), "HTTP error");
            let reason = status.canonical_reason().unwrap_or("unknown status");
            return Err(TransportError::remote(status.as_u16(), reason).into());
        }

        let mut buffer = if request.exact() {
            ResponseBuffer::exact(request.limit())
        } else {
            ResponseBuffer::new(request.limit())
        };

        let mut reader = response.into_body().into_reader();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::local(format!("reading response: {e}")).into()),
            };
            if let Err(e) = buffer.extend(&chunk[..n]) {
                warn!(method = request.method(), limit = request.limit(), "Response buffer overflow");
                return Err(e.into());
            }
        }

        Ok(buffer)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
