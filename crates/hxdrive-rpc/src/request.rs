//! Construction of outbound calls.
//!
//! A call is an operation name (sent as the HTTP method), a list of named
//! string arguments (sent as `X-<Key>` headers with percent-encoded values),
//! an optional upload body and a response ceiling. Building a request never
//! performs I/O.

use crate::error::ConfigError;
use crate::session::Session;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Bytes left unescaped in header values: ASCII alphanumerics and `-._~`.
const HEADER_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes an argument value for use in a header.
pub fn escape_value(value: &str) -> String {
    utf8_percent_encode(value, HEADER_VALUE).to_string()
}

/// A fully built call, ready to hand to a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest<'a> {
    method: String,
    headers: Vec<(String, String)>,
    body: Option<&'a [u8]>,
    limit: usize,
    exact: bool,
}

impl<'a> RpcRequest<'a> {
    /// Starts building a call to `method` whose reply may be at most `limit` bytes.
    pub fn builder(method: &str, limit: usize) -> RequestBuilder<'a> {
        RequestBuilder {
            method: method.to_string(),
            args: Vec::new(),
            body: None,
            limit,
            exact: false,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Header `(name, value)` pairs in send order. Values are already escaped.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Looks up a header by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&'a [u8]> {
        self.body
    }

    /// Response ceiling in bytes.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether the response buffer is reserved at full size up front.
    pub fn exact(&self) -> bool {
        self.exact
    }
}

/// Builder for [`RpcRequest`].
#[derive(Debug, Clone)]
pub struct RequestBuilder<'a> {
    method: String,
    args: Vec<(String, String)>,
    body: Option<&'a [u8]>,
    limit: usize,
    exact: bool,
}

impl<'a> RequestBuilder<'a> {
    /// Adds a named argument. Setting an existing key again replaces its value
    /// in place.
    #[must_use]
    pub fn arg(mut self, key: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.args.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.args.push((key.to_string(), value)),
        }
        self
    }

    /// Reserves the whole response ceiling before the exchange starts.
    #[must_use]
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Attaches an upload body. The bytes are borrowed, not copied.
    #[must_use]
    pub fn upload(mut self, body: &'a [u8]) -> Self {
        self.body = Some(body);
        self
    }

    /// Finishes the call, appending the session's token and root.
    pub fn build(self, session: &Session) -> Result<RpcRequest<'a>, ConfigError> {
        if session.token().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if session.endpoint().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.method.is_empty() {
            return Err(ConfigError::EmptyMethod);
        }
        if !self.method.bytes().all(is_token_char) {
            return Err(ConfigError::InvalidMethod(self.method));
        }

        let mut headers = Vec::with_capacity(self.args.len() + 2);
        for (key, value) in &self.args {
            if key.is_empty() || !key.bytes().all(is_token_char) {
                return Err(ConfigError::InvalidHeader(key.clone()));
            }
            headers.push((format!("X-{key}"), escape_value(value)));
        }
        headers.push(("X-Token".to_string(), escape_value(session.token())));
        if let Some(root) = session.root() {
            headers.push(("X-Root".to_string(), escape_value(root)));
        }

        Ok(RpcRequest {
            method: self.method,
            headers,
            body: self.body,
            limit: self.limit,
            exact: self.exact,
        })
    }
}

/// RFC 9110 `tchar`, valid in both methods and header names.
fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
