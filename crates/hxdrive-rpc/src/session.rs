//! Connection settings shared by every call of a mount.

use std::time::Duration;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://drive.hexalinq.com/fsapi";

/// Settings for one mount session.
///
/// The session is configured before the first request and then handed to
/// [`RpcClient`](crate::RpcClient), which only reads it.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    root: Option<String>,
    endpoint: String,
    debug: bool,
    timeout: Duration,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl Session {
    /// Creates a session for `endpoint` with no token and no root.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            token: String::new(),
            root: None,
            endpoint: endpoint.into(),
            debug: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.set_token(token);
        self
    }

    /// Sets the remote root every path is resolved against.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.set_root(Some(root.into()));
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the timeout applied to each HTTP exchange.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    pub fn set_root(&mut self, root: Option<String>) {
        self.root = root;
    }

    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        self.endpoint = endpoint.into();
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("root", &self.root)
            .field("endpoint", &self.endpoint)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .finish()
    }
}
