//! In-memory transport for tests.
//!
//! [`ScriptedTransport`] replays canned replies in order and records every
//! request it receives, so tests can assert on both the wire traffic and
//! the decoded result without an HTTP server.

use crate::buffer::ResponseBuffer;
use crate::error::{RpcError, RpcResult, TransportError};
use crate::request::RpcRequest;
use crate::response::HEADER_SIZE;
use crate::transport::Transport;
use crate::wire::{StatRecord, VolumeStats};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A request as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub limit: usize,
    pub exact: bool,
}

impl RecordedRequest {
    /// Looks up a header by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_names(&self) -> Vec<&str> {
        self.headers.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Canned replies.
pub mod reply {
    use super::{HEADER_SIZE, StatRecord, VolumeStats};

    /// A bare status byte.
    pub fn status(code: u8) -> Vec<u8> {
        vec![code]
    }

    /// A successful metadata reply.
    pub fn attributes(stat: &StatRecord) -> Vec<u8> {
        let mut body = vec![0u8; HEADER_SIZE];
        stat.encode_into(&mut body);
        body
    }

    /// A successful read reply carrying `data`.
    pub fn data(data: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; HEADER_SIZE];
        body.extend_from_slice(data);
        body
    }

    pub fn volume(stats: &VolumeStats) -> Vec<u8> {
        stats.encode()
    }
}

/// Transport that answers from a script.
///
/// Replies larger than the request's ceiling fail with an overflow error,
/// the same as the HTTP transport. Once the script is exhausted every call
/// fails with a local transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<RpcResult<Vec<u8>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw reply body.
    pub fn push_reply(&self, body: impl Into<Vec<u8>>) {
        self.replies.lock().push_back(Ok(body.into()));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: impl Into<RpcError>) {
        self.replies.lock().push_back(Err(error.into()));
    }

    /// Builder form of [`push_reply`](Self::push_reply).
    #[must_use]
    pub fn with_reply(self, body: impl Into<Vec<u8>>) -> Self {
        self.push_reply(body);
        self
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Replies not yet consumed.
    pub fn pending(&self) -> usize {
        self.replies.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &RpcRequest<'_>) -> RpcResult<ResponseBuffer> {
        self.requests.lock().push(RecordedRequest {
            method: request.method().to_string(),
            headers: request.headers().to_vec(),
            body: request.body().map(<[u8]>::to_vec),
            limit: request.limit(),
            exact: request.exact(),
        });

        let next = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::local("no scripted reply").into()))?;

        let mut buffer = if request.exact() {
            ResponseBuffer::exact(request.limit())
        } else {
            ResponseBuffer::new(request.limit())
        };
        buffer.extend(&next)?;
        Ok(buffer)
    }
}
