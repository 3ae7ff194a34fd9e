//! Shared helpers for hxdrive-rpc integration tests.

#![allow(dead_code)]

use hxdrive_rpc::testing::ScriptedTransport;
use hxdrive_rpc::wire::{EntryType, StatRecord, Timespec};
use hxdrive_rpc::{RpcClient, Session};
use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;
use tiny_http::{Response, Server};

pub const TOKEN: &str = "test-token";

/// Installs a test-friendly subscriber once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("hxdrive_rpc=trace")
        .try_init();
}

pub fn session(endpoint: &str) -> Session {
    Session::new(endpoint)
        .with_token(TOKEN)
        .with_timeout(Duration::from_secs(5))
}

pub fn scripted_client() -> RpcClient<ScriptedTransport> {
    init_tracing();
    RpcClient::with_transport(session("http://scripted.invalid/fsapi"), ScriptedTransport::new())
}

pub fn record(entry_type: EntryType, size: u64) -> StatRecord {
    StatRecord {
        size,
        accessed: Timespec { seconds: 1_700_000_000, nanoseconds: 1 },
        modified: Timespec { seconds: 1_700_000_100, nanoseconds: 2 },
        changed: Timespec { seconds: 1_700_000_200, nanoseconds: 3 },
        created: Timespec { seconds: 1_600_000_000, nanoseconds: 0 },
        uid: 1000,
        gid: 1000,
        permissions: 0o644,
        entry_type,
    }
}

pub fn file_record(size: u64) -> StatRecord {
    record(EntryType::File, size)
}

pub fn dir_record() -> StatRecord {
    record(EntryType::Directory, 4096)
}

/// A request as received by the loopback server.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Names of the `X-` headers in the order they were sent, lowercased.
    pub fn rpc_header_names(&self) -> Vec<String> {
        self.headers
            .iter()
            .map(|(n, _)| n.to_ascii_lowercase())
            .filter(|n| n.starts_with("x-"))
            .collect()
    }
}

/// Loopback HTTP server answering a fixed list of `(status, body)` replies.
pub struct LoopbackServer {
    pub url: String,
    handle: Option<JoinHandle<Vec<Captured>>>,
}

impl LoopbackServer {
    /// Returns `None` when no local port can be bound.
    pub fn start(replies: Vec<(u16, Vec<u8>)>) -> Option<Self> {
        if TcpListener::bind("127.0.0.1:0").is_err() {
            eprintln!("skipping test: cannot bind local port");
            return None;
        }
        init_tracing();

        let server = Server::http("127.0.0.1:0").ok()?;
        let port = server.server_addr().to_ip()?.port();
        let handle = std::thread::spawn(move || {
            let mut captured = Vec::new();
            for (status, body) in replies {
                let Ok(Some(mut request)) = server.recv_timeout(Duration::from_secs(10)) else {
                    break;
                };
                let mut received = Vec::new();
                let _ = request.as_reader().read_to_end(&mut received);
                captured.push(Captured {
                    method: request.method().to_string(),
                    headers: request
                        .headers()
                        .iter()
                        .map(|h| (h.field.as_str().to_string(), h.value.as_str().to_string()))
                        .collect(),
                    body: received,
                });
                let _ = request.respond(Response::from_data(body).with_status_code(status));
            }
            captured
        });

        Some(Self {
            url: format!("http://127.0.0.1:{port}/fsapi"),
            handle: Some(handle),
        })
    }

    /// Waits for the server thread and returns what it received.
    pub fn finish(mut self) -> Vec<Captured> {
        self.handle
            .take()
            .map(|h| h.join().expect("server thread panicked"))
            .unwrap_or_default()
    }
}

/// Returns a URL on a local port with nothing listening.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/fsapi")
}
