//! Lock-free counters for RPC activity.
//!
//! # Usage
//!
//! ```
//! use hxdrive_rpc::stats::RpcStats;
//!
//! let stats = RpcStats::new();
//! stats.record_request(128);
//! stats.record_response(4096);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.requests, 1);
//! assert_eq!(snapshot.bytes_received, 4096);
//! ```

use crate::error::RpcError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for requests, payload bytes and failures.
///
/// All operations use relaxed atomics; the counters are independent and
/// only ever read for reporting.
#[derive(Debug, Default)]
pub struct RpcStats {
    /// Exchanges attempted.
    pub requests: AtomicU64,
    /// Upload bytes sent.
    pub bytes_sent: AtomicU64,
    /// Response bytes received.
    pub bytes_received: AtomicU64,
    /// Failures before a reply was read (configuration or transport).
    pub transport_errors: AtomicU64,
    /// Replies that did not match the expected layout.
    pub protocol_errors: AtomicU64,
    /// Replies carrying a non-zero status byte.
    pub remote_errors: AtomicU64,
    /// Listings decoded with a diagnostic.
    pub partial_listings: AtomicU64,
}

impl RpcStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_request(&self, upload_len: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(upload_len as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_response(&self, len: usize) {
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Counts a failed call under its error category.
    #[inline]
    pub fn record_error(&self, error: &RpcError) {
        let counter = match error {
            RpcError::Config(_) | RpcError::Transport(_) => &self.transport_errors,
            RpcError::Protocol(_) => &self.protocol_errors,
            RpcError::Remote(_) => &self.remote_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_partial_listing(&self) {
        self.partial_listings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.requests,
            &self.bytes_sent,
            &self.bytes_received,
            &self.transport_errors,
            &self.protocol_errors,
            &self.remote_errors,
            &self.partial_listings,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Create a snapshot of current values.
    pub fn snapshot(&self) -> RpcStatsSnapshot {
        RpcStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            partial_listings: self.partial_listings.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RpcStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcStatsSnapshot {
    pub requests: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub transport_errors: u64,
    pub protocol_errors: u64,
    pub remote_errors: u64,
    pub partial_listings: u64,
}

impl RpcStatsSnapshot {
    pub fn total_errors(&self) -> u64 {
        self.transport_errors + self.protocol_errors + self.remote_errors
    }
}

impl fmt::Display for RpcStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests, {} bytes sent, {} bytes received, {} errors",
            self.requests,
            self.bytes_sent,
            self.bytes_received,
            self.total_errors()
        )
    }
}
