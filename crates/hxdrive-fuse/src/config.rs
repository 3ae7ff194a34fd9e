//! Mount configuration for the FUSE filesystem.

use fuser::MountOption;
use std::time::Duration;

/// Default time-to-live for attributes and entries handed to the kernel.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Filesystem subtype shown in the mount table.
pub const SUBTYPE: &str = "hexalinq-drive";

/// Configuration options for the FUSE filesystem.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Time-to-live for attributes and entries.
    ///
    /// Every `getattr` past the TTL costs a remote round trip.
    pub attr_ttl: Duration,

    /// Reject every modifying operation with `EROFS`.
    pub read_only: bool,

    /// Ask the kernel to keep cached file pages across opens.
    pub kernel_cache: bool,

    /// Source name shown in the mount table, normally the endpoint host.
    pub fs_name: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_ATTR_TTL,
            read_only: false,
            kernel_cache: true,
            fs_name: SUBTYPE.to_string(),
        }
    }
}

impl MountConfig {
    /// Sets the cache TTL for file attributes.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn kernel_cache(mut self, enabled: bool) -> Self {
        self.kernel_cache = enabled;
        self
    }

    #[must_use]
    pub fn fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }

    /// Derives the mount table name from an endpoint URL (its host part).
    #[must_use]
    pub fn fs_name_from_endpoint(self, endpoint: &str) -> Self {
        let without_scheme = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
        let host = without_scheme.split('/').next().unwrap_or_default();
        if host.is_empty() {
            self
        } else {
            self.fs_name(host)
        }
    }

    /// Options passed to `fuser` when mounting.
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fs_name.clone()),
            MountOption::Subtype(SUBTYPE.to_string()),
            MountOption::AutoUnmount,
        ];
        if self.read_only {
            options.push(MountOption::RO);
        } else {
            options.push(MountOption::RW);
        }
        options
    }
}
