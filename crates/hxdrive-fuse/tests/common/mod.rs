//! Shared helpers for adapter integration tests.

#![allow(dead_code)]

use hxdrive_rpc::{EntryType, StatRecord, Timespec};
use std::io::Write;
use tempfile::NamedTempFile;

/// Writes `contents` to a fresh temporary file.
pub fn temp_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents).expect("write temp file");
    file
}

pub fn record(entry_type: EntryType, size: u64) -> StatRecord {
    StatRecord {
        size,
        accessed: Timespec { seconds: 1_600_000_000, nanoseconds: 0 },
        modified: Timespec { seconds: 1_700_000_000, nanoseconds: 500 },
        changed: Timespec { seconds: 1_700_000_001, nanoseconds: 0 },
        created: Timespec { seconds: 1_500_000_000, nanoseconds: 0 },
        uid: 0,
        gid: 0,
        permissions: 0o644,
        entry_type,
    }
}
