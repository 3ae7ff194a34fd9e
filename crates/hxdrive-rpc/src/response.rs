//! Per-operation interpretation of raw response bodies.
//!
//! Most replies start with a one-byte status. Metadata and read replies
//! reserve an 8-byte header in front of their payload, of which only the
//! first byte is the status. Listings and volume statistics carry no status
//! byte at all.

use crate::error::{ProtocolError, RpcResult};
use crate::status::RemoteError;
use crate::wire::{DirentIter, ListingDiagnostic, STAT_RECORD_SIZE, STATVFS_RECORD_SIZE, StatRecord, VolumeStats};

/// Length of the header in front of metadata, listing and read payloads.
pub const HEADER_SIZE: usize = 8;

fn require(operation: &'static str, body: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if body.len() < expected {
        return Err(ProtocolError::ShortResponse {
            operation,
            expected,
            actual: body.len(),
        });
    }
    Ok(())
}

fn status_of(body: &[u8]) -> Result<(), RemoteError> {
    match body.first().copied().and_then(RemoteError::from_status) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Checks a bare status reply.
pub fn check_status(operation: &'static str, body: &[u8]) -> RpcResult<()> {
    require(operation, body, 1)?;
    status_of(body)?;
    Ok(())
}

/// Decodes a `GETATTR` reply.
pub fn decode_attributes(body: &[u8]) -> RpcResult<StatRecord> {
    require("GETATTR", body, HEADER_SIZE)?;
    status_of(body)?;
    require("GETATTR", body, HEADER_SIZE + STAT_RECORD_SIZE)?;
    Ok(StatRecord::decode(&body[HEADER_SIZE..])?)
}

/// One decoded listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Raw name bytes as sent by the remote.
    pub name: Vec<u8>,
    pub stat: StatRecord,
}

impl DirEntry {
    pub fn name_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// Entries of a `READDIR` reply plus any leniency diagnostic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    pub entries: Vec<DirEntry>,
    pub diagnostic: Option<ListingDiagnostic>,
}

/// Decodes a `READDIR` reply.
///
/// A malformed entry stops decoding but is not an error: the entries before
/// it are returned together with a diagnostic.
pub fn decode_listing(body: &[u8]) -> RpcResult<DirListing> {
    require("READDIR", body, HEADER_SIZE)?;
    let mut count = [0u8; HEADER_SIZE];
    count.copy_from_slice(&body[..HEADER_SIZE]);
    let declared = u64::from_le_bytes(count);

    let mut iter = DirentIter::new(&body[HEADER_SIZE..], declared);
    let entries = iter
        .by_ref()
        .map(|entry| DirEntry {
            name: entry.name().to_vec(),
            stat: *entry.stat(),
        })
        .collect();

    Ok(DirListing {
        entries,
        diagnostic: iter.finish(),
    })
}

/// Decodes a `STATVFS` reply.
pub fn decode_statvfs(body: &[u8]) -> RpcResult<VolumeStats> {
    require("STATVFS", body, STATVFS_RECORD_SIZE)?;
    Ok(VolumeStats::decode(body)?)
}

/// Decodes a `READ` reply, returning the file content after the header.
///
/// A payload shorter than requested means end of file.
pub fn decode_read(body: &[u8]) -> RpcResult<&[u8]> {
    check_status("READ", body)?;
    require("READ", body, HEADER_SIZE)?;
    Ok(&body[HEADER_SIZE..])
}
