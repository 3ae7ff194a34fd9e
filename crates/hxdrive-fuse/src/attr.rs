//! Conversion from remote metadata to kernel attribute replies.

use fuser::{FileAttr, FileType};
use hxdrive_rpc::{Attributes, EntryType, VolumeStats};
use std::time::SystemTime;

/// Preferred I/O size reported to the kernel.
pub const BLOCK_SIZE: u32 = 4096;

/// Block size used for volume statistics.
pub const STATFS_BLOCK_SIZE: u32 = 1024;

/// Longest file name accepted by the protocol.
pub const MAX_NAME_LEN: u32 = 255;

/// Maps a remote entry type to a kernel file type.
///
/// Entries of unknown type are presented as regular files.
pub fn file_type(kind: EntryType) -> FileType {
    match kind {
        EntryType::Directory => FileType::Directory,
        EntryType::File | EntryType::Other(_) => FileType::RegularFile,
    }
}

/// Builds the kernel attributes for inode `ino`, owned by `uid`/`gid`.
#[allow(clippy::cast_possible_truncation)]
pub fn to_file_attr(ino: u64, attrs: &Attributes, uid: u32, gid: u32) -> FileAttr {
    FileAttr {
        ino,
        size: attrs.size,
        blocks: attrs.blocks,
        atime: attrs.accessed,
        mtime: attrs.modified,
        ctime: attrs.changed,
        crtime: attrs.created,
        kind: file_type(attrs.kind),
        // Permission bits are at most 0o7777
        perm: attrs.permissions() as u16,
        nlink: attrs.nlink,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Attributes of an entry that was just created, used when the follow-up
/// metadata request fails.
pub fn fresh_attributes(kind: EntryType, mode: u32, now: SystemTime) -> Attributes {
    let type_bits = if kind.is_dir() { 0o040_000 } else { 0o100_000 };
    Attributes {
        kind,
        mode: type_bits | (mode & 0o7777),
        nlink: if kind.is_dir() { 2 } else { 1 },
        size: 0,
        blocks: 0,
        accessed: now,
        modified: now,
        changed: now,
        created: now,
    }
}

/// Arguments of a `statfs` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatfsReply {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

impl From<&VolumeStats> for StatfsReply {
    fn from(stats: &VolumeStats) -> Self {
        let block = u64::from(STATFS_BLOCK_SIZE);
        Self {
            blocks: stats.total_space / block,
            bfree: stats.free_space / block,
            bavail: stats.free_space / block,
            files: stats.total_inodes,
            ffree: stats.free_inodes,
            bsize: STATFS_BLOCK_SIZE,
            namelen: MAX_NAME_LEN,
            frsize: STATFS_BLOCK_SIZE,
        }
    }
}
