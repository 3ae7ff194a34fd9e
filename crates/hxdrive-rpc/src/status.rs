//! Mapping of one-byte remote status codes to local filesystem errors.

use std::fmt;

/// Category of a non-zero remote status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    NotFound,
    PermissionDenied,
    NotADirectory,
    Io,
    Unsupported,
    IsADirectory,
    AlreadyExists,
    QuotaExceeded,
    DirectoryNotEmpty,
    ReadOnlyFilesystem,
    OutOfSpace,
    TemporarilyUnavailable,
}

impl RemoteErrorKind {
    /// Maps a raw status code. Unknown codes are treated as generic I/O failures.
    pub fn from_status(status: u8) -> Self {
        match status {
            1 => RemoteErrorKind::NotFound,
            2 => RemoteErrorKind::PermissionDenied,
            3 => RemoteErrorKind::NotADirectory,
            5 => RemoteErrorKind::Unsupported,
            6 => RemoteErrorKind::IsADirectory,
            7 => RemoteErrorKind::AlreadyExists,
            8 => RemoteErrorKind::QuotaExceeded,
            9 => RemoteErrorKind::DirectoryNotEmpty,
            10 => RemoteErrorKind::ReadOnlyFilesystem,
            11 => RemoteErrorKind::OutOfSpace,
            12 => RemoteErrorKind::TemporarilyUnavailable,
            _ => RemoteErrorKind::Io,
        }
    }

    pub fn to_errno(self) -> i32 {
        match self {
            RemoteErrorKind::NotFound => libc::ENOENT,
            RemoteErrorKind::PermissionDenied => libc::EACCES,
            RemoteErrorKind::NotADirectory => libc::ENOTDIR,
            RemoteErrorKind::Io => libc::EIO,
            RemoteErrorKind::Unsupported => libc::ENOTSUP,
            RemoteErrorKind::IsADirectory => libc::EISDIR,
            RemoteErrorKind::AlreadyExists => libc::EEXIST,
            RemoteErrorKind::QuotaExceeded => libc::EDQUOT,
            RemoteErrorKind::DirectoryNotEmpty => libc::ENOTEMPTY,
            RemoteErrorKind::ReadOnlyFilesystem => libc::EROFS,
            RemoteErrorKind::OutOfSpace => libc::ENOSPC,
            RemoteErrorKind::TemporarilyUnavailable => libc::EAGAIN,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::PermissionDenied => "permission denied",
            RemoteErrorKind::NotADirectory => "not a directory",
            RemoteErrorKind::Io => "I/O error",
            RemoteErrorKind::Unsupported => "operation not supported",
            RemoteErrorKind::IsADirectory => "is a directory",
            RemoteErrorKind::AlreadyExists => "already exists",
            RemoteErrorKind::QuotaExceeded => "quota exceeded",
            RemoteErrorKind::DirectoryNotEmpty => "directory not empty",
            RemoteErrorKind::ReadOnlyFilesystem => "read-only filesystem",
            RemoteErrorKind::OutOfSpace => "no space left",
            RemoteErrorKind::TemporarilyUnavailable => "temporarily unavailable",
        }
    }
}

/// A failure reported by the remote through the status byte.
///
/// The raw code is kept so that unknown codes still show up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteError {
    pub status: u8,
    pub kind: RemoteErrorKind,
}

impl RemoteError {
    /// Returns `None` for status 0 (success).
    pub fn from_status(status: u8) -> Option<Self> {
        (status != 0).then(|| Self {
            status,
            kind: RemoteErrorKind::from_status(status),
        })
    }

    pub fn to_errno(&self) -> i32 {
        self.kind.to_errno()
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote status {}: {}", self.status, self.kind.describe())
    }
}

impl std::error::Error for RemoteError {}
