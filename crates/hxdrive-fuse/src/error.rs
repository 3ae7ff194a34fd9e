//! Errors raised while preparing a mount.
//!
//! Filesystem operations themselves report [`hxdrive_rpc::RpcError`]
//! through its errno mapping; the errors here only occur at startup.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    /// Neither a token nor a token file was given.
    #[error("no access token given (use --token, --token-file or HXDRIVE_TOKEN)")]
    MissingToken,

    /// The token (or the first line of the token file) is empty.
    #[error("access token is empty")]
    EmptyToken,

    /// The token file could not be read.
    #[error("failed to read token file {}: {source}", path.display())]
    TokenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The remote path is not absolute.
    #[error("remote path must start with '/': {0:?}")]
    InvalidRemotePath(String),
}

pub type MountResult<T> = Result<T, MountError>;
