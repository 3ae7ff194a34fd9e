//! Access token and remote root resolution.

use crate::error::{MountError, MountResult};
use std::path::Path;

/// Reads the token from the first line of `path`.
///
/// Everything from the first `\n` or `\r` on is discarded.
pub fn read_token_file(path: &Path) -> MountResult<String> {
    let contents = std::fs::read(path).map_err(|source| MountError::TokenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let first_line = contents
        .split(|&b| b == b'\n' || b == b'\r')
        .next()
        .unwrap_or_default();
    non_empty(String::from_utf8_lossy(first_line).into_owned())
}

/// Picks the token from an explicit value or a token file, in that order.
pub fn resolve_token(token: Option<String>, token_file: Option<&Path>) -> MountResult<String> {
    match (token, token_file) {
        (Some(token), _) => non_empty(token),
        (None, Some(path)) => read_token_file(path),
        (None, None) => Err(MountError::MissingToken),
    }
}

fn non_empty(token: String) -> MountResult<String> {
    if token.is_empty() {
        Err(MountError::EmptyToken)
    } else {
        Ok(token)
    }
}

/// Checks that the remote path is absolute and returns it as the session root.
pub fn parse_remote_root(path: &str) -> MountResult<String> {
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Err(MountError::InvalidRemotePath(path.to_string()))
    }
}
