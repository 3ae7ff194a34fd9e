//! Bounded response buffer.

use crate::error::ProtocolError;

/// Most an exact buffer reserves before any byte arrives (8 MiB).
const MAX_RESERVATION: usize = 8 * 1024 * 1024;

/// Append-only byte buffer with a fixed ceiling.
///
/// Appending past the ceiling fails instead of growing, so a misbehaving
/// server cannot make a single call allocate without bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    limit: usize,
}

impl ResponseBuffer {
    /// Creates an empty buffer that grows on demand up to `limit`.
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    /// Creates an empty buffer with its capacity reserved up front.
    ///
    /// The reservation is capped at 8 MiB; a larger ceiling is still
    /// honored, the buffer grows past the reservation on demand.
    pub fn exact(limit: usize) -> Self {
        Self {
            data: Vec::with_capacity(limit.min(MAX_RESERVATION)),
            limit,
        }
    }

    /// Appends `bytes`, failing with [`ProtocolError::Overflow`] if the
    /// result would exceed the ceiling. On failure nothing is appended.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        if bytes.len() > self.remaining() {
            return Err(ProtocolError::Overflow { limit: self.limit });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes that can still be appended.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.data.len())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for ResponseBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
