//! Binary record layouts of the `binary-le-1` wire format.
//!
//! Every record is little-endian and densely packed. Records are decoded
//! through bounds-checked reads over a byte slice rather than by
//! reinterpreting memory, so a short or malformed buffer can never cause an
//! out-of-bounds access.
//!
//! # Layouts
//!
//! | Record | Size | Contents |
//! |--------|------|----------|
//! | stat | 83 | size, atime, mtime, ctime, crtime, uid, gid, permissions, type |
//! | dirent | `align8(84 + n + 1)` | stat, name length `n`, name, NUL, padding |
//! | statvfs | 32 | total space, free space, total inodes, free inodes |
//!
//! Each timestamp is a `(u64 seconds, u64 nanoseconds)` pair.

use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Format negotiation string sent with every data request.
pub const FORMAT: &str = "binary-le-1";

/// Encoded size of a [`StatRecord`].
pub const STAT_RECORD_SIZE: usize = 83;

/// Fixed part of a directory entry: a stat record plus the name length byte.
pub const DIRENT_FIXED_SIZE: usize = STAT_RECORD_SIZE + 1;

/// Directory entries are padded to this boundary.
pub const DIRENT_ALIGNMENT: usize = 8;

/// Longest name a directory entry can carry (the length is a single byte).
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Encoded size of a [`VolumeStats`] record.
pub const STATVFS_RECORD_SIZE: usize = 32;

/// Errors from encoding or decoding fixed-layout records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    /// The buffer is shorter than the record layout.
    #[error("{record} record needs {expected} bytes, got {actual}")]
    Truncated {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A directory entry name does not fit the one-byte length field.
    #[error("entry name is {len} bytes, longer than {max}", max = MAX_NAME_LEN)]
    NameTooLong { len: usize },
}

/// Rounds `value` up to the next multiple of `alignment`.
#[inline]
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Sequential little-endian reader over a byte slice.
///
/// Every read is bounds-checked and returns `None` past the end.
struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let field = self.bytes.get(self.pos..end)?;
        self.pos = end;
        field.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn timespec(&mut self) -> Option<Timespec> {
        Some(Timespec {
            seconds: self.u64()?,
            nanoseconds: self.u64()?,
        })
    }
}

/// A `(seconds, nanoseconds)` timestamp relative to the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timespec {
    pub seconds: u64,
    pub nanoseconds: u64,
}

impl Timespec {
    /// Converts to a `SystemTime`, saturating to the epoch on overflow.
    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH
            .checked_add(Duration::from_secs(self.seconds))
            .and_then(|t| t.checked_add(Duration::from_nanos(self.nanoseconds)))
            .unwrap_or(UNIX_EPOCH)
    }

    fn encode_into(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.seconds.to_le_bytes());
        out.extend_from_slice(&self.nanoseconds.to_le_bytes());
    }
}

/// Entry type discriminant of a stat record.
///
/// Unknown discriminants are kept verbatim so that re-encoding a decoded
/// record reproduces the original bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Directory,
    File,
    Other(u8),
}

impl EntryType {
    pub fn is_dir(self) -> bool {
        matches!(self, EntryType::Directory)
    }
}

impl From<u8> for EntryType {
    fn from(raw: u8) -> Self {
        match raw {
            0 => EntryType::Directory,
            1 => EntryType::File,
            other => EntryType::Other(other),
        }
    }
}

impl From<EntryType> for u8 {
    fn from(kind: EntryType) -> Self {
        match kind {
            EntryType::Directory => 0,
            EntryType::File => 1,
            EntryType::Other(raw) => raw,
        }
    }
}

/// Metadata record returned by `GETATTR` and embedded in directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
    pub size: u64,
    pub accessed: Timespec,
    pub modified: Timespec,
    pub changed: Timespec,
    pub created: Timespec,
    pub uid: u32,
    pub gid: u32,
    pub permissions: u16,
    pub entry_type: EntryType,
}

impl StatRecord {
    /// Decodes a record from the start of `bytes`.
    ///
    /// Bytes past [`STAT_RECORD_SIZE`] are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Self::read(&mut FieldReader::new(bytes)).ok_or(WireError::Truncated {
            record: "stat",
            expected: STAT_RECORD_SIZE,
            actual: bytes.len(),
        })
    }

    fn read(reader: &mut FieldReader<'_>) -> Option<Self> {
        Some(Self {
            size: reader.u64()?,
            accessed: reader.timespec()?,
            modified: reader.timespec()?,
            changed: reader.timespec()?,
            created: reader.timespec()?,
            uid: reader.u32()?,
            gid: reader.u32()?,
            permissions: reader.u16()?,
            entry_type: EntryType::from(reader.u8()?),
        })
    }

    /// Appends the encoded record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.size.to_le_bytes());
        self.accessed.encode_into(out);
        self.modified.encode_into(out);
        self.changed.encode_into(out);
        self.created.encode_into(out);
        out.extend_from_slice(&self.uid.to_le_bytes());
        out.extend_from_slice(&self.gid.to_le_bytes());
        out.extend_from_slice(&self.permissions.to_le_bytes());
        out.push(u8::from(self.entry_type));
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STAT_RECORD_SIZE);
        self.encode_into(&mut out);
        out
    }
}

/// Volume statistics record returned by `STATVFS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeStats {
    pub total_space: u64,
    pub free_space: u64,
    pub total_inodes: u64,
    pub free_inodes: u64,
}

impl VolumeStats {
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = FieldReader::new(bytes);
        let read = |r: &mut FieldReader<'_>| {
            Some(Self {
                total_space: r.u64()?,
                free_space: r.u64()?,
                total_inodes: r.u64()?,
                free_inodes: r.u64()?,
            })
        };
        read(&mut reader).ok_or(WireError::Truncated {
            record: "statvfs",
            expected: STATVFS_RECORD_SIZE,
            actual: bytes.len(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STATVFS_RECORD_SIZE);
        for field in [
            self.total_space,
            self.free_space,
            self.total_inodes,
            self.free_inodes,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out
    }
}

/// Why decoding a directory entry stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DirentError {
    /// Fewer bytes remain than the fixed part of an entry.
    #[error("{remaining} bytes left, an entry needs at least {min}", min = DIRENT_FIXED_SIZE)]
    ShortHeader { remaining: usize },

    /// The padded entry length runs past the end of the buffer.
    #[error("entry needs {needed} bytes but only {remaining} remain")]
    Overrun { needed: usize, remaining: usize },

    /// The name is not NUL-terminated at its declared length.
    #[error("name of declared length {name_len} is not NUL-terminated")]
    Unterminated { name_len: usize },
}

/// Returns the padded on-wire length of an entry with a `name_len` byte name.
#[inline]
pub fn dirent_len(name_len: usize) -> usize {
    align_up(DIRENT_FIXED_SIZE + name_len + 1, DIRENT_ALIGNMENT)
}

/// A validated directory entry borrowed from a response buffer.
#[derive(Debug, Clone, Copy)]
pub struct DirentView<'a> {
    stat: StatRecord,
    name: &'a [u8],
    encoded_len: usize,
}

impl<'a> DirentView<'a> {
    /// Validates and decodes the entry at the start of `bytes`.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DirentError> {
        let remaining = bytes.len();
        if remaining < DIRENT_FIXED_SIZE {
            return Err(DirentError::ShortHeader { remaining });
        }

        let name_len = usize::from(bytes[STAT_RECORD_SIZE]);
        let needed = dirent_len(name_len);
        if needed > remaining {
            return Err(DirentError::Overrun { needed, remaining });
        }

        let name_end = DIRENT_FIXED_SIZE + name_len;
        if bytes[name_end] != 0 {
            return Err(DirentError::Unterminated { name_len });
        }

        let stat = StatRecord::decode(bytes).map_err(|_| DirentError::ShortHeader { remaining })?;
        Ok(Self {
            stat,
            name: &bytes[DIRENT_FIXED_SIZE..name_end],
            encoded_len: needed,
        })
    }

    pub fn stat(&self) -> &StatRecord {
        &self.stat
    }

    /// Raw name bytes, without the terminator.
    pub fn name(&self) -> &'a [u8] {
        self.name
    }

    pub fn name_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.name)
    }

    /// Padded length this entry occupies in the stream.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }
}

/// Appends one padded directory entry to `out`.
pub fn encode_dirent(stat: &StatRecord, name: &[u8], out: &mut Vec<u8>) -> Result<(), WireError> {
    let name_len = u8::try_from(name.len()).map_err(|_| WireError::NameTooLong { len: name.len() })?;
    let start = out.len();
    stat.encode_into(out);
    out.push(name_len);
    out.extend_from_slice(name);
    out.push(0);
    out.resize(start + dirent_len(name.len()), 0);
    Ok(())
}

/// Encodes a complete listing body: entry count followed by the entries.
pub fn encode_listing<'n, I>(entries: I) -> Result<Vec<u8>, WireError>
where
    I: IntoIterator<Item = (StatRecord, &'n [u8])>,
{
    let mut body = vec![0u8; 8];
    let mut count: u64 = 0;
    for (stat, name) in entries {
        encode_dirent(&stat, name, &mut body)?;
        count += 1;
    }
    body[..8].copy_from_slice(&count.to_le_bytes());
    Ok(body)
}

/// Leniency diagnostics from decoding a directory entry stream.
///
/// Neither case is an error: the entries decoded before the problem are
/// still returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingDiagnostic {
    /// Fewer entries were decoded than the header declared.
    Truncated { missing: u64, cause: DirentError },
    /// All declared entries were decoded but bytes were left over.
    TrailingBytes { count: usize },
}

impl fmt::Display for ListingDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingDiagnostic::Truncated { missing, cause } => write!(
                f,
                "truncated response: {missing} {} remaining ({cause})",
                if *missing == 1 { "entry" } else { "entries" }
            ),
            ListingDiagnostic::TrailingBytes { count } => write!(
                f,
                "{count} {} not parsed",
                if *count == 1 { "byte was" } else { "bytes were" }
            ),
        }
    }
}

/// Iterator over the directory entries of a listing body.
///
/// Stops at the declared count or at the first malformed entry; call
/// [`DirentIter::finish`] afterwards to learn whether anything was skipped.
pub struct DirentIter<'a> {
    rest: &'a [u8],
    remaining: u64,
    stopped: Option<DirentError>,
}

impl<'a> DirentIter<'a> {
    /// Iterates `declared` entries from `entries` (the bytes after the count header).
    pub fn new(entries: &'a [u8], declared: u64) -> Self {
        Self {
            rest: entries,
            remaining: declared,
            stopped: None,
        }
    }

    /// Consumes the iterator and reports what was left undecoded.
    pub fn finish(mut self) -> Option<ListingDiagnostic> {
        // Drain so that a partially consumed iterator reports accurately.
        while self.next().is_some() {}

        if self.remaining > 0 {
            let cause = self.stopped.unwrap_or(DirentError::ShortHeader {
                remaining: self.rest.len(),
            });
            Some(ListingDiagnostic::Truncated {
                missing: self.remaining,
                cause,
            })
        } else if !self.rest.is_empty() {
            Some(ListingDiagnostic::TrailingBytes {
                count: self.rest.len(),
            })
        } else {
            None
        }
    }
}

impl<'a> Iterator for DirentIter<'a> {
    type Item = DirentView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.stopped.is_some() {
            return None;
        }

        match DirentView::parse(self.rest) {
            Ok(entry) => {
                self.rest = &self.rest[entry.encoded_len()..];
                self.remaining -= 1;
                Some(entry)
            }
            Err(e) => {
                self.stopped = Some(e);
                None
            }
        }
    }
}
