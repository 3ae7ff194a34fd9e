//! One method per filesystem verb.
//!
//! [`RpcClient`] composes the request builder, a [`Transport`] and the
//! response decoders. Every verb is a single synchronous exchange, except
//! [`RpcClient::write`], which sends one exchange per chunk in order.

use crate::buffer::ResponseBuffer;
use crate::error::RpcResult;
use crate::request::{RequestBuilder, RpcRequest};
use crate::response::{self, DirListing, HEADER_SIZE};
use crate::session::Session;
use crate::stats::RpcStats;
use crate::transport::{HttpTransport, Transport};
use crate::wire::{EntryType, FORMAT, StatRecord, VolumeStats};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{trace, warn};

/// Response ceiling for metadata and status replies (8 MiB).
pub const MAX_METADATA_SIZE: usize = 8 * 1024 * 1024;

/// Largest upload sent in a single `WRITE` (256 KiB).
pub const MAX_CHUNK_SIZE: usize = 256 * 1024;

/// Response ceiling for the `INIT` handshake (512 KiB).
pub const INIT_RESPONSE_LIMIT: usize = 512 * 1024;

const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const DEFAULT_PERMISSIONS: u32 = 0o755;

/// Access mode of an `OPEN` call, the `O_ACCMODE` part of the open flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Extracts the access mode from `open(2)` flags.
    ///
    /// Returns `None` when the `O_ACCMODE` bits hold none of the three
    /// standard modes.
    pub fn from_flags(flags: i32) -> Option<Self> {
        match flags & libc::O_ACCMODE {
            libc::O_RDONLY => Some(AccessMode::ReadOnly),
            libc::O_WRONLY => Some(AccessMode::WriteOnly),
            libc::O_RDWR => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }

    /// Value sent on the wire.
    #[allow(clippy::cast_sign_loss)]
    pub fn as_raw(self) -> u32 {
        match self {
            AccessMode::ReadOnly => libc::O_RDONLY as u32,
            AccessMode::WriteOnly => libc::O_WRONLY as u32,
            AccessMode::ReadWrite => libc::O_RDWR as u32,
        }
    }
}

/// Metadata of a remote entry, in the shape the filesystem reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub kind: EntryType,
    /// Full mode including the file type bits.
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    /// Size in 512-byte units, rounded up.
    pub blocks: u64,
    pub accessed: SystemTime,
    pub modified: SystemTime,
    pub changed: SystemTime,
    pub created: SystemTime,
}

impl Attributes {
    /// Attributes reported for the mount root without asking the remote.
    pub fn root() -> Self {
        Self {
            kind: EntryType::Directory,
            mode: S_IFDIR | DEFAULT_PERMISSIONS,
            nlink: 2,
            size: 0,
            blocks: 0,
            accessed: UNIX_EPOCH,
            modified: UNIX_EPOCH,
            changed: UNIX_EPOCH,
            created: UNIX_EPOCH,
        }
    }

    pub fn from_record(record: &StatRecord) -> Self {
        let type_bits = match record.entry_type {
            EntryType::Directory => S_IFDIR,
            EntryType::File => S_IFREG,
            EntryType::Other(_) => 0,
        };
        Self {
            kind: record.entry_type,
            mode: type_bits | DEFAULT_PERMISSIONS,
            nlink: 2,
            size: record.size,
            blocks: record.size.div_ceil(512),
            accessed: record.accessed.to_system_time(),
            modified: record.modified.to_system_time(),
            changed: record.changed.to_system_time(),
            created: record.created.to_system_time(),
        }
    }

    /// Permission bits without the file type.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Client for the remote filesystem protocol.
pub struct RpcClient<T: Transport = HttpTransport> {
    session: Session,
    transport: T,
    chunk_size: usize,
    stats: Arc<RpcStats>,
}

impl RpcClient<HttpTransport> {
    /// Creates a client that talks HTTP to the session's endpoint.
    pub fn new(session: Session) -> Self {
        let transport = HttpTransport::new(&session);
        Self::with_transport(session, transport)
    }
}

impl<T: Transport> RpcClient<T> {
    pub fn with_transport(session: Session, transport: T) -> Self {
        Self {
            session,
            transport,
            chunk_size: MAX_CHUNK_SIZE,
            stats: Arc::new(RpcStats::new()),
        }
    }

    /// Sets the largest upload sent per `WRITE`. Zero is treated as one.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn stats(&self) -> &Arc<RpcStats> {
        &self.stats
    }

    fn send(&self, builder: RequestBuilder<'_>) -> RpcResult<ResponseBuffer> {
        let request: RpcRequest<'_> = builder.build(&self.session)?;
        self.stats.record_request(request.body().map_or(0, <[u8]>::len));
        let buffer = self.transport.execute(&request)?;
        self.stats.record_response(buffer.len());
        Ok(buffer)
    }

    /// Sends a request and decodes its reply, counting any failure.
    fn roundtrip<R>(
        &self,
        builder: RequestBuilder<'_>,
        decode: impl FnOnce(&[u8]) -> RpcResult<R>,
    ) -> RpcResult<R> {
        let result = self.send(builder).and_then(|buffer| decode(buffer.as_slice()));
        if let Err(e) = &result {
            self.stats.record_error(e);
        }
        result
    }

    fn path_request<'a>(method: &str, path: &str) -> RequestBuilder<'a> {
        RpcRequest::builder(method, MAX_METADATA_SIZE)
            .arg("Path", path)
            .arg("Format", FORMAT)
    }

    /// Opens the remote session.
    pub fn connect(&self) -> RpcResult<()> {
        trace!("connect");
        self.roundtrip(RpcRequest::builder("INIT", INIT_RESPONSE_LIMIT), |_| Ok(()))
    }

    /// Closes the remote session. Failures are logged and otherwise ignored.
    pub fn disconnect(&self) {
        trace!("disconnect");
        if let Err(e) = self.roundtrip(RpcRequest::builder("DESTROY", 0), |_| Ok(())) {
            warn!(error = %e, "disconnect failed");
        }
    }

    /// Fetches the attributes of `path`.
    ///
    /// The root is answered locally as a directory.
    pub fn lookup(&self, path: &str) -> RpcResult<Attributes> {
        trace!(path, "lookup");
        if path == "/" {
            return Ok(Attributes::root());
        }

        let request = RpcRequest::builder("GETATTR", MAX_METADATA_SIZE)
            .arg("Path", path)
            .arg("Format", FORMAT)
            .arg("Max-Size", MAX_METADATA_SIZE);
        self.roundtrip(request, |body| {
            response::decode_attributes(body).map(|record| Attributes::from_record(&record))
        })
    }

    /// Lists the entries of the directory at `path`.
    ///
    /// A listing that stops early or leaves bytes over is still returned;
    /// the diagnostic is logged and kept in the result.
    pub fn list(&self, path: &str) -> RpcResult<DirListing> {
        trace!(path, "list");
        let request = RpcRequest::builder("READDIR", MAX_METADATA_SIZE)
            .arg("Path", path)
            .arg("Format", FORMAT)
            .arg("Max-Size", MAX_METADATA_SIZE);
        let listing = self.roundtrip(request, response::decode_listing)?;

        if let Some(diagnostic) = &listing.diagnostic {
            self.stats.record_partial_listing();
            warn!(path, decoded = listing.entries.len(), "readdir: {diagnostic}");
        }
        Ok(listing)
    }

    pub fn volume_stats(&self) -> RpcResult<VolumeStats> {
        trace!("volume_stats");
        let request = RpcRequest::builder("STATVFS", MAX_METADATA_SIZE).arg("Format", FORMAT);
        self.roundtrip(request, response::decode_statvfs)
    }

    pub fn unlink(&self, path: &str) -> RpcResult<()> {
        trace!(path, "unlink");
        self.roundtrip(Self::path_request("UNLINK", path), |body| {
            response::check_status("UNLINK", body)
        })
    }

    pub fn remove_dir(&self, path: &str) -> RpcResult<()> {
        trace!(path, "remove_dir");
        self.roundtrip(Self::path_request("RMDIR", path), |body| {
            response::check_status("RMDIR", body)
        })
    }

    pub fn make_dir(&self, path: &str, mode: u32) -> RpcResult<()> {
        trace!(path, mode, "make_dir");
        let request = RpcRequest::builder("MKDIR", MAX_METADATA_SIZE)
            .arg("Path", path)
            .arg("Mode", mode)
            .arg("Format", FORMAT);
        self.roundtrip(request, |body| response::check_status("MKDIR", body))
    }

    /// Opens an existing file, optionally truncating it.
    pub fn open(&self, path: &str, access: AccessMode, truncate: bool) -> RpcResult<()> {
        trace!(path, ?access, truncate, "open");
        let request = RpcRequest::builder("OPEN", MAX_METADATA_SIZE)
            .arg("Path", path)
            .arg("Access", access.as_raw())
            .arg("Mode", 0o777)
            .arg("Trunc", u8::from(truncate))
            .arg("Create", 0)
            .arg("Excl", 0)
            .arg("Format", FORMAT);
        self.roundtrip(request, |body| response::check_status("OPEN", body))
    }

    /// Creates a new file for reading and writing. Fails if it already exists.
    pub fn create(&self, path: &str, mode: u32) -> RpcResult<()> {
        trace!(path, mode, "create");
        let request = RpcRequest::builder("OPEN", MAX_METADATA_SIZE)
            .arg("Path", path)
            .arg("Access", AccessMode::ReadWrite.as_raw())
            .arg("Mode", mode)
            .arg("Trunc", 0)
            .arg("Create", 1)
            .arg("Excl", 1)
            .arg("Format", FORMAT);
        self.roundtrip(request, |body| response::check_status("OPEN", body))
    }

    /// Reads up to `size` bytes at `offset`. Fewer bytes means end of file.
    pub fn read(&self, path: &str, offset: u64, size: usize) -> RpcResult<Vec<u8>> {
        trace!(path, offset, size, "read");
        let request = RpcRequest::builder("READ", HEADER_SIZE.saturating_add(size))
            .arg("Path", path)
            .arg("Offset", offset)
            .arg("Size", size)
            .arg("Format", FORMAT)
            .exact();
        self.roundtrip(request, |body| response::decode_read(body).map(<[u8]>::to_vec))
    }

    /// Writes `data` at `offset`, one request per chunk.
    ///
    /// The first failing chunk aborts the write; chunks before it have
    /// already been applied remotely. Returns `data.len()` on success.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> RpcResult<usize> {
        trace!(path, offset, len = data.len(), "write");
        let mut offset = offset;
        for chunk in data.chunks(self.chunk_size) {
            let request = Self::path_request("WRITE", path)
                .arg("Offset", offset)
                .upload(chunk);
            self.roundtrip(request, |body| response::check_status("WRITE", body))?;
            offset += chunk.len() as u64;
        }
        Ok(data.len())
    }

    /// Sets the size of the file at `path`.
    pub fn truncate(&self, path: &str, size: u64) -> RpcResult<()> {
        trace!(path, size, "truncate");
        let request = Self::path_request("TRUNCATE", path).arg("Size", size);
        self.roundtrip(request, |body| response::check_status("TRUNCATE", body))
    }
}

impl<T: Transport> std::fmt::Debug for RpcClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("session", &self.session)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}
