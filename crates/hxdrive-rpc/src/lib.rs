//! RPC translation layer for the Hexalinq Drive filesystem protocol.
//!
//! Filesystem operations are sent as HTTP requests whose method is the
//! operation name and whose arguments travel as `X-<Key>` headers. Replies
//! are small little-endian binary records.
//!
//! # Usage
//!
//! ```no_run
//! use hxdrive_rpc::{RpcClient, Session};
//!
//! let session = Session::new("https://drive.example.com/fsapi")
//!     .with_token("access-token")
//!     .with_root("/home/me");
//! let client = RpcClient::new(session);
//! client.connect()?;
//!
//! for entry in client.list("/")?.entries {
//!     println!("{}", entry.name_lossy());
//! }
//!
//! client.disconnect();
//! # Ok::<(), hxdrive_rpc::RpcError>(())
//! ```

pub mod buffer;
pub mod client;
pub mod error;
pub mod request;
pub mod response;
pub mod session;
pub mod stats;
pub mod status;
pub mod testing;
pub mod transport;
pub mod wire;

pub use buffer::ResponseBuffer;
pub use client::{AccessMode, Attributes, MAX_CHUNK_SIZE, MAX_METADATA_SIZE, RpcClient};
pub use error::{ConfigError, ProtocolError, RpcError, RpcResult, ToErrno, TransportError, TransportErrorKind};
pub use request::{RequestBuilder, RpcRequest};
pub use response::{DirEntry, DirListing};
pub use session::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT, Session};
pub use stats::{RpcStats, RpcStatsSnapshot};
pub use status::{RemoteError, RemoteErrorKind};
pub use transport::{HttpTransport, Transport};
pub use wire::{EntryType, ListingDiagnostic, StatRecord, Timespec, VolumeStats};
