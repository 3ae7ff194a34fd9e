//! FUSE filesystem for Hexalinq Drive.
//!
//! Presents a subtree of a remote drive as a local directory. Every kernel
//! request is answered with one or more synchronous RPC verbs from
//! [`hxdrive_rpc`]; nothing is cached beyond the kernel's attribute TTL and
//! the listing held by an open directory handle.
//!
//! # Usage
//!
//! ```no_run
//! use hxdrive_fuse::{DriveFs, MountConfig};
//! use hxdrive_rpc::{RpcClient, Session};
//!
//! let session = Session::default().with_token("secret").with_root("/photos");
//! let client = RpcClient::new(session);
//! client.connect()?;
//!
//! let config = MountConfig::default().fs_name_from_endpoint(client.session().endpoint());
//! let options = config.mount_options();
//! let fs = DriveFs::new(client, config);
//! fuser::mount2(fs, "/mnt/drive", &options)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod attr;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod inode;
pub mod token;

pub use attr::{StatfsReply, to_file_attr};
pub use config::{DEFAULT_ATTR_TTL, MountConfig, SUBTYPE};
pub use error::{MountError, MountResult};
pub use filesystem::{DirSlot, DriveFs};
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
pub use token::{parse_remote_root, read_token_file, resolve_token};
