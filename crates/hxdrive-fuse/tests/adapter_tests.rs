//! Integration tests for the adapter's public building blocks.

mod common;

use fuser::{FileType, MountOption};
use hxdrive_fuse::{
    InodeTable, MountConfig, MountError, ROOT_INODE, StatfsReply, parse_remote_root, resolve_token,
    to_file_attr,
};
use hxdrive_rpc::{Attributes, DEFAULT_ENDPOINT, EntryType, VolumeStats};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

#[test]
fn token_file_with_crlf() {
    let file = common::temp_file(b"tok-123\r\nignored\r\n");
    assert_eq!(resolve_token(None, Some(file.path())).unwrap(), "tok-123");
}

#[test]
fn token_file_blank_first_line() {
    let file = common::temp_file(b"\r\ntoken-on-line-two\n");
    assert!(matches!(
        resolve_token(None, Some(file.path())),
        Err(MountError::EmptyToken)
    ));
}

#[test]
fn relative_remote_path_is_rejected() {
    let err = parse_remote_root("photos/2024").unwrap_err();
    assert!(matches!(err, MountError::InvalidRemotePath(_)));
    assert_eq!(parse_remote_root("/photos/2024").unwrap(), "/photos/2024");
}

#[test]
fn default_endpoint_names_the_mount() {
    let options = MountConfig::default()
        .fs_name_from_endpoint(DEFAULT_ENDPOINT)
        .mount_options();
    assert_eq!(options[0], MountOption::FSName("drive.hexalinq.com".to_string()));
    assert_eq!(options[1], MountOption::Subtype("hexalinq-drive".to_string()));
}

#[test]
fn concurrent_lookups_share_one_inode() {
    let table = Arc::new(InodeTable::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                (0..100)
                    .map(|i| table.get_or_insert(&format!("/dir/file{i}")))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for other in &results[1..] {
        assert_eq!(other, &results[0]);
    }
    assert_eq!(table.len(), 101);

    // Every lookup was counted: eight forgets evict each entry.
    let ino = results[0][0];
    for _ in 0..7 {
        assert!(!table.forget(ino, 1));
    }
    assert!(table.forget(ino, 1));
    assert!(table.get(ino).is_none());
    assert!(table.get(ROOT_INODE).is_some());
}

#[test]
fn remote_record_to_kernel_attr() {
    let attrs = Attributes::from_record(&common::record(EntryType::Directory, 0));
    let attr = to_file_attr(42, &attrs, 1000, 1000);
    assert_eq!(attr.kind, FileType::Directory);
    assert_eq!(attr.perm, 0o755);
    assert_eq!(attr.atime, UNIX_EPOCH + Duration::from_secs(1_600_000_000));
    assert_eq!(attr.mtime, UNIX_EPOCH + Duration::new(1_700_000_000, 500));

    let attrs = Attributes::from_record(&common::record(EntryType::Other(9), 513));
    let attr = to_file_attr(43, &attrs, 0, 0);
    assert_eq!(attr.kind, FileType::RegularFile);
    assert_eq!(attr.blocks, 2);
}

#[test]
fn statfs_reply_from_volume() {
    let reply = StatfsReply::from(&VolumeStats {
        total_space: 1 << 30,
        free_space: 1 << 20,
        total_inodes: 0,
        free_inodes: 0,
    });
    assert_eq!(reply.blocks, 1 << 20);
    assert_eq!(reply.bfree, 1 << 10);
    assert_eq!(reply.namelen, 255);
}
