//! FUSE filesystem implementation backed by the remote drive.
//!
//! Every kernel request turns into at most a couple of synchronous RPC
//! verbs. The work of each operation lives in a `do_*` helper that returns
//! `Result<_, c_int>`; the [`Filesystem`] methods only translate the result
//! into a kernel reply.

use crate::attr::{StatfsReply, fresh_attributes, to_file_attr};
use crate::config::MountConfig;
use crate::inode::{InodeTable, ROOT_INODE, child_path, parent_path};
use dashmap::DashMap;
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use hxdrive_rpc::{
    AccessMode, Attributes, EntryType, HttpTransport, RpcClient, RpcError, RpcStats, Transport,
};
use libc::c_int;
use std::ffi::{OsStr, OsString};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// Longest entry name passed to the remote.
const MAX_NAME_LEN: usize = 255;

fn errno(err: &RpcError) -> c_int {
    err.to_errno()
}

/// One row of a directory listing as handed to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSlot {
    pub ino: u64,
    pub kind: FileType,
    pub name: OsString,
}

impl DirSlot {
    fn new(ino: u64, kind: FileType, name: impl Into<OsString>) -> Self {
        Self {
            ino,
            kind,
            name: name.into(),
        }
    }
}

/// Filesystem presenting a remote drive subtree.
pub struct DriveFs<T: Transport = HttpTransport> {
    client: RpcClient<T>,
    inodes: InodeTable,
    /// Listings fetched at `opendir`, served by offset until `releasedir`.
    dir_handles: DashMap<u64, Arc<Vec<DirSlot>>>,
    next_fh: AtomicU64,
    config: MountConfig,
    uid: u32,
    gid: u32,
}

impl<T: Transport> DriveFs<T> {
    /// Creates the filesystem. Entries are owned by the mounting user.
    pub fn new(client: RpcClient<T>, config: MountConfig) -> Self {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Self {
            client,
            inodes: InodeTable::new(),
            dir_handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
            config,
            uid,
            gid,
        }
    }

    /// Request counters of the underlying client, still valid after unmount.
    pub fn stats(&self) -> Arc<RpcStats> {
        Arc::clone(self.client.stats())
    }

    pub fn client(&self) -> &RpcClient<T> {
        &self.client
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    fn alloc_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    fn make_attr(&self, ino: u64, attrs: &Attributes) -> FileAttr {
        to_file_attr(ino, attrs, self.uid, self.gid)
    }

    fn check_writable(&self) -> Result<(), c_int> {
        if self.config.read_only {
            Err(libc::EROFS)
        } else {
            Ok(())
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.inodes.path(ino).ok_or(libc::ENOENT)
    }

    /// Resolves `name` inside directory `parent` to a remote path.
    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let Some(name) = name.to_str() else {
            return Err(libc::EINVAL);
        };
        if name.len() > MAX_NAME_LEN {
            return Err(libc::ENAMETOOLONG);
        }
        let parent_path = self.path_of(parent)?;
        Ok(child_path(&parent_path, name))
    }

    /// Looks up a freshly created entry, falling back to local attributes
    /// if the remote cannot describe it yet.
    fn attributes_after_create(&self, path: &str, kind: EntryType, mode: u32) -> Attributes {
        match self.client.lookup(path) {
            Ok(attrs) => attrs,
            Err(e) => {
                debug!(path, error = %e, "metadata of new entry unavailable");
                fresh_attributes(kind, mode, SystemTime::now())
            }
        }
    }

    pub(crate) fn do_lookup(&self, parent: u64, name: &OsStr) -> Result<FileAttr, c_int> {
        let path = self.child_of(parent, name)?;
        let attrs = self.client.lookup(&path).map_err(|e| errno(&e))?;
        let ino = self.inodes.get_or_insert(&path);
        Ok(self.make_attr(ino, &attrs))
    }

    pub(crate) fn do_getattr(&self, ino: u64) -> Result<FileAttr, c_int> {
        let path = self.path_of(ino)?;
        let attrs = self.client.lookup(&path).map_err(|e| errno(&e))?;
        Ok(self.make_attr(ino, &attrs))
    }

    /// Applies a size change. Ownership and permission changes are not
    /// supported by the remote; timestamp changes are accepted and dropped.
    pub(crate) fn do_setattr(
        &self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
    ) -> Result<FileAttr, c_int> {
        if mode.is_some() || uid.is_some() || gid.is_some() {
            return Err(libc::ENOSYS);
        }
        let path = self.path_of(ino)?;
        if let Some(size) = size {
            self.check_writable()?;
            self.client.truncate(&path, size).map_err(|e| errno(&e))?;
        }
        let attrs = self.client.lookup(&path).map_err(|e| errno(&e))?;
        Ok(self.make_attr(ino, &attrs))
    }

    /// Fetches the listing of `ino`, including `.` and `..`.
    pub(crate) fn list_dir(&self, ino: u64) -> Result<Vec<DirSlot>, c_int> {
        let path = self.path_of(ino)?;
        let listing = self.client.list(&path).map_err(|e| errno(&e))?;

        let parent_ino = self.inodes.get_inode(parent_path(&path)).unwrap_or(ROOT_INODE);
        let mut slots = Vec::with_capacity(listing.entries.len() + 2);
        slots.push(DirSlot::new(ino, FileType::Directory, "."));
        slots.push(DirSlot::new(parent_ino, FileType::Directory, ".."));

        for entry in &listing.entries {
            let name = entry.name_lossy();
            if name.is_empty() || name == "." || name == ".." || name.contains('/') {
                debug!(path, name = %name, "skipping unusable entry name");
                continue;
            }
            let child = child_path(&path, &name);
            let child_ino = self.inodes.get_or_insert_no_lookup_inc(&child);
            let kind = crate::attr::file_type(entry.stat.entry_type);
            slots.push(DirSlot::new(child_ino, kind, name.into_owned()));
        }
        Ok(slots)
    }

    pub(crate) fn do_opendir(&self, ino: u64) -> Result<u64, c_int> {
        let slots = self.list_dir(ino)?;
        let fh = self.alloc_fh();
        self.dir_handles.insert(fh, Arc::new(slots));
        Ok(fh)
    }

    /// Listing for a `readdir` call, from the handle or fetched anew.
    fn dir_slots(&self, ino: u64, fh: u64) -> Result<Arc<Vec<DirSlot>>, c_int> {
        if let Some(slots) = self.dir_handles.get(&fh) {
            return Ok(Arc::clone(slots.value()));
        }
        self.list_dir(ino).map(Arc::new)
    }

    /// Drops a directory handle and the inodes its listing allocated that
    /// the kernel never looked up.
    pub(crate) fn do_releasedir(&self, fh: u64) {
        if let Some((_, slots)) = self.dir_handles.remove(&fh) {
            self.release_slots(&slots);
        }
    }

    fn release_slots(&self, slots: &[DirSlot]) {
        let evicted = slots
            .iter()
            .skip(2)
            .filter(|slot| self.inodes.evict_unreferenced(slot.ino))
            .count();
        if evicted > 0 {
            trace!(evicted, "released listing-only inodes");
        }
    }

    pub(crate) fn do_statfs(&self) -> Result<StatfsReply, c_int> {
        let stats = self.client.volume_stats().map_err(|e| errno(&e))?;
        Ok(StatfsReply::from(&stats))
    }

    pub(crate) fn do_mkdir(&self, parent: u64, name: &OsStr, mode: u32) -> Result<FileAttr, c_int> {
        self.check_writable()?;
        let path = self.child_of(parent, name)?;
        self.client.make_dir(&path, mode).map_err(|e| errno(&e))?;
        let attrs = self.attributes_after_create(&path, EntryType::Directory, mode);
        let ino = self.inodes.get_or_insert(&path);
        Ok(self.make_attr(ino, &attrs))
    }

    pub(crate) fn do_unlink(&self, parent: u64, name: &OsStr) -> Result<(), c_int> {
        self.check_writable()?;
        let path = self.child_of(parent, name)?;
        self.client.unlink(&path).map_err(|e| errno(&e))?;
        self.inodes.invalidate_path(&path);
        Ok(())
    }

    pub(crate) fn do_rmdir(&self, parent: u64, name: &OsStr) -> Result<(), c_int> {
        self.check_writable()?;
        let path = self.child_of(parent, name)?;
        self.client.remove_dir(&path).map_err(|e| errno(&e))?;
        self.inodes.invalidate_path(&path);
        Ok(())
    }

    /// Flags returned with a file handle.
    fn open_flags(&self, truncated: bool) -> u32 {
        if self.config.kernel_cache && !truncated {
            fuser::consts::FOPEN_KEEP_CACHE
        } else {
            0
        }
    }

    /// Opens `ino`, returning the handle and reply flags.
    pub(crate) fn do_open(&self, ino: u64, flags: i32) -> Result<(u64, u32), c_int> {
        let access = AccessMode::from_flags(flags).ok_or(libc::EINVAL)?;
        let truncate = flags & libc::O_TRUNC != 0;
        if access != AccessMode::ReadOnly || truncate {
            self.check_writable()?;
        }
        let path = self.path_of(ino)?;
        self.client.open(&path, access, truncate).map_err(|e| errno(&e))?;
        Ok((self.alloc_fh(), self.open_flags(truncate)))
    }

    /// Creates a new file, returning its attributes, handle and reply flags.
    pub(crate) fn do_create(
        &self,
        parent: u64,
        name: &OsStr,
        mode: u32,
    ) -> Result<(FileAttr, u64, u32), c_int> {
        self.check_writable()?;
        let path = self.child_of(parent, name)?;
        self.client.create(&path, mode).map_err(|e| errno(&e))?;
        let attrs = self.attributes_after_create(&path, EntryType::File, mode);
        let ino = self.inodes.get_or_insert(&path);
        Ok((self.make_attr(ino, &attrs), self.alloc_fh(), self.open_flags(true)))
    }

    pub(crate) fn do_read(&self, ino: u64, offset: i64, size: u32) -> Result<Vec<u8>, c_int> {
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let path = self.path_of(ino)?;
        self.client
            .read(&path, offset, size as usize)
            .map_err(|e| errno(&e))
    }

    pub(crate) fn do_write(&self, ino: u64, offset: i64, data: &[u8]) -> Result<u32, c_int> {
        self.check_writable()?;
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let path = self.path_of(ino)?;
        let written = self.client.write(&path, offset, data).map_err(|e| errno(&e))?;
        u32::try_from(written).map_err(|_| libc::EINVAL)
    }
}

impl<T: Transport> Filesystem for DriveFs<T> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(
            endpoint = self.client.session().endpoint(),
            root = self.client.session().root().unwrap_or("/"),
            read_only = self.config.read_only,
            "filesystem initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        self.client.disconnect();
        info!(stats = %self.client.stats().snapshot(), "filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!(parent, name = ?name, "lookup");
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&self.config.attr_ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn batch_forget(&mut self, _req: &Request<'_>, nodes: &[fuser::fuse_forget_one]) {
        trace!(count = nodes.len(), "batch_forget");
        for node in nodes {
            self.inodes.forget(node.nodeid, node.nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        trace!(inode = ino, mode = ?mode, uid = ?uid, gid = ?gid, size = ?size, "setattr");
        match self.do_setattr(ino, mode, uid, gid, size) {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "opendir");
        match self.do_opendir(ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, fh, offset, "readdir");
        let slots = match self.dir_slots(ino, fh) {
            Ok(slots) => slots,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let start = usize::try_from(offset).unwrap_or(0);
        for (index, slot) in slots.iter().enumerate().skip(start) {
            #[allow(clippy::cast_possible_wrap)]
            let next_offset = (index + 1) as i64;
            if reply.add(slot.ino, next_offset, slot.kind, &slot.name) {
                break;
            }
        }
        reply.ok();

        // A listing fetched without a handle has no releasedir to clean up after it
        if !self.dir_handles.contains_key(&fh) {
            self.release_slots(&slots);
        }
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.do_releasedir(fh);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        trace!("statfs");
        match self.do_statfs() {
            Ok(s) => reply.statfs(s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize),
            Err(e) => reply.error(e),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        trace!(parent, name = ?name, mode, "mkdir");
        match self.do_mkdir(parent, name, mode & !umask) {
            Ok(attr) => reply.entry(&self.config.attr_ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!(parent, name = ?name, "unlink");
        match self.do_unlink(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!(parent, name = ?name, "rmdir");
        match self.do_rmdir(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags, "open");
        match self.do_open(ino, flags) {
            Ok((fh, open_flags)) => reply.opened(fh, open_flags),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        trace!(parent, name = ?name, mode, "create");
        match self.do_create(parent, name, mode & !umask) {
            Ok((attr, fh, open_flags)) => reply.created(&self.config.attr_ttl, &attr, 0, fh, open_flags),
            Err(e) => reply.error(e),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh, offset, size, "read");
        match self.do_read(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(inode = ino, fh, offset, size = data.len(), "write");
        match self.do_write(ino, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => {
                warn!(inode = ino, offset, errno = e, "write failed");
                reply.error(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxdrive_rpc::testing::{ScriptedTransport, reply};
    use hxdrive_rpc::wire::encode_listing;
    use hxdrive_rpc::{Session, StatRecord, Timespec};

    fn drive(config: MountConfig) -> DriveFs<ScriptedTransport> {
        let session = Session::default().with_token("token").with_root("/share");
        DriveFs::new(RpcClient::with_transport(session, ScriptedTransport::new()), config)
    }

    fn transport(fs: &DriveFs<ScriptedTransport>) -> &ScriptedTransport {
        fs.client().transport()
    }

    fn record(entry_type: EntryType, size: u64) -> StatRecord {
        StatRecord {
            size,
            accessed: Timespec::default(),
            modified: Timespec { seconds: 1_700_000_000, nanoseconds: 0 },
            changed: Timespec::default(),
            created: Timespec::default(),
            uid: 0,
            gid: 0,
            permissions: 0o644,
            entry_type,
        }
    }

    fn name(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    /// A failed metadata reply: status byte plus the rest of the header.
    fn failed_header(code: u8) -> Vec<u8> {
        let mut body = vec![0u8; 8];
        body[0] = code;
        body
    }

    #[test]
    fn test_lookup_allocates_inode() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::attributes(&record(EntryType::File, 10)));

        let attr = fs.do_lookup(ROOT_INODE, name("a.txt")).unwrap();
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.size, 10);
        assert_eq!(fs.inodes().path(attr.ino).as_deref(), Some("/a.txt"));

        let requests = transport(&fs).requests();
        assert_eq!(requests[0].method, "GETATTR");
        assert_eq!(requests[0].header("X-Path"), Some("%2Fa.txt"));
    }

    #[test]
    fn test_lookup_missing_entry() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(failed_header(1));
        assert_eq!(fs.do_lookup(ROOT_INODE, name("nope")).unwrap_err(), libc::ENOENT);
        assert!(fs.inodes().get_inode("/nope").is_none());
    }

    #[test]
    fn test_lookup_rejects_bad_names() {
        use std::os::unix::ffi::OsStrExt;

        let fs = drive(MountConfig::default());
        assert_eq!(
            fs.do_lookup(ROOT_INODE, OsStr::from_bytes(b"\xff")).unwrap_err(),
            libc::EINVAL
        );
        let long = "x".repeat(256);
        assert_eq!(fs.do_lookup(ROOT_INODE, name(&long)).unwrap_err(), libc::ENAMETOOLONG);
        assert_eq!(fs.do_lookup(999, name("a")).unwrap_err(), libc::ENOENT);
        assert_eq!(transport(&fs).request_count(), 0);
    }

    #[test]
    fn test_root_getattr_is_local() {
        let fs = drive(MountConfig::default());
        let attr = fs.do_getattr(ROOT_INODE).unwrap();
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.ino, ROOT_INODE);
        assert_eq!(transport(&fs).request_count(), 0);
    }

    #[test]
    fn test_listing_with_dot_entries() {
        let fs = drive(MountConfig::default());
        let body = encode_listing([
            (record(EntryType::Directory, 0), b"docs".as_slice()),
            (record(EntryType::File, 5), b"notes.txt".as_slice()),
        ])
        .unwrap();
        transport(&fs).push_reply(body);

        let fh = fs.do_opendir(ROOT_INODE).unwrap();
        let slots = fs.dir_slots(ROOT_INODE, fh).unwrap();
        let names: Vec<_> = slots.iter().map(|s| s.name.to_string_lossy().into_owned()).collect();
        assert_eq!(names, [".", "..", "docs", "notes.txt"]);
        assert_eq!(slots[2].kind, FileType::Directory);
        assert_eq!(slots[3].kind, FileType::RegularFile);

        // Listed entries get inodes without counting a lookup.
        let docs = fs.inodes().get_inode("/docs").unwrap();
        assert_eq!(slots[2].ino, docs);
        assert_eq!(fs.inodes().get(docs).unwrap().nlookup(), 0);

        // Served from the handle, no second request.
        fs.dir_slots(ROOT_INODE, fh).unwrap();
        assert_eq!(transport(&fs).request_count(), 1);
    }

    #[test]
    fn test_listing_skips_unusable_names() {
        let fs = drive(MountConfig::default());
        let body = encode_listing([
            (record(EntryType::File, 0), b"..".as_slice()),
            (record(EntryType::File, 0), b"a/b".as_slice()),
            (record(EntryType::File, 0), b"ok".as_slice()),
        ])
        .unwrap();
        transport(&fs).push_reply(body);

        let slots = fs.list_dir(ROOT_INODE).unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[2].name, "ok");
    }

    #[test]
    fn test_releasedir_evicts_listing_only_inodes() {
        let fs = drive(MountConfig::default());
        let body = encode_listing([
            (record(EntryType::File, 1), b"seen".as_slice()),
            (record(EntryType::File, 2), b"opened".as_slice()),
        ])
        .unwrap();
        transport(&fs).push_reply(body);
        transport(&fs).push_reply(reply::attributes(&record(EntryType::File, 2)));

        let fh = fs.do_opendir(ROOT_INODE).unwrap();
        let seen = fs.inodes().get_inode("/seen").unwrap();
        let opened = fs.do_lookup(ROOT_INODE, name("opened")).unwrap().ino;
        assert_eq!(fs.inodes().len(), 3);

        fs.do_releasedir(fh);
        assert!(fs.inodes().get(seen).is_none());
        assert!(fs.inodes().get_inode("/seen").is_none());
        assert_eq!(fs.inodes().get(opened).unwrap().nlookup(), 1);
        assert_eq!(fs.inodes().len(), 2);
        assert!(fs.dir_handles.is_empty());

        // Releasing twice is harmless.
        fs.do_releasedir(fh);
        assert_eq!(fs.inodes().len(), 2);
    }

    #[test]
    fn test_statfs() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::volume(&hxdrive_rpc::VolumeStats {
            total_space: 4096,
            free_space: 2048,
            total_inodes: 10,
            free_inodes: 5,
        }));
        let s = fs.do_statfs().unwrap();
        assert_eq!((s.blocks, s.bfree, s.files), (4, 2, 10));
    }

    #[test]
    fn test_read_only_rejects_modifications() {
        let fs = drive(MountConfig::default().read_only(true));
        assert_eq!(fs.do_mkdir(ROOT_INODE, name("d"), 0o755).unwrap_err(), libc::EROFS);
        assert_eq!(fs.do_unlink(ROOT_INODE, name("f")), Err(libc::EROFS));
        assert_eq!(fs.do_rmdir(ROOT_INODE, name("d")), Err(libc::EROFS));
        assert_eq!(fs.do_write(ROOT_INODE, 0, b"x"), Err(libc::EROFS));
        assert_eq!(fs.do_open(ROOT_INODE, libc::O_WRONLY).err(), Some(libc::EROFS));
        assert!(fs.do_create(ROOT_INODE, name("f"), 0o644).is_err());
        assert_eq!(transport(&fs).request_count(), 0);
    }

    #[test]
    fn test_unlink_invalidates_path() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::attributes(&record(EntryType::File, 1)));
        let attr = fs.do_lookup(ROOT_INODE, name("gone")).unwrap();

        transport(&fs).push_reply(reply::status(0));
        fs.do_unlink(ROOT_INODE, name("gone")).unwrap();
        assert!(fs.inodes().get_inode("/gone").is_none());
        assert!(fs.inodes().get(attr.ino).is_some());
        assert_eq!(transport(&fs).requests()[1].method, "UNLINK");
    }

    #[test]
    fn test_rmdir_not_empty() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::status(9));
        assert_eq!(fs.do_rmdir(ROOT_INODE, name("full")).unwrap_err(), libc::ENOTEMPTY);
    }

    #[test]
    fn test_create_falls_back_to_local_attributes() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::status(0));
        transport(&fs).push_reply(failed_header(1));

        let (attr, fh, flags) = fs.do_create(ROOT_INODE, name("new.txt"), 0o640).unwrap();
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.size, 0);
        assert!(fh > 0);
        assert_eq!(flags, 0);

        let requests = transport(&fs).requests();
        assert_eq!(requests[0].method, "OPEN");
        assert_eq!(requests[0].header("X-Create"), Some("1"));
        assert_eq!(requests[0].header("X-Excl"), Some("1"));
        assert_eq!(requests[0].header("X-Mode"), Some("416"));
    }

    #[test]
    fn test_open_keeps_cache_unless_truncating() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::status(0));
        transport(&fs).push_reply(reply::status(0));

        let (_, flags) = fs.do_open(ROOT_INODE, libc::O_RDONLY).unwrap();
        assert_eq!(flags, fuser::consts::FOPEN_KEEP_CACHE);
        let (_, flags) = fs.do_open(ROOT_INODE, libc::O_RDWR | libc::O_TRUNC).unwrap();
        assert_eq!(flags, 0);

        let requests = transport(&fs).requests();
        assert_eq!(requests[1].header("X-Trunc"), Some("1"));
    }

    #[test]
    fn test_open_permission_denied() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::status(2));
        assert_eq!(fs.do_open(ROOT_INODE, libc::O_RDONLY).err(), Some(libc::EACCES));
    }

    #[test]
    fn test_open_rejects_invalid_access_mode() {
        let fs = drive(MountConfig::default());
        assert_eq!(fs.do_open(ROOT_INODE, libc::O_ACCMODE).err(), Some(libc::EINVAL));
        assert_eq!(
            fs.do_open(ROOT_INODE, libc::O_ACCMODE | libc::O_TRUNC).err(),
            Some(libc::EINVAL)
        );
        assert_eq!(transport(&fs).request_count(), 0);
    }

    #[test]
    fn test_read_and_write() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::attributes(&record(EntryType::File, 3)));
        let ino = fs.do_lookup(ROOT_INODE, name("f")).unwrap().ino;

        transport(&fs).push_reply(reply::data(b"abc"));
        assert_eq!(fs.do_read(ino, 0, 4096).unwrap(), b"abc");

        transport(&fs).push_reply(reply::status(0));
        assert_eq!(fs.do_write(ino, 3, b"def").unwrap(), 3);

        let requests = transport(&fs).requests();
        assert_eq!(requests[2].method, "WRITE");
        assert_eq!(requests[2].header("X-Offset"), Some("3"));
        assert_eq!(requests[2].body.as_deref(), Some(b"def".as_slice()));
    }

    #[test]
    fn test_negative_offset() {
        let fs = drive(MountConfig::default());
        assert_eq!(fs.do_read(ROOT_INODE, -1, 10), Err(libc::EINVAL));
        assert_eq!(fs.do_write(ROOT_INODE, -1, b"x"), Err(libc::EINVAL));
    }

    #[test]
    fn test_setattr_truncates() {
        let fs = drive(MountConfig::default());
        transport(&fs).push_reply(reply::attributes(&record(EntryType::File, 100)));
        let ino = fs.do_lookup(ROOT_INODE, name("f")).unwrap().ino;

        transport(&fs).push_reply(reply::status(0));
        transport(&fs).push_reply(reply::attributes(&record(EntryType::File, 0)));
        let attr = fs.do_setattr(ino, None, None, None, Some(0)).unwrap();
        assert_eq!(attr.size, 0);

        let requests = transport(&fs).requests();
        assert_eq!(requests[1].method, "TRUNCATE");
        assert_eq!(requests[1].header("X-Size"), Some("0"));
    }

    #[test]
    fn test_setattr_chmod_unsupported() {
        let fs = drive(MountConfig::default());
        assert_eq!(
            fs.do_setattr(ROOT_INODE, Some(0o600), None, None, None).unwrap_err(),
            libc::ENOSYS
        );
        assert_eq!(transport(&fs).request_count(), 0);
    }

    #[test]
    fn test_transport_failure_is_eio() {
        let fs = drive(MountConfig::default());
        // Empty script: the scripted transport fails locally.
        assert_eq!(fs.do_lookup(ROOT_INODE, name("x")).unwrap_err(), libc::EIO);
        assert_eq!(fs.stats().snapshot().total_errors(), 1);
    }
}
