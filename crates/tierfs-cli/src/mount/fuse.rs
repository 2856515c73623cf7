//! `fuser::Filesystem` over [`UnionFs`].
//!
//! Each request names a path, which is resolved afresh by the namespace.
//! Open files are the exception: the tier picked at `open` is kept in the
//! handle, so reads and writes on it land on the same concrete file.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::future::Future;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use tokio::runtime::Handle;
use tracing::{debug, info};

use tierfs_kernel::{
    FileAttr, FileType, ResolvedPath, SetAttr, UnionFs, VfsOps, VirtualPath,
};

use super::{InodeTable, ROOT_INODE, errno, open_flags};

const TTL: Duration = Duration::from_secs(1);

pub(crate) struct TierFuse {
    fs: Arc<UnionFs>,
    runtime: Handle,
    inodes: InodeTable,
    handles: HashMap<u64, ResolvedPath>,
    next_handle: u64,
}

impl TierFuse {
    pub(crate) fn new(fs: Arc<UnionFs>, runtime: Handle) -> Self {
        Self {
            fs,
            runtime,
            inodes: InodeTable::new(),
            handles: HashMap::new(),
            next_handle: 1,
        }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn path(&self, inode: u64) -> Result<VirtualPath, i32> {
        self.inodes.path_for(inode).cloned().ok_or(libc::ENOENT)
    }

    fn child(&self, parent: u64, name: &OsStr) -> Result<VirtualPath, i32> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        self.path(parent)?.child(name).map_err(errno)
    }

    /// lstat `path` through the namespace and give it an inode.
    fn lookup_attr(&mut self, path: &VirtualPath) -> Result<fuser::FileAttr, i32> {
        let attr = self.block_on(self.fs.getattr(path.as_path())).map_err(errno)?;
        let inode = self.inodes.insert(path);
        Ok(fuse_attr(inode, &attr))
    }

    fn add_handle(&mut self, resolved: ResolvedPath) -> u64 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.handles.insert(handle, resolved);
        handle
    }

    fn do_setattr(&mut self, inode: u64, set: SetAttr) -> Result<fuser::FileAttr, i32> {
        let path = self.path(inode)?;
        let attr = self
            .block_on(self.fs.setattr(path.as_path(), set))
            .map_err(errno)?;
        Ok(fuse_attr(inode, &attr))
    }

    fn do_open(&mut self, inode: u64, flags: i32) -> Result<u64, i32> {
        let path = self.path(inode)?;
        let resolved = self
            .block_on(self.fs.open(path.as_path(), open_flags(flags), 0))
            .map_err(errno)?;
        Ok(self.add_handle(resolved))
    }

    fn do_create(
        &mut self,
        parent: u64,
        name: &OsStr,
        mode: u32,
        flags: i32,
    ) -> Result<(fuser::FileAttr, u64), i32> {
        let path = self.child(parent, name)?;
        let mut open = open_flags(flags);
        open.create = true;
        let resolved = self
            .block_on(self.fs.open(path.as_path(), open, mode))
            .map_err(errno)?;
        let attr = self
            .block_on(resolved.store().getattr(resolved.store_path()))
            .map_err(errno)?;
        debug!(path = %path, tier = %resolved.role(), "created");
        let inode = self.inodes.insert(&path);
        Ok((fuse_attr(inode, &attr), self.add_handle(resolved)))
    }

    fn do_readdir(&mut self, inode: u64) -> Result<Vec<(u64, fuser::FileType, String)>, i32> {
        let path = self.path(inode)?;
        let entries = self.block_on(self.fs.readdir(path.as_path())).map_err(errno)?;

        let parent = path
            .parent()
            .map_or(ROOT_INODE, |parent| self.inodes.insert(&parent));
        let mut listing = Vec::with_capacity(entries.len().saturating_add(2));
        listing.push((inode, fuser::FileType::Directory, ".".to_owned()));
        listing.push((parent, fuser::FileType::Directory, "..".to_owned()));
        for entry in entries {
            let Ok(child) = path.child(&entry.name) else {
                continue;
            };
            let child_inode = self.inodes.insert(&child);
            listing.push((child_inode, fuse_kind(entry.kind), entry.name));
        }
        Ok(listing)
    }
}

fn fuse_kind(kind: FileType) -> fuser::FileType {
    match kind {
        FileType::File => fuser::FileType::RegularFile,
        FileType::Directory => fuser::FileType::Directory,
        FileType::Symlink => fuser::FileType::Symlink,
    }
}

fn fuse_attr(inode: u64, attr: &FileAttr) -> fuser::FileAttr {
    fuser::FileAttr {
        ino: inode,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime.unwrap_or(attr.mtime),
        mtime: attr.mtime,
        ctime: attr.ctime.unwrap_or(attr.mtime),
        crtime: attr.mtime,
        kind: fuse_kind(attr.kind),
        perm: (attr.perm & 0o7777) as u16,
        nlink: attr.nlink,
        uid: attr.uid.unwrap_or(0),
        gid: attr.gid.unwrap_or(0),
        rdev: 0,
        flags: 0,
        blksize: 4096,
    }
}

fn system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    }
}

impl Filesystem for TierFuse {
    fn destroy(&mut self) {
        info!("namespace unmounted");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.child(parent, name).and_then(|path| self.lookup_attr(&path)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, inode: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.path(inode).and_then(|path| self.lookup_attr(&path)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let set = SetAttr {
            size,
            mtime: mtime.map(system_time),
            atime: atime.map(system_time),
            perm: mode.map(|mode| mode & 0o7777),
            uid,
            gid,
        };
        match self.do_setattr(inode, set) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, inode: u64, reply: ReplyData) {
        let target = self
            .path(inode)
            .and_then(|path| self.block_on(self.fs.readlink(path.as_path())).map_err(errno));
        match target {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
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
        let made = self.child(parent, name).and_then(|path| {
            self.block_on(self.fs.mkdir(path.as_path(), mode & !umask & 0o7777))
                .map_err(errno)?;
            self.lookup_attr(&path)
        });
        match made {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let removed = self.child(parent, name).and_then(|path| {
            self.block_on(self.fs.unlink(path.as_path())).map_err(errno)?;
            self.inodes.forget(&path);
            Ok(())
        });
        match removed {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let removed = self.child(parent, name).and_then(|path| {
            self.block_on(self.fs.rmdir(path.as_path())).map_err(errno)?;
            self.inodes.forget(&path);
            Ok(())
        });
        match removed {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let made = self.child(parent, link_name).and_then(|path| {
            self.block_on(self.fs.symlink(path.as_path(), target))
                .map_err(errno)?;
            self.lookup_attr(&path)
        });
        match made {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        // RENAME_NOREPLACE and RENAME_EXCHANGE are not offered.
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let renamed = self.child(parent, name).and_then(|from| {
            let to = self.child(newparent, newname)?;
            self.block_on(self.fs.rename(from.as_path(), to.as_path()))
                .map_err(errno)?;
            self.inodes.rename(&from, &to);
            Ok(())
        });
        match renamed {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let linked = self.path(inode).and_then(|from| {
            let to = self.child(newparent, newname)?;
            self.block_on(self.fs.link(from.as_path(), to.as_path()))
                .map_err(errno)?;
            self.lookup_attr(&to)
        });
        match linked {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, inode: u64, flags: i32, reply: ReplyOpen) {
        match self.do_open(inode, flags) {
            Ok(handle) => reply.opened(handle, 0),
            Err(e) => reply.error(e),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _inode: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(resolved) = self.handles.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let data = self.block_on(resolved.store().read(resolved.store_path(), offset, size));
        match data {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _inode: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(resolved) = self.handles.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let written = self.block_on(resolved.store().write(resolved.store_path(), offset, data));
        match written {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _inode: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.handles.remove(&fh);
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let listing = match self.do_readdir(inode) {
            Ok(listing) => listing,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        let skip = usize::try_from(offset).unwrap_or(0);
        for (idx, (child, kind, name)) in listing.into_iter().enumerate().skip(skip) {
            if reply.add(child, (idx + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, inode: u64, reply: ReplyStatfs) {
        let stat = self
            .path(inode)
            .and_then(|path| self.block_on(self.fs.statfs_at(path.as_path())).map_err(errno));
        match stat {
            Ok(stat) => reply.statfs(
                stat.blocks,
                stat.bfree,
                stat.bavail,
                stat.files,
                stat.ffree,
                stat.bsize,
                stat.namelen,
                stat.frsize,
            ),
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
        flags: i32,
        reply: ReplyCreate,
    ) {
        match self.do_create(parent, name, mode & !umask & 0o7777, flags) {
            Ok((attr, handle)) => reply.created(&TTL, &attr, 0, handle, 0),
            Err(e) => reply.error(e),
        }
    }
}
