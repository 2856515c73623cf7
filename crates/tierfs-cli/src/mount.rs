//! Host mount of the unified namespace.
//!
//! The kernel speaks inodes and raw open flags; [`UnionFs`] speaks paths.
//! This module keeps the inode <-> path map and the errno and flag
//! translations. The FUSE session itself lives in `fuse.rs`, built only
//! with `--features fuse`.
#![cfg_attr(not(feature = "fuse"), allow(dead_code))]

#[cfg(feature = "fuse")]
mod fuse;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

#[cfg(not(feature = "fuse"))]
use anyhow::anyhow;
#[cfg(feature = "fuse")]
use anyhow::Context;
use anyhow::Result;
use tokio::runtime::Handle;

use tierfs_kernel::{OpenFlags, UnionFs, VfsError, VirtualPath};

pub(crate) const ROOT_INODE: u64 = 1;

/// Serve `fs` at `at` until the mount point is unmounted.
///
/// Blocks the calling thread, so call it from a blocking task. Namespace
/// calls are driven on `runtime`.
pub fn mount(fs: Arc<UnionFs>, runtime: Handle, at: &Path) -> Result<()> {
    #[cfg(feature = "fuse")]
    {
        let filesystem = fuse::TierFuse::new(fs, runtime);
        let options = [
            fuser::MountOption::FSName("tierfs".to_owned()),
            fuser::MountOption::AutoUnmount,
        ];
        fuser::mount2(filesystem, at, &options)
            .with_context(|| format!("mount {}", at.display()))?;
        Ok(())
    }
    #[cfg(not(feature = "fuse"))]
    {
        let _ = fs;
        let _ = runtime;
        let _ = at;
        Err(anyhow!("fuse support disabled; rebuild tierfs with --features fuse"))
    }
}

/// Inode numbers handed to the kernel, and the virtual path behind each.
#[derive(Debug)]
pub(crate) struct InodeTable {
    by_inode: HashMap<u64, VirtualPath>,
    by_path: HashMap<VirtualPath, u64>,
    next_inode: u64,
}

impl InodeTable {
    pub(crate) fn new() -> Self {
        let mut table = Self {
            by_inode: HashMap::new(),
            by_path: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        table.by_inode.insert(ROOT_INODE, VirtualPath::root());
        table.by_path.insert(VirtualPath::root(), ROOT_INODE);
        table
    }

    /// The inode for `path`, allocating one on first sight.
    pub(crate) fn insert(&mut self, path: &VirtualPath) -> u64 {
        if let Some(inode) = self.by_path.get(path) {
            return *inode;
        }
        let inode = self.next_inode;
        self.next_inode = self.next_inode.saturating_add(1);
        self.by_inode.insert(inode, path.clone());
        self.by_path.insert(path.clone(), inode);
        inode
    }

    pub(crate) fn path_for(&self, inode: u64) -> Option<&VirtualPath> {
        self.by_inode.get(&inode)
    }

    /// Drop `path` after it was unlinked or removed.
    pub(crate) fn forget(&mut self, path: &VirtualPath) {
        if let Some(inode) = self.by_path.remove(path) {
            self.by_inode.remove(&inode);
        }
    }

    /// Re-key `from` and everything below it under `to`, keeping inodes.
    pub(crate) fn rename(&mut self, from: &VirtualPath, to: &VirtualPath) {
        self.forget(to);
        let moved: Vec<(VirtualPath, u64)> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.as_path().starts_with(from.as_path()))
            .map(|(path, inode)| (path.clone(), *inode))
            .collect();

        for (old, inode) in moved {
            let Ok(rest) = old.as_path().strip_prefix(from.as_path()) else {
                continue;
            };
            let Ok(new) = VirtualPath::new(to.as_path().join(rest)) else {
                continue;
            };
            self.by_path.remove(&old);
            self.by_path.insert(new.clone(), inode);
            self.by_inode.insert(inode, new);
        }
    }
}

/// The errno to answer the kernel with. OS errors keep their own code.
pub(crate) fn errno(err: VfsError) -> i32 {
    let err = io::Error::from(err);
    if let Some(code) = err.raw_os_error() {
        return code;
    }
    match err.kind() {
        io::ErrorKind::NotFound => libc::ENOENT,
        io::ErrorKind::AlreadyExists => libc::EEXIST,
        io::ErrorKind::PermissionDenied => libc::EACCES,
        io::ErrorKind::NotADirectory => libc::ENOTDIR,
        io::ErrorKind::IsADirectory => libc::EISDIR,
        io::ErrorKind::DirectoryNotEmpty => libc::ENOTEMPTY,
        io::ErrorKind::InvalidInput => libc::EINVAL,
        io::ErrorKind::NotConnected => libc::ENOTCONN,
        _ => libc::EIO,
    }
}

/// Decode `open(2)` flags.
pub(crate) fn open_flags(flags: i32) -> OpenFlags {
    let access = flags & libc::O_ACCMODE;
    OpenFlags {
        read: access != libc::O_WRONLY,
        write: access != libc::O_RDONLY,
        create: flags & libc::O_CREAT != 0,
        truncate: flags & libc::O_TRUNC != 0,
        exclusive: flags & libc::O_EXCL != 0,
    }
}
