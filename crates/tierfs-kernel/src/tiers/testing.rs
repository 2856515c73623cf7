//! Test stores.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use crate::vfs::{DirEntry, FileAttr, SetAttr, StatFs, VfsError, VfsOps, VfsResult};

/// A store whose transport has gone away: every call fails with `ENOTCONN`,
/// the way a dead sshfs mount does.
pub(crate) struct DisconnectedStore;

fn lost<T>() -> VfsResult<T> {
    Err(VfsError::Io(io::Error::from(io::ErrorKind::NotConnected)))
}

#[async_trait]
impl VfsOps for DisconnectedStore {
    async fn getattr(&self, _path: &Path) -> VfsResult<FileAttr> {
        lost()
    }

    async fn readdir(&self, _path: &Path) -> VfsResult<Vec<DirEntry>> {
        lost()
    }

    async fn read(&self, _path: &Path, _offset: u64, _size: u32) -> VfsResult<Vec<u8>> {
        lost()
    }

    async fn readlink(&self, _path: &Path) -> VfsResult<PathBuf> {
        lost()
    }

    async fn write(&self, _path: &Path, _offset: u64, _data: &[u8]) -> VfsResult<u32> {
        lost()
    }

    async fn create(&self, _path: &Path, _mode: u32) -> VfsResult<FileAttr> {
        lost()
    }

    async fn mkdir(&self, _path: &Path, _mode: u32) -> VfsResult<FileAttr> {
        lost()
    }

    async fn unlink(&self, _path: &Path) -> VfsResult<()> {
        lost()
    }

    async fn rmdir(&self, _path: &Path) -> VfsResult<()> {
        lost()
    }

    async fn rename(&self, _from: &Path, _to: &Path) -> VfsResult<()> {
        lost()
    }

    async fn truncate(&self, _path: &Path, _size: u64) -> VfsResult<()> {
        lost()
    }

    async fn setattr(&self, _path: &Path, _attr: SetAttr) -> VfsResult<FileAttr> {
        lost()
    }

    async fn symlink(&self, _path: &Path, _target: &Path) -> VfsResult<FileAttr> {
        lost()
    }

    async fn link(&self, _oldpath: &Path, _newpath: &Path) -> VfsResult<FileAttr> {
        lost()
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn statfs(&self) -> VfsResult<StatFs> {
        lost()
    }
}
