//! The operation set shared by tier stores and the union adapter.
//!
//! Calls are keyed by path, never by inode or handle, and reads/writes carry
//! their own offset. That keeps every call self-contained, so the union layer
//! is free to pick a tier afresh each time.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::types::{DirEntry, FileAttr, SetAttr, StatFs};
use super::VfsResult;

/// Path-keyed filesystem operations.
///
/// Paths are relative to the implementor's root; a leading `/` is ignored.
#[async_trait]
pub trait VfsOps: Send + Sync {
    /// lstat: attributes of `path` itself, even when it is a symlink.
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr>;

    /// stat: like `getattr` but a final symlink is followed, so a dangling
    /// link reports not-found. Stores that never follow links keep the
    /// default.
    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        self.getattr(path).await
    }

    /// Children of a directory. `.` and `..` are not included.
    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// At most `size` bytes from `offset`; short at end of file.
    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>>;

    /// Stored target of a symlink, uninterpreted.
    async fn readlink(&self, path: &Path) -> VfsResult<PathBuf>;

    /// Write `data` at `offset` into an existing file.
    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32>;

    /// New empty file. Fails if `path` exists or its parent does not.
    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    /// New directory. Parents are never created implicitly.
    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    async fn unlink(&self, path: &Path) -> VfsResult<()>;

    /// Fails unless the directory is empty.
    async fn rmdir(&self, path: &Path) -> VfsResult<()>;

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    async fn truncate(&self, path: &Path, size: u64) -> VfsResult<()>;

    /// chmod, chown, utimens and size changes in one call.
    async fn setattr(&self, path: &Path, attr: SetAttr) -> VfsResult<FileAttr>;

    /// `path` becomes a symlink to `target`.
    async fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr>;

    /// `newpath` becomes another name for `oldpath`.
    async fn link(&self, oldpath: &Path, newpath: &Path) -> VfsResult<FileAttr>;

    fn read_only(&self) -> bool;

    /// Space and inode counts for the underlying filesystem.
    async fn statfs(&self) -> VfsResult<StatFs>;

    /// Whether `path` can be stat'ed. Any error reads as `false`.
    async fn exists(&self, path: &Path) -> bool {
        self.getattr(path).await.is_ok()
    }

    async fn is_dir(&self, path: &Path) -> bool {
        matches!(self.getattr(path).await, Ok(attr) if attr.is_dir())
    }

    /// Whole file in one call.
    async fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let size = self.getattr(path).await?.size;
        self.read(path, 0, u32::try_from(size).unwrap_or(u32::MAX)).await
    }

    /// Replace the contents of `path`, creating it (mode 0644) if absent.
    async fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        if self.exists(path).await {
            self.truncate(path, 0).await?;
        } else {
            self.create(path, 0o644).await?;
        }
        self.write(path, 0, data).await?;
        Ok(())
    }
}
