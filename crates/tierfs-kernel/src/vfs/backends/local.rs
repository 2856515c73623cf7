//! Local directory backend.
//!
//! One of these sits behind every tier: the Primary and Fallback roots, and
//! the local mount point through which the Remote transport is reached.

use async_trait::async_trait;
use std::fs::FileTimes;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::types::{DirEntry, FileAttr, FileType, SetAttr, StatFs};

/// Local filesystem backend.
///
/// All operations are relative to `root`. If `root` is `/srv/primary`, then
/// `read("docs/a.txt")` reads `/srv/primary/docs/a.txt`.
///
/// Paths are confined lexically: `..` components are rejected, but symlinks
/// inside the tier are left alone so that `getattr` reports the link itself
/// and `readlink` returns its stored target, wherever it points.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a local backend rooted at the given directory.
    ///
    /// The root is canonicalized when it exists so that concrete paths
    /// handed to callers are absolute and symlink-free at the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a tier-relative path onto the root.
    ///
    /// Rejects `..` so nothing outside the root is reachable by name.
    fn full_path(&self, path: &Path) -> VfsResult<PathBuf> {
        let mut full = self.root.clone();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => full.push(part),
                Component::ParentDir => {
                    return Err(VfsError::path_escapes_root(path.display().to_string()));
                }
                Component::Prefix(_) => {
                    return Err(VfsError::invalid_path(path.display().to_string()));
                }
            }
        }
        Ok(full)
    }

    fn unix_time(secs: i64, nsecs: i64) -> Option<SystemTime> {
        let secs = u64::try_from(secs).ok()?;
        let nsecs = u32::try_from(nsecs).ok()?;
        Some(UNIX_EPOCH + Duration::new(secs, nsecs))
    }

    /// chown and utimens, which tokio has no async form of.
    fn set_owner_and_times(path: &Path, attr: &SetAttr) -> std::io::Result<()> {
        if attr.uid.is_some() || attr.gid.is_some() {
            std::os::unix::fs::chown(path, attr.uid, attr.gid)?;
        }

        if attr.atime.is_some() || attr.mtime.is_some() {
            let mut times = FileTimes::new();
            if let Some(atime) = attr.atime {
                times = times.set_accessed(atime);
            }
            if let Some(mtime) = attr.mtime {
                times = times.set_modified(mtime);
            }
            std::fs::File::open(path)?.set_times(times)?;
        }
        Ok(())
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            FileType::Symlink
        } else if file_type.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };

        FileAttr {
            size: meta.len(),
            blocks: meta.blocks(),
            kind,
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(UNIX_EPOCH),
            atime: meta.accessed().ok(),
            ctime: Self::unix_time(meta.ctime(), meta.ctime_nsec()),
            nlink: meta.nlink() as u32,
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        }
    }
}

#[async_trait]
impl VfsOps for LocalBackend {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let full_path = self.full_path(path)?;
        let meta = fs::symlink_metadata(&full_path).await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let full_path = self.full_path(path)?;
        let meta = fs::metadata(&full_path).await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let full_path = self.full_path(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_symlink() {
                FileType::Symlink
            } else if file_type.is_dir() {
                FileType::Directory
            } else {
                FileType::File
            };

            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let full_path = self.full_path(path)?;
        let mut file = fs::File::open(&full_path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        // A single read() may return short on pipes and network mounts.
        let mut buffer = Vec::with_capacity(size as usize);
        file.take(u64::from(size)).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    async fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        let full_path = self.full_path(path)?;
        Ok(fs::read_link(&full_path).await?)
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};

        let full_path = self.full_path(path)?;

        let mut file = fs::OpenOptions::new().write(true).open(&full_path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(data.len() as u32)
    }

    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let full_path = self.full_path(path)?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&full_path)
            .await?;

        let meta = file.metadata().await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let full_path = self.full_path(path)?;

        fs::DirBuilder::new().mode(mode).create(&full_path).await?;

        let meta = fs::symlink_metadata(&full_path).await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        let full_path = self.full_path(path)?;
        Ok(fs::remove_file(&full_path).await?)
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let full_path = self.full_path(path)?;
        Ok(fs::remove_dir(&full_path).await?)
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_path = self.full_path(from)?;
        let to_path = self.full_path(to)?;
        Ok(fs::rename(&from_path, &to_path).await?)
    }

    async fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        let full_path = self.full_path(path)?;

        let file = fs::OpenOptions::new().write(true).open(&full_path).await?;
        Ok(file.set_len(size).await?)
    }

    async fn setattr(&self, path: &Path, attr: SetAttr) -> VfsResult<FileAttr> {
        let full_path = self.full_path(path)?;

        if let Some(size) = attr.size {
            let file = fs::OpenOptions::new().write(true).open(&full_path).await?;
            file.set_len(size).await?;
        }

        if let Some(perm) = attr.perm {
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(perm)).await?;
        }

        let touches_owner = attr.uid.is_some() || attr.gid.is_some();
        let touches_times = attr.atime.is_some() || attr.mtime.is_some();
        if touches_owner || touches_times {
            tokio::task::spawn_blocking(move || Self::set_owner_and_times(&full_path, &attr))
                .await
                .map_err(std::io::Error::from)??;
        }

        self.getattr(path).await
    }

    async fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr> {
        let full_path = self.full_path(path)?;
        fs::symlink(target, &full_path).await?;
        self.getattr(path).await
    }

    async fn link(&self, oldpath: &Path, newpath: &Path) -> VfsResult<FileAttr> {
        let old_full = self.full_path(oldpath)?;
        let new_full = self.full_path(newpath)?;
        fs::hard_link(&old_full, &new_full).await?;
        self.getattr(newpath).await
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn statfs(&self) -> VfsResult<StatFs> {
        let stat = rustix::fs::statvfs(&self.root)
            .map_err(|e| VfsError::Io(e.into()))?;

        Ok(StatFs {
            blocks: stat.f_blocks,
            bfree: stat.f_bfree,
            bavail: stat.f_bavail,
            files: stat.f_files,
            ffree: stat.f_ffree,
            favail: stat.f_favail,
            bsize: stat.f_bsize as u32,
            namelen: stat.f_namemax as u32,
            frsize: stat.f_frsize as u32,
            flags: stat.f_flag.bits(),
        })
    }
}
