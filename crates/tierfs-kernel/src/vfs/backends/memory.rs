//! In-memory filesystem backend.
//!
//! Stands in for a tier root in tests and embedders. All data is ephemeral.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::types::{DirEntry, FileAttr, FileType, SetAttr, StatFs};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
    Symlink { target: PathBuf, attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
            Entry::Symlink { attr, .. } => attr,
        }
    }

    fn attr_mut(&mut self) -> &mut FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
            Entry::Symlink { attr, .. } => attr,
        }
    }

    fn kind(&self) -> FileType {
        self.attr().kind
    }
}

type Entries = HashMap<PathBuf, Entry>;

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. Like a real directory, creating an
/// object requires its parent to exist already; use [`MemoryBackend::seed_file`]
/// and [`MemoryBackend::seed_dir`] to lay out fixtures in one call.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<Entries>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new filesystem holding only the root directory.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            PathBuf::new(),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Add a file with `data`, creating any missing parent directories.
    ///
    /// Replaces an existing file at the same path.
    pub fn seed_file(&self, path: impl AsRef<Path>, data: &[u8]) -> VfsResult<()> {
        let normalized = Self::normalize(path.as_ref())?;
        let mut entries = self.write_lock()?;
        Self::ensure_parents(&mut entries, &normalized);
        entries.insert(
            normalized,
            Entry::File {
                data: data.to_vec(),
                attr: FileAttr::file(data.len() as u64, 0o644),
            },
        );
        Ok(())
    }

    /// Add a directory and any missing parents.
    pub fn seed_dir(&self, path: impl AsRef<Path>) -> VfsResult<()> {
        let normalized = Self::normalize(path.as_ref())?;
        let mut entries = self.write_lock()?;
        Self::ensure_parents(&mut entries, &normalized);
        entries.entry(normalized).or_insert(Entry::Directory {
            attr: FileAttr::directory(0o755),
        });
        Ok(())
    }

    fn read_lock(&self) -> VfsResult<std::sync::RwLockReadGuard<'_, Entries>> {
        self.entries
            .read()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    fn write_lock(&self) -> VfsResult<std::sync::RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    /// Normalize a path: drop leading `/` and `.`; `..` is an escape.
    fn normalize(path: &Path) -> VfsResult<PathBuf> {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    return Err(VfsError::path_escapes_root(path.display().to_string()));
                }
                Component::Normal(s) => result.push(s),
            }
        }
        Ok(result)
    }

    fn ensure_parents(entries: &mut Entries, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            if let Component::Normal(s) = component {
                current.push(s);
                entries.entry(current.clone()).or_insert(Entry::Directory {
                    attr: FileAttr::directory(0o755),
                });
            }
        }
    }

    /// The parent of `path` must be an existing directory.
    fn check_parent(entries: &Entries, path: &Path) -> VfsResult<()> {
        let parent = path.parent().unwrap_or(Path::new(""));
        match entries.get(parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(_) => Err(VfsError::not_a_directory(Self::path_str(parent))),
            None => Err(VfsError::not_found(Self::path_str(parent))),
        }
    }

    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }
}

#[async_trait]
impl VfsOps for MemoryBackend {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path)?;
        let entries = self.read_lock()?;

        entries
            .get(&normalized)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let normalized = Self::normalize(path)?;
        let entries = self.read_lock()?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&normalized))),
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(entry_path, _)| {
                *entry_path != &normalized && entry_path.parent() == Some(normalized.as_path())
            })
            .filter_map(|(entry_path, entry)| {
                entry_path
                    .file_name()
                    .map(|name| DirEntry::new(name.to_string_lossy(), entry.kind()))
            })
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let normalized = Self::normalize(path)?;
        let entries = self.read_lock()?;

        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => {
                let start = (offset as usize).min(data.len());
                let end = (start + size as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::Symlink { .. }) => Err(VfsError::other("cannot read symlink as file")),
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        let normalized = Self::normalize(path)?;
        let entries = self.read_lock()?;

        match entries.get(&normalized) {
            Some(Entry::Symlink { target, .. }) => Ok(target.clone()),
            Some(_) => Err(VfsError::NotASymlink(Self::path_str(&normalized))),
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.write_lock()?;

        match entries.get_mut(&normalized) {
            Some(Entry::File {
                data: file_data,
                attr,
            }) => {
                let offset = offset as usize;
                if offset + data.len() > file_data.len() {
                    file_data.resize(offset + data.len(), 0);
                }
                file_data[offset..offset + data.len()].copy_from_slice(data);
                attr.size = file_data.len() as u64;
                attr.mtime = SystemTime::now();
                Ok(data.len() as u32)
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::Symlink { .. }) => Err(VfsError::other("cannot write to symlink")),
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.write_lock()?;

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }
        Self::check_parent(&entries, &normalized)?;

        let attr = FileAttr::file(0, mode);
        entries.insert(
            normalized,
            Entry::File {
                data: Vec::new(),
                attr: attr.clone(),
            },
        );
        Ok(attr)
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.write_lock()?;

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }
        Self::check_parent(&entries, &normalized)?;

        let attr = FileAttr::directory(mode);
        entries.insert(normalized, Entry::Directory { attr: attr.clone() });
        Ok(attr)
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.write_lock()?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(_) => {
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;

        if normalized.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.write_lock()?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&normalized))),
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let has_children = entries
            .keys()
            .any(|k| k.parent() == Some(normalized.as_path()) && k != &normalized);
        if has_children {
            return Err(VfsError::directory_not_empty(Self::path_str(&normalized)));
        }

        entries.remove(&normalized);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_normalized = Self::normalize(from)?;
        let to_normalized = Self::normalize(to)?;
        if from_normalized == to_normalized && !from_normalized.as_os_str().is_empty() {
            return Ok(());
        }
        // Root, or a directory moved inside itself.
        if from_normalized.as_os_str().is_empty() || to_normalized.starts_with(&from_normalized) {
            return Err(VfsError::invalid_path(Self::path_str(&to_normalized)));
        }

        let mut entries = self.write_lock()?;

        if !entries.contains_key(&from_normalized) {
            return Err(VfsError::not_found(Self::path_str(&from_normalized)));
        }
        Self::check_parent(&entries, &to_normalized)?;

        let moved: Vec<PathBuf> = entries
            .keys()
            .filter(|k| k.starts_with(&from_normalized))
            .cloned()
            .collect();

        for old_path in moved {
            if let Some(entry) = entries.remove(&old_path) {
                let new_path = match old_path.strip_prefix(&from_normalized) {
                    Ok(rest) if !rest.as_os_str().is_empty() => to_normalized.join(rest),
                    _ => to_normalized.clone(),
                };
                entries.insert(new_path, entry);
            }
        }
        Ok(())
    }

    async fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.write_lock()?;

        match entries.get_mut(&normalized) {
            Some(Entry::File { data, attr }) => {
                data.resize(size as usize, 0);
                attr.size = size;
                attr.mtime = SystemTime::now();
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::Symlink { .. }) => Err(VfsError::other("cannot truncate symlink")),
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn setattr(&self, path: &Path, set: SetAttr) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.write_lock()?;

        let entry = entries
            .get_mut(&normalized)
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))?;

        if let Some(size) = set.size {
            if let Entry::File { data, attr } = entry {
                data.resize(size as usize, 0);
                attr.size = size;
            }
        }

        let attr = entry.attr_mut();
        if let Some(mtime) = set.mtime {
            attr.mtime = mtime;
        }
        if let Some(atime) = set.atime {
            attr.atime = Some(atime);
        }
        if let Some(perm) = set.perm {
            attr.perm = perm;
        }
        if let Some(uid) = set.uid {
            attr.uid = Some(uid);
        }
        if let Some(gid) = set.gid {
            attr.gid = Some(gid);
        }

        Ok(entry.attr().clone())
    }

    async fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.write_lock()?;

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }
        Self::check_parent(&entries, &normalized)?;

        let attr = FileAttr::symlink(target.as_os_str().len() as u64);
        entries.insert(
            normalized,
            Entry::Symlink {
                target: target.to_path_buf(),
                attr: attr.clone(),
            },
        );
        Ok(attr)
    }

    async fn link(&self, oldpath: &Path, newpath: &Path) -> VfsResult<FileAttr> {
        let _ = (oldpath, newpath);
        Err(VfsError::other("hard links not supported in memory backend"))
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn statfs(&self) -> VfsResult<StatFs> {
        Ok(StatFs::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read() {
        let fs = MemoryBackend::new();
        fs.create(Path::new("test.txt"), 0o644).await.unwrap();
        fs.write(Path::new("test.txt"), 0, b"hello world")
            .await
            .unwrap();

        let data = fs.read(Path::new("test.txt"), 6, 5).await.unwrap();
        assert_eq!(data, b"world");
    }

    #[tokio::test]
    async fn test_create_without_parent_fails() {
        let fs = MemoryBackend::new();
        let err = fs
            .create(Path::new("nowhere/file.txt"), 0o644)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_seed_creates_parents() {
        let fs = MemoryBackend::new();
        fs.seed_file("a/b/c.txt", b"deep").unwrap();

        assert!(fs.getattr(Path::new("a")).await.unwrap().is_dir());
        assert!(fs.getattr(Path::new("a/b")).await.unwrap().is_dir());
        assert_eq!(fs.read_all(Path::new("a/b/c.txt")).await.unwrap(), b"deep");
    }

    #[tokio::test]
    async fn test_mkdir_and_readdir() {
        let fs = MemoryBackend::new();
        fs.mkdir(Path::new("subdir"), 0o755).await.unwrap();
        fs.create(Path::new("subdir/file.txt"), 0o644)
            .await
            .unwrap();
        fs.create(Path::new("root.txt"), 0o644).await.unwrap();

        let entries = fs.readdir(Path::new("")).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::file("root.txt"), DirEntry::directory("subdir")]
        );

        let subentries = fs.readdir(Path::new("subdir")).await.unwrap();
        assert_eq!(subentries, vec![DirEntry::file("file.txt")]);
    }

    #[tokio::test]
    async fn test_readdir_on_file() {
        let fs = MemoryBackend::new();
        fs.seed_file("plain.txt", b"").unwrap();
        let err = fs.readdir(Path::new("plain.txt")).await.unwrap_err();
        assert!(err.is_not_a_directory());
    }

    #[tokio::test]
    async fn test_rmdir_not_empty() {
        let fs = MemoryBackend::new();
        fs.seed_file("nonempty/file.txt", b"x").unwrap();

        let result = fs.rmdir(Path::new("nonempty")).await;
        assert!(matches!(result, Err(VfsError::DirectoryNotEmpty(_))));

        fs.unlink(Path::new("nonempty/file.txt")).await.unwrap();
        fs.rmdir(Path::new("nonempty")).await.unwrap();
        assert!(!fs.exists(Path::new("nonempty")).await);
    }

    #[tokio::test]
    async fn test_rename_directory_moves_children() {
        let fs = MemoryBackend::new();
        fs.seed_file("old/inner.txt", b"content").unwrap();

        fs.rename(Path::new("old"), Path::new("new")).await.unwrap();

        assert!(!fs.exists(Path::new("old")).await);
        let data = fs.read_all(Path::new("new/inner.txt")).await.unwrap();
        assert_eq!(data, b"content");
    }

    #[tokio::test]
    async fn test_symlink() {
        let fs = MemoryBackend::new();
        fs.symlink(Path::new("link"), Path::new("/target/path"))
            .await
            .unwrap();

        let target = fs.readlink(Path::new("link")).await.unwrap();
        assert_eq!(target, Path::new("/target/path"));
        assert!(fs.getattr(Path::new("link")).await.unwrap().is_symlink());
    }

    #[tokio::test]
    async fn test_parent_dir_rejected() {
        let fs = MemoryBackend::new();
        let result = fs.getattr(Path::new("a/../b")).await;
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }
}
