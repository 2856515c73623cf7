//! The unified filesystem.
//!
//! [`UnionFs`] is a [`VfsOps`] over the whole namespace. Each call derives
//! an [`Intent`], asks the resolver for a tier, and performs the raw I/O on
//! that tier's store. Storage errors pass through untouched.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::tiers::{
    DirectoryMerger, Intent, PathResolver, ResolvedPath, TierRegistry, VirtualPath,
};
use crate::vfs::{DirEntry, FileAttr, OpenFlags, SetAttr, StatFs, VfsError, VfsOps, VfsResult};

/// Path-level filesystem over all tiers.
#[derive(Debug, Clone)]
pub struct UnionFs {
    resolver: PathResolver,
    merger: DirectoryMerger,
}

impl UnionFs {
    pub fn new(registry: Arc<TierRegistry>) -> Self {
        Self {
            resolver: PathResolver::new(registry.clone()),
            merger: DirectoryMerger::new(registry),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn merger(&self) -> &DirectoryMerger {
        &self.merger
    }

    pub fn registry(&self) -> &Arc<TierRegistry> {
        self.resolver.registry()
    }

    /// Open `path`, creating it with `mode` if `flags` ask for that.
    ///
    /// Returns where the file lives so a host adapter can hold on to the
    /// concrete path. Without `create` the file must exist somewhere.
    pub async fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<ResolvedPath> {
        let vpath = VirtualPath::new(path)?;
        match Intent::from(flags) {
            Intent::Read => {
                let resolved = self.resolver.resolve_existing(&vpath).await?;
                if flags.write && flags.truncate {
                    resolved.store().truncate(resolved.store_path(), 0).await?;
                }
                Ok(resolved)
            }
            Intent::Write => {
                let resolved = self.resolver.resolve_for_create(&vpath).await;
                let store = resolved.store();
                match store.getattr(resolved.store_path()).await {
                    Ok(_) if flags.exclusive => Err(VfsError::already_exists(vpath.to_string())),
                    Ok(attr) => {
                        if flags.truncate && attr.is_file() {
                            store.truncate(resolved.store_path(), 0).await?;
                        }
                        Ok(resolved)
                    }
                    Err(e) if e.is_not_found() => {
                        store.create(resolved.store_path(), mode).await?;
                        Ok(resolved)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Merged entry names of `dir`, including `.` and `..`.
    pub async fn list_entries(&self, dir: &Path) -> VfsResult<BTreeSet<String>> {
        self.merger.list_entries(&VirtualPath::new(dir)?).await
    }

    /// Filesystem statistics of the tier holding `path`.
    pub async fn statfs_at(&self, path: &Path) -> VfsResult<StatFs> {
        self.existing(path).await?.store().statfs().await
    }

    async fn existing(&self, path: &Path) -> VfsResult<ResolvedPath> {
        self.resolver.resolve_existing(&VirtualPath::new(path)?).await
    }

    async fn for_create(&self, path: &Path) -> VfsResult<ResolvedPath> {
        Ok(self.resolver.resolve_for_create(&VirtualPath::new(path)?).await)
    }

    /// Make an absolute link target that points back into the link's own
    /// tier relative, so it stays valid when seen through the namespace.
    fn rewrite_link_target(&self, link: &ResolvedPath, target: PathBuf) -> PathBuf {
        if !target.is_absolute() {
            return target;
        }
        let Some(tier) = self.registry().configured(link.role()) else {
            return target;
        };
        let Ok(inside) = target.strip_prefix(tier.root()) else {
            return target;
        };
        let from_dir = link.virtual_path().parent().unwrap_or_default();
        relative_path(from_dir.as_path(), inside)
    }
}

/// `to` expressed relative to directory `from`; both relative to one root.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component);
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

#[async_trait]
impl VfsOps for UnionFs {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let resolved = self.existing(path).await?;
        resolved.store().getattr(resolved.store_path()).await
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let resolved = self.existing(path).await?;
        resolved.store().stat(resolved.store_path()).await
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let dir = VirtualPath::new(path)?;
        let resolved = self.resolver.resolve_existing(&dir).await?;
        // The winning tier's own listing decides: a link to a directory
        // lists, a plain file fails with the store's error.
        resolved.store().readdir(resolved.store_path()).await?;

        let names = self.merger.list_entries(&dir).await?;
        let mut entries = Vec::with_capacity(names.len());
        for name in names.into_iter().filter(|n| n != "." && n != "..") {
            let child = dir.child(&name)?;
            // The winning tier decides the kind, same as getattr would.
            let Some(found) = self.resolver.resolve(&child, Intent::Read).await else {
                debug!(path = %child, "entry vanished during listing");
                continue;
            };
            match found.store().getattr(found.store_path()).await {
                Ok(attr) => entries.push(DirEntry::new(name, attr.kind)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let resolved = self.existing(path).await?;
        resolved.store().read(resolved.store_path(), offset, size).await
    }

    async fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        let resolved = self.existing(path).await?;
        let target = resolved.store().readlink(resolved.store_path()).await?;
        Ok(self.rewrite_link_target(&resolved, target))
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let resolved = self.existing(path).await?;
        resolved.store().write(resolved.store_path(), offset, data).await
    }

    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let resolved = self.for_create(path).await?;
        resolved.store().create(resolved.store_path(), mode).await
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let resolved = self.for_create(path).await?;
        resolved.store().mkdir(resolved.store_path(), mode).await
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        let resolved = self.existing(path).await?;
        resolved.store().unlink(resolved.store_path()).await
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let resolved = self.existing(path).await?;
        resolved.store().rmdir(resolved.store_path()).await
    }

    /// Renames within the source's tier; data never crosses tiers.
    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let source = self.existing(from).await?;
        let dest = VirtualPath::new(to)?;
        source.store().rename(source.store_path(), dest.as_path()).await
    }

    async fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        let resolved = self.existing(path).await?;
        resolved.store().truncate(resolved.store_path(), size).await
    }

    async fn setattr(&self, path: &Path, attr: SetAttr) -> VfsResult<FileAttr> {
        let resolved = self.existing(path).await?;
        resolved.store().setattr(resolved.store_path(), attr).await
    }

    async fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr> {
        let resolved = self.for_create(path).await?;
        resolved.store().symlink(resolved.store_path(), target).await
    }

    /// Links within the source's tier.
    async fn link(&self, oldpath: &Path, newpath: &Path) -> VfsResult<FileAttr> {
        let source = self.existing(oldpath).await?;
        let dest = VirtualPath::new(newpath)?;
        source.store().link(source.store_path(), dest.as_path()).await
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn statfs(&self) -> VfsResult<StatFs> {
        self.registry().primary().store().statfs().await
    }
}
