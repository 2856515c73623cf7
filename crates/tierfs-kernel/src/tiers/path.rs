//! Virtual paths in the unified namespace.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::vfs::{VfsError, VfsResult};

/// A path as seen through the unified namespace, independent of tier.
///
/// Always relative: no leading separator, no `.` components. `..` is
/// rejected outright rather than resolved, so a virtual path can never name
/// anything outside a tier root. The empty path is the namespace root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath(PathBuf);

impl VirtualPath {
    /// The namespace root.
    pub fn root() -> Self {
        Self(PathBuf::new())
    }

    /// Normalize a host-supplied path (`/a/./b`, `a/b/`, ...) into a virtual path.
    pub fn new(path: impl AsRef<Path>) -> VfsResult<Self> {
        let path = path.as_ref();
        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => normalized.push(part),
                Component::ParentDir => {
                    return Err(VfsError::path_escapes_root(path.display().to_string()));
                }
                Component::Prefix(_) => {
                    return Err(VfsError::invalid_path(path.display().to_string()));
                }
            }
        }
        Ok(Self(normalized))
    }

    /// The relative path, suitable for handing to a tier store.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// True for the namespace root.
    pub fn is_root(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    /// Parent directory; `None` for the root.
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0.parent().map(Path::to_path_buf).unwrap_or_default()))
    }

    /// Final component; `None` for the root.
    pub fn file_name(&self) -> Option<&OsStr> {
        self.0.file_name()
    }

    /// Append a single entry name, as found in a directory listing.
    pub fn child(&self, name: &str) -> VfsResult<VirtualPath> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(Self(self.0.join(name))),
            _ => Err(VfsError::invalid_path(name.to_string())),
        }
    }
}

impl AsRef<Path> for VirtualPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl FromStr for VirtualPath {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.display())
    }
}
