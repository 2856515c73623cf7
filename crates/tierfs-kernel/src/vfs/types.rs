//! Core VFS types.
//!
//! Attributes are always taken from the single tier that resolution picked
//! for a path. Nothing here carries a tier of origin; callers that need one
//! ask the resolver.

use std::time::SystemTime;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }

    /// Single-character tag, as printed by `ls -l`.
    pub fn tag(&self) -> char {
        match self {
            FileType::File => '-',
            FileType::Directory => 'd',
            FileType::Symlink => 'l',
        }
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// Blocks allocated (512-byte units).
    pub blocks: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permission bits (e.g. 0o644).
    pub perm: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time.
    pub atime: Option<SystemTime>,
    /// Last status change time.
    pub ctime: Option<SystemTime>,
    /// Number of hard links.
    pub nlink: u32,
    /// Owner user ID.
    pub uid: Option<u32>,
    /// Owner group ID.
    pub gid: Option<u32>,
}

impl FileAttr {
    fn fresh(kind: FileType, size: u64, perm: u32, nlink: u32) -> Self {
        let now = SystemTime::now();
        Self {
            size,
            blocks: size.div_ceil(512),
            kind,
            perm,
            mtime: now,
            atime: Some(now),
            ctime: Some(now),
            nlink,
            uid: None,
            gid: None,
        }
    }

    /// Attributes for a new file.
    pub fn file(size: u64, perm: u32) -> Self {
        Self::fresh(FileType::File, size, perm, 1)
    }

    /// Attributes for a new directory.
    pub fn directory(perm: u32) -> Self {
        Self::fresh(FileType::Directory, 0, perm, 2)
    }

    /// Attributes for a symlink whose target is `target_len` bytes long.
    pub fn symlink(target_len: u64) -> Self {
        Self::fresh(FileType::Symlink, target_len, 0o777, 1)
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }
}

/// Directory entry as returned by a single store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// Attributes to change in a `setattr` call.
///
/// Covers chmod, chown, utimens, and truncate-by-setattr.
#[derive(Debug, Clone, Default)]
pub struct SetAttr {
    /// New size (truncate/extend).
    pub size: Option<u64>,
    /// New modification time.
    pub mtime: Option<SystemTime>,
    /// New access time.
    pub atime: Option<SystemTime>,
    /// New permission bits.
    pub perm: Option<u32>,
    /// New owner user ID.
    pub uid: Option<u32>,
    /// New owner group ID.
    pub gid: Option<u32>,
}

impl SetAttr {
    /// Create a new empty SetAttr.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set both access and modification times.
    pub fn with_times(mut self, atime: SystemTime, mtime: SystemTime) -> Self {
        self.atime = Some(atime);
        self.mtime = Some(mtime);
        self
    }

    /// Set permissions.
    pub fn with_perm(mut self, perm: u32) -> Self {
        self.perm = Some(perm);
        self
    }

    /// Set ownership. `None` leaves that half unchanged.
    pub fn with_owner(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// True if no field would be changed.
    pub fn is_empty(&self) -> bool {
        self.size.is_none()
            && self.mtime.is_none()
            && self.atime.is_none()
            && self.perm.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
    }
}

/// Filesystem statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFs {
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Available blocks (to non-root).
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Available inodes (to non-root).
    pub favail: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
    /// Mount flags.
    pub flags: u64,
}

impl Default for StatFs {
    fn default() -> Self {
        Self {
            blocks: 1024 * 1024,
            bfree: 512 * 1024,
            bavail: 512 * 1024,
            files: 1024 * 1024,
            ffree: 512 * 1024,
            favail: 512 * 1024,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
            flags: 0,
        }
    }
}

/// Open file flags, as a host adapter receives them.
///
/// The union adapter derives a resolution intent from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Write access to an existing file.
    pub fn write() -> Self {
        Self {
            write: true,
            ..Default::default()
        }
    }

    /// Create with write access.
    pub fn create() -> Self {
        Self {
            write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Create exclusively (fail if exists).
    pub fn create_exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::create()
        }
    }

    /// Create and truncate.
    pub fn create_truncate() -> Self {
        Self {
            truncate: true,
            ..Self::create()
        }
    }
}
