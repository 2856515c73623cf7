//! # tierfs-kernel
//!
//! One namespace over up to three storage tiers.
//!
//! A namespace:
//! - Always has a Primary directory, optionally a Fallback directory
//! - Optionally has a Remote directory, usable only while its sshfs mount is up
//! - Reads from the first tier holding a path (Primary > Fallback > Remote)
//! - Creates new objects in Primary unless only Fallback has the parent
//! - Lists directories as the deduplicated union of every available tier

pub mod config;
pub mod lifecycle;
pub mod namespace;
pub mod tiers;
pub mod union;
pub mod vfs;

pub use config::{ConfigError, RemoteConfig, RemoteEndpoint, TierConfig};
pub use lifecycle::{LifecycleError, ManualMount, MountLifecycle, SshfsMount};
pub use namespace::{Namespace, StartupError};
pub use tiers::{
    DirectoryMerger, Intent, PathResolver, ResolvedPath, Tier, TierRegistry, TierRole, TierSlot,
    VirtualPath,
};
pub use union::UnionFs;
pub use vfs::{
    backends::{LocalBackend, MemoryBackend},
    DirEntry, FileAttr, FileType, OpenFlags, SetAttr, StatFs, VfsError, VfsOps, VfsResult,
};
