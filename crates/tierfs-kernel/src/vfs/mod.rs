//! Virtual filesystem primitives shared by every tier.
//!
//! Key components:
//!
//! - [`VfsOps`] - Path-based filesystem operations trait
//! - [`LocalBackend`] - A real directory (Primary, Fallback, or the Remote mount point)
//! - [`MemoryBackend`] - In-memory store for tests and embedders
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: host adapters keep their own inode ↔ path map.
//! - **Explicit offset/size**: read/write carry no handle state, so the
//!   union layer can resolve the tier fresh on every call.
//! - **Native errors pass through**: backends report the OS error as-is.

pub mod backends;
mod error;
mod ops;
mod types;

pub use backends::{LocalBackend, MemoryBackend};
pub use error::{VfsError, VfsResult};
pub use ops::VfsOps;
pub use types::{DirEntry, FileAttr, FileType, OpenFlags, SetAttr, StatFs};
