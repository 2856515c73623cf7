//! Tier store backends.
//!
//! Backends implement [`VfsOps`](crate::vfs::VfsOps) over one storage root.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
