//! The tier-resolution and directory-merge engine.
//!
//! - [`TierRegistry`] - Fixed Primary/Fallback/Remote slots, filled at startup
//! - [`PathResolver`] - Which tier serves a path, for a given [`Intent`]
//! - [`DirectoryMerger`] - Deduplicated union of a directory across tiers
//!
//! Precedence is Primary > Fallback > Remote for both lookup and listing.
//! Nothing is cached; every call looks at live storage.

mod merger;
mod path;
mod registry;
mod resolver;
#[cfg(test)]
pub(crate) mod testing;

pub use merger::DirectoryMerger;
pub use path::VirtualPath;
pub use registry::{Tier, TierRegistry, TierRegistryBuilder, TierRole, TierSlot};
pub use resolver::{Intent, PathResolver, ResolvedPath};
