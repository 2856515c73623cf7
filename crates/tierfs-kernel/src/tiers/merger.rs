//! Merged directory listings.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::path::VirtualPath;
use super::registry::TierRegistry;
use crate::vfs::VfsResult;

/// Unions a directory's entry names across every available tier.
#[derive(Debug, Clone)]
pub struct DirectoryMerger {
    registry: Arc<TierRegistry>,
}

impl DirectoryMerger {
    pub fn new(registry: Arc<TierRegistry>) -> Self {
        Self { registry }
    }

    /// Entry names visible in `dir`, always including `.` and `..`.
    ///
    /// Names are deduplicated by string equality only: a name that is a
    /// file in one tier and a directory in another appears once. Tiers
    /// where `dir` is missing or not a directory contribute nothing. A
    /// gated tier whose transport has dropped is marked lost and skipped.
    /// Any other listing failure is returned as-is.
    pub async fn list_entries(&self, dir: &VirtualPath) -> VfsResult<BTreeSet<String>> {
        let mut names = BTreeSet::from([".".to_string(), "..".to_string()]);

        for tier in self.registry.available() {
            match tier.store().readdir(dir.as_path()).await {
                Ok(entries) => {
                    debug!(dir = %dir, tier = %tier.role(), count = entries.len(), "listed");
                    names.extend(entries.into_iter().map(|entry| entry.name));
                }
                Err(e) if e.is_not_found() || e.is_not_a_directory() => {}
                Err(e) if e.is_transport_lost() && tier.mark_lost() => {
                    debug!(dir = %dir, tier = %tier.role(), "transport lost, skipped");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(names)
    }
}
