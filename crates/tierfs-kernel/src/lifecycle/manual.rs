//! Lifecycle toggled by the embedder.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{LifecycleError, MountLifecycle};

/// A transport that something else mounts.
///
/// `establish` and `teardown` just flip the flag. Useful when the remote
/// directory is managed outside this process, and for simulating a lost
/// transport in tests.
#[derive(Debug, Default)]
pub struct ManualMount {
    mounted: AtomicBool,
}

impl ManualMount {
    /// Starts unmounted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts mounted.
    pub fn mounted() -> Self {
        Self {
            mounted: AtomicBool::new(true),
        }
    }

    pub fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::Release);
    }
}

#[async_trait]
impl MountLifecycle for ManualMount {
    fn describe(&self) -> String {
        "manual".to_string()
    }

    async fn establish(&self) -> Result<(), LifecycleError> {
        self.set_mounted(true);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), LifecycleError> {
        self.set_mounted(false);
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    fn mark_lost(&self) {
        self.set_mounted(false);
    }
}
