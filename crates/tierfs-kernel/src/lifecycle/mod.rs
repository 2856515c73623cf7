//! Remote transport lifecycle.
//!
//! The Remote tier is only reachable while some transport (an sshfs mount)
//! is up. The resolver never talks to the transport directly; it asks the
//! lifecycle "mounted right now?" on every call and otherwise treats Remote
//! as unconfigured.

mod manual;
mod sshfs;

pub use manual::ManualMount;
pub use sshfs::SshfsMount;

use async_trait::async_trait;
use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors from establishing or tearing down a transport.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The helper program could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The helper program ran and reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Establishes and tears down the transport behind the Remote tier.
///
/// `establish` is awaited once before the namespace is offered and
/// `teardown` once after operations stop. `is_mounted` is called on every
/// resolution, so it must be cheap and must not block.
#[async_trait]
pub trait MountLifecycle: Send + Sync {
    /// Short description for logs, e.g. `host:/dir on /mnt/remote`.
    fn describe(&self) -> String;

    /// Bring the transport up.
    async fn establish(&self) -> Result<(), LifecycleError>;

    /// Take the transport down.
    async fn teardown(&self) -> Result<(), LifecycleError>;

    /// Current state, read live.
    fn is_mounted(&self) -> bool;

    /// Record that the transport failed underneath an operation.
    ///
    /// After this `is_mounted` reports `false` and `teardown` has nothing
    /// left to undo.
    fn mark_lost(&self);
}
