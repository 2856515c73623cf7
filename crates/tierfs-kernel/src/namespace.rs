//! Startup and shutdown of a tiered namespace.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, TierConfig};
use crate::lifecycle::{LifecycleError, MountLifecycle, SshfsMount};
use crate::tiers::{DirectoryMerger, PathResolver, Tier, TierRegistry, TierRole};
use crate::union::UnionFs;

/// Errors that prevent the namespace from being offered.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("remote tier is required but could not be mounted: {0}")]
    RemoteRequired(#[source] LifecycleError),
}

/// A running namespace: the registry plus the Remote transport behind it.
///
/// Build with [`Namespace::start`], and call [`Namespace::shutdown`] once
/// every operation on it has finished.
#[derive(Debug)]
pub struct Namespace {
    fs: Arc<UnionFs>,
}

impl Namespace {
    /// Build the tiers described by `config` and bring Remote up.
    pub async fn start(config: &TierConfig) -> Result<Self, StartupError> {
        config.validate()?;

        let mut builder = TierRegistry::builder(Tier::local(config.primary_root()?));
        if let Some(fallback) = &config.fallback {
            builder = builder.fallback(Tier::local(fallback));
        }
        if let Some(remote) = &config.remote {
            let mount: Arc<dyn MountLifecycle> = Arc::new(SshfsMount::new(remote));
            builder = builder.remote(Tier::local(&remote.local_mount), mount);
        }

        Self::start_with(builder.build(), config.require_remote).await
    }

    /// Offer an already-built registry, establishing Remote if configured.
    ///
    /// A failed establish leaves Remote unavailable, which the resolver
    /// treats as unconfigured, unless `require_remote` is set.
    pub async fn start_with(
        registry: TierRegistry,
        require_remote: bool,
    ) -> Result<Self, StartupError> {
        if let Some(lifecycle) = registry.remote_lifecycle() {
            if let Err(e) = lifecycle.establish().await {
                if require_remote {
                    return Err(StartupError::RemoteRequired(e));
                }
                warn!(
                    remote = %lifecycle.describe(),
                    error = %e,
                    "remote unavailable, continuing without it"
                );
            }
        }

        for role in TierRole::PRECEDENCE {
            if let Some(tier) = registry.configured(role) {
                info!(
                    tier = %role,
                    root = %tier.root().display(),
                    available = tier.is_available(),
                    "tier registered"
                );
            }
        }

        Ok(Self {
            fs: Arc::new(UnionFs::new(Arc::new(registry))),
        })
    }

    pub fn fs(&self) -> &Arc<UnionFs> {
        &self.fs
    }

    pub fn registry(&self) -> &Arc<TierRegistry> {
        self.fs.registry()
    }

    pub fn resolver(&self) -> &PathResolver {
        self.fs.resolver()
    }

    pub fn merger(&self) -> &DirectoryMerger {
        self.fs.merger()
    }

    /// Tear Remote down. Failures are logged, never returned.
    pub async fn shutdown(self) {
        let Some(lifecycle) = self.registry().remote_lifecycle() else {
            return;
        };
        if let Err(e) = lifecycle.teardown().await {
            warn!(remote = %lifecycle.describe(), error = %e, "remote teardown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::lifecycle::ManualMount;
    use crate::vfs::{MemoryBackend, VfsOps};
    use std::path::Path;

    fn remote_config(dir: &Path, sshfs: &str) -> RemoteConfig {
        let mut remote = RemoteConfig::new("box:/data".parse().unwrap(), dir.to_path_buf());
        remote.sshfs_program = sshfs.to_string();
        remote.unmount_program = "true".to_string();
        remote
    }

    #[tokio::test]
    async fn test_start_primary_only() {
        let primary = tempfile::tempdir().unwrap();
        std::fs::write(primary.path().join("a.txt"), b"a").unwrap();

        let config = TierConfig::default().with_primary(primary.path().to_path_buf());
        let namespace = Namespace::start(&config).await.unwrap();

        assert_eq!(namespace.fs().read_all(Path::new("a.txt")).await.unwrap(), b"a");
        assert!(!namespace.registry().is_remote_available());
        namespace.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_requires_primary() {
        let err = Namespace::start(&TierConfig::default()).await.unwrap_err();
        assert!(matches!(err, StartupError::Config(ConfigError::MissingPrimary)));
    }

    #[tokio::test]
    async fn test_failed_remote_is_disabled() {
        let primary = tempfile::tempdir().unwrap();
        let mount_dir = tempfile::tempdir().unwrap();
        let config = TierConfig {
            remote: Some(remote_config(mount_dir.path(), "false")),
            ..TierConfig::default().with_primary(primary.path().to_path_buf())
        };

        let namespace = Namespace::start(&config).await.unwrap();
        assert!(namespace.registry().configured(TierRole::Remote).is_some());
        assert!(!namespace.registry().is_remote_available());
        namespace.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_remote_is_fatal_when_required() {
        let primary = tempfile::tempdir().unwrap();
        let mount_dir = tempfile::tempdir().unwrap();
        let config = TierConfig {
            remote: Some(remote_config(mount_dir.path(), "false")),
            ..TierConfig::default().with_primary(primary.path().to_path_buf())
        }
        .with_require_remote(true);

        let err = Namespace::start(&config).await.unwrap_err();
        assert!(matches!(err, StartupError::RemoteRequired(_)));
    }

    #[tokio::test]
    async fn test_remote_established_and_torn_down() {
        let mount = Arc::new(ManualMount::new());
        let registry = TierRegistry::builder(Tier::new("/p", Arc::new(MemoryBackend::new())))
            .remote(Tier::new("/r", Arc::new(MemoryBackend::new())), mount.clone())
            .build();

        let namespace = Namespace::start_with(registry, true).await.unwrap();
        assert!(mount.is_mounted());
        assert!(namespace.registry().is_remote_available());

        namespace.shutdown().await;
        assert!(!mount.is_mounted());
    }
}
