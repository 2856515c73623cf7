//! sshfs-backed Remote transport.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tracing::{info, warn};

use super::{LifecycleError, MountLifecycle};
use crate::config::{RemoteConfig, RemoteEndpoint};

/// Mounts `host:directory` onto a local directory with `sshfs`.
pub struct SshfsMount {
    endpoint: RemoteEndpoint,
    local_mount: PathBuf,
    options: Vec<String>,
    sshfs_program: String,
    unmount_program: String,
    mounted: AtomicBool,
}

impl SshfsMount {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            local_mount: config.local_mount.clone(),
            options: config.sshfs_options.clone(),
            sshfs_program: config.sshfs_program.clone(),
            unmount_program: config.unmount_program.clone(),
            mounted: AtomicBool::new(false),
        }
    }

    /// `host:dir <local_mount> [-o opt,opt]`
    pub(crate) fn mount_args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(self.endpoint.to_string()),
            self.local_mount.clone().into_os_string(),
        ];
        if !self.options.is_empty() {
            args.push("-o".into());
            args.push(self.options.join(",").into());
        }
        args
    }

    /// `-u <local_mount>`
    pub(crate) fn unmount_args(&self) -> Vec<OsString> {
        vec!["-u".into(), self.local_mount.clone().into_os_string()]
    }

    async fn run(program: &str, args: &[OsString]) -> Result<(), LifecycleError> {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| LifecycleError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(LifecycleError::CommandFailed {
                program: program.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl std::fmt::Debug for SshfsMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshfsMount")
            .field("endpoint", &self.endpoint)
            .field("local_mount", &self.local_mount)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

#[async_trait]
impl MountLifecycle for SshfsMount {
    fn describe(&self) -> String {
        format!("{} on {}", self.endpoint, self.local_mount.display())
    }

    async fn establish(&self) -> Result<(), LifecycleError> {
        if self.is_mounted() {
            return Ok(());
        }
        Self::run(&self.sshfs_program, &self.mount_args()).await?;
        self.mounted.store(true, Ordering::Release);
        info!(remote = %self.endpoint, local = %self.local_mount.display(), "remote mounted");
        Ok(())
    }

    async fn teardown(&self) -> Result<(), LifecycleError> {
        // Flip first so nothing resolves onto a half-unmounted directory.
        if !self.mounted.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        Self::run(&self.unmount_program, &self.unmount_args()).await?;
        info!(local = %self.local_mount.display(), "remote unmounted");
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Later resolutions skip Remote and teardown becomes a no-op. The
    /// stale sshfs mount is left for the operator to clear.
    fn mark_lost(&self) {
        if self.mounted.swap(false, Ordering::AcqRel) {
            warn!(remote = %self.endpoint, "remote transport lost, disabling remote tier");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sshfs: &str, unmount: &str) -> RemoteConfig {
        let mut config = RemoteConfig::new(
            "user@203.0.113.7:/root/sshfs".parse().unwrap(),
            PathBuf::from("/mnt/remote"),
        );
        config.sshfs_program = sshfs.to_string();
        config.unmount_program = unmount.to_string();
        config
    }

    #[test]
    fn test_command_lines() {
        let mount = SshfsMount::new(&config("sshfs", "fusermount"));
        let args: Vec<String> = mount
            .mount_args()
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(
            args,
            ["user@203.0.113.7:/root/sshfs", "/mnt/remote", "-o", "nonempty,rw"]
        );

        let args: Vec<String> = mount
            .unmount_args()
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(args, ["-u", "/mnt/remote"]);
    }

    #[test]
    fn test_no_options() {
        let mut cfg = config("sshfs", "fusermount");
        cfg.sshfs_options.clear();
        let mount = SshfsMount::new(&cfg);
        assert_eq!(mount.mount_args().len(), 2);
    }

    #[tokio::test]
    async fn test_establish_and_teardown() {
        let mount = SshfsMount::new(&config("true", "true"));
        assert!(!mount.is_mounted());

        mount.establish().await.unwrap();
        assert!(mount.is_mounted());

        mount.teardown().await.unwrap();
        assert!(!mount.is_mounted());

        // Already down: nothing to run.
        mount.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_establish_failure() {
        let mount = SshfsMount::new(&config("false", "true"));
        let err = mount.establish().await.unwrap_err();
        assert!(matches!(err, LifecycleError::CommandFailed { .. }));
        assert!(!mount.is_mounted());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let mount = SshfsMount::new(&config("/nonexistent/tierfs-sshfs", "true"));
        let err = mount.establish().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_mark_lost() {
        let mount = SshfsMount::new(&config("true", "false"));
        mount.establish().await.unwrap();
        mount.mark_lost();
        assert!(!mount.is_mounted());
        // The failing unmount program is never run.
        mount.teardown().await.unwrap();
    }
}
