//! Tier configuration.
//!
//! Loaded from TOML, then overridden from the command line:
//!
//! ```toml
//! primary = "/srv/primary"
//! fallback = "/srv/fallback"
//!
//! [remote]
//! host = "user@203.0.113.7"
//! directory = "/root/sshfs"
//! local_mount = "/mnt/remote"
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::tiers::TierRole;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("a primary root is required")]
    MissingPrimary,

    #[error("remote needs both an endpoint and a local mount point")]
    IncompleteRemote,

    #[error("invalid remote endpoint {0:?}, expected host:directory")]
    InvalidRemote(String),

    #[error("{role} root {path} is not a directory")]
    NotADirectory { role: TierRole, path: PathBuf },
}

/// `host:directory` on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteEndpoint {
    /// `host` or `user@host`.
    pub host: String,
    /// Directory on the remote host.
    pub directory: String,
}

impl FromStr for RemoteEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((host, directory)) if !host.is_empty() && !directory.is_empty() => Ok(Self {
                host: host.to_string(),
                directory: directory.to_string(),
            }),
            _ => Err(ConfigError::InvalidRemote(s.to_string())),
        }
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.directory)
    }
}

/// The `[remote]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteConfig {
    #[serde(flatten)]
    pub endpoint: RemoteEndpoint,
    /// Local directory the remote is mounted onto; the Remote tier root.
    pub local_mount: PathBuf,
    #[serde(default = "default_sshfs_options")]
    pub sshfs_options: Vec<String>,
    #[serde(default = "default_sshfs_program")]
    pub sshfs_program: String,
    #[serde(default = "default_unmount_program")]
    pub unmount_program: String,
}

fn default_sshfs_options() -> Vec<String> {
    vec!["nonempty".to_string(), "rw".to_string()]
}

fn default_sshfs_program() -> String {
    "sshfs".to_string()
}

fn default_unmount_program() -> String {
    "fusermount".to_string()
}

impl RemoteConfig {
    pub fn new(endpoint: RemoteEndpoint, local_mount: PathBuf) -> Self {
        Self {
            endpoint,
            local_mount,
            sshfs_options: default_sshfs_options(),
            sshfs_program: default_sshfs_program(),
            unmount_program: default_unmount_program(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    pub primary: Option<PathBuf>,
    pub fallback: Option<PathBuf>,
    pub remote: Option<RemoteConfig>,
    /// Fail startup instead of running without Remote.
    #[serde(default)]
    pub require_remote: bool,
}

impl TierConfig {
    /// `<config dir>/tierfs/tierfs.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tierfs").join("tierfs.toml"))
    }

    /// Load from a TOML file, expanding `~` in paths.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Load the default config file if there is one, else start empty.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Ok(config.expand_paths())
    }

    fn expand_paths(mut self) -> Self {
        self.primary = self.primary.map(expand);
        self.fallback = self.fallback.map(expand);
        if let Some(remote) = self.remote.as_mut() {
            remote.local_mount = expand(std::mem::take(&mut remote.local_mount));
        }
        self
    }

    pub fn with_primary(mut self, primary: PathBuf) -> Self {
        self.primary = Some(expand(primary));
        self
    }

    pub fn with_fallback(mut self, fallback: PathBuf) -> Self {
        self.fallback = Some(expand(fallback));
        self
    }

    /// Override the remote from separate endpoint and mount arguments.
    ///
    /// Both or neither: one without the other is an error. Neither leaves
    /// the file's `[remote]` table alone. An existing table keeps its
    /// program and option settings.
    pub fn with_remote_parts(
        mut self,
        endpoint: Option<RemoteEndpoint>,
        local_mount: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        match (endpoint, local_mount) {
            (None, None) => {}
            (Some(endpoint), Some(local_mount)) => {
                let local_mount = expand(local_mount);
                match self.remote.as_mut() {
                    Some(remote) => {
                        remote.endpoint = endpoint;
                        remote.local_mount = local_mount;
                    }
                    None => self.remote = Some(RemoteConfig::new(endpoint, local_mount)),
                }
            }
            _ => return Err(ConfigError::IncompleteRemote),
        }
        Ok(self)
    }

    pub fn with_require_remote(mut self, require: bool) -> Self {
        self.require_remote |= require;
        self
    }

    /// The primary root, or [`ConfigError::MissingPrimary`].
    pub fn primary_root(&self) -> Result<&Path, ConfigError> {
        self.primary.as_deref().ok_or(ConfigError::MissingPrimary)
    }

    /// Check that every configured root is an existing directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_dir(TierRole::Primary, self.primary_root()?)?;
        if let Some(fallback) = &self.fallback {
            check_dir(TierRole::Fallback, fallback)?;
        }
        if let Some(remote) = &self.remote {
            check_dir(TierRole::Remote, &remote.local_mount)?;
        }
        Ok(())
    }
}

fn expand(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path,
    }
}

fn check_dir(role: TierRole, path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::NotADirectory {
            role,
            path: path.to_path_buf(),
        })
    }
}
