//! Tier registration.
//!
//! The registry is filled once at startup by [`TierRegistryBuilder`] and is
//! immutable afterwards. The only live state it consults is the Remote
//! transport's mounted flag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum::EnumString;

use super::path::VirtualPath;
use crate::lifecycle::MountLifecycle;
use crate::vfs::{LocalBackend, VfsOps};

/// Which slot a tier occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum TierRole {
    /// The required local store.
    Primary,
    /// Optional second local store.
    Fallback,
    /// Optional store behind a mounted transport.
    Remote,
}

impl TierRole {
    /// Search order for reads and directory merges.
    pub const PRECEDENCE: [TierRole; 3] = [TierRole::Primary, TierRole::Fallback, TierRole::Remote];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierRole::Primary => "primary",
            TierRole::Fallback => "fallback",
            TierRole::Remote => "remote",
        }
    }

    fn index(self) -> usize {
        match self {
            TierRole::Primary => 0,
            TierRole::Fallback => 1,
            TierRole::Remote => 2,
        }
    }
}

impl fmt::Display for TierRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One storage tier: a root directory and the store doing I/O under it.
#[derive(Clone)]
pub struct Tier {
    role: TierRole,
    root: PathBuf,
    store: Arc<dyn VfsOps>,
    lifecycle: Option<Arc<dyn MountLifecycle>>,
}

impl Tier {
    /// A tier over an arbitrary store. The role is assigned on registration.
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn VfsOps>) -> Self {
        Self {
            role: TierRole::Primary,
            root: root.into(),
            store,
            lifecycle: None,
        }
    }

    /// A tier over a real directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        let backend = LocalBackend::new(root);
        let root = backend.root().to_path_buf();
        Self::new(root, Arc::new(backend))
    }

    pub fn role(&self) -> TierRole {
        self.role
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn VfsOps> {
        &self.store
    }

    /// Where `path` lives (or would live) inside this tier.
    pub fn concrete_path(&self, path: &VirtualPath) -> PathBuf {
        if path.is_root() {
            self.root.clone()
        } else {
            self.root.join(path.as_path())
        }
    }

    /// Usable right now. Only a Remote tier can be unavailable.
    pub fn is_available(&self) -> bool {
        self.lifecycle
            .as_ref()
            .is_none_or(|lifecycle| lifecycle.is_mounted())
    }

    /// Take a gated tier out of service after its transport failed mid-call.
    ///
    /// Returns `false` for ungated tiers, which have no transport to lose.
    pub fn mark_lost(&self) -> bool {
        match &self.lifecycle {
            Some(lifecycle) => {
                lifecycle.mark_lost();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tier")
            .field("role", &self.role)
            .field("root", &self.root)
            .field("available", &self.is_available())
            .finish()
    }
}

/// A fixed registry slot.
#[derive(Debug, Clone, Default)]
pub enum TierSlot {
    Present(Tier),
    #[default]
    Absent,
}

impl TierSlot {
    pub fn tier(&self) -> Option<&Tier> {
        match self {
            TierSlot::Present(tier) => Some(tier),
            TierSlot::Absent => None,
        }
    }
}

/// The configured tiers, in fixed slots indexed by role.
#[derive(Debug)]
pub struct TierRegistry {
    slots: [TierSlot; 3],
}

impl TierRegistry {
    /// Start a registry. Primary is mandatory, so it comes first.
    pub fn builder(primary: Tier) -> TierRegistryBuilder {
        TierRegistryBuilder {
            primary,
            fallback: None,
            remote: None,
        }
    }

    pub fn slot(&self, role: TierRole) -> &TierSlot {
        &self.slots[role.index()]
    }

    /// The tier in `role`'s slot, whether or not it is available.
    pub fn configured(&self, role: TierRole) -> Option<&Tier> {
        self.slot(role).tier()
    }

    /// The Primary tier.
    pub fn primary(&self) -> &Tier {
        let TierSlot::Present(tier) = &self.slots[TierRole::Primary.index()] else {
            unreachable!("the builder always fills the primary slot");
        };
        tier
    }

    /// Configured tiers that are usable right now, in precedence order.
    ///
    /// Availability is sampled once per call; callers should make one
    /// snapshot per operation.
    pub fn available(&self) -> Vec<&Tier> {
        TierRole::PRECEDENCE
            .iter()
            .filter_map(|role| self.configured(*role))
            .filter(|tier| tier.is_available())
            .collect()
    }

    /// Remote is configured and its transport is up.
    pub fn is_remote_available(&self) -> bool {
        self.configured(TierRole::Remote)
            .is_some_and(Tier::is_available)
    }

    /// The Remote transport, if Remote is configured.
    pub fn remote_lifecycle(&self) -> Option<&Arc<dyn MountLifecycle>> {
        self.configured(TierRole::Remote)
            .and_then(|tier| tier.lifecycle.as_ref())
    }
}

/// Startup-only registration.
pub struct TierRegistryBuilder {
    primary: Tier,
    fallback: Option<Tier>,
    remote: Option<Tier>,
}

impl TierRegistryBuilder {
    pub fn fallback(mut self, tier: Tier) -> Self {
        self.fallback = Some(tier);
        self
    }

    /// Register Remote, gated by `lifecycle`'s mounted state.
    pub fn remote(mut self, mut tier: Tier, lifecycle: Arc<dyn MountLifecycle>) -> Self {
        tier.lifecycle = Some(lifecycle);
        self.remote = Some(tier);
        self
    }

    pub fn build(self) -> TierRegistry {
        let slot = |tier: Option<Tier>, role: TierRole| match tier {
            Some(mut tier) => {
                tier.role = role;
                TierSlot::Present(tier)
            }
            None => TierSlot::Absent,
        };

        let mut primary = self.primary;
        primary.role = TierRole::Primary;
        // Primary and Fallback are plain directories; never gated.
        primary.lifecycle = None;
        let fallback = self.fallback.map(|mut tier| {
            tier.lifecycle = None;
            tier
        });

        TierRegistry {
            slots: [
                TierSlot::Present(primary),
                slot(fallback, TierRole::Fallback),
                slot(self.remote, TierRole::Remote),
            ],
        }
    }
}
