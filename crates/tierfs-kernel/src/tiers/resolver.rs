//! Tier resolution.
//!
//! All placement policy lives here: which tier an existing object is read
//! from, and which tier a new object is created in.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::path::VirtualPath;
use super::registry::{Tier, TierRegistry, TierRole};
use crate::vfs::{OpenFlags, VfsError, VfsOps, VfsResult};

/// Why a path is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Act on an object that must already exist.
    Read,
    /// Act on an object that may not exist yet.
    Write,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Read => "read",
            Intent::Write => "write",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<OpenFlags> for Intent {
    /// Only `O_CREAT` can bring a new object into being.
    fn from(flags: OpenFlags) -> Self {
        if flags.create {
            Intent::Write
        } else {
            Intent::Read
        }
    }
}

/// The outcome of a successful resolution.
#[derive(Clone)]
pub struct ResolvedPath {
    role: TierRole,
    virtual_path: VirtualPath,
    concrete_path: PathBuf,
    store: Arc<dyn VfsOps>,
}

impl ResolvedPath {
    fn new(tier: &Tier, virtual_path: &VirtualPath) -> Self {
        Self {
            role: tier.role(),
            virtual_path: virtual_path.clone(),
            concrete_path: tier.concrete_path(virtual_path),
            store: tier.store().clone(),
        }
    }

    pub fn role(&self) -> TierRole {
        self.role
    }

    pub fn virtual_path(&self) -> &VirtualPath {
        &self.virtual_path
    }

    /// `tier root / virtual path`.
    pub fn concrete_path(&self) -> &Path {
        &self.concrete_path
    }

    /// The tier's store, for the raw I/O.
    pub fn store(&self) -> &Arc<dyn VfsOps> {
        &self.store
    }

    /// The path to hand to [`store`](Self::store).
    pub fn store_path(&self) -> &Path {
        self.virtual_path.as_path()
    }
}

impl PartialEq for ResolvedPath {
    fn eq(&self, other: &Self) -> bool {
        self.role == other.role && self.concrete_path == other.concrete_path
    }
}

impl Eq for ResolvedPath {}

impl fmt::Debug for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPath")
            .field("role", &self.role)
            .field("virtual_path", &self.virtual_path)
            .field("concrete_path", &self.concrete_path)
            .finish()
    }
}

/// Maps `(virtual path, intent)` to one concrete tier and path.
///
/// Stateless apart from the registry: every call re-examines live storage.
#[derive(Debug, Clone)]
pub struct PathResolver {
    registry: Arc<TierRegistry>,
}

impl PathResolver {
    pub fn new(registry: Arc<TierRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TierRegistry> {
        &self.registry
    }

    /// Pick the tier `path` should be served from.
    ///
    /// `Read` returns the first available tier, in precedence order, where
    /// the path exists, or `None`. `Write` returns the holding tier if there
    /// is one and otherwise the creation tier, so it is never `None`.
    pub async fn resolve(&self, path: &VirtualPath, intent: Intent) -> Option<ResolvedPath> {
        let tiers = self.registry.available();

        let resolved = match Self::find_existing(&tiers, path).await {
            Some(tier) => Some(ResolvedPath::new(tier, path)),
            None => match intent {
                Intent::Read => None,
                Intent::Write => Some(ResolvedPath::new(self.creation_tier(path).await, path)),
            },
        };

        match &resolved {
            Some(r) => debug!(path = %path, intent = %intent, tier = %r.role(), "resolved"),
            None => debug!(path = %path, intent = %intent, "not found in any tier"),
        }
        resolved
    }

    /// Read resolution, with NotFound as an error.
    pub async fn resolve_existing(&self, path: &VirtualPath) -> VfsResult<ResolvedPath> {
        self.resolve(path, Intent::Read)
            .await
            .ok_or_else(|| VfsError::not_found(path.to_string()))
    }

    /// Write resolution.
    pub async fn resolve_for_create(&self, path: &VirtualPath) -> ResolvedPath {
        let tiers = self.registry.available();
        let tier = match Self::find_existing(&tiers, path).await {
            Some(tier) => tier,
            None => self.creation_tier(path).await,
        };
        debug!(path = %path, intent = %Intent::Write, tier = %tier.role(), "resolved");
        ResolvedPath::new(tier, path)
    }

    async fn find_existing<'a>(tiers: &[&'a Tier], path: &VirtualPath) -> Option<&'a Tier> {
        for tier in tiers {
            match tier.store().getattr(path.as_path()).await {
                Ok(_) => return Some(*tier),
                Err(e) if e.is_transport_lost() && tier.mark_lost() => {
                    debug!(path = %path, tier = %tier.role(), "transport lost, skipped");
                }
                // A failed stat counts as absent; the real I/O reports the error.
                Err(_) => {}
            }
        }
        None
    }

    /// Where a brand new object goes. Remote is never a candidate.
    ///
    /// Primary wins unless only Fallback already has the parent directory.
    /// The parent check follows symlinks, so a dangling link where the
    /// parent should be does not count.
    async fn creation_tier(&self, path: &VirtualPath) -> &Tier {
        let primary = self.registry.primary();
        let Some(fallback) = self.registry.configured(TierRole::Fallback) else {
            return primary;
        };
        let Some(parent) = path.parent() else {
            return primary;
        };

        let primary_parent_exists = primary.store().stat(parent.as_path()).await.is_ok();
        if primary_parent_exists {
            return primary;
        }
        let fallback_parent_exists = fallback.store().stat(parent.as_path()).await.is_ok();
        if fallback_parent_exists { fallback } else { primary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ManualMount, MountLifecycle};
    use crate::tiers::testing::DisconnectedStore;
    use crate::vfs::MemoryBackend;

    struct Fixture {
        primary: Arc<MemoryBackend>,
        fallback: Arc<MemoryBackend>,
        remote: Arc<MemoryBackend>,
        mount: Arc<ManualMount>,
        resolver: PathResolver,
    }

    fn fixture(with_remote: bool) -> Fixture {
        let primary = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        let remote = Arc::new(MemoryBackend::new());
        let mount = Arc::new(ManualMount::mounted());

        let mut builder = TierRegistry::builder(Tier::new("/p", primary.clone()))
            .fallback(Tier::new("/f", fallback.clone()));
        if with_remote {
            builder = builder.remote(Tier::new("/r", remote.clone()), mount.clone());
        }
        let resolver = PathResolver::new(Arc::new(builder.build()));

        Fixture {
            primary,
            fallback,
            remote,
            mount,
            resolver,
        }
    }

    fn vpath(s: &str) -> VirtualPath {
        VirtualPath::new(s).unwrap()
    }

    async fn role_of(resolver: &PathResolver, path: &str, intent: Intent) -> Option<TierRole> {
        resolver.resolve(&vpath(path), intent).await.map(|r| r.role())
    }

    #[tokio::test]
    async fn test_read_precedence() {
        let fx = fixture(false);
        fx.primary.seed_file("a.txt", b"a").unwrap();
        fx.fallback.seed_file("b.txt", b"b").unwrap();

        assert_eq!(role_of(&fx.resolver, "a.txt", Intent::Read).await, Some(TierRole::Primary));
        assert_eq!(role_of(&fx.resolver, "b.txt", Intent::Read).await, Some(TierRole::Fallback));
        assert_eq!(role_of(&fx.resolver, "c.txt", Intent::Read).await, None);

        let resolved = fx.resolver.resolve(&vpath("b.txt"), Intent::Read).await.unwrap();
        assert_eq!(resolved.concrete_path(), Path::new("/f/b.txt"));
    }

    #[tokio::test]
    async fn test_primary_shadows_fallback() {
        let fx = fixture(false);
        fx.primary.seed_file("same.txt", b"p").unwrap();
        fx.fallback.seed_file("same.txt", b"f").unwrap();
        assert_eq!(role_of(&fx.resolver, "same.txt", Intent::Read).await, Some(TierRole::Primary));
    }

    #[tokio::test]
    async fn test_create_where_primary_has_parent() {
        let fx = fixture(false);
        fx.primary.seed_dir("sub").unwrap();

        let resolved = fx.resolver.resolve(&vpath("sub/new.txt"), Intent::Write).await.unwrap();
        assert_eq!(resolved.role(), TierRole::Primary);
        assert_eq!(resolved.concrete_path(), Path::new("/p/sub/new.txt"));
    }

    #[tokio::test]
    async fn test_create_where_only_fallback_has_parent() {
        let fx = fixture(false);
        fx.fallback.seed_dir("sub2").unwrap();

        let resolved = fx.resolver.resolve(&vpath("sub2/new.txt"), Intent::Write).await.unwrap();
        assert_eq!(resolved.role(), TierRole::Fallback);
        assert_eq!(resolved.concrete_path(), Path::new("/f/sub2/new.txt"));
    }

    #[tokio::test]
    async fn test_create_where_no_tier_has_parent() {
        let fx = fixture(false);
        assert_eq!(
            role_of(&fx.resolver, "sub3/new.txt", Intent::Write).await,
            Some(TierRole::Primary)
        );
    }

    #[tokio::test]
    async fn test_create_at_root_goes_to_primary() {
        let fx = fixture(false);
        assert_eq!(role_of(&fx.resolver, "top.txt", Intent::Write).await, Some(TierRole::Primary));
    }

    #[tokio::test]
    async fn test_write_keeps_existing_object_in_place() {
        let fx = fixture(true);
        fx.primary.seed_dir("docs").unwrap();
        fx.fallback.seed_file("docs/old.txt", b"f").unwrap();
        fx.remote.seed_file("far.txt", b"r").unwrap();

        assert_eq!(
            role_of(&fx.resolver, "docs/old.txt", Intent::Write).await,
            Some(TierRole::Fallback)
        );
        // Existing on Remote: never relocated, even though Remote never creates.
        assert_eq!(role_of(&fx.resolver, "far.txt", Intent::Write).await, Some(TierRole::Remote));
    }

    #[tokio::test]
    async fn test_remote_never_a_creation_target() {
        let fx = fixture(true);
        fx.remote.seed_dir("only_remote").unwrap();

        assert_eq!(
            role_of(&fx.resolver, "only_remote/new.txt", Intent::Write).await,
            Some(TierRole::Primary)
        );
    }

    #[tokio::test]
    async fn test_fallback_beats_remote() {
        let fx = fixture(true);
        fx.fallback.seed_file("n", b"f").unwrap();
        fx.remote.seed_file("n", b"r").unwrap();
        assert_eq!(role_of(&fx.resolver, "n", Intent::Read).await, Some(TierRole::Fallback));
    }

    #[tokio::test]
    async fn test_unmounted_remote_is_invisible() {
        let fx = fixture(true);
        fx.remote.seed_file("r.txt", b"r").unwrap();
        assert_eq!(role_of(&fx.resolver, "r.txt", Intent::Read).await, Some(TierRole::Remote));

        fx.mount.set_mounted(false);
        assert_eq!(role_of(&fx.resolver, "r.txt", Intent::Read).await, None);
        assert!(fx.resolver.resolve_existing(&vpath("r.txt")).await.unwrap_err().is_not_found());

        fx.mount.set_mounted(true);
        assert_eq!(role_of(&fx.resolver, "r.txt", Intent::Read).await, Some(TierRole::Remote));
    }

    #[tokio::test]
    async fn test_disconnected_remote_is_marked_lost() {
        let primary = Arc::new(MemoryBackend::new());
        let mount = Arc::new(ManualMount::mounted());
        let registry = TierRegistry::builder(Tier::new("/p", primary))
            .remote(Tier::new("/r", Arc::new(DisconnectedStore)), mount.clone())
            .build();
        let resolver = PathResolver::new(Arc::new(registry));

        assert_eq!(role_of(&resolver, "far.txt", Intent::Read).await, None);
        assert!(!mount.is_mounted());
        assert!(!resolver.registry().is_remote_available());
    }

    #[tokio::test]
    async fn test_repeat_resolution_is_stable() {
        let fx = fixture(true);
        fx.fallback.seed_file("x/y.txt", b"f").unwrap();

        for intent in [Intent::Read, Intent::Write] {
            let first = fx.resolver.resolve(&vpath("x/y.txt"), intent).await;
            let second = fx.resolver.resolve(&vpath("x/y.txt"), intent).await;
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_resolve_for_create_matches_write_intent() {
        let fx = fixture(false);
        fx.fallback.seed_dir("sub2").unwrap();
        let path = vpath("sub2/new.txt");

        let direct = fx.resolver.resolve_for_create(&path).await;
        let via_intent = fx.resolver.resolve(&path, Intent::Write).await.unwrap();
        assert_eq!(direct, via_intent);
    }

    #[tokio::test]
    async fn test_root_resolves_to_primary() {
        let fx = fixture(true);
        let resolved = fx.resolver.resolve_existing(&VirtualPath::root()).await.unwrap();
        assert_eq!(resolved.role(), TierRole::Primary);
        assert_eq!(resolved.concrete_path(), Path::new("/p"));
    }

    #[test]
    fn test_intent_from_open_flags() {
        assert_eq!(Intent::from(OpenFlags::read()), Intent::Read);
        assert_eq!(Intent::from(OpenFlags::write()), Intent::Read);
        assert_eq!(Intent::from(OpenFlags::create()), Intent::Write);
        assert_eq!(Intent::from(OpenFlags::create_exclusive()), Intent::Write);
    }
}
