//! End-to-end tier resolution over real directories.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tempfile::TempDir;

use tierfs_kernel::{
    Intent, ManualMount, Namespace, Tier, TierConfig, TierRegistry, TierRole, VfsOps, VirtualPath,
};

struct Tiers {
    primary: TempDir,
    fallback: TempDir,
    remote: TempDir,
    mount: Arc<ManualMount>,
}

impl Tiers {
    fn new() -> Self {
        Self {
            primary: TempDir::new().unwrap(),
            fallback: TempDir::new().unwrap(),
            remote: TempDir::new().unwrap(),
            mount: Arc::new(ManualMount::new()),
        }
    }

    /// Primary and Fallback only.
    async fn two_tier(&self) -> Namespace {
        let registry = TierRegistry::builder(Tier::local(self.primary.path()))
            .fallback(Tier::local(self.fallback.path()))
            .build();
        Namespace::start_with(registry, false).await.unwrap()
    }

    /// All three, Remote gated by `self.mount`.
    async fn three_tier(&self) -> Namespace {
        let registry = TierRegistry::builder(Tier::local(self.primary.path()))
            .fallback(Tier::local(self.fallback.path()))
            .remote(Tier::local(self.remote.path()), self.mount.clone())
            .build();
        Namespace::start_with(registry, true).await.unwrap()
    }
}

fn vpath(s: &str) -> VirtualPath {
    VirtualPath::new(s).unwrap()
}

async fn role(ns: &Namespace, path: &str, intent: Intent) -> Option<TierRole> {
    ns.resolver().resolve(&vpath(path), intent).await.map(|r| r.role())
}

#[tokio::test]
async fn read_takes_first_tier_holding_the_path() {
    let tiers = Tiers::new();
    fs::write(tiers.primary.path().join("a.txt"), "a").unwrap();
    fs::write(tiers.fallback.path().join("b.txt"), "b").unwrap();
    let ns = tiers.two_tier().await;

    assert_eq!(role(&ns, "a.txt", Intent::Read).await, Some(TierRole::Primary));
    assert_eq!(role(&ns, "b.txt", Intent::Read).await, Some(TierRole::Fallback));
    assert_eq!(role(&ns, "c.txt", Intent::Read).await, None);

    let resolved = ns.resolver().resolve_existing(&vpath("b.txt")).await.unwrap();
    assert_eq!(
        resolved.concrete_path(),
        fs::canonicalize(tiers.fallback.path()).unwrap().join("b.txt")
    );
}

#[tokio::test]
async fn create_goes_to_primary_when_it_has_the_parent() {
    let tiers = Tiers::new();
    fs::create_dir(tiers.primary.path().join("sub")).unwrap();
    let ns = tiers.two_tier().await;

    assert_eq!(role(&ns, "sub/new.txt", Intent::Write).await, Some(TierRole::Primary));

    ns.fs().write_all(Path::new("sub/new.txt"), b"hello").await.unwrap();
    assert_eq!(fs::read(tiers.primary.path().join("sub/new.txt")).unwrap(), b"hello");
}

#[tokio::test]
async fn create_goes_to_fallback_when_only_it_has_the_parent() {
    let tiers = Tiers::new();
    fs::create_dir(tiers.fallback.path().join("sub2")).unwrap();
    let ns = tiers.two_tier().await;

    assert_eq!(role(&ns, "sub2/new.txt", Intent::Write).await, Some(TierRole::Fallback));

    ns.fs().write_all(Path::new("sub2/new.txt"), b"hello").await.unwrap();
    assert!(tiers.fallback.path().join("sub2/new.txt").is_file());
    assert!(!tiers.primary.path().join("sub2").exists());
}

#[tokio::test]
async fn create_defaults_to_primary_when_no_parent_exists() {
    let tiers = Tiers::new();
    let ns = tiers.two_tier().await;

    let resolved = ns.resolver().resolve(&vpath("sub3/new.txt"), Intent::Write).await.unwrap();
    assert_eq!(resolved.role(), TierRole::Primary);

    // No implicit parent creation: the OS error comes back as-is.
    let err = ns.fs().create(Path::new("sub3/new.txt"), 0o644).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!tiers.primary.path().join("sub3").exists());
}

#[tokio::test]
async fn listing_is_a_deduplicated_union() {
    let tiers = Tiers::new();
    for (dir, names) in [(&tiers.primary, ["x", "y"]), (&tiers.fallback, ["y", "z"])] {
        fs::create_dir(dir.path().join("d")).unwrap();
        for name in names {
            fs::write(dir.path().join("d").join(name), name).unwrap();
        }
    }
    let ns = tiers.two_tier().await;

    let names: Vec<String> = ns
        .merger()
        .list_entries(&vpath("d"))
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(names, [".", "..", "x", "y", "z"]);

    let entries = ns.fs().readdir(Path::new("d")).await.unwrap();
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn symlinked_directory_lists_its_target() {
    let tiers = Tiers::new();
    fs::create_dir(tiers.primary.path().join("real")).unwrap();
    fs::write(tiers.primary.path().join("real/f"), "f").unwrap();
    symlink("real", tiers.primary.path().join("link")).unwrap();
    let ns = tiers.two_tier().await;

    let entries = ns.fs().readdir(Path::new("link")).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["f"]);

    let err = ns.fs().readdir(Path::new("real/f")).await.unwrap_err();
    assert!(err.is_not_a_directory());
}

#[tokio::test]
async fn dangling_parent_link_does_not_count_as_a_parent() {
    let tiers = Tiers::new();
    symlink("gone", tiers.primary.path().join("sub")).unwrap();
    fs::create_dir(tiers.fallback.path().join("sub")).unwrap();
    let ns = tiers.two_tier().await;

    assert_eq!(role(&ns, "sub/new.txt", Intent::Write).await, Some(TierRole::Fallback));

    // A live link to a directory does count.
    fs::create_dir(tiers.primary.path().join("target")).unwrap();
    symlink("target", tiers.primary.path().join("via")).unwrap();
    fs::create_dir(tiers.fallback.path().join("via")).unwrap();
    assert_eq!(role(&ns, "via/new.txt", Intent::Write).await, Some(TierRole::Primary));
}

#[tokio::test]
async fn fallback_shadows_remote() {
    let tiers = Tiers::new();
    fs::write(tiers.fallback.path().join("n"), "fallback").unwrap();
    fs::write(tiers.remote.path().join("n"), "remote").unwrap();
    let ns = tiers.three_tier().await;

    assert!(ns.registry().is_remote_available());
    assert_eq!(role(&ns, "n", Intent::Read).await, Some(TierRole::Fallback));
    assert_eq!(ns.fs().read_all(Path::new("n")).await.unwrap(), b"fallback");
}

#[tokio::test]
async fn resolution_is_repeatable() {
    let tiers = Tiers::new();
    fs::create_dir_all(tiers.fallback.path().join("a/b")).unwrap();
    fs::write(tiers.remote.path().join("r.txt"), "r").unwrap();
    let ns = tiers.three_tier().await;

    for (path, intent) in [
        ("a/b", Intent::Read),
        ("a/b/new", Intent::Write),
        ("r.txt", Intent::Read),
        ("missing", Intent::Read),
    ] {
        let first = ns.resolver().resolve(&vpath(path), intent).await;
        let second = ns.resolver().resolve(&vpath(path), intent).await;
        assert_eq!(first, second, "{path} ({intent})");
    }
}

#[tokio::test]
async fn remote_dropped_mid_session_is_not_found() {
    let tiers = Tiers::new();
    fs::write(tiers.remote.path().join("far.txt"), "far").unwrap();
    let ns = tiers.three_tier().await;

    assert_eq!(role(&ns, "far.txt", Intent::Read).await, Some(TierRole::Remote));

    tiers.mount.set_mounted(false);
    assert!(!ns.registry().is_remote_available());
    assert_eq!(role(&ns, "far.txt", Intent::Read).await, None);
    assert!(ns.fs().getattr(Path::new("far.txt")).await.unwrap_err().is_not_found());
    assert!(!ns.merger().list_entries(&VirtualPath::root()).await.unwrap().contains("far.txt"));

    ns.shutdown().await;
}

#[tokio::test]
async fn remote_is_never_a_creation_target() {
    let tiers = Tiers::new();
    fs::create_dir(tiers.remote.path().join("only_remote")).unwrap();
    let ns = tiers.three_tier().await;

    assert_eq!(
        role(&ns, "only_remote/new.txt", Intent::Write).await,
        Some(TierRole::Primary)
    );
}

#[tokio::test]
async fn concurrent_resolution_agrees() {
    let tiers = Tiers::new();
    fs::create_dir(tiers.fallback.path().join("shared")).unwrap();
    for i in 0..16 {
        fs::write(tiers.fallback.path().join("shared").join(format!("f{i}")), "x").unwrap();
    }
    let ns = tiers.two_tier().await;

    let lookups = (0..16).map(|i| {
        let resolver = ns.resolver().clone();
        async move {
            resolver
                .resolve(&vpath(&format!("shared/f{i}")), Intent::Read)
                .await
                .map(|r| r.role())
        }
    });
    let roles = join_all(lookups).await;
    assert!(roles.iter().all(|r| *r == Some(TierRole::Fallback)));
}

#[tokio::test]
async fn start_from_config_over_real_directories() {
    let tiers = Tiers::new();
    fs::write(tiers.fallback.path().join("cfg.txt"), "from fallback").unwrap();

    let config = TierConfig::default()
        .with_primary(tiers.primary.path().to_path_buf())
        .with_fallback(tiers.fallback.path().to_path_buf());
    let ns = Namespace::start(&config).await.unwrap();

    assert_eq!(ns.fs().read_all(Path::new("cfg.txt")).await.unwrap(), b"from fallback");
    ns.fs().mkdir(Path::new("made"), 0o755).await.unwrap();
    assert!(tiers.primary.path().join("made").is_dir());

    ns.shutdown().await;
}
