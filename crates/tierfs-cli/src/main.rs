//! tierfs command-line front end.
//!
//! Drives a tiered namespace directly, or serves it at a mount point when
//! built with `--features fuse`.
//!
//! Usage:
//!   # Mount all three tiers at /mnt/unified
//!   tierfs --primary /srv/p --fallback /srv/f \
//!          --remote user@host:/data --local /mnt/remote mount /mnt/unified
//!
//!   # Where would a new file go?
//!   tierfs --primary /srv/p --fallback /srv/f resolve sub2/new.txt --write
//!
//!   # Merged listing, with the remote tier mounted for the duration
//!   tierfs --primary /srv/p --remote user@host:/data --local /mnt/remote ls /
//!
//!   # Write stdin through the namespace
//!   echo hello | tierfs put notes/hello.txt

mod mount;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tierfs_kernel::{
    ConfigError, Intent, Namespace, OpenFlags, RemoteEndpoint, TierConfig, TierRole, TierSlot,
    VfsOps, VirtualPath,
};

/// Bytes per read when streaming a file out.
const CAT_CHUNK: u32 = 64 * 1024;

/// One namespace over primary, fallback, and remote storage tiers.
#[derive(Parser, Debug)]
#[command(name = "tierfs", version)]
#[command(about = "Unified namespace over primary, fallback, and remote storage tiers")]
struct Args {
    /// Config file (default: <config dir>/tierfs/tierfs.toml, if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Primary tier root (required, here or in the config file)
    #[arg(long, global = true, value_name = "DIR")]
    primary: Option<PathBuf>,

    /// Fallback tier root
    #[arg(long, global = true, value_name = "DIR")]
    fallback: Option<PathBuf>,

    /// Remote endpoint to mount with sshfs
    #[arg(long, global = true, value_name = "HOST:DIR", requires = "local")]
    remote: Option<RemoteEndpoint>,

    /// Local mount point for the remote endpoint
    #[arg(long, global = true, value_name = "DIR", requires = "remote")]
    local: Option<PathBuf>,

    /// Fail instead of running without the remote tier
    #[arg(long, global = true)]
    require_remote: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show each tier slot, its root, and whether it is available
    Tiers,
    /// Show which tier and concrete path a virtual path resolves to
    Resolve {
        path: String,
        /// Resolve for creation instead of lookup
        #[arg(long)]
        write: bool,
    },
    /// List a directory, merged across tiers
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show attributes from the tier that holds a path
    Stat { path: String },
    /// Write a file's contents to stdout
    Cat { path: String },
    /// Write stdin to a file, creating it if needed
    Put {
        path: String,
        /// Permission bits for a new file, in octal
        #[arg(long, default_value = "644", value_parser = parse_mode)]
        mode: u32,
    },
    /// Create a directory
    Mkdir {
        path: String,
        /// Permission bits, in octal
        #[arg(long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },
    /// Remove a file or empty directory
    Rm { path: String },
    /// Serve the namespace at a mount point until it is unmounted
    Mount {
        #[arg(value_name = "MOUNTPOINT")]
        mountpoint: PathBuf,
    },
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s, 8).map_err(|e| format!("invalid octal mode {s:?}: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            if matches!(e.downcast_ref::<ConfigError>(), Some(ConfigError::MissingPrimary)) {
                Args::command()
                    .error(
                        ErrorKind::MissingRequiredArgument,
                        "a primary root is required: \
                         pass --primary or set `primary` in the config file",
                    )
                    .exit();
            }
            eprintln!("tierfs: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let namespace = match Namespace::start(&config).await {
        Ok(namespace) => namespace,
        Err(e) => {
            eprintln!("tierfs: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&namespace, args.command).await;
    namespace.shutdown().await;

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tierfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Config file first, then command-line overrides.
fn load_config(args: &Args) -> Result<TierConfig> {
    let mut config = match &args.config {
        Some(path) => TierConfig::load(path)?,
        None => TierConfig::load_default()?,
    };

    if let Some(primary) = &args.primary {
        config = config.with_primary(primary.clone());
    }
    if let Some(fallback) = &args.fallback {
        config = config.with_fallback(fallback.clone());
    }
    config = config
        .with_remote_parts(args.remote.clone(), args.local.clone())?
        .with_require_remote(args.require_remote);

    config.primary_root()?;
    Ok(config)
}

async fn run(namespace: &Namespace, command: Command) -> Result<ExitCode> {
    let fs = namespace.fs();

    match command {
        Command::Tiers => {
            for role in TierRole::PRECEDENCE {
                match namespace.registry().slot(role) {
                    TierSlot::Present(tier) => {
                        let state = if tier.is_available() { "available" } else { "unavailable" };
                        println!("{:<9}{:<12}{}", role.as_str(), state, tier.root().display());
                    }
                    TierSlot::Absent => println!("{:<9}absent", role.as_str()),
                }
            }
        }

        Command::Resolve { path, write } => {
            let vpath = VirtualPath::new(&path)?;
            let intent = if write { Intent::Write } else { Intent::Read };
            match namespace.resolver().resolve(&vpath, intent).await {
                Some(resolved) => {
                    println!("{}\t{}", resolved.role(), resolved.concrete_path().display())
                }
                None => {
                    eprintln!("tierfs: {vpath}: not found");
                    return Ok(ExitCode::from(1));
                }
            }
        }

        Command::Ls { path } => {
            let mut entries = fs
                .readdir(Path::new(&path))
                .await
                .with_context(|| format!("cannot list {path}"))?;
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in entries {
                println!("{} {}", entry.kind.tag(), entry.name);
            }
        }

        Command::Stat { path } => {
            let vpath = VirtualPath::new(&path)?;
            let resolved = namespace.resolver().resolve_existing(&vpath).await?;
            let attr = resolved.store().getattr(resolved.store_path()).await?;
            let mtime = attr
                .mtime
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();

            println!("  path: {vpath}");
            println!("  tier: {} ({})", resolved.role(), resolved.concrete_path().display());
            println!("  type: {}", attr.kind.tag());
            println!("  size: {}", attr.size);
            println!("  mode: {:o}", attr.perm);
            println!(" links: {}", attr.nlink);
            if let (Some(uid), Some(gid)) = (attr.uid, attr.gid) {
                println!(" owner: {uid}:{gid}");
            }
            println!(" mtime: {mtime}");
        }

        Command::Cat { path } => {
            let path = Path::new(&path);
            let mut stdout = tokio::io::stdout();
            let mut offset = 0u64;
            loop {
                let chunk = fs
                    .read(path, offset, CAT_CHUNK)
                    .await
                    .with_context(|| format!("cannot read {}", path.display()))?;
                if chunk.is_empty() {
                    break;
                }
                stdout.write_all(&chunk).await?;
                offset += chunk.len() as u64;
            }
            stdout.flush().await?;
        }

        Command::Put { path, mode } => {
            let mut data = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut data)
                .await
                .context("cannot read stdin")?;

            let resolved = fs
                .open(Path::new(&path), OpenFlags::create_truncate(), mode)
                .await
                .with_context(|| format!("cannot open {path}"))?;
            resolved
                .store()
                .write(resolved.store_path(), 0, &data)
                .await
                .with_context(|| format!("cannot write {path}"))?;
            tracing::info!(
                path = %resolved.virtual_path(),
                tier = %resolved.role(),
                bytes = data.len(),
                "wrote"
            );
        }

        Command::Mkdir { path, mode } => {
            fs.mkdir(Path::new(&path), mode)
                .await
                .with_context(|| format!("cannot create directory {path}"))?;
        }

        Command::Rm { path } => {
            let path = Path::new(&path);
            let attr = fs.getattr(path).await?;
            if attr.is_dir() {
                fs.rmdir(path).await?;
            } else {
                fs.unlink(path).await?;
            }
        }

        Command::Mount { mountpoint } => {
            let fs = Arc::clone(fs);
            let runtime = tokio::runtime::Handle::current();
            tracing::info!(mountpoint = %mountpoint.display(), "serving namespace");
            tokio::task::spawn_blocking(move || mount::mount(fs, runtime, &mountpoint)).await??;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "tierfs",
            "--primary",
            "/srv/p",
            "--remote",
            "box:/data",
            "--local",
            "/mnt/r",
            "resolve",
            "sub/new.txt",
            "--write",
        ])
        .unwrap();

        assert_eq!(args.primary, Some(PathBuf::from("/srv/p")));
        assert_eq!(args.remote.unwrap().host, "box");
        assert!(matches!(args.command, Command::Resolve { write: true, .. }));
    }

    #[test]
    fn test_remote_needs_local() {
        let err = Args::try_parse_from(["tierfs", "--primary", "/p", "--remote", "box:/d", "tiers"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_bad_remote_rejected() {
        let err = Args::try_parse_from(["tierfs", "--remote", "nocolon", "--local", "/m", "tiers"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_mode_is_octal() {
        assert_eq!(parse_mode("755"), Ok(0o755));
        assert!(parse_mode("9").is_err());
    }

    #[test]
    fn test_mount_takes_a_mountpoint() {
        let args =
            Args::try_parse_from(["tierfs", "--primary", "/p", "mount", "/mnt/unified"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Mount { ref mountpoint } if mountpoint == Path::new("/mnt/unified")
        ));

        let err = Args::try_parse_from(["tierfs", "mount"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }
}
