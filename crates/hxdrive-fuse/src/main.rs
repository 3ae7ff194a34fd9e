//! hxmount - Mount a Hexalinq Drive folder as a FUSE filesystem.
//!
//! Usage: hxmount --token-file <file> <remote-path> <mountpoint>

use anyhow::{Context, Result};
use clap::Parser;
use hxdrive_fuse::{DriveFs, MountConfig, parse_remote_root, resolve_token};
use hxdrive_rpc::{DEFAULT_ENDPOINT, RpcClient, Session};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hxmount")]
#[command(about = "Mount a Hexalinq Drive folder as a FUSE filesystem")]
#[command(version)]
struct Cli {
    /// Remote folder to mount, starting with '/'
    remote_path: String,

    /// Mountpoint for the filesystem
    mount: PathBuf,

    /// Access token (takes precedence over --token-file)
    #[arg(short, long, env = "HXDRIVE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// File whose first line is the access token
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Remote API endpoint
    #[arg(long, env = "HXDRIVE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Enable debug logging, including every remote exchange
    #[arg(short, long)]
    debug: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    timeout: u64,

    /// Mount as read-only (default: read-write)
    #[arg(long)]
    read_only: bool,

    /// Attribute cache lifetime in seconds
    #[arg(long, value_name = "SECS", default_value_t = 1)]
    attr_ttl: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    if !cli.mount.exists() {
        anyhow::bail!("Mountpoint does not exist: {}", cli.mount.display());
    }

    let token = resolve_token(cli.token.clone(), cli.token_file.as_deref())
        .context("Failed to load access token")?;
    let root = parse_remote_root(&cli.remote_path)?;

    let session = Session::new(cli.endpoint.as_str())
        .with_token(token)
        .with_root(root)
        .with_debug(cli.debug)
        .with_timeout(Duration::from_secs(cli.timeout));

    info!(endpoint = %cli.endpoint, remote = %cli.remote_path, "Connecting");
    let client = RpcClient::new(session);
    client.connect().context("Failed to connect to remote drive")?;

    let config = MountConfig::default()
        .attr_ttl(Duration::from_secs(cli.attr_ttl))
        .read_only(cli.read_only)
        .fs_name_from_endpoint(&cli.endpoint);

    mount_and_wait(cli, DriveFs::new(client, config))
}

/// Mount the filesystem and wait for Ctrl+C.
fn mount_and_wait(cli: &Cli, fs: DriveFs) -> Result<()> {
    let options = fs.config().mount_options();
    let stats = fs.stats();

    let (tx, rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to set signal handler")?;

    info!("Mounting filesystem (press Ctrl+C to unmount)");

    let session = fuser::spawn_mount2(fs, &cli.mount, &options).map_err(|e| {
        error!(error = %e, "Mount failed");
        anyhow::anyhow!("Failed to mount filesystem: {e}")
    })?;

    info!("Filesystem mounted at {}", cli.mount.display());

    match rx.recv() {
        Ok(()) => info!("Received interrupt signal, unmounting..."),
        Err(_) => warn!("Signal channel closed unexpectedly"),
    }

    drop(session);
    info!(stats = %stats.snapshot(), "Filesystem unmounted");
    Ok(())
}
