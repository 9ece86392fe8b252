//! The kestr indexing daemon (`kestrd`).
//!
//! Scans and watches a root directory, keeps the store and vector index
//! current, and serves queries over a local Unix socket until it receives
//! SIGINT/SIGTERM or an IPC `shutdown` request.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use kestr::config::{self, Config};
use kestr::daemon;
use kestr::server::DEFAULT_SOCKET_PATH;

#[derive(Parser)]
#[command(
    name = "kestrd",
    about = "Background indexing daemon for hybrid (semantic + keyword) codebase search",
    version
)]
struct Cli {
    /// Root directory to index and watch.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to the JSON configuration file.
    /// Defaults to `~/.config/kestr/config.json`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the SQLite store.
    /// Defaults to `~/.local/share/kestr/kestr.db`.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Unix socket path for the IPC endpoint.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| config::config_dir().join("config.json"));
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let db_path = cli.db.unwrap_or_else(|| config::data_dir().join("kestr.db"));

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("invalid root {}", cli.root.display()))?;

    daemon::run(root, config, db_path, cli.socket).await
}
