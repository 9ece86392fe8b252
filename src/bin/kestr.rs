//! Thin IPC client for the kestr daemon.
//!
//! Builds a single `{method, params}` request, sends it over the daemon's
//! Unix socket, and prints the raw JSON reply.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use kestr::server::DEFAULT_SOCKET_PATH;

#[derive(Parser)]
#[command(name = "kestr", about = "Client for the kestr indexing daemon", version)]
struct Cli {
    /// Unix socket path of the daemon.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test the connection.
    Ping,
    /// Show index residency, queue depth, and memory mode.
    Status,
    /// Trigger a full re-scan of the daemon's root.
    Reindex,
    /// Stop the daemon.
    Shutdown,
    /// Search the index (semantic first, keyword fallback).
    Query {
        /// The search query string.
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let request = match &cli.command {
        Commands::Ping => json!({ "method": "ping" }),
        Commands::Status => json!({ "method": "status" }),
        Commands::Reindex => json!({ "method": "reindex" }),
        Commands::Shutdown => json!({ "method": "shutdown" }),
        Commands::Query { query } => json!({ "method": "query", "params": [query] }),
    };

    let stream = UnixStream::connect(&cli.socket)
        .await
        .with_context(|| "could not connect to the kestrd daemon; is it running?")?;

    let response = roundtrip(stream, &request.to_string()).await?;
    println!("{}", response.trim_end());
    Ok(())
}

async fn roundtrip(stream: UnixStream, request: &str) -> Result<String> {
    let mut stream = stream;
    stream.write_all(request.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(line)
}
