//! Local IPC surface.
//!
//! A connection-oriented Unix-domain socket carrying one JSON request per
//! connection: `{"method": ..., "params": [...]}` in, `{"result": ...}` or
//! `{"error": ...}` out, newline-delimited. The server replies and closes;
//! protocol errors keep the daemon serving.
//!
//! Methods: `ping`, `status`, `reindex`, `shutdown`, `query`.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::daemon::{self, DaemonState};
use crate::search;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/kestr.sock";

#[derive(Debug, Deserialize)]
struct Request {
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

/// Accept loop. Each connection is handled in its own task; the loop exits
/// when shutdown is requested.
pub async fn serve(state: Arc<DaemonState>, listener: UnixListener) {
    let mut shutdown = state.shutdown_signal();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            log::debug!("ipc: connection error: {}", e);
                        }
                    });
                }
                Err(e) => log::warn!("ipc: accept failed: {}", e),
            },
            _ = shutdown.changed() => break,
        }
    }
    log::debug!("ipc listener stopped");
}

async fn handle_connection(state: Arc<DaemonState>, stream: UnixStream) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let reply = dispatch(&state, line.trim()).await;

    let mut stream = reader.into_inner();
    let mut payload = reply.to_string();
    payload.push('\n');
    stream.write_all(payload.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Parses and executes one request, producing the full reply object.
pub async fn dispatch(state: &Arc<DaemonState>, raw: &str) -> Value {
    let request: Request = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(_) => return json!({ "error": "invalid json" }),
    };

    match request.method.as_str() {
        "ping" => json!({ "result": "pong" }),

        "status" => json!({
            "result": {
                "memory_items": state.memory_items(),
                "queue_size": state.queue.len(),
                "memory_mode": state.config.memory_mode.as_str(),
            }
        }),

        "reindex" => {
            // Unconditional: every discovered file is re-queued.
            daemon::spawn_scan(state.clone(), false);
            json!({ "result": "reindex started" })
        }

        "shutdown" => {
            state.request_shutdown();
            json!({ "result": "shutting down" })
        }

        "query" => match request.params.first().and_then(|p| p.as_str()) {
            Some(query) => {
                let hits = search::hybrid_query(state, query).await;
                match serde_json::to_value(hits) {
                    Ok(results) => json!({ "result": results }),
                    Err(e) => {
                        log::warn!("ipc: failed to serialize query results: {}", e);
                        json!({ "error": "internal error" })
                    }
                }
            }
            None => json!({ "error": "missing query parameter" }),
        },

        _ => json!({ "error": "unknown method" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn disk_state() -> (TempDir, Arc<DaemonState>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("kestr.db")).await.unwrap();
        let mut config = Config::default();
        config.memory_mode = crate::config::MemoryMode::Disk;
        let state = DaemonState::new(config, PathBuf::from("/repo"), store, None, None);
        (dir, state)
    }

    #[tokio::test]
    async fn ping_pongs() {
        let (_dir, state) = disk_state().await;
        let reply = dispatch(&state, r#"{"method": "ping"}"#).await;
        assert_eq!(reply, json!({ "result": "pong" }));
    }

    #[tokio::test]
    async fn malformed_json_yields_protocol_error() {
        let (_dir, state) = disk_state().await;
        let reply = dispatch(&state, "not json").await;
        assert_eq!(reply, json!({ "error": "invalid json" }));

        // the daemon keeps serving
        let reply = dispatch(&state, r#"{"method": "ping"}"#).await;
        assert_eq!(reply["result"], "pong");
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let (_dir, state) = disk_state().await;
        let reply = dispatch(&state, r#"{"method": "frobnicate"}"#).await;
        assert_eq!(reply, json!({ "error": "unknown method" }));
    }

    #[tokio::test]
    async fn status_reports_mode_queue_and_residency() {
        let (_dir, state) = disk_state().await;
        let reply = dispatch(&state, r#"{"method": "status"}"#).await;
        let result = &reply["result"];
        assert_eq!(result["memory_items"], 0);
        assert_eq!(result["queue_size"], 0);
        assert_eq!(result["memory_mode"], "disk");
    }

    #[tokio::test]
    async fn query_without_parameter_is_an_error() {
        let (_dir, state) = disk_state().await;
        let reply = dispatch(&state, r#"{"method": "query"}"#).await;
        assert_eq!(reply, json!({ "error": "missing query parameter" }));

        let reply = dispatch(&state, r#"{"method": "query", "params": [7]}"#).await;
        assert_eq!(reply, json!({ "error": "missing query parameter" }));
    }

    #[tokio::test]
    async fn query_on_empty_store_returns_empty_result_list() {
        let (_dir, state) = disk_state().await;
        let reply = dispatch(&state, r#"{"method": "query", "params": ["anything"]}"#).await;
        assert_eq!(reply["result"], json!([]));
    }

    #[tokio::test]
    async fn shutdown_flips_the_run_flag() {
        let (_dir, state) = disk_state().await;
        assert!(!state.shutdown_requested());
        let reply = dispatch(&state, r#"{"method": "shutdown"}"#).await;
        assert_eq!(reply["result"], "shutting down");
        assert!(state.shutdown_requested());
    }
}
