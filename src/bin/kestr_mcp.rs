//! Stdio tool adapter (`kestr-mcp`) exposing the daemon to AI agents.
//!
//! Speaks line-oriented JSON-RPC 2.0 on stdin/stdout and forwards the
//! `kestr_query` tool to the daemon's Unix socket. Diagnostics go to
//! stderr so they cannot corrupt the stdio transport.

use anyhow::Result;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use kestr::server::DEFAULT_SOCKET_PATH;

#[tokio::main]
async fn main() -> Result<()> {
    let socket = std::env::var("KESTR_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_PATH));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("kestr-mcp: malformed request: {}", e);
                continue;
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");

        match method {
            "initialize" => send_result(
                &id,
                json!({
                    "protocolVersion": "0.1.0",
                    "capabilities": { "resources": {}, "tools": {} },
                    "serverInfo": { "name": "kestr-mcp", "version": env!("CARGO_PKG_VERSION") }
                }),
            ),

            "notifications/initialized" => {}

            "tools/list" => send_result(
                &id,
                json!({
                    "tools": [{
                        "name": "kestr_query",
                        "description": "Search the indexed codebase for relevant context using semantic and keyword search.",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "query": { "type": "string", "description": "The search query." }
                            },
                            "required": ["query"]
                        }
                    }]
                }),
            ),

            "tools/call" => handle_tool_call(&socket, &id, &request).await,

            _ => {
                // Notifications get no reply.
                if request.get("id").map_or(true, Value::is_null) {
                    continue;
                }
                send_error(&id, -32601, "Method not found");
            }
        }
    }

    Ok(())
}

async fn handle_tool_call(socket: &Path, id: &Value, request: &Value) {
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));
    let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");

    if name != "kestr_query" {
        send_error(id, -32601, "Tool not found");
        return;
    }

    let query = params
        .get("arguments")
        .and_then(|a| a.get("query"))
        .and_then(|q| q.as_str())
        .unwrap_or("");

    let daemon_request = json!({ "method": "query", "params": [query] });
    let reply = match forward(socket, &daemon_request.to_string()).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("kestr-mcp: daemon unreachable: {}", e);
            send_error(id, -32000, "Daemon error");
            return;
        }
    };

    match reply.get("result") {
        Some(Value::Array(items)) => {
            let mut text = String::from("Found relevant context:\n\n");
            for item in items {
                text.push_str("--- File Content ---\n");
                text.push_str(item.get("content").and_then(|c| c.as_str()).unwrap_or(""));
                text.push('\n');
            }
            send_result(
                id,
                json!({ "content": [{ "type": "text", "text": text }] }),
            );
        }
        _ => send_error(id, -32000, "Daemon error"),
    }
}

async fn forward(socket: &Path, request: &str) -> Result<Value> {
    let mut stream = UnixStream::connect(socket).await?;
    stream.write_all(request.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(serde_json::from_str(&line)?)
}

fn send_result(id: &Value, result: Value) {
    let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
    println!("{}", response);
}

fn send_error(id: &Value, code: i64, message: &str) {
    let response = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    });
    println!("{}", response);
}
