pub mod auth;
pub mod handlers;

use crate::error::CoreError;
use crate::AppContext;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

// ─── Error codes ─────────────────────────────────────────────────────────────
//
// notFound     = -32001  (task or notification does not exist)
// forbidden    = -32002  (authenticated but not allowed, e.g. non-creator delete)
// unauthorized = -32004  (no verified identity on this connection)

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const NOT_FOUND: i32 = -32001;
const FORBIDDEN: i32 = -32002;
const UNAUTHORIZED: i32 = -32004;

/// Maximum time a client may take to authenticate after connecting.
const AUTH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "server listening (WebSocket + HTTP health on same port)");

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The daemon shares one port for both WebSocket (JSON-RPC) and a plain
/// HTTP health endpoint so clients can check liveness without a WS library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": ctx.started_at.elapsed().as_secs(),
        "connections": ctx.presence.connection_count(),
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from WebSocket
    // upgrades — both share the same port and both start with "GET ". Health
    // checks are detected by path; everything else falls through to the WS
    // handshake as normal.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    // ── Auth handshake ───────────────────────────────────────────────────────
    // Every connection must send `auth.login {token}` before task or
    // notification methods become available. The token resolves to a user id
    // through the identity verifier; success joins the user's presence
    // channel. `daemon.ping` and `daemon.status` are allowed pre-auth so the
    // local CLI can probe a daemon without credentials.
    let user_id = loop {
        let first = tokio::time::timeout(AUTH_TIMEOUT, stream.next()).await;

        let text = match first {
            Ok(Some(Ok(Message::Text(t)))) => t,
            Ok(Some(Ok(Message::Ping(data)))) => {
                let _ = sink.send(Message::Pong(data)).await;
                continue;
            }
            // Timeout, connection closed, or non-text frame — reject silently.
            _ => return Ok(()),
        };

        let req: RpcRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(_) => {
                let _ = sink
                    .send(Message::Text(error_response(
                        Value::Null,
                        PARSE_ERROR,
                        "Parse error",
                    )))
                    .await;
                continue;
            }
        };

        let id = req.id.clone().unwrap_or(Value::Null);

        match req.method.as_str() {
            "auth.login" => {
                let params = req.params.unwrap_or(Value::Null);
                let token = params
                    .get("token")
                    .and_then(Value::as_str)
                    .unwrap_or_default();

                match ctx.verifier.verify(token).await {
                    Some(user) => {
                        // Optional profile fields let clients register a
                        // display name for notification messages.
                        if let Some(name) = params.get("name").and_then(Value::as_str) {
                            let email = params.get("email").and_then(Value::as_str);
                            if let Err(e) = ctx.storage.upsert_user(&user, name, email).await {
                                warn!(user = %user, err = %e, "profile upsert failed");
                            }
                        }
                        let resp = serde_json::json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": { "authenticated": true, "userId": user }
                        });
                        let _ = sink.send(Message::Text(resp.to_string())).await;
                        break user;
                    }
                    None => {
                        let _ = sink
                            .send(Message::Text(error_response(
                                id,
                                UNAUTHORIZED,
                                "Unauthorized — invalid token",
                            )))
                            .await;
                        return Ok(());
                    }
                }
            }
            // Probe methods work without identity.
            "daemon.ping" | "daemon.status" => {
                let response = dispatch_text(&text, &ctx, None).await;
                let _ = sink.send(Message::Text(response)).await;
            }
            _ => {
                let _ = sink
                    .send(Message::Text(error_response(
                        id,
                        UNAUTHORIZED,
                        "Unauthorized — send auth.login first",
                    )))
                    .await;
            }
        }
    };

    debug!(user = %user_id, "client authenticated");

    // Join the presence channel. The mpsc receiver carries every event
    // addressed to this user; the connection task drains it into the sink.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let conn_id = ctx.presence.join(&user_id, event_tx);

    loop {
        tokio::select! {
            // Incoming message from client
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = dispatch_text(&text, &ctx, Some(&user_id)).await;
                        if let Err(e) = sink.send(Message::Text(response)).await {
                            warn!(err = %e, "send error");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }
            // Outgoing presence event
            event = event_rx.recv() => {
                match event {
                    Some(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            warn!(err = %e, "event send error");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    ctx.presence.leave(conn_id);
    debug!(user = %user_id, "client disconnected");
    Ok(())
}

pub(crate) async fn dispatch_text(text: &str, ctx: &AppContext, user: Option<&str>) -> String {
    // Parse
    let req: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            return error_response(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    // Validate jsonrpc field
    if req.jsonrpc != "2.0" {
        return error_response(
            req.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "Invalid Request",
        );
    }

    let id = req.id.unwrap_or(Value::Null);
    let params = req.params.unwrap_or(Value::Null);

    debug!(method = %req.method, "rpc dispatch");

    let result = dispatch(&req.method, params, ctx, user).await;

    match result {
        Ok(value) => {
            let resp = RpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            };
            serde_json::to_string(&resp).unwrap_or_default()
        }
        Err(e) => {
            let (code, msg) = classify_error(&e);
            error_response(id, code, &msg)
        }
    }
}

async fn dispatch(
    method: &str,
    params: Value,
    ctx: &AppContext,
    user: Option<&str>,
) -> anyhow::Result<Value> {
    // Probe methods never need identity.
    match method {
        "daemon.ping" => return handlers::daemon::ping(params, ctx).await,
        "daemon.status" => return handlers::daemon::status(params, ctx).await,
        _ => {}
    }

    let user = user.ok_or(CoreError::Unauthenticated)?;

    match method {
        // Re-auth on an authenticated connection is a harmless no-op.
        "auth.login" => Ok(serde_json::json!({ "authenticated": true, "userId": user })),
        "task.create" => handlers::tasks::create(params, ctx, user).await,
        "task.get" => handlers::tasks::get(params, ctx, user).await,
        "task.list" => handlers::tasks::list(params, ctx, user).await,
        "task.update" => handlers::tasks::update(params, ctx, user).await,
        "task.assign" => handlers::tasks::assign(params, ctx, user).await,
        "task.delete" => handlers::tasks::delete(params, ctx, user).await,
        "task.audit" => handlers::tasks::audit_trail(params, ctx, user).await,
        "notification.list" => handlers::notifications::list(params, ctx, user).await,
        "notification.unread" => handlers::notifications::unread(params, ctx, user).await,
        "notification.markRead" => handlers::notifications::mark_read(params, ctx, user).await,
        "notification.markAllRead" => {
            handlers::notifications::mark_all_read(params, ctx, user).await
        }
        "notification.unreadCount" => {
            handlers::notifications::unread_count(params, ctx, user).await
        }
        _ => Err(anyhow::anyhow!("METHOD_NOT_FOUND:{}", method)),
    }
}

fn classify_error(e: &anyhow::Error) -> (i32, String) {
    if let Some(core) = e.downcast_ref::<CoreError>() {
        return match core {
            CoreError::NotFound(_) => (NOT_FOUND, core.to_string()),
            CoreError::Forbidden(_) => (FORBIDDEN, core.to_string()),
            CoreError::Unauthenticated => (UNAUTHORIZED, "Unauthorized".to_string()),
            CoreError::Validation(_) => (INVALID_PARAMS, core.to_string()),
            CoreError::Storage(inner) => {
                error!(err = %inner, "storage error");
                (INTERNAL_ERROR, "Internal error".to_string())
            }
        };
    }
    let msg = e.to_string();
    if msg.starts_with("METHOD_NOT_FOUND:") {
        return (METHOD_NOT_FOUND, "Method not found".to_string());
    }
    if msg.contains("missing field") || msg.contains("invalid type") {
        return (INVALID_PARAMS, format!("Invalid params: {}", msg));
    }
    error!(err = %e, "internal error");
    (INTERNAL_ERROR, "Internal error".to_string())
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    let resp = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
        }),
    };
    serde_json::to_string(&resp).unwrap_or_default()
}
