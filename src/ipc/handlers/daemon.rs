use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "pong": true }))
}

pub async fn status(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": ctx.started_at.elapsed().as_secs(),
        "connections": ctx.presence.connection_count(),
        "port": ctx.config.port,
    }))
}
