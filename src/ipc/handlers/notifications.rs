use crate::error::CoreError;
use crate::notify::storage::DEFAULT_LIST_LIMIT;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn list(params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let limit = params
        .get("limit")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_LIST_LIMIT);
    if limit < 1 {
        return Err(CoreError::validation("limit must be >= 1").into());
    }
    let unread_only = params
        .get("unreadOnly")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let notifications = if unread_only {
        ctx.notifications.list_unread(user).await?
    } else {
        ctx.notifications.list_for_user(user, limit).await?
    };
    Ok(json!({ "notifications": notifications }))
}

pub async fn unread(_params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let notifications = ctx.notifications.list_unread(user).await?;
    Ok(json!({ "notifications": notifications }))
}

pub async fn mark_read(params: Value, ctx: &AppContext, _user: &str) -> Result<Value> {
    let id = params
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::validation("id is required"))?;
    if !ctx.notifications.mark_read(id).await? {
        return Err(CoreError::NotFound("notification").into());
    }
    Ok(json!({ "updated": true }))
}

pub async fn mark_all_read(_params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let updated = ctx.notifications.mark_all_read(user).await?;
    Ok(json!({ "updated": updated }))
}

pub async fn unread_count(_params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let count = ctx.notifications.unread_count(user).await?;
    Ok(json!({ "count": count }))
}
