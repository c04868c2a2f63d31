use crate::error::CoreError;
use crate::tasks::model::{
    validate_due_date, validate_title, NewTask, Pagination, TaskFilters, TaskPriority, TaskStatus,
    TaskUpdate,
};
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

fn s(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|v| v.as_str()).map(String::from)
}
fn sv<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|v| v.as_str())
}
fn n(v: &Value, key: &str) -> Option<i64> {
    v.get(key).and_then(|v| v.as_i64())
}

fn require<'a>(v: &'a Value, key: &str) -> Result<&'a str, CoreError> {
    sv(v, key).ok_or_else(|| CoreError::validation(format!("{key} is required")))
}

fn parse_status(raw: &str) -> Result<TaskStatus, CoreError> {
    TaskStatus::parse(raw).ok_or_else(|| CoreError::validation(format!("invalid status: {raw}")))
}

fn parse_priority(raw: &str) -> Result<TaskPriority, CoreError> {
    TaskPriority::parse(raw)
        .ok_or_else(|| CoreError::validation(format!("invalid priority: {raw}")))
}

/// Three-state assignee field: absent = keep, null or "" = clear, id = set.
fn parse_assignee(params: &Value) -> Result<Option<Option<String>>, CoreError> {
    match params.get("assignedToId") {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => {
            let id = v
                .as_str()
                .ok_or_else(|| CoreError::validation("assignedToId must be a string"))?;
            if id.is_empty() {
                Ok(Some(None))
            } else {
                Ok(Some(Some(id.to_string())))
            }
        }
    }
}

fn parse_pagination(params: &Value) -> Result<Pagination, CoreError> {
    let defaults = Pagination::default();
    let page = match n(params, "page") {
        Some(p) => u32::try_from(p).map_err(|_| CoreError::validation("page must be >= 1"))?,
        None => defaults.page,
    };
    let limit = match n(params, "limit") {
        Some(l) => u32::try_from(l).map_err(|_| CoreError::validation("limit must be >= 1"))?,
        None => defaults.limit,
    };
    Pagination { page, limit }.validate()
}

pub async fn create(params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let title = validate_title(require(&params, "title")?)?;
    let due_date = validate_due_date(require(&params, "dueDate")?)?;
    let priority = match sv(&params, "priority") {
        Some(p) => parse_priority(p)?,
        None => TaskPriority::Medium,
    };
    let status = match sv(&params, "status") {
        Some(st) => parse_status(st)?,
        None => TaskStatus::ToDo,
    };

    let input = NewTask {
        title,
        description: s(&params, "description").unwrap_or_default(),
        due_date,
        priority,
        status,
        assigned_to_id: s(&params, "assignedToId").filter(|a| !a.is_empty()),
    };
    let task = ctx.coordinator.create_task(input, user).await?;
    Ok(json!({ "task": task }))
}

pub async fn get(params: Value, ctx: &AppContext, _user: &str) -> Result<Value> {
    let task = ctx.coordinator.get_task(require(&params, "id")?).await?;
    Ok(json!({ "task": task }))
}

pub async fn list(params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let filters = TaskFilters {
        status: sv(&params, "status").map(parse_status).transpose()?,
        priority: sv(&params, "priority").map(parse_priority).transpose()?,
        assigned_to_id: s(&params, "assignedToId"),
        creator_id: s(&params, "creatorId"),
    };
    let page = parse_pagination(&params)?;
    let result = ctx.coordinator.list_tasks(user, filters, page).await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn update(params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let id = require(&params, "id")?;

    let update = TaskUpdate {
        title: sv(&params, "title").map(validate_title).transpose()?,
        description: s(&params, "description"),
        due_date: sv(&params, "dueDate").map(validate_due_date).transpose()?,
        priority: sv(&params, "priority").map(parse_priority).transpose()?,
        status: sv(&params, "status").map(parse_status).transpose()?,
        assigned_to_id: parse_assignee(&params)?,
    };

    let task = ctx.coordinator.update_task(id, update, user).await?;
    Ok(json!({ "task": task }))
}

pub async fn assign(params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let id = require(&params, "id")?;
    let assignee = require(&params, "assigneeId")?;
    if assignee.is_empty() {
        return Err(CoreError::validation("assigneeId is required").into());
    }
    let task = ctx.coordinator.assign_task(id, assignee, user).await?;
    Ok(json!({ "task": task }))
}

pub async fn delete(params: Value, ctx: &AppContext, user: &str) -> Result<Value> {
    let id = require(&params, "id")?;
    ctx.coordinator.delete_task(id, user).await?;
    Ok(json!({ "deleted": true }))
}

pub async fn audit_trail(params: Value, ctx: &AppContext, _user: &str) -> Result<Value> {
    let entries = ctx.coordinator.audit_trail(require(&params, "id")?).await?;
    Ok(json!({ "entries": entries }))
}
