// SPDX-License-Identifier: MIT

//! Append-only audit trail of semantic task changes.
//!
//! Records are written once and never updated or deleted. An append failure
//! is a soft failure: the caller logs it and the enclosing mutation stands
//! with an incomplete trail.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

// ─── Actions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Deleted,
    StatusChanged,
    PriorityChanged,
    TitleChanged,
    Assigned,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Deleted => "deleted",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::PriorityChanged => "priority_changed",
            AuditAction::TitleChanged => "title_changed",
            AuditAction::Assigned => "assigned",
        }
    }
}

// ─── Entry ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub task_id: String,
    /// The actor who performed the change.
    pub user_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub timestamp: String,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    task_id: String,
    user_id: String,
    action: String,
    previous_value: Option<String>,
    new_value: Option<String>,
    timestamp: String,
}

impl From<AuditRow> for AuditEntry {
    fn from(r: AuditRow) -> AuditEntry {
        AuditEntry {
            id: r.id,
            task_id: r.task_id,
            user_id: r.user_id,
            action: r.action,
            previous_value: r.previous_value,
            new_value: r.new_value,
            timestamp: r.timestamp,
        }
    }
}

// ─── AuditLog ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AuditLog {
    pool: SqlitePool,
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write one immutable record. Each change event is its own independent
    /// append — there is no batch and no rollback.
    pub async fn append(
        &self,
        task_id: &str,
        actor_id: &str,
        action: AuditAction,
        previous_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<AuditEntry, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO audit_log
                 (id, task_id, user_id, action, previous_value, new_value, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(task_id)
        .bind(actor_id)
        .bind(action.as_str())
        .bind(previous_value)
        .bind(new_value)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(AuditEntry {
            id,
            task_id: task_id.to_string(),
            user_id: actor_id.to_string(),
            action: action.as_str().to_string(),
            previous_value: previous_value.map(String::from),
            new_value: new_value.map(String::from),
            timestamp: now,
        })
    }

    /// Chronological-descending history for one task.
    pub async fn list(&self, task_id: &str) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT * FROM audit_log WHERE task_id = ? ORDER BY timestamp DESC, id DESC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Total record count for one task (test and status plumbing).
    pub async fn count(&self, task_id: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log WHERE task_id = ?")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
