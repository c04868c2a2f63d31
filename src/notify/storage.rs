// SPDX-License-Identifier: MIT

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::model::Notification;
use crate::presence::PresenceRegistry;

pub const DEFAULT_LIST_LIMIT: i64 = 50;

// ─── Raw DB row ───────────────────────────────────────────────────────────────

/// Notification row joined against tasks so the task id resolves to its
/// current title on read paths.
#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    message: String,
    task_id: Option<String>,
    task_title: Option<String>,
    is_read: i64,
    created_at: String,
}

impl From<NotificationRow> for Notification {
    fn from(r: NotificationRow) -> Notification {
        Notification {
            id: r.id,
            user_id: r.user_id,
            message: r.message,
            task_id: r.task_id,
            task_title: r.task_title,
            is_read: r.is_read != 0,
            created_at: r.created_at,
        }
    }
}

const SELECT_NOTIFICATION: &str = "SELECT n.*, t.title AS task_title \
     FROM notifications n LEFT JOIN tasks t ON t.id = n.task_id";

// ─── NotificationStore ────────────────────────────────────────────────────────

/// Per-user notification mailbox with read/unread state.
///
/// `create` pushes `notification:new` into the recipient's presence channel
/// synchronously, before returning — a recipient with zero live connections
/// still gets the persisted record for later retrieval.
#[derive(Clone)]
pub struct NotificationStore {
    pool: SqlitePool,
    presence: Arc<PresenceRegistry>,
}

impl NotificationStore {
    pub fn new(pool: SqlitePool, presence: Arc<PresenceRegistry>) -> Self {
        Self { pool, presence }
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    /// Persist a new unread notification and deliver it live.
    pub async fn create(
        &self,
        recipient_id: &str,
        message: &str,
        task_id: Option<&str>,
    ) -> Result<Notification, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO notifications (id, user_id, message, task_id, is_read, created_at)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(recipient_id)
        .bind(message)
        .bind(task_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row: NotificationRow =
            sqlx::query_as(&format!("{SELECT_NOTIFICATION} WHERE n.id = ?"))
                .bind(&id)
                .fetch_one(&self.pool)
                .await?;
        let notification: Notification = row.into();

        self.presence.broadcast_to(
            recipient_id,
            "notification:new",
            serde_json::to_value(&notification).unwrap_or_default(),
        );

        Ok(notification)
    }

    /// Mark one notification read. Idempotent — marking an already-read
    /// notification succeeds and changes nothing. `Ok(false)` when the id
    /// does not exist.
    pub async fn mark_read(&self, id: &str) -> Result<bool, sqlx::Error> {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM notifications WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Ok(false);
        }
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    /// Mark every unread notification for `user_id` read. Idempotent bulk
    /// update; returns the number of rows flipped this call.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Newest-first notifications for a user, task titles resolved.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "{SELECT_NOTIFICATION} WHERE n.user_id = ? ORDER BY n.created_at DESC, n.id DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_unread(&self, user_id: &str) -> Result<Vec<Notification>, sqlx::Error> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "{SELECT_NOTIFICATION} WHERE n.user_id = ? AND n.is_read = 0 \
             ORDER BY n.created_at DESC, n.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn store() -> NotificationStore {
        // One connection so every query sees the same in-memory database.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("src/storage/migrations")
            .run(&pool)
            .await
            .unwrap();
        NotificationStore::new(pool, Arc::new(PresenceRegistry::new()))
    }

    #[tokio::test]
    async fn create_delivers_live_before_returning() {
        let store = store().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.presence.join("u-b", tx);

        let n = store.create("u-b", "hello", None).await.unwrap();
        assert!(!n.is_read);

        let frame = rx.try_recv().expect("live delivery must precede return");
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["method"], "notification:new");
        assert_eq!(v["params"]["message"], "hello");
    }

    #[tokio::test]
    async fn list_resolves_task_titles_newest_first() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO tasks (id, title, description, due_date, priority, status,
                                creator_id, created_at, updated_at)
             VALUES ('t-1', 'Ship v1', '', '2025-01-01T00:00:00+00:00', 'High', 'To Do',
                     'u-a', '2024-12-01T00:00:00+00:00', '2024-12-01T00:00:00+00:00')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        store.create("u-b", "first", Some("t-1")).await.unwrap();
        store.create("u-b", "second", None).await.unwrap();

        let list = store.list_for_user("u-b", DEFAULT_LIST_LIMIT).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].message, "second");
        assert_eq!(list[1].task_title.as_deref(), Some("Ship v1"));
        assert!(list[0].task_title.is_none());
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let store = store().await;
        let n = store.create("u-b", "m", None).await.unwrap();

        assert!(store.mark_read(&n.id).await.unwrap());
        assert!(store.mark_read(&n.id).await.unwrap());
        assert!(!store.mark_read("missing").await.unwrap());
        assert_eq!(store.unread_count("u-b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_all_read_then_count_zero_and_noop_again() {
        let store = store().await;
        store.create("u-b", "one", None).await.unwrap();
        store.create("u-b", "two", None).await.unwrap();
        store.create("u-c", "other", None).await.unwrap();

        assert_eq!(store.mark_all_read("u-b").await.unwrap(), 2);
        assert_eq!(store.unread_count("u-b").await.unwrap(), 0);
        assert_eq!(store.mark_all_read("u-b").await.unwrap(), 0);
        // Unrelated user untouched.
        assert_eq!(store.unread_count("u-c").await.unwrap(), 1);
        assert_eq!(store.list_unread("u-c").await.unwrap().len(), 1);
    }
}
