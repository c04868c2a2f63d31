// SPDX-License-Identifier: MIT

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::model::{
    NewTask, Pagination, Task, TaskFilters, TaskPriority, TaskStatus, TaskUpdate, UserRef,
    UserSummary,
};
use crate::storage::with_timeout;

// ─── Raw DB row ───────────────────────────────────────────────────────────────

/// Task row joined against the users table so identity references come back
/// expanded when a profile exists (and as bare ids when it does not).
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: String,
    due_date: String,
    priority: String,
    status: String,
    creator_id: String,
    assigned_to_id: Option<String>,
    created_at: String,
    updated_at: String,
    creator_name: Option<String>,
    creator_email: Option<String>,
    assignee_name: Option<String>,
    assignee_email: Option<String>,
}

fn user_ref(id: String, name: Option<String>, email: Option<String>) -> UserRef {
    match name {
        Some(name) => UserRef::Expanded(UserSummary { id, name, email }),
        None => UserRef::Id(id),
    }
}

impl From<TaskRow> for Task {
    fn from(r: TaskRow) -> Task {
        let assigned_to_id = r
            .assigned_to_id
            .map(|id| user_ref(id, r.assignee_name, r.assignee_email));
        Task {
            id: r.id,
            title: r.title,
            description: r.description,
            due_date: r.due_date,
            // Fallbacks guard against hand-edited rows; writes only ever
            // store canonical enum strings.
            priority: TaskPriority::parse(&r.priority).unwrap_or(TaskPriority::Medium),
            status: TaskStatus::parse(&r.status).unwrap_or(TaskStatus::ToDo),
            creator_id: user_ref(r.creator_id, r.creator_name, r.creator_email),
            assigned_to_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const SELECT_TASK: &str = "SELECT t.*, \
     cu.name AS creator_name, cu.email AS creator_email, \
     au.name AS assignee_name, au.email AS assignee_email \
     FROM tasks t \
     LEFT JOIN users cu ON cu.id = t.creator_id \
     LEFT JOIN users au ON au.id = t.assigned_to_id";

// ─── TaskStorage ──────────────────────────────────────────────────────────────

/// SQLite-backed authoritative task store.
///
/// Mutations here are plain last-write-wins row operations; the ordering and
/// side-effect policy lives in the sync coordinator, which is the only
/// externally exposed writer path.
#[derive(Clone)]
pub struct TaskStorage {
    pool: SqlitePool,
}

impl TaskStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    /// Persist a new task and return it with expanded user references.
    pub async fn create_task(
        &self,
        input: &NewTask,
        creator_id: &str,
    ) -> Result<Task, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO tasks
                 (id, title, description, due_date, priority, status,
                  creator_id, assigned_to_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.due_date)
        .bind(input.priority.as_str())
        .bind(input.status.as_str())
        .bind(creator_id)
        .bind(input.assigned_to_id.as_deref())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_task(&id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Apply a partial update. The creator is never touched — it is immutable
    /// after creation and has no corresponding column assignment here.
    ///
    /// Returns the updated task, or `None` when the id does not exist.
    pub async fn update_task(
        &self,
        id: &str,
        update: &TaskUpdate,
    ) -> Result<Option<Task>, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET updated_at = ");
        qb.push_bind(&now);
        if let Some(ref title) = update.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(ref description) = update.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(ref due_date) = update.due_date {
            qb.push(", due_date = ").push_bind(due_date);
        }
        if let Some(priority) = update.priority {
            qb.push(", priority = ").push_bind(priority.as_str());
        }
        if let Some(status) = update.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(ref assignee) = update.assigned_to_id {
            qb.push(", assigned_to_id = ").push_bind(assignee.as_deref());
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_task(id).await
    }

    /// Delete by id. Returns `true` when a row was removed.
    pub async fn delete_task(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, sqlx::Error> {
        let row: Option<TaskRow> = sqlx::query_as(&format!("{SELECT_TASK} WHERE t.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// One page of tasks plus the total matching count.
    ///
    /// `scope_user`: when set, only tasks where that user is creator OR
    /// assignee are visible (a task matching both appears once — rows are
    /// keyed by primary key). Filters combine with AND. Ordering is
    /// `(due_date ASC, created_at DESC)`.
    pub async fn list_tasks(
        &self,
        scope_user: Option<&str>,
        filters: &TaskFilters,
        page: Pagination,
    ) -> Result<(Vec<Task>, i64), sqlx::Error> {
        let mut count_qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM tasks t");
        push_filters(&mut count_qb, scope_user, filters);
        let total: i64 = with_timeout(async {
            let row: (i64,) = count_qb.build_query_as().fetch_one(&self.pool).await?;
            Ok(row.0)
        })
        .await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_TASK);
        push_filters(&mut qb, scope_user, filters);
        qb.push(" ORDER BY t.due_date ASC, t.created_at DESC LIMIT ");
        qb.push_bind(page.limit as i64);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows: Vec<TaskRow> = with_timeout(async {
            qb.build_query_as().fetch_all(&self.pool).await
        })
        .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    scope_user: Option<&str>,
    filters: &TaskFilters,
) {
    qb.push(" WHERE 1=1");
    if let Some(user) = scope_user {
        qb.push(" AND (t.creator_id = ")
            .push_bind(user.to_string())
            .push(" OR t.assigned_to_id = ")
            .push_bind(user.to_string())
            .push(")");
    }
    if let Some(status) = filters.status {
        qb.push(" AND t.status = ").push_bind(status.as_str());
    }
    if let Some(priority) = filters.priority {
        qb.push(" AND t.priority = ").push_bind(priority.as_str());
    }
    if let Some(ref assignee) = filters.assigned_to_id {
        qb.push(" AND t.assigned_to_id = ").push_bind(assignee.clone());
    }
    if let Some(ref creator) = filters.creator_id {
        qb.push(" AND t.creator_id = ").push_bind(creator.clone());
    }
}
