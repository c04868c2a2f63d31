// SPDX-License-Identifier: MIT

//! Sync coordinator — the only externally exposed writer path for tasks.
//!
//! Each mutation runs a short deterministic sequence: persist, diff, audit,
//! notify, live-broadcast. Audit appends and live delivery are soft
//! failures; store errors abort the mutation before any side effect runs.
//!
//! The notify-vs-broadcast rules are deliberately asymmetric and preserved
//! from the reference behavior: assignment broadcasts to every connected
//! user, create/update/delete broadcast only to creator and assignee, and
//! deletion never creates a notification record.

use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::error::{CoreError, CoreResult};
use crate::notify::NotificationStore;
use crate::presence::PresenceRegistry;
use crate::storage::Storage;
use crate::tasks::diff::detect_changes;
use crate::tasks::model::{NewTask, Pagination, Task, TaskFilters, TaskPage, TaskUpdate};
use crate::tasks::TaskStorage;

// ─── Per-task write serialization ─────────────────────────────────────────────

/// Single-writer queue keyed by task id.
///
/// The fetch-diff-write-notify sequence is not atomic at the storage layer;
/// holding one async mutex per task id for the whole sequence keeps the
/// change detector's diff trustworthy under concurrent same-task mutations.
/// Different tasks proceed independently.
#[derive(Default)]
struct TaskLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskLocks {
    fn lock_for(&self, task_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("task lock map poisoned");
        locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the map entry when the calling mutation holds the last reference
    /// outside the map. Called after the guard is released; a waiter holds
    /// its own `Arc` clone, which keeps the entry alive for it.
    fn release(&self, task_id: &str) {
        let mut locks = self.locks.lock().expect("task lock map poisoned");
        if let Some(entry) = locks.get(task_id) {
            // Two refs: the map's and the releasing mutation's.
            if Arc::strong_count(entry) <= 2 {
                locks.remove(task_id);
            }
        }
    }
}

// ─── SyncCoordinator ──────────────────────────────────────────────────────────

pub struct SyncCoordinator {
    tasks: TaskStorage,
    audit: AuditLog,
    notifications: NotificationStore,
    presence: Arc<PresenceRegistry>,
    storage: Storage,
    locks: TaskLocks,
}

impl SyncCoordinator {
    pub fn new(
        storage: Storage,
        tasks: TaskStorage,
        audit: AuditLog,
        notifications: NotificationStore,
        presence: Arc<PresenceRegistry>,
    ) -> Self {
        Self {
            tasks,
            audit,
            notifications,
            presence,
            storage,
            locks: TaskLocks::default(),
        }
    }

    /// Append one audit record, logging and swallowing failures — the
    /// enclosing mutation stands even with an incomplete trail.
    async fn audit_soft(
        &self,
        task_id: &str,
        actor: &str,
        action: AuditAction,
        previous: Option<&str>,
        new: Option<&str>,
    ) {
        if let Err(e) = self
            .audit
            .append(task_id, actor, action, previous, new)
            .await
        {
            warn!(task = %task_id, action = action.as_str(), err = %e,
                  "audit append failed — mutation stands");
        }
    }

    /// Broadcast to the creator's channel and, when different, the
    /// assignee's channel.
    fn broadcast_parties(&self, task: &Task, event: &str, payload: serde_json::Value) {
        self.presence.broadcast_to(task.creator(), event, payload.clone());
        if let Some(assignee) = task.assignee() {
            if assignee != task.creator() {
                self.presence.broadcast_to(assignee, event, payload);
            }
        }
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Create: persist → audit("created") → notify assignee (unless
    /// self-assigned) → `task:created` to creator and assignee channels.
    pub async fn create_task(&self, input: NewTask, creator_id: &str) -> CoreResult<Task> {
        let task = self.tasks.create_task(&input, creator_id).await?;

        self.audit_soft(
            &task.id,
            creator_id,
            AuditAction::Created,
            None,
            Some(&format!("Task \"{}\" created", task.title)),
        )
        .await;

        if let Some(assignee) = task.assignee() {
            if assignee != creator_id {
                self.notifications
                    .create(
                        assignee,
                        &format!("You have been assigned a new task: \"{}\"", task.title),
                        Some(&task.id),
                    )
                    .await?;
            }
        }

        let payload = serde_json::to_value(&task).unwrap_or_default();
        self.broadcast_parties(&task, "task:created", payload);

        Ok(task)
    }

    /// Update: fetch prior → persist → diff → audit per change → notify the
    /// counterpart (assignee unless the requester is the assignee, then the
    /// creator; never the requester themselves) → `task:updated` to creator
    /// and assignee channels.
    pub async fn update_task(
        &self,
        task_id: &str,
        update: TaskUpdate,
        requester_id: &str,
    ) -> CoreResult<Task> {
        let lock = self.locks.lock_for(task_id);
        let guard = lock.lock().await;
        let result = self.update_task_locked(task_id, update, requester_id).await;
        drop(guard);
        self.locks.release(task_id);
        result
    }

    async fn update_task_locked(
        &self,
        task_id: &str,
        update: TaskUpdate,
        requester_id: &str,
    ) -> CoreResult<Task> {
        let prior = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or(CoreError::NotFound("task"))?;
        let updated = self
            .tasks
            .update_task(task_id, &update)
            .await?
            .ok_or(CoreError::NotFound("task"))?;

        for change in detect_changes(&prior, &update) {
            self.audit_soft(
                task_id,
                requester_id,
                change.action,
                change.previous_value.as_deref(),
                change.new_value.as_deref(),
            )
            .await;
        }

        let assignee = updated.assignee();
        let notify_target = if assignee != Some(requester_id) {
            assignee
        } else {
            Some(updated.creator())
        };
        if let Some(target) = notify_target {
            if target != requester_id {
                let actor = self.storage.display_name(requester_id).await;
                self.notifications
                    .create(
                        target,
                        &format!("Task \"{}\" was updated by {actor}", updated.title),
                        Some(task_id),
                    )
                    .await?;
            }
        }

        let payload = serde_json::to_value(&updated).unwrap_or_default();
        self.broadcast_parties(&updated, "task:updated", payload);

        Ok(updated)
    }

    /// Assign: set assignee → audit("assigned") → always notify the new
    /// assignee, even on self-assignment → `task:assigned` broadcast to all
    /// connections (assignment is globally observable).
    pub async fn assign_task(
        &self,
        task_id: &str,
        assignee_id: &str,
        requester_id: &str,
    ) -> CoreResult<Task> {
        let lock = self.locks.lock_for(task_id);
        let guard = lock.lock().await;
        let result = self.assign_task_locked(task_id, assignee_id, requester_id).await;
        drop(guard);
        self.locks.release(task_id);
        result
    }

    async fn assign_task_locked(
        &self,
        task_id: &str,
        assignee_id: &str,
        requester_id: &str,
    ) -> CoreResult<Task> {
        let prior = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or(CoreError::NotFound("task"))?;
        let update = TaskUpdate {
            assigned_to_id: Some(Some(assignee_id.to_string())),
            ..Default::default()
        };
        let updated = self
            .tasks
            .update_task(task_id, &update)
            .await?
            .ok_or(CoreError::NotFound("task"))?;

        self.audit_soft(
            task_id,
            requester_id,
            AuditAction::Assigned,
            prior.assignee(),
            Some(assignee_id),
        )
        .await;

        let assigner = self.storage.display_name(requester_id).await;
        self.notifications
            .create(
                assignee_id,
                &format!("{assigner} assigned you to task: \"{}\"", updated.title),
                Some(task_id),
            )
            .await?;

        self.presence.broadcast_all(
            "task:assigned",
            json!({
                "task": updated,
                "assigneeId": assignee_id,
            }),
        );

        Ok(updated)
    }

    /// Delete: creator-only → capture parties → delete → audit("deleted")
    /// → `task:deleted {taskId}` to creator and assignee channels. No
    /// notification record is ever created for deletion.
    pub async fn delete_task(&self, task_id: &str, requester_id: &str) -> CoreResult<()> {
        let lock = self.locks.lock_for(task_id);
        let guard = lock.lock().await;
        let result = self.delete_task_locked(task_id, requester_id).await;
        drop(guard);
        self.locks.release(task_id);
        result
    }

    async fn delete_task_locked(&self, task_id: &str, requester_id: &str) -> CoreResult<()> {
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or(CoreError::NotFound("task"))?;

        if task.creator() != requester_id {
            return Err(CoreError::Forbidden(
                "only the task creator can delete this task",
            ));
        }

        if !self.tasks.delete_task(task_id).await? {
            return Err(CoreError::NotFound("task"));
        }

        self.audit_soft(
            task_id,
            requester_id,
            AuditAction::Deleted,
            Some(&format!("Task \"{}\"", task.title)),
            None,
        )
        .await;

        self.broadcast_parties(&task, "task:deleted", json!({ "taskId": task_id }));
        Ok(())
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub async fn get_task(&self, task_id: &str) -> CoreResult<Task> {
        self.tasks
            .get_task(task_id)
            .await?
            .ok_or(CoreError::NotFound("task"))
    }

    /// Tasks visible to the requester (creator OR assignee), AND-filtered,
    /// paginated.
    pub async fn list_tasks(
        &self,
        requester_id: &str,
        filters: TaskFilters,
        page: Pagination,
    ) -> CoreResult<TaskPage> {
        let page = page.validate()?;
        let (tasks, total) = self
            .tasks
            .list_tasks(Some(requester_id), &filters, page)
            .await?;
        Ok(TaskPage {
            tasks,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    /// The append-only change history for one task, newest first.
    pub async fn audit_trail(&self, task_id: &str) -> CoreResult<Vec<AuditEntry>> {
        // A missing task still has a retrievable trail after deletion, so no
        // existence check here.
        Ok(self.audit.list(task_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::{TaskPriority, TaskStatus};
    use sqlx::SqlitePool;
    use tokio::sync::mpsc;

    async fn coordinator() -> (SyncCoordinator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        let pool: SqlitePool = storage.pool();
        let presence = Arc::new(PresenceRegistry::new());
        let coordinator = SyncCoordinator::new(
            storage,
            TaskStorage::new(pool.clone()),
            AuditLog::new(pool.clone()),
            NotificationStore::new(pool, presence.clone()),
            presence,
        );
        (coordinator, dir)
    }

    fn presence_of(c: &SyncCoordinator) -> Arc<PresenceRegistry> {
        c.presence.clone()
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.into(),
            description: String::new(),
            due_date: "2025-01-01T00:00:00+00:00".into(),
            priority: TaskPriority::Medium,
            status: TaskStatus::ToDo,
            assigned_to_id: None,
        }
    }

    fn connect(c: &SyncCoordinator, user: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        presence_of(c).join(user, tx);
        rx
    }

    fn drain_methods(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut methods = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
            methods.push(v["method"].as_str().unwrap().to_string());
        }
        methods
    }

    #[tokio::test]
    async fn create_with_assignee_full_scenario() {
        let (c, _dir) = coordinator().await;
        let mut rx_a = connect(&c, "u-a");
        let mut rx_b = connect(&c, "u-b");

        let mut input = new_task("Ship v1");
        input.priority = TaskPriority::High;
        input.assigned_to_id = Some("u-b".into());
        let task = c.create_task(input, "u-a").await.unwrap();

        // One audit entry.
        let trail = c.audit_trail(&task.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "created");
        assert_eq!(
            trail[0].new_value.as_deref(),
            Some("Task \"Ship v1\" created")
        );

        // One notification for B with the canonical message.
        let inbox = c.notifications.list_for_user("u-b", 50).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(
            inbox[0].message,
            "You have been assigned a new task: \"Ship v1\""
        );
        assert_eq!(inbox[0].task_id.as_deref(), Some(task.id.as_str()));

        // Live task:created on both channels; B also got notification:new.
        assert_eq!(drain_methods(&mut rx_a), vec!["task:created"]);
        let b_methods = drain_methods(&mut rx_b);
        assert!(b_methods.contains(&"notification:new".to_string()));
        assert!(b_methods.contains(&"task:created".to_string()));
    }

    #[tokio::test]
    async fn self_assigned_create_produces_no_notification() {
        let (c, _dir) = coordinator().await;
        let mut rx_a = connect(&c, "u-a");

        let mut input = new_task("solo");
        input.assigned_to_id = Some("u-a".into());
        c.create_task(input, "u-a").await.unwrap();

        assert_eq!(c.notifications.unread_count("u-a").await.unwrap(), 0);
        // Solo creator-assignee broadcasts exactly once.
        assert_eq!(drain_methods(&mut rx_a), vec!["task:created"]);
    }

    #[tokio::test]
    async fn creator_is_immutable_across_updates() {
        let (c, _dir) = coordinator().await;
        let task = c.create_task(new_task("t"), "u-a").await.unwrap();

        let updated = c
            .update_task(
                &task.id,
                TaskUpdate {
                    title: Some("renamed".into()),
                    status: Some(TaskStatus::Review),
                    ..Default::default()
                },
                "u-a",
            )
            .await
            .unwrap();
        assert_eq!(updated.creator(), "u-a");

        let again = c
            .update_task(&task.id, TaskUpdate::default(), "u-a")
            .await
            .unwrap();
        assert_eq!(again.creator(), "u-a");
    }

    #[tokio::test]
    async fn no_op_update_writes_zero_audit_records() {
        let (c, _dir) = coordinator().await;
        let task = c.create_task(new_task("t"), "u-a").await.unwrap();

        c.update_task(
            &task.id,
            TaskUpdate {
                status: Some(TaskStatus::ToDo),
                title: Some("t".into()),
                ..Default::default()
            },
            "u-a",
        )
        .await
        .unwrap();

        let trail = c.audit_trail(&task.id).await.unwrap();
        // Only the creation record.
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "created");
    }

    #[tokio::test]
    async fn status_change_audits_exactly_once() {
        let (c, _dir) = coordinator().await;
        let task = c.create_task(new_task("t"), "u-a").await.unwrap();

        c.update_task(
            &task.id,
            TaskUpdate {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            },
            "u-a",
        )
        .await
        .unwrap();

        let trail = c.audit_trail(&task.id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, "status_changed");
        assert_eq!(trail[0].previous_value.as_deref(), Some("To Do"));
        assert_eq!(trail[0].new_value.as_deref(), Some("In Progress"));
    }

    #[tokio::test]
    async fn update_by_assignee_notifies_creator() {
        let (c, _dir) = coordinator().await;
        let mut input = new_task("shared");
        input.assigned_to_id = Some("u-b".into());
        let task = c.create_task(input, "u-a").await.unwrap();

        c.update_task(
            &task.id,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
            "u-b",
        )
        .await
        .unwrap();

        let creator_inbox = c.notifications.list_for_user("u-a", 50).await.unwrap();
        assert_eq!(creator_inbox.len(), 1);
        assert_eq!(
            creator_inbox[0].message,
            "Task \"shared\" was updated by u-b"
        );
    }

    #[tokio::test]
    async fn update_by_creator_notifies_assignee() {
        let (c, _dir) = coordinator().await;
        let mut input = new_task("shared");
        input.assigned_to_id = Some("u-b".into());
        let task = c.create_task(input, "u-a").await.unwrap();
        c.notifications.mark_all_read("u-b").await.unwrap();

        c.update_task(
            &task.id,
            TaskUpdate {
                priority: Some(TaskPriority::Urgent),
                ..Default::default()
            },
            "u-a",
        )
        .await
        .unwrap();

        assert_eq!(c.notifications.unread_count("u-b").await.unwrap(), 1);
        // The requester is never notified.
        assert_eq!(c.notifications.unread_count("u-a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_unassigned_task_notifies_nobody() {
        let (c, _dir) = coordinator().await;
        let task = c.create_task(new_task("lone"), "u-a").await.unwrap();

        c.update_task(
            &task.id,
            TaskUpdate {
                status: Some(TaskStatus::Review),
                ..Default::default()
            },
            "u-a",
        )
        .await
        .unwrap();

        assert_eq!(c.notifications.unread_count("u-a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_uses_display_name_when_profile_exists() {
        let (c, _dir) = coordinator().await;
        c.storage.upsert_user("u-b", "Bob", None).await.unwrap();
        let mut input = new_task("shared");
        input.assigned_to_id = Some("u-b".into());
        let task = c.create_task(input, "u-a").await.unwrap();

        c.update_task(
            &task.id,
            TaskUpdate {
                status: Some(TaskStatus::Review),
                ..Default::default()
            },
            "u-b",
        )
        .await
        .unwrap();

        let inbox = c.notifications.list_for_user("u-a", 50).await.unwrap();
        assert_eq!(inbox[0].message, "Task \"shared\" was updated by Bob");
    }

    #[tokio::test]
    async fn update_missing_task_has_no_side_effects() {
        let (c, _dir) = coordinator().await;
        let err = c
            .update_task("missing", TaskUpdate::default(), "u-a")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(c.audit_trail("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn assign_always_notifies_even_self_assign() {
        let (c, _dir) = coordinator().await;
        let task = c.create_task(new_task("t"), "u-a").await.unwrap();

        c.assign_task(&task.id, "u-a", "u-a").await.unwrap();

        let inbox = c.notifications.list_for_user("u-a", 50).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message, "u-a assigned you to task: \"t\"");
    }

    #[tokio::test]
    async fn assign_broadcasts_to_all_and_audits_transition() {
        let (c, _dir) = coordinator().await;
        let task = c.create_task(new_task("t"), "u-a").await.unwrap();
        c.assign_task(&task.id, "u-b", "u-a").await.unwrap();

        // An uninvolved bystander still sees task:assigned.
        let mut rx_c = connect(&c, "u-c");
        c.assign_task(&task.id, "u-c", "u-a").await.unwrap();

        let methods = drain_methods(&mut rx_c);
        assert!(methods.contains(&"task:assigned".to_string()));

        let trail = c.audit_trail(&task.id).await.unwrap();
        let assigns: Vec<_> = trail.iter().filter(|e| e.action == "assigned").collect();
        assert_eq!(assigns.len(), 2);
        // Newest first: u-b → u-c transition carries the previous assignee.
        assert_eq!(assigns[0].previous_value.as_deref(), Some("u-b"));
        assert_eq!(assigns[0].new_value.as_deref(), Some("u-c"));
        assert_eq!(assigns[1].previous_value, None);
    }

    #[tokio::test]
    async fn delete_by_non_creator_is_forbidden_and_inert() {
        let (c, _dir) = coordinator().await;
        let mut input = new_task("keep");
        input.assigned_to_id = Some("u-b".into());
        let task = c.create_task(input, "u-a").await.unwrap();
        let trail_before = c.audit_trail(&task.id).await.unwrap().len();
        let unread_before = c.notifications.unread_count("u-b").await.unwrap();

        let err = c.delete_task(&task.id, "u-b").await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        // Task, trail, and notifications unchanged.
        assert!(c.get_task(&task.id).await.is_ok());
        assert_eq!(c.audit_trail(&task.id).await.unwrap().len(), trail_before);
        assert_eq!(
            c.notifications.unread_count("u-b").await.unwrap(),
            unread_before
        );
    }

    #[tokio::test]
    async fn delete_broadcasts_but_never_notifies() {
        let (c, _dir) = coordinator().await;
        let mut input = new_task("gone");
        input.assigned_to_id = Some("u-b".into());
        let task = c.create_task(input, "u-a").await.unwrap();
        c.notifications.mark_all_read("u-b").await.unwrap();

        let mut rx_a = connect(&c, "u-a");
        let mut rx_b = connect(&c, "u-b");
        c.delete_task(&task.id, "u-a").await.unwrap();

        assert!(matches!(
            c.get_task(&task.id).await.unwrap_err(),
            CoreError::NotFound(_)
        ));
        assert_eq!(drain_methods(&mut rx_a), vec!["task:deleted"]);
        assert_eq!(drain_methods(&mut rx_b), vec!["task:deleted"]);
        assert_eq!(c.notifications.unread_count("u-b").await.unwrap(), 0);

        // Trail survives deletion, newest first.
        let trail = c.audit_trail(&task.id).await.unwrap();
        assert_eq!(trail[0].action, "deleted");
        assert_eq!(trail[0].previous_value.as_deref(), Some("Task \"gone\""));
    }

    #[tokio::test]
    async fn list_tasks_validates_pagination() {
        let (c, _dir) = coordinator().await;
        let err = c
            .list_tasks("u-a", TaskFilters::default(), Pagination { page: 0, limit: 10 })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn racing_updates_serialize_per_task() {
        let (c, _dir) = coordinator().await;
        let c = Arc::new(c);
        let task = c.create_task(new_task("contended"), "u-a").await.unwrap();

        let c1 = c.clone();
        let id1 = task.id.clone();
        let h1 = tokio::spawn(async move {
            c1.update_task(
                &id1,
                TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
                "u-a",
            )
            .await
        });
        let c2 = c.clone();
        let id2 = task.id.clone();
        let h2 = tokio::spawn(async move {
            c2.update_task(
                &id2,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
                "u-a",
            )
            .await
        });
        h1.await.unwrap().unwrap();
        h2.await.unwrap().unwrap();

        // Serialized sequence: each diff saw the true prior value, so the
        // status_changed records chain without gaps or duplicates.
        let trail = c.audit_trail(&task.id).await.unwrap();
        let mut transitions: Vec<(String, String)> = trail
            .iter()
            .filter(|e| e.action == "status_changed")
            .map(|e| {
                (
                    e.previous_value.clone().unwrap(),
                    e.new_value.clone().unwrap(),
                )
            })
            .collect();
        transitions.reverse();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].0, "To Do");
        // The second writer's previous value is the first writer's result.
        assert_eq!(transitions[1].0, transitions[0].1);

        // No lock entries linger once both writers are done.
        assert!(c.locks.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lock_map_is_empty_after_mutations_settle() {
        let (c, _dir) = coordinator().await;
        let task = c.create_task(new_task("t"), "u-a").await.unwrap();

        c.update_task(
            &task.id,
            TaskUpdate {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            },
            "u-a",
        )
        .await
        .unwrap();
        c.assign_task(&task.id, "u-b", "u-a").await.unwrap();
        // Error paths release their entry too.
        let _ = c.update_task("missing", TaskUpdate::default(), "u-a").await;
        c.delete_task(&task.id, "u-a").await.unwrap();

        assert!(c.locks.locks.lock().unwrap().is_empty());
    }
}
