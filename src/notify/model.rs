// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// A per-user mailbox message. Created only as a side effect of a task
/// mutation — clients can read and mark, never write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    /// Recipient identity.
    pub user_id: String,
    pub message: String,
    /// Originating task, when the notification refers to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Resolved from the task on read paths; absent when the task is gone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}
