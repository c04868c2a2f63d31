// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const TITLE_MAX_LEN: usize = 100;

// ─── Enums ────────────────────────────────────────────────────────────────────

/// Task workflow status. Wire values match the persisted strings exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Review")]
    Review,
    #[serde(rename = "Completed")]
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::ToDo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Review => "Review",
            TaskStatus::Completed => "Completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "To Do" => Some(TaskStatus::ToDo),
            "In Progress" => Some(TaskStatus::InProgress),
            "Review" => Some(TaskStatus::Review),
            "Completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
            TaskPriority::Urgent => "Urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Low" => Some(TaskPriority::Low),
            "Medium" => Some(TaskPriority::Medium),
            "High" => Some(TaskPriority::High),
            "Urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }
}

// ─── User references ──────────────────────────────────────────────────────────

/// Minimal public profile attached to expanded user references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// A reference to a user that appears either as a bare identifier or as an
/// expanded profile, depending on the query path. Resolved at the Task Store
/// boundary — never an untyped either/or downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Expanded(UserSummary),
    Id(String),
}

impl UserRef {
    /// The stable user identifier, regardless of representation.
    pub fn id(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::Expanded(u) => &u.id,
        }
    }
}

// ─── Task ─────────────────────────────────────────────────────────────────────

/// A persisted task. Field names are the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// RFC 3339, normalized to UTC at the validation boundary.
    pub due_date: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Immutable after creation.
    pub creator_id: UserRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to_id: Option<UserRef>,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn creator(&self) -> &str {
        self.creator_id.id()
    }

    pub fn assignee(&self) -> Option<&str> {
        self.assigned_to_id.as_ref().map(UserRef::id)
    }
}

// ─── Mutation inputs ──────────────────────────────────────────────────────────

/// Validated fields for `task.create`. Defaults applied during validation.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub assigned_to_id: Option<String>,
}

/// Partial update for `task.update`. `None` means "field not present".
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub assigned_to_id: Option<Option<String>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.assigned_to_id.is_none()
    }
}

// ─── Query parameters ─────────────────────────────────────────────────────────

/// AND-combined listing filters.
#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to_id: Option<String>,
    pub creator_id: Option<String>,
}

/// Upper bound on page size; larger requests are clamped, not rejected.
pub const MAX_LIST_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Pagination {
    pub fn validate(self) -> Result<Self, CoreError> {
        if self.page < 1 {
            return Err(CoreError::validation("page must be >= 1"));
        }
        if self.limit < 1 {
            return Err(CoreError::validation("limit must be >= 1"));
        }
        Ok(Self {
            page: self.page,
            limit: self.limit.min(MAX_LIST_LIMIT),
        })
    }

    pub fn offset(&self) -> i64 {
        // Cannot overflow once validate() has clamped limit; saturate anyway
        // rather than trust every caller went through validate().
        (i64::from(self.page) - 1)
            .max(0)
            .saturating_mul(i64::from(self.limit))
    }
}

/// One page of tasks plus the total matching count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

// ─── Field validation ─────────────────────────────────────────────────────────

/// Trim and bounds-check a title. Rejects empty and over-long titles.
pub fn validate_title(raw: &str) -> Result<String, CoreError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(CoreError::validation("title is required"));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(CoreError::validation(format!(
            "title cannot exceed {TITLE_MAX_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

/// Parse an RFC 3339 due date and normalize it to UTC so string ordering in
/// the store matches chronological ordering.
pub fn validate_due_date(raw: &str) -> Result<String, CoreError> {
    let parsed = chrono::DateTime::parse_from_rfc3339(raw)
        .map_err(|e| CoreError::validation(format!("invalid due date: {e}")))?;
    Ok(parsed.with_timezone(&chrono::Utc).to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ref_serializes_both_shapes() {
        let bare = UserRef::Id("u-1".into());
        assert_eq!(serde_json::to_value(&bare).unwrap(), serde_json::json!("u-1"));

        let expanded = UserRef::Expanded(UserSummary {
            id: "u-1".into(),
            name: "Alice".into(),
            email: Some("alice@example.com".into()),
        });
        let v = serde_json::to_value(&expanded).unwrap();
        assert_eq!(v["id"], "u-1");
        assert_eq!(v["name"], "Alice");
        assert_eq!(expanded.id(), "u-1");
    }

    #[test]
    fn user_ref_deserializes_bare_and_expanded() {
        let bare: UserRef = serde_json::from_value(serde_json::json!("u-2")).unwrap();
        assert_eq!(bare, UserRef::Id("u-2".into()));

        let expanded: UserRef = serde_json::from_value(serde_json::json!({
            "id": "u-2", "name": "Bob", "email": null
        }))
        .unwrap();
        assert_eq!(expanded.id(), "u-2");
    }

    #[test]
    fn status_round_trips_wire_names() {
        for s in ["To Do", "In Progress", "Review", "Completed"] {
            let parsed = TaskStatus::parse(s).unwrap();
            assert_eq!(parsed.as_str(), s);
            let json: TaskStatus = serde_json::from_value(serde_json::json!(s)).unwrap();
            assert_eq!(json, parsed);
        }
        assert!(TaskStatus::parse("Done").is_none());
    }

    #[test]
    fn title_validation_trims_and_bounds() {
        assert_eq!(validate_title("  Ship v1  ").unwrap(), "Ship v1");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(101)).is_err());
        assert!(validate_title(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn pagination_clamps_limit_and_offset_never_overflows() {
        let p = Pagination {
            page: u32::MAX,
            limit: u32::MAX,
        }
        .validate()
        .unwrap();
        assert_eq!(p.limit, MAX_LIST_LIMIT);
        assert_eq!(
            p.offset(),
            (i64::from(u32::MAX) - 1) * i64::from(MAX_LIST_LIMIT)
        );

        // Within-cap requests pass through unchanged.
        let p = Pagination { page: 3, limit: 25 }.validate().unwrap();
        assert_eq!((p.page, p.limit), (3, 25));
        assert_eq!(p.offset(), 50);
    }

    #[test]
    fn due_date_normalizes_to_utc() {
        let utc = validate_due_date("2025-01-01T10:00:00+02:00").unwrap();
        assert!(utc.starts_with("2025-01-01T08:00:00"));
        assert!(validate_due_date("next tuesday").is_err());
    }
}
