// SPDX-License-Identifier: MIT

//! Change detection for task updates.
//!
//! Diffs a requested partial update against the prior task state and emits
//! one semantic change event per field that is both present in the update
//! and different from the prior value. Only classification-relevant fields
//! are checked — description and due date edits are intentionally not
//! audited.

use crate::audit::AuditAction;
use crate::tasks::model::{Task, TaskUpdate};

/// One semantic change, ready to be appended to the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub action: AuditAction,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
}

/// Pure function: prior state + requested update → ordered change events.
///
/// Emission order is fixed (status, priority, title) so the audit trail is
/// deterministic for a given update.
pub fn detect_changes(prior: &Task, update: &TaskUpdate) -> Vec<ChangeEvent> {
    let mut changes = Vec::new();

    if let Some(status) = update.status {
        if status != prior.status {
            changes.push(ChangeEvent {
                action: AuditAction::StatusChanged,
                previous_value: Some(prior.status.as_str().to_string()),
                new_value: Some(status.as_str().to_string()),
            });
        }
    }

    if let Some(priority) = update.priority {
        if priority != prior.priority {
            changes.push(ChangeEvent {
                action: AuditAction::PriorityChanged,
                previous_value: Some(prior.priority.as_str().to_string()),
                new_value: Some(priority.as_str().to_string()),
            });
        }
    }

    if let Some(ref title) = update.title {
        if *title != prior.title {
            changes.push(ChangeEvent {
                action: AuditAction::TitleChanged,
                previous_value: Some(prior.title.clone()),
                new_value: Some(title.clone()),
            });
        }
    }

    changes
}
