//! Assignment definitions: the core data model for tracked ownership.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reminders::{Reminder, ReminderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

/// Assignment status.
///
/// ```text
/// Assigned → Accepted → InProgress → Completed
/// Assigned | Accepted | InProgress → Delegated → (accept) → Accepted
/// any non-terminal → Cancelled
/// ```
/// `Overdue` is a reporting label; the lifecycle never moves an assignment into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Accepted,
    InProgress,
    Delegated,
    Overdue,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 7] = [
        AssignmentStatus::Assigned,
        AssignmentStatus::Accepted,
        AssignmentStatus::InProgress,
        AssignmentStatus::Delegated,
        AssignmentStatus::Overdue,
        AssignmentStatus::Completed,
        AssignmentStatus::Cancelled,
    ];

    /// Completed and Cancelled admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Cancelled)
    }

    /// Counts against the owner's workload.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Pending,
    Accepted,
    /// Part of the model; nothing in the engine moves a delegation here yet.
    Declined,
}

/// A proposed transfer of ownership. History is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub delegated_at: DateTime<Utc>,
    pub reason: String,
    pub status: DelegationStatus,
    pub accepted_at: Option<DateTime<Utc>>,
    pub original_due_date: Option<DateTime<Utc>>,
    pub new_due_date: Option<DateTime<Utc>>,
}

impl Delegation {
    pub fn new(
        from_user_id: &str,
        to_user_id: &str,
        reason: &str,
        original_due_date: Option<DateTime<Utc>>,
        new_due_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: format!("del-{}", uuid::Uuid::new_v4()),
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            delegated_at: Utc::now(),
            reason: reason.to_string(),
            status: DelegationStatus::Pending,
            accepted_at: None,
            original_due_date,
            new_due_date,
        }
    }
}

/// A task linked to exactly one current assignee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    /// Opaque, caller-supplied.
    pub task_id: String,
    /// Current owner's assignee id.
    pub assigned_to: String,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: AssignmentStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub delegations: Vec<Delegation>,
    pub reminders: Vec<Reminder>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Assignment {
    pub fn new(
        task_id: &str,
        assigned_to: &str,
        assigned_by: &str,
        due_date: Option<DateTime<Utc>>,
        priority: Priority,
    ) -> Self {
        Self {
            id: format!("asg-{}", uuid::Uuid::new_v4()),
            task_id: task_id.to_string(),
            assigned_to: assigned_to.to_string(),
            assigned_by: assigned_by.to_string(),
            assigned_at: Utc::now(),
            due_date,
            priority,
            status: AssignmentStatus::Assigned,
            completed_at: None,
            delegations: Vec::new(),
            reminders: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Past due and not completed. Cancelled assignments still count here.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != AssignmentStatus::Completed
            && self.due_date.is_some_and(|due| due < now)
    }

    pub fn delegation(&self, id: &str) -> Option<&Delegation> {
        self.delegations.iter().find(|d| d.id == id)
    }

    pub(crate) fn delegation_mut(&mut self, id: &str) -> Option<&mut Delegation> {
        self.delegations.iter_mut().find(|d| d.id == id)
    }

    /// Cancel every reminder still waiting to fire. Returns how many changed.
    pub(crate) fn cancel_scheduled_reminders(&mut self) -> usize {
        self.reminders
            .iter_mut()
            .map(|r| r.cancel())
            .filter(|changed| *changed)
            .count()
    }

    pub fn scheduled_reminders(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders
            .iter()
            .filter(|r| r.status == ReminderStatus::Scheduled)
    }
}
