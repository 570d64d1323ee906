//! Reminders: when to nudge an assignee about a due date.
//! Planning is pure; the dispatch loop (see `dispatch`) sends them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::assignment::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    DueSoon,
    Overdue,
    FollowUp,
    Escalation,
    DelegationRequest,
    MilestoneApproaching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderChannel {
    #[default]
    Email,
    Sms,
    Push,
    InApp,
    Slack,
    Teams,
}

impl ReminderChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderChannel::Email => "email",
            ReminderChannel::Sms => "sms",
            ReminderChannel::Push => "push",
            ReminderChannel::InApp => "in_app",
            ReminderChannel::Slack => "slack",
            ReminderChannel::Teams => "teams",
        }
    }
}

impl std::fmt::Display for ReminderChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Once a reminder leaves `Scheduled` it never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Scheduled,
    Sent,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub task_id: String,
    pub assignment_id: String,
    pub reminder_type: ReminderType,
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub channel: ReminderChannel,
    pub status: ReminderStatus,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

impl Reminder {
    pub fn new(
        assignment: &Assignment,
        reminder_type: ReminderType,
        scheduled_for: DateTime<Utc>,
        channel: ReminderChannel,
        message: String,
    ) -> Self {
        Self {
            id: format!("rem-{}", uuid::Uuid::new_v4()),
            task_id: assignment.task_id.clone(),
            assignment_id: assignment.id.clone(),
            reminder_type,
            scheduled_for,
            sent_at: None,
            channel,
            status: ReminderStatus::Scheduled,
            message,
            metadata: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReminderStatus::Scheduled && self.scheduled_for <= now
    }

    /// Scheduled → Sent. No-op (false) from any other status.
    pub(crate) fn mark_sent(&mut self, at: DateTime<Utc>) -> bool {
        self.leave_scheduled(ReminderStatus::Sent, Some(at))
    }

    pub(crate) fn mark_failed(&mut self, reason: &str) -> bool {
        let changed = self.leave_scheduled(ReminderStatus::Failed, None);
        if changed {
            self.metadata = Some(serde_json::json!({ "error": reason }));
        }
        changed
    }

    pub(crate) fn cancel(&mut self) -> bool {
        self.leave_scheduled(ReminderStatus::Cancelled, None)
    }

    fn leave_scheduled(&mut self, to: ReminderStatus, sent_at: Option<DateTime<Utc>>) -> bool {
        if self.status != ReminderStatus::Scheduled {
            return false;
        }
        self.status = to;
        self.sent_at = sent_at;
        true
    }
}

/// Offsets used when planning reminders around a due date.
#[derive(Debug, Clone, Copy)]
pub struct ReminderPlan {
    pub due_soon_lead: Duration,
    pub overdue_grace: Duration,
}

impl ReminderPlan {
    pub fn from_config(config: &taskwarden_core::config::ReminderConfig) -> Self {
        Self {
            due_soon_lead: Duration::hours(config.due_soon_lead_hours),
            overdue_grace: Duration::hours(config.overdue_grace_hours),
        }
    }

    /// Reminders for an assignment's due date. Empty when there is none.
    ///
    /// `due_soon` only when the due date is more than one lead time away;
    /// `overdue` always, one grace period after the due date.
    /// A reminder whose time falls outside the representable range is skipped.
    pub fn plan(&self, assignment: &Assignment, now: DateTime<Utc>) -> Vec<Reminder> {
        let Some(due) = assignment.due_date else {
            return Vec::new();
        };
        let mut reminders = Vec::with_capacity(2);

        if let Some(at) = due
            .checked_sub_signed(self.due_soon_lead)
            .filter(|at| *at > now)
        {
            reminders.push(Reminder::new(
                assignment,
                ReminderType::DueSoon,
                at,
                ReminderChannel::Email,
                format!(
                    "Reminder: task {} is due {}",
                    assignment.task_id,
                    due.format("%Y-%m-%d %H:%M UTC")
                ),
            ));
        }

        match due.checked_add_signed(self.overdue_grace) {
            Some(at) => reminders.push(Reminder::new(
                assignment,
                ReminderType::Overdue,
                at,
                ReminderChannel::Email,
                format!(
                    "Overdue: task {} was due {}",
                    assignment.task_id,
                    due.format("%Y-%m-%d %H:%M UTC")
                ),
            )),
            None => tracing::warn!(
                "Due date {} on {} leaves no room for an overdue reminder",
                due,
                assignment.id
            ),
        }

        reminders
    }
}

impl Default for ReminderPlan {
    fn default() -> Self {
        Self::from_config(&taskwarden_core::config::ReminderConfig::default())
    }
}
