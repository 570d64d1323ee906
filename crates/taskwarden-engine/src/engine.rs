//! Assignment engine: owns assignments, the directory, rules and reminders.
//!
//! Every mutating operation validates first and only then touches state, so a
//! failed call leaves nothing half-done. Share the engine as [`SharedEngine`]:
//! the single mutex serializes workload and reminder-status changes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use taskwarden_core::config::TaskWardenConfig;
use taskwarden_core::error::{Result, TaskWardenError};

use crate::assignment::{Assignment, AssignmentStatus, Delegation, DelegationStatus, Priority};
use crate::directory::{Assignee, Availability, Directory};
use crate::events::{EngineEvent, EventKind, EventNotifier, EventSubscription};
use crate::notify::{self, OutboundNotification};
use crate::reminders::{Reminder, ReminderChannel, ReminderPlan, ReminderStatus, ReminderType};
use crate::rules::{AutoAssignmentRule, NotificationRule, RuleStore};
use crate::selector;

pub type SharedEngine = Arc<Mutex<AssignmentEngine>>;

/// Input to [`AssignmentEngine::assign_task`]: either a direct assignee or auto-assignment.
#[derive(Debug, Clone, Default)]
pub struct AssignRequest {
    pub task_id: String,
    pub assigned_by: String,
    pub assigned_to: Option<String>,
    pub auto_assign: bool,
    /// Record that auto-assignment rules are evaluated against.
    pub task_data: serde_json::Value,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AssignRequest {
    pub fn direct(task_id: &str, assigned_by: &str, assignee_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            assigned_by: assigned_by.to_string(),
            assigned_to: Some(assignee_id.to_string()),
            ..Self::default()
        }
    }

    pub fn auto(task_id: &str, assigned_by: &str, task_data: serde_json::Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            assigned_by: assigned_by.to_string(),
            auto_assign: true,
            task_data,
            ..Self::default()
        }
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Listing filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub status: Option<AssignmentStatus>,
    pub priority: Option<Priority>,
    /// Case-insensitive match on task id or assignee name.
    pub search: Option<String>,
}

/// Dashboard counters.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentSummary {
    pub total: usize,
    pub by_status: HashMap<AssignmentStatus, usize>,
    /// Due before today and not completed.
    pub overdue: usize,
    pub due_today: usize,
    /// Due after today, within the week.
    pub due_soon: usize,
}

/// A reminder claimed for delivery; the outcome goes back via `record_delivery`.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub reminder_id: String,
    pub assignment_id: String,
    pub task_id: String,
    pub reminder_type: ReminderType,
    pub recipient: String,
    pub channel: ReminderChannel,
    pub message: String,
}

/// Lifecycle manager over directory, rules and reminders.
pub struct AssignmentEngine {
    directory: Directory,
    rules: RuleStore,
    assignments: HashMap<String, Assignment>,
    /// Assignment ids in creation order.
    order: Vec<String>,
    /// reminder id → assignment id
    reminder_index: HashMap<String, String>,
    /// Reminders handed to the delivery collaborator and not yet reported back.
    in_flight: HashSet<String>,
    notifier: EventNotifier,
    plan: ReminderPlan,
    default_max_workload: u32,
}

impl AssignmentEngine {
    /// Engine with default settings.
    pub fn new() -> Self {
        Self::with_config(&TaskWardenConfig::default())
    }

    pub fn with_config(config: &TaskWardenConfig) -> Self {
        Self {
            directory: Directory::new(),
            rules: RuleStore::new(),
            assignments: HashMap::new(),
            order: Vec::new(),
            reminder_index: HashMap::new(),
            in_flight: HashSet::new(),
            notifier: EventNotifier::with_default_handlers(config.events.channel_capacity),
            plan: ReminderPlan::from_config(&config.reminders),
            default_max_workload: config.engine.default_max_workload,
        }
    }

    /// Wrap for sharing with the dispatch loop and notification router.
    pub fn shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    // ─── Directory & rules ─────────────────────────────────────

    pub fn register_user(&mut self, assignee: Assignee) -> Result<()> {
        self.directory.register(assignee)
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn assignee(&self, id: &str) -> Result<&Assignee> {
        self.directory.get(id)
    }

    pub fn set_availability(&mut self, id: &str, availability: Availability) -> Result<()> {
        self.directory.set_availability(id, availability)
    }

    /// Record activity; feeds round-robin selection.
    pub fn touch(&mut self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.directory.touch(id, at)
    }

    pub fn add_auto_assignment_rule(&mut self, rule: AutoAssignmentRule) -> String {
        self.rules.add_auto_rule(rule)
    }

    pub fn add_notification_rule(&mut self, rule: NotificationRule) -> String {
        self.rules.add_notification_rule(rule)
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// Enable/disable/remove rules.
    pub fn rules_mut(&mut self) -> &mut RuleStore {
        &mut self.rules
    }

    // ─── Events ────────────────────────────────────────────────

    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }

    /// Register or remove synchronous handlers.
    pub fn notifier_mut(&mut self) -> &mut EventNotifier {
        &mut self.notifier
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.notifier.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        self.notifier.publish(event);
    }

    // ─── Lifecycle ─────────────────────────────────────────────

    /// Create an assignment for a directly named or rule-selected assignee.
    pub fn assign_task(&mut self, request: AssignRequest) -> Result<Assignment> {
        if request.task_id.trim().is_empty() {
            return Err(TaskWardenError::InvalidRequest("task id is required".into()));
        }

        let (assignee_id, rule_id) = match (&request.assigned_to, request.auto_assign) {
            (Some(id), false) => (self.directory.get(id)?.id.clone(), None),
            (None, true) => {
                let candidates = self.rules.matching_auto_rules(&request.task_data);
                let selection = selector::find_best_assignee(
                    &candidates,
                    &self.directory,
                    &request.task_data,
                    self.default_max_workload,
                )
                .ok_or_else(|| TaskWardenError::NoSuitableAssignee(request.task_id.clone()))?;
                (selection.assignee_id, Some(selection.rule_id))
            }
            (Some(_), true) => {
                return Err(TaskWardenError::InvalidRequest(
                    "give either an assignee or auto_assign, not both".into(),
                ));
            }
            (None, false) => {
                return Err(TaskWardenError::InvalidRequest(
                    "an assignee or auto_assign is required".into(),
                ));
            }
        };

        let now = Utc::now();
        let mut assignment = Assignment::new(
            &request.task_id,
            &assignee_id,
            &request.assigned_by,
            request.due_date,
            request.priority.unwrap_or_default(),
        );
        assignment.metadata = request.metadata;
        if let Some(rule_id) = &rule_id {
            self.rules.mark_auto_rule_used(rule_id, now);
            assignment
                .metadata
                .insert("auto_assignment_rule".into(), serde_json::json!(rule_id));
        }

        self.directory.increment_workload(&assignee_id)?;
        let reminders = self.plan.plan(&assignment, now);
        self.attach_reminders(&mut assignment, reminders);

        tracing::info!(
            "📅 Assignment {} created: task {} → {}",
            assignment.id,
            assignment.task_id,
            assignee_id
        );
        let event = EngineEvent::new(EventKind::TaskAssigned, &assignment.id, &assignment.task_id)
            .with_assignee(&assignee_id)
            .with_data(serde_json::json!({
                "assigned_by": assignment.assigned_by,
                "priority": assignment.priority,
                "rule_id": rule_id,
            }));
        self.insert(assignment.clone());
        self.notifier.publish(event);
        Ok(assignment)
    }

    /// Propose handing an assignment to another assignee. Workload moves on acceptance.
    pub fn delegate_task(
        &mut self,
        assignment_id: &str,
        from_user_id: &str,
        to_user_id: &str,
        reason: &str,
        new_due_date: Option<DateTime<Utc>>,
    ) -> Result<Delegation> {
        let assignment = self.get(assignment_id)?;
        ensure_open(assignment, "delegate")?;
        self.directory.get(to_user_id)?;

        let delegation = Delegation::new(
            from_user_id,
            to_user_id,
            reason,
            assignment.due_date,
            new_due_date,
        );
        let assignment = self.get_mut(assignment_id)?;
        assignment.delegations.push(delegation.clone());
        assignment.status = AssignmentStatus::Delegated;
        let task_id = assignment.task_id.clone();
        let owner = assignment.assigned_to.clone();

        tracing::info!(
            "🔀 Assignment {} delegation proposed: {} → {} ({})",
            assignment_id,
            from_user_id,
            to_user_id,
            reason
        );
        self.notifier.publish(
            EngineEvent::new(EventKind::TaskDelegated, assignment_id, &task_id)
                .with_assignee(&owner)
                .with_data(serde_json::json!({
                    "delegation_id": delegation.id,
                    "from_user_id": from_user_id,
                    "to_user_id": to_user_id,
                    "reason": reason,
                })),
        );
        Ok(delegation)
    }

    /// Accept a pending delegation: ownership and one unit of workload move to `user_id`.
    pub fn accept_delegation(
        &mut self,
        assignment_id: &str,
        delegation_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let assignment = self.get(assignment_id)?;
        let delegation = assignment.delegation(delegation_id).ok_or_else(|| {
            TaskWardenError::DelegationNotFound {
                assignment_id: assignment_id.to_string(),
                delegation_id: delegation_id.to_string(),
            }
        })?;
        if delegation.status != DelegationStatus::Pending {
            return Err(TaskWardenError::InvalidTransition {
                entity: "delegation",
                id: delegation_id.to_string(),
                reason: format!("delegation is {:?}, not pending", delegation.status),
            });
        }
        ensure_open(assignment, "accept a delegation on")?;
        self.directory.get(user_id)?;

        let previous_owner = assignment.assigned_to.clone();
        let new_due_date = delegation.new_due_date;
        let now = Utc::now();

        self.directory.decrement_workload(&previous_owner)?;
        self.directory.increment_workload(user_id)?;

        let assignment = self.get_mut(assignment_id)?;
        if let Some(delegation) = assignment.delegation_mut(delegation_id) {
            delegation.status = DelegationStatus::Accepted;
            delegation.accepted_at = Some(now);
        }
        assignment.assigned_to = user_id.to_string();
        assignment.status = AssignmentStatus::Accepted;
        let task_id = assignment.task_id.clone();

        if let Some(due) = new_due_date {
            self.reschedule(assignment_id, due, now)?;
        }

        tracing::info!(
            "🤝 Assignment {} accepted by {} (was {})",
            assignment_id,
            user_id,
            previous_owner
        );
        self.notifier.publish(
            EngineEvent::new(EventKind::TaskAccepted, assignment_id, &task_id)
                .with_assignee(user_id)
                .with_data(serde_json::json!({
                    "delegation_id": delegation_id,
                    "previous_assignee": previous_owner,
                })),
        );
        Ok(())
    }

    /// Owner starts work: Assigned | Accepted → InProgress.
    pub fn start_task(&mut self, assignment_id: &str, user_id: &str) -> Result<()> {
        let assignment = self.get(assignment_id)?;
        if !matches!(
            assignment.status,
            AssignmentStatus::Assigned | AssignmentStatus::Accepted
        ) {
            return Err(TaskWardenError::InvalidTransition {
                entity: "assignment",
                id: assignment_id.to_string(),
                reason: format!("cannot start from {:?}", assignment.status),
            });
        }
        if assignment.assigned_to != user_id {
            return Err(TaskWardenError::InvalidRequest(format!(
                "{user_id} does not own assignment {assignment_id}"
            )));
        }

        let assignment = self.get_mut(assignment_id)?;
        assignment.status = AssignmentStatus::InProgress;
        let task_id = assignment.task_id.clone();
        self.directory.touch(user_id, Utc::now())?;

        self.notifier.publish(
            EngineEvent::new(EventKind::TaskStarted, assignment_id, &task_id).with_assignee(user_id),
        );
        Ok(())
    }

    /// Close an assignment: frees the owner's workload slot and cancels pending reminders.
    pub fn complete_task(&mut self, assignment_id: &str, completed_by: &str) -> Result<()> {
        let assignment = self.get(assignment_id)?;
        ensure_open(assignment, "complete")?;
        let owner = assignment.assigned_to.clone();
        let now = Utc::now();

        self.directory.decrement_workload(&owner)?;
        let assignment = self.get_mut(assignment_id)?;
        assignment.status = AssignmentStatus::Completed;
        assignment.completed_at = Some(now);
        let cancelled = assignment.cancel_scheduled_reminders();
        let task_id = assignment.task_id.clone();
        if self.directory.contains(completed_by) {
            self.directory.touch(completed_by, now)?;
        }

        tracing::debug!("Assignment {assignment_id}: {cancelled} reminders cancelled");
        self.notifier.publish(
            EngineEvent::new(EventKind::TaskCompleted, assignment_id, &task_id)
                .with_assignee(&owner)
                .with_data(serde_json::json!({ "completed_by": completed_by })),
        );
        Ok(())
    }

    /// Withdraw an open assignment. Terminal, like completion.
    pub fn cancel_task(&mut self, assignment_id: &str, reason: &str) -> Result<()> {
        let assignment = self.get(assignment_id)?;
        ensure_open(assignment, "cancel")?;
        let owner = assignment.assigned_to.clone();

        self.directory.decrement_workload(&owner)?;
        let assignment = self.get_mut(assignment_id)?;
        assignment.status = AssignmentStatus::Cancelled;
        assignment.cancel_scheduled_reminders();
        let task_id = assignment.task_id.clone();

        tracing::info!("🚫 Assignment {assignment_id} cancelled: {reason}");
        self.notifier.publish(
            EngineEvent::new(EventKind::TaskCancelled, assignment_id, &task_id)
                .with_assignee(&owner)
                .with_data(serde_json::json!({ "reason": reason })),
        );
        Ok(())
    }

    /// Add a reminder by hand, e.g. to replace one that failed.
    pub fn schedule_reminder(
        &mut self,
        assignment_id: &str,
        reminder_type: ReminderType,
        at: DateTime<Utc>,
        channel: ReminderChannel,
        message: &str,
    ) -> Result<Reminder> {
        let assignment = self.get(assignment_id)?;
        ensure_open(assignment, "schedule a reminder on")?;
        let reminder = Reminder::new(assignment, reminder_type, at, channel, message.to_string());

        self.reminder_index
            .insert(reminder.id.clone(), assignment_id.to_string());
        self.get_mut(assignment_id)?.reminders.push(reminder.clone());
        Ok(reminder)
    }

    // ─── Queries ───────────────────────────────────────────────

    pub fn get_assignment(&self, id: &str) -> Result<&Assignment> {
        self.get(id)
    }

    /// All assignments in creation order.
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.order.iter().filter_map(|id| self.assignments.get(id))
    }

    /// Past due and not completed (cancelled ones included).
    pub fn overdue_assignments(&self, now: DateTime<Utc>) -> Vec<&Assignment> {
        self.assignments().filter(|a| a.is_overdue(now)).collect()
    }

    pub fn assignments_for(&self, user_id: &str) -> Vec<&Assignment> {
        self.assignments()
            .filter(|a| a.assigned_to == user_id)
            .collect()
    }

    pub fn list_assignments(&self, filter: &AssignmentFilter) -> Vec<&Assignment> {
        let needle = filter.search.as_deref().map(str::to_lowercase);
        self.assignments()
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| filter.priority.is_none_or(|p| a.priority == p))
            .filter(|a| match &needle {
                None => true,
                Some(needle) => {
                    a.task_id.to_lowercase().contains(needle)
                        || self
                            .directory
                            .get(&a.assigned_to)
                            .is_ok_and(|who| who.name.to_lowercase().contains(needle))
                }
            })
            .collect()
    }

    pub fn summary(&self, now: DateTime<Utc>) -> AssignmentSummary {
        let today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);
        let tomorrow = today + Duration::days(1);
        let next_week = today + Duration::days(7);

        let mut by_status: HashMap<AssignmentStatus, usize> =
            AssignmentStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let (mut overdue, mut due_today, mut due_soon) = (0, 0, 0);

        for a in self.assignments() {
            *by_status.entry(a.status).or_default() += 1;
            let Some(due) = a.due_date else { continue };
            if due < today && a.status != AssignmentStatus::Completed {
                overdue += 1;
            }
            if due >= today && due < tomorrow {
                due_today += 1;
            } else if due >= tomorrow && due < next_week {
                due_soon += 1;
            }
        }

        AssignmentSummary {
            total: self.order.len(),
            by_status,
            overdue,
            due_today,
            due_soon,
        }
    }

    pub fn reminder(&self, reminder_id: &str) -> Option<&Reminder> {
        let assignment_id = self.reminder_index.get(reminder_id)?;
        self.assignments
            .get(assignment_id)?
            .reminders
            .iter()
            .find(|r| r.id == reminder_id)
    }

    // ─── Reminder dispatch ─────────────────────────────────────

    /// Claim every due, scheduled reminder not already in flight.
    ///
    /// A claimed reminder is skipped by later claims until its outcome is recorded,
    /// so each one is attempted at most once.
    pub fn claim_due_reminders(&mut self, now: DateTime<Utc>) -> Vec<DueReminder> {
        let mut due = Vec::new();
        for id in &self.order {
            let Some(assignment) = self.assignments.get(id) else { continue };
            let recipient = match self.directory.get(&assignment.assigned_to) {
                Ok(owner) => owner.email.clone(),
                Err(_) => continue,
            };
            for reminder in &assignment.reminders {
                if !reminder.is_due(now) || self.in_flight.contains(&reminder.id) {
                    continue;
                }
                due.push(DueReminder {
                    reminder_id: reminder.id.clone(),
                    assignment_id: assignment.id.clone(),
                    task_id: assignment.task_id.clone(),
                    reminder_type: reminder.reminder_type,
                    recipient: recipient.clone(),
                    channel: reminder.channel,
                    message: reminder.message.clone(),
                });
            }
        }
        for d in &due {
            self.in_flight.insert(d.reminder_id.clone());
        }
        due
    }

    /// Apply a delivery outcome. Returns the reminder's resulting status.
    ///
    /// A reminder cancelled while in flight stays cancelled whatever the outcome.
    pub fn record_delivery(
        &mut self,
        reminder_id: &str,
        outcome: std::result::Result<(), String>,
        now: DateTime<Utc>,
    ) -> Option<ReminderStatus> {
        self.in_flight.remove(reminder_id);
        let assignment_id = self.reminder_index.get(reminder_id)?.clone();
        let assignment = self.assignments.get_mut(&assignment_id)?;
        let owner = assignment.assigned_to.clone();
        let task_id = assignment.task_id.clone();
        let reminder = assignment
            .reminders
            .iter_mut()
            .find(|r| r.id == reminder_id)?;

        match outcome {
            Ok(()) => {
                if reminder.mark_sent(now) {
                    let reminder_type = reminder.reminder_type;
                    let channel = reminder.channel;
                    self.notifier.publish(
                        EngineEvent::new(EventKind::ReminderSent, &assignment_id, &task_id)
                            .with_assignee(&owner)
                            .with_reminder(reminder_id)
                            .with_data(serde_json::json!({
                                "type": reminder_type,
                                "channel": channel,
                            })),
                    );
                    if reminder_type == ReminderType::Overdue {
                        self.notifier.publish(
                            EngineEvent::new(EventKind::TaskOverdue, &assignment_id, &task_id)
                                .with_assignee(&owner)
                                .with_reminder(reminder_id),
                        );
                    }
                    return Some(ReminderStatus::Sent);
                }
            }
            Err(reason) => {
                if reminder.mark_failed(&reason) {
                    tracing::warn!("⚠️ Reminder {reminder_id} failed: {reason}");
                    return Some(ReminderStatus::Failed);
                }
            }
        }
        self.reminder(reminder_id).map(|r| r.status)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    // ─── Notification rules ────────────────────────────────────

    /// Evaluate notification rules for an event and render what should go out.
    pub fn fire_notification_rules(
        &mut self,
        event: &EngineEvent,
        now: DateTime<Utc>,
    ) -> Vec<OutboundNotification> {
        let assignment = self.assignments.get(&event.assignment_id);
        let owner = assignment.and_then(|a| self.directory.get(&a.assigned_to).ok());

        let mut record = event.to_record();
        if let Some(a) = assignment {
            record["assignment"] = serde_json::json!({
                "priority": a.priority,
                "status": a.status,
                "due_date": a.due_date,
                "assigned_by": a.assigned_by,
                "metadata": a.metadata,
            });
        }

        let rules = self.rules.matching_notification_rules(event.kind, &record);
        let mut outbound = Vec::new();
        for rule in &rules {
            tracing::info!("⚡ Notification rule '{}' fired on {}", rule.name, event.kind);
            outbound.extend(notify::render_actions(rule, event, owner));
        }
        for rule in &rules {
            self.rules.mark_notification_rule_triggered(&rule.id, now);
        }
        outbound
    }

    // ─── Internals ─────────────────────────────────────────────

    fn get(&self, id: &str) -> Result<&Assignment> {
        self.assignments
            .get(id)
            .ok_or_else(|| TaskWardenError::AssignmentNotFound(id.to_string()))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Assignment> {
        self.assignments
            .get_mut(id)
            .ok_or_else(|| TaskWardenError::AssignmentNotFound(id.to_string()))
    }

    fn insert(&mut self, assignment: Assignment) {
        self.order.push(assignment.id.clone());
        self.assignments.insert(assignment.id.clone(), assignment);
    }

    fn attach_reminders(&mut self, assignment: &mut Assignment, reminders: Vec<Reminder>) {
        for reminder in reminders {
            self.reminder_index
                .insert(reminder.id.clone(), assignment.id.clone());
            assignment.reminders.push(reminder);
        }
    }

    /// Move the due date and re-plan: pending reminders are cancelled, fresh ones appended.
    fn reschedule(&mut self, assignment_id: &str, due: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        let mut assignment = self
            .assignments
            .remove(assignment_id)
            .ok_or_else(|| TaskWardenError::AssignmentNotFound(assignment_id.to_string()))?;
        assignment.due_date = Some(due);
        assignment.cancel_scheduled_reminders();
        let reminders = self.plan.plan(&assignment, now);
        self.attach_reminders(&mut assignment, reminders);
        self.assignments.insert(assignment_id.to_string(), assignment);
        Ok(())
    }
}

impl Default for AssignmentEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_open(assignment: &Assignment, action: &str) -> Result<()> {
    if assignment.status.is_terminal() {
        return Err(TaskWardenError::InvalidTransition {
            entity: "assignment",
            id: assignment.id.clone(),
            reason: format!("cannot {action} a {:?} assignment", assignment.status),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{Condition, Predicate};
    use crate::directory::AssigneeType;
    use crate::rules::SelectionStrategy;
    use serde_json::json;

    fn person(id: &str, workload: u32) -> Assignee {
        Assignee::new(id, AssigneeType::Solicitor, id, &format!("{id}@example.com"))
            .with_workload(workload)
    }

    fn legal_rule() -> AutoAssignmentRule {
        AutoAssignmentRule::new(
            "legal by workload",
            SelectionStrategy::WorkloadBased { max_workload: Some(5) },
            1,
        )
        .with_conditions(vec![Condition::new(
            "category",
            Predicate::Equals(json!("legal")),
        )])
    }

    /// A=0, B=3, C=0, all available, plus the legal workload rule.
    fn engine() -> AssignmentEngine {
        let mut engine = AssignmentEngine::new();
        engine.register_user(person("A", 0)).unwrap();
        engine.register_user(person("B", 3)).unwrap();
        engine.register_user(person("C", 0)).unwrap();
        engine.add_auto_assignment_rule(legal_rule());
        engine
    }

    fn workload(engine: &AssignmentEngine, id: &str) -> u32 {
        engine.assignee(id).unwrap().workload
    }

    /// workload == open assignments owned, offset by each assignee's seeded baseline.
    fn assert_workload_invariant(engine: &AssignmentEngine, baseline: &[(&str, u32)]) {
        for assignee in engine.directory().list() {
            let open = engine
                .assignments_for(&assignee.id)
                .iter()
                .filter(|a| a.status.is_open())
                .count() as u32;
            let base = baseline
                .iter()
                .find(|(id, _)| *id == assignee.id)
                .map(|(_, w)| *w)
                .unwrap_or(0);
            assert_eq!(assignee.workload, base + open, "workload drift for {}", assignee.id);
        }
    }

    #[test]
    fn test_auto_assign_end_to_end() {
        let mut engine = engine();
        let a = engine
            .assign_task(AssignRequest::auto("T1", "mgr", json!({"category": "legal"})))
            .unwrap();

        assert_eq!(a.assigned_to, "A");
        assert_eq!(a.status, AssignmentStatus::Assigned);
        assert_eq!(a.priority, Priority::Medium);
        assert_eq!(workload(&engine, "A"), 1);
        assert_eq!(workload(&engine, "B"), 3);
        assert!(engine.rules().auto_rules()[0].last_used.is_some());
    }

    #[test]
    fn test_delegate_accept_complete_scenario() {
        let mut engine = engine();
        let due = Utc::now() + Duration::hours(48);
        let a = engine
            .assign_task(AssignRequest::auto("T1", "mgr", json!({"category": "legal"})).due(due))
            .unwrap();
        assert_eq!(a.reminders.len(), 2);

        let d = engine.delegate_task(&a.id, "A", "C", "leave", None).unwrap();
        let current = engine.get_assignment(&a.id).unwrap();
        assert_eq!(current.status, AssignmentStatus::Delegated);
        assert_eq!(current.delegations.len(), 1);
        assert_eq!(current.delegations[0].status, DelegationStatus::Pending);
        // Nothing moves until acceptance
        assert_eq!(workload(&engine, "A"), 1);
        assert_eq!(workload(&engine, "C"), 0);

        let total_before = engine.directory().total_workload();
        engine.accept_delegation(&a.id, &d.id, "C").unwrap();
        assert_eq!(engine.directory().total_workload(), total_before);
        assert_eq!(workload(&engine, "A"), 0);
        assert_eq!(workload(&engine, "C"), 1);
        let current = engine.get_assignment(&a.id).unwrap();
        assert_eq!(current.assigned_to, "C");
        assert_eq!(current.status, AssignmentStatus::Accepted);
        assert_eq!(current.delegations[0].status, DelegationStatus::Accepted);
        assert!(current.delegations[0].accepted_at.is_some());

        engine.complete_task(&a.id, "C").unwrap();
        let current = engine.get_assignment(&a.id).unwrap();
        assert_eq!(current.status, AssignmentStatus::Completed);
        assert!(current.completed_at.is_some());
        assert_eq!(workload(&engine, "C"), 0);
        assert!(current
            .reminders
            .iter()
            .all(|r| r.status == ReminderStatus::Cancelled));
    }

    #[test]
    fn test_no_available_assignee() {
        let mut engine = AssignmentEngine::new();
        engine.add_auto_assignment_rule(legal_rule());
        let err = engine
            .assign_task(AssignRequest::auto("T1", "mgr", json!({"category": "legal"})))
            .unwrap_err();
        assert!(matches!(err, TaskWardenError::NoSuitableAssignee(t) if t == "T1"));

        engine
            .register_user(person("A", 0).with_availability(Availability::Offline))
            .unwrap();
        let err = engine
            .assign_task(AssignRequest::auto("T1", "mgr", json!({"category": "legal"})))
            .unwrap_err();
        assert!(matches!(err, TaskWardenError::NoSuitableAssignee(_)));
        assert_eq!(engine.assignments().count(), 0);
    }

    #[test]
    fn test_directory_changes_steer_selection() {
        let mut engine = engine();
        engine.set_availability("A", Availability::Busy).unwrap();
        let a = engine
            .assign_task(AssignRequest::auto("T1", "mgr", json!({"category": "legal"})))
            .unwrap();
        assert_eq!(a.assigned_to, "C");

        engine.add_auto_assignment_rule(AutoAssignmentRule::new(
            "rotate",
            SelectionStrategy::RoundRobin,
            0,
        ));
        let now = Utc::now();
        engine.touch("B", now).unwrap();
        engine.touch("C", now - Duration::hours(2)).unwrap();
        let b = engine
            .assign_task(AssignRequest::auto("T2", "mgr", json!({"category": "legal"})))
            .unwrap();
        assert_eq!(b.assigned_to, "C");
        assert!(matches!(
            engine.touch("ghost", now),
            Err(TaskWardenError::AssigneeNotFound(_))
        ));
    }

    #[test]
    fn test_no_matching_rule_is_no_suitable_assignee() {
        let mut engine = engine();
        let err = engine
            .assign_task(AssignRequest::auto("T1", "mgr", json!({"category": "sales"})))
            .unwrap_err();
        assert!(matches!(err, TaskWardenError::NoSuitableAssignee(_)));
    }

    #[test]
    fn test_rule_precedence() {
        let mut engine = engine();
        // Priority 2 would pick B (fallback); priority 1 must win with A.
        engine.add_auto_assignment_rule(
            AutoAssignmentRule::new("fallback to B", SelectionStrategy::Fallback, 2)
                .with_fallback("B"),
        );
        let a = engine
            .assign_task(AssignRequest::auto("T1", "mgr", json!({"category": "legal"})))
            .unwrap();
        assert_eq!(a.assigned_to, "A");
        let fallback = engine
            .rules()
            .auto_rules()
            .iter()
            .find(|r| r.name == "fallback to B")
            .unwrap();
        assert!(fallback.last_used.is_none());
    }

    #[test]
    fn test_invalid_requests() {
        let mut engine = engine();
        let mut both = AssignRequest::direct("T1", "mgr", "A");
        both.auto_assign = true;
        assert!(matches!(
            engine.assign_task(both),
            Err(TaskWardenError::InvalidRequest(_))
        ));

        let neither = AssignRequest {
            task_id: "T1".into(),
            assigned_by: "mgr".into(),
            ..AssignRequest::default()
        };
        assert!(matches!(
            engine.assign_task(neither),
            Err(TaskWardenError::InvalidRequest(_))
        ));

        assert!(matches!(
            engine.assign_task(AssignRequest::direct(" ", "mgr", "A")),
            Err(TaskWardenError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_direct_assign_unknown_assignee_leaves_no_trace() {
        let mut engine = engine();
        let err = engine
            .assign_task(AssignRequest::direct("T1", "mgr", "ghost"))
            .unwrap_err();
        assert!(matches!(err, TaskWardenError::AssigneeNotFound(id) if id == "ghost"));
        assert_eq!(engine.assignments().count(), 0);
        assert_eq!(engine.directory().total_workload(), 3);
    }

    #[test]
    fn test_direct_assign_with_priority_and_metadata() {
        let mut engine = engine();
        let a = engine
            .assign_task(
                AssignRequest::direct("T9", "mgr", "B")
                    .priority(Priority::Critical)
                    .metadata("project", json!("Fitzwilliam Quarter")),
            )
            .unwrap();
        assert_eq!(a.assigned_to, "B");
        assert_eq!(a.priority, Priority::Critical);
        assert_eq!(a.metadata["project"], "Fitzwilliam Quarter");
        assert!(a.reminders.is_empty());
        assert_eq!(workload(&engine, "B"), 4);
    }

    #[test]
    fn test_delegation_errors() {
        let mut engine = engine();
        let a = engine.assign_task(AssignRequest::direct("T1", "mgr", "A")).unwrap();

        assert!(matches!(
            engine.delegate_task("nope", "A", "C", "x", None),
            Err(TaskWardenError::AssignmentNotFound(_))
        ));
        assert!(matches!(
            engine.delegate_task(&a.id, "A", "ghost", "x", None),
            Err(TaskWardenError::AssigneeNotFound(_))
        ));
        assert_eq!(engine.get_assignment(&a.id).unwrap().status, AssignmentStatus::Assigned);

        assert!(matches!(
            engine.accept_delegation(&a.id, "del-missing", "C"),
            Err(TaskWardenError::DelegationNotFound { .. })
        ));
        assert!(matches!(
            engine.accept_delegation("nope", "del-missing", "C"),
            Err(TaskWardenError::AssignmentNotFound(_))
        ));

        let d = engine.delegate_task(&a.id, "A", "C", "leave", None).unwrap();
        engine.accept_delegation(&a.id, &d.id, "C").unwrap();
        // Accepted delegations are terminal
        assert!(matches!(
            engine.accept_delegation(&a.id, &d.id, "C"),
            Err(TaskWardenError::InvalidTransition { .. })
        ));
        assert_eq!(workload(&engine, "C"), 1);
    }

    #[test]
    fn test_delegation_history_is_append_only() {
        let mut engine = engine();
        let a = engine.assign_task(AssignRequest::direct("T1", "mgr", "A")).unwrap();
        let d1 = engine.delegate_task(&a.id, "A", "B", "first", None).unwrap();
        let d2 = engine.delegate_task(&a.id, "A", "C", "second", None).unwrap();
        engine.accept_delegation(&a.id, &d2.id, "C").unwrap();

        let current = engine.get_assignment(&a.id).unwrap();
        let ids: Vec<_> = current.delegations.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![d1.id.as_str(), d2.id.as_str()]);
        assert_eq!(current.delegations[0].status, DelegationStatus::Pending);
        assert_eq!(current.delegations[1].status, DelegationStatus::Accepted);
    }

    #[test]
    fn test_new_due_date_replans_reminders() {
        let mut engine = engine();
        let due = Utc::now() + Duration::hours(48);
        let new_due = Utc::now() + Duration::hours(96);
        let a = engine
            .assign_task(AssignRequest::direct("T1", "mgr", "A").due(due))
            .unwrap();
        let d = engine
            .delegate_task(&a.id, "A", "C", "handover", Some(new_due))
            .unwrap();
        assert_eq!(d.original_due_date, Some(due));
        engine.accept_delegation(&a.id, &d.id, "C").unwrap();

        let current = engine.get_assignment(&a.id).unwrap();
        assert_eq!(current.due_date, Some(new_due));
        assert_eq!(current.reminders.len(), 4);
        let scheduled: Vec<_> = current.scheduled_reminders().collect();
        assert_eq!(scheduled.len(), 2);
        assert!(scheduled
            .iter()
            .any(|r| r.reminder_type == ReminderType::Overdue
                && r.scheduled_for == new_due + Duration::hours(2)));
    }

    #[test]
    fn test_completion_leaves_sent_reminders_alone() {
        let mut engine = engine();
        let now = Utc::now();
        let a = engine
            .assign_task(AssignRequest::direct("T1", "mgr", "A").due(now + Duration::hours(48)))
            .unwrap();
        // Fire the due_soon reminder as if a day had passed.
        let later = now + Duration::hours(25);
        let due = engine.claim_due_reminders(later);
        assert_eq!(due.len(), 1);
        engine.record_delivery(&due[0].reminder_id, Ok(()), later);

        engine.complete_task(&a.id, "A").unwrap();
        let current = engine.get_assignment(&a.id).unwrap();
        let statuses: Vec<_> = current.reminders.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ReminderStatus::Sent, ReminderStatus::Cancelled]);
    }

    #[test]
    fn test_terminal_assignments_reject_changes() {
        let mut engine = engine();
        let a = engine.assign_task(AssignRequest::direct("T1", "mgr", "A")).unwrap();
        engine.complete_task(&a.id, "A").unwrap();

        assert!(matches!(
            engine.complete_task(&a.id, "A"),
            Err(TaskWardenError::InvalidTransition { .. })
        ));
        assert!(matches!(
            engine.delegate_task(&a.id, "A", "C", "x", None),
            Err(TaskWardenError::InvalidTransition { .. })
        ));
        assert!(matches!(
            engine.cancel_task(&a.id, "x"),
            Err(TaskWardenError::InvalidTransition { .. })
        ));
        assert_eq!(workload(&engine, "A"), 0);
    }

    #[test]
    fn test_start_task() {
        let mut engine = engine();
        let a = engine.assign_task(AssignRequest::direct("T1", "mgr", "A")).unwrap();
        assert!(matches!(
            engine.start_task(&a.id, "B"),
            Err(TaskWardenError::InvalidRequest(_))
        ));
        engine.start_task(&a.id, "A").unwrap();
        assert_eq!(
            engine.get_assignment(&a.id).unwrap().status,
            AssignmentStatus::InProgress
        );
        assert!(engine.assignee("A").unwrap().last_active.is_some());
        assert!(matches!(
            engine.start_task(&a.id, "A"),
            Err(TaskWardenError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_task() {
        let mut engine = engine();
        let a = engine
            .assign_task(AssignRequest::direct("T1", "mgr", "A").due(Utc::now() + Duration::hours(1)))
            .unwrap();
        engine.cancel_task(&a.id, "client withdrew").unwrap();
        let current = engine.get_assignment(&a.id).unwrap();
        assert_eq!(current.status, AssignmentStatus::Cancelled);
        assert_eq!(workload(&engine, "A"), 0);
        assert!(current
            .reminders
            .iter()
            .all(|r| r.status == ReminderStatus::Cancelled));
    }

    #[test]
    fn test_workload_invariant_over_mixed_operations() {
        let mut engine = engine();
        let baseline = [("B", 3)];
        let mut ids = Vec::new();
        for i in 0..6 {
            let a = engine
                .assign_task(AssignRequest::auto(
                    &format!("T{i}"),
                    "mgr",
                    json!({"category": "legal"}),
                ))
                .unwrap();
            ids.push(a.id);
            assert_workload_invariant(&engine, &baseline);
        }

        let d = engine.delegate_task(&ids[0], "A", "B", "swap", None).unwrap();
        assert_workload_invariant(&engine, &baseline);
        engine.accept_delegation(&ids[0], &d.id, "B").unwrap();
        assert_workload_invariant(&engine, &baseline);

        engine.complete_task(&ids[1], "x").unwrap();
        engine.cancel_task(&ids[2], "dup").unwrap();
        let owner = engine.get_assignment(&ids[3]).unwrap().assigned_to.clone();
        engine.start_task(&ids[3], &owner).unwrap();
        engine.complete_task(&ids[3], "x").unwrap();
        assert_workload_invariant(&engine, &baseline);

        // Failed operations leave counters untouched
        let _ = engine.complete_task(&ids[1], "x");
        let _ = engine.accept_delegation(&ids[0], &d.id, "C");
        assert_workload_invariant(&engine, &baseline);
    }

    #[test]
    fn test_overdue_listing_keeps_cancelled() {
        let mut engine = engine();
        let past = Utc::now() - Duration::hours(3);
        let open = engine.assign_task(AssignRequest::direct("T1", "mgr", "A").due(past)).unwrap();
        let done = engine.assign_task(AssignRequest::direct("T2", "mgr", "A").due(past)).unwrap();
        let dropped = engine.assign_task(AssignRequest::direct("T3", "mgr", "A").due(past)).unwrap();
        engine.assign_task(AssignRequest::direct("T4", "mgr", "A")).unwrap();
        engine.complete_task(&done.id, "A").unwrap();
        engine.cancel_task(&dropped.id, "dup").unwrap();

        let overdue: Vec<_> = engine
            .overdue_assignments(Utc::now())
            .into_iter()
            .map(|a| a.id.clone())
            .collect();
        assert_eq!(overdue, vec![open.id, dropped.id]);
    }

    #[test]
    fn test_listing_and_summary() {
        let mut engine = engine();
        let now = Utc::now();
        let today = now.date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();
        engine
            .assign_task(AssignRequest::direct("LEGAL-1", "mgr", "A").due(today - Duration::days(2)))
            .unwrap();
        engine
            .assign_task(
                AssignRequest::direct("LEGAL-2", "mgr", "B")
                    .due(today)
                    .priority(Priority::High),
            )
            .unwrap();
        engine
            .assign_task(AssignRequest::direct("SURVEY-1", "mgr", "C").due(today + Duration::days(3)))
            .unwrap();

        let filter = AssignmentFilter {
            search: Some("legal".into()),
            ..AssignmentFilter::default()
        };
        assert_eq!(engine.list_assignments(&filter).len(), 2);

        let filter = AssignmentFilter {
            priority: Some(Priority::High),
            ..AssignmentFilter::default()
        };
        assert_eq!(engine.list_assignments(&filter)[0].task_id, "LEGAL-2");

        // Search also matches assignee names
        let filter = AssignmentFilter {
            search: Some("c".into()),
            status: Some(AssignmentStatus::Assigned),
            ..AssignmentFilter::default()
        };
        let hits: Vec<_> = engine
            .list_assignments(&filter)
            .into_iter()
            .map(|a| a.task_id.as_str())
            .collect();
        assert_eq!(hits, vec!["SURVEY-1"]);

        let summary = engine.summary(now);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_status[&AssignmentStatus::Assigned], 3);
        assert_eq!(summary.by_status[&AssignmentStatus::Completed], 0);
        assert_eq!(summary.overdue, 1);
        assert_eq!(summary.due_today, 1);
        assert_eq!(summary.due_soon, 1);
        assert_eq!(engine.assignments_for("B").len(), 1);
    }

    #[test]
    fn test_claim_is_at_most_once() {
        let mut engine = engine();
        let now = Utc::now();
        let a = engine
            .assign_task(AssignRequest::direct("T1", "mgr", "A").due(now - Duration::hours(3)))
            .unwrap();
        assert_eq!(a.reminders.len(), 1);

        let first = engine.claim_due_reminders(now);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].recipient, "A@example.com");
        // Still in flight: a second tick must not pick it up again.
        assert!(engine.claim_due_reminders(now).is_empty());
        assert_eq!(engine.in_flight_count(), 1);

        let status = engine.record_delivery(&first[0].reminder_id, Err("smtp down".into()), now);
        assert_eq!(status, Some(ReminderStatus::Failed));
        assert_eq!(engine.in_flight_count(), 0);
        // Failed reminders are never retried.
        assert!(engine.claim_due_reminders(now + Duration::hours(1)).is_empty());
        let failed = engine.reminder(&first[0].reminder_id).unwrap();
        assert_eq!(failed.metadata.as_ref().unwrap()["error"], "smtp down");
    }

    #[test]
    fn test_cancelled_while_in_flight_stays_cancelled() {
        let mut engine = engine();
        let now = Utc::now();
        let a = engine
            .assign_task(AssignRequest::direct("T1", "mgr", "A").due(now - Duration::hours(3)))
            .unwrap();
        let due = engine.claim_due_reminders(now);
        engine.complete_task(&a.id, "A").unwrap();
        let status = engine.record_delivery(&due[0].reminder_id, Ok(()), now);
        assert_eq!(status, Some(ReminderStatus::Cancelled));
    }

    #[test]
    fn test_overdue_reminder_publishes_events() {
        let mut engine = engine();
        let mut events = engine.subscribe();
        let now = Utc::now();
        engine
            .assign_task(AssignRequest::direct("T1", "mgr", "A").due(now - Duration::hours(3)))
            .unwrap();
        let due = engine.claim_due_reminders(now);
        engine.record_delivery(&due[0].reminder_id, Ok(()), now);

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::TaskAssigned, EventKind::ReminderSent, EventKind::TaskOverdue]
        );
    }

    #[test]
    fn test_manual_reminder() {
        let mut engine = engine();
        let a = engine.assign_task(AssignRequest::direct("T1", "mgr", "A")).unwrap();
        let at = Utc::now() + Duration::hours(4);
        let r = engine
            .schedule_reminder(&a.id, ReminderType::FollowUp, at, ReminderChannel::Sms, "Call the client")
            .unwrap();
        assert_eq!(engine.reminder(&r.id).unwrap().channel, ReminderChannel::Sms);
        assert_eq!(engine.get_assignment(&a.id).unwrap().reminders.len(), 1);
        assert!(matches!(
            engine.schedule_reminder("nope", ReminderType::FollowUp, at, ReminderChannel::Sms, "x"),
            Err(TaskWardenError::AssignmentNotFound(_))
        ));
    }

    #[test]
    fn test_lifecycle_events_in_order() {
        let mut engine = engine();
        let mut events = engine.subscribe();
        let a = engine.assign_task(AssignRequest::direct("T1", "mgr", "A")).unwrap();
        let d = engine.delegate_task(&a.id, "A", "C", "leave", None).unwrap();
        engine.accept_delegation(&a.id, &d.id, "C").unwrap();
        engine.complete_task(&a.id, "C").unwrap();

        let seen: Vec<_> = std::iter::from_fn(|| events.try_recv())
            .map(|e| (e.kind, e.assignee_id.unwrap_or_default()))
            .collect();
        assert_eq!(
            seen,
            vec![
                (EventKind::TaskAssigned, "A".to_string()),
                (EventKind::TaskDelegated, "A".to_string()),
                (EventKind::TaskAccepted, "C".to_string()),
                (EventKind::TaskCompleted, "C".to_string()),
            ]
        );
    }

    #[test]
    fn test_reregister_keeps_workload() {
        let mut engine = engine();
        let t1 = engine.assign_task(AssignRequest::direct("T1", "mgr", "A")).unwrap();
        engine.assign_task(AssignRequest::direct("T2", "mgr", "A")).unwrap();

        engine
            .register_user(Assignee::new("A", AssigneeType::Solicitor, "A", "a.new@example.com"))
            .unwrap();
        assert_eq!(workload(&engine, "A"), 2);
        assert_eq!(engine.assignee("A").unwrap().email, "a.new@example.com");

        engine.complete_task(&t1.id, "A").unwrap();
        assert_eq!(workload(&engine, "A"), 1);
        assert_workload_invariant(&engine, &[("B", 3)]);
    }

    #[test]
    fn test_far_future_due_date() {
        let mut engine = engine();
        let a = engine
            .assign_task(AssignRequest::direct("T1", "mgr", "A").due(DateTime::<Utc>::MAX_UTC))
            .unwrap();
        let stored = engine.get_assignment(&a.id).unwrap();
        assert_eq!(stored.due_date, Some(DateTime::<Utc>::MAX_UTC));
        assert_eq!(stored.reminders.len(), 1);
        assert_eq!(stored.reminders[0].reminder_type, ReminderType::DueSoon);
        assert!(engine.overdue_assignments(Utc::now()).is_empty());
        assert_workload_invariant(&engine, &[("B", 3)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_workload_holds_under_concurrent_calls() {
        let shared = engine().shared();
        let owner = |i: usize| if i % 2 == 0 { "A" } else { "C" };

        let assigns = (0..40).map(|i| {
            let engine = shared.clone();
            tokio::spawn(async move {
                engine
                    .lock()
                    .await
                    .assign_task(AssignRequest::direct(&format!("T{i}"), "mgr", owner(i)))
                    .map(|a| (i, a.id))
            })
        });
        let ids: Vec<(usize, String)> = futures::future::join_all(assigns)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let work = ids.into_iter().map(|(i, id)| {
            let engine = shared.clone();
            tokio::spawn(async move {
                match i % 3 {
                    0 => engine.lock().await.complete_task(&id, owner(i)),
                    1 => {
                        let d = engine
                            .lock()
                            .await
                            .delegate_task(&id, owner(i), "B", "rebalance", None)
                            .unwrap();
                        tokio::task::yield_now().await;
                        engine.lock().await.accept_delegation(&id, &d.id, "B")
                    }
                    _ => Ok(()),
                }
            })
        });
        for joined in futures::future::join_all(work).await {
            joined.unwrap().unwrap();
        }

        let eng = shared.lock().await;
        assert_workload_invariant(&eng, &[("B", 3)]);
        // 14 completed, 13 moved to B, 13 left with their first owner.
        assert_eq!(workload(&eng, "B"), 3 + 13);
        assert_eq!(workload(&eng, "A") + workload(&eng, "C"), 13);
    }
}
