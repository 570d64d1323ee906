//! Rule store: auto-assignment and notification rules, evaluated in priority order.
//!
//! Lower `priority` runs first; equal priorities keep insertion order.
//! Lookups hand out cloned snapshots so a rule edited mid-selection never leaks into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conditions::{self, Condition};
use crate::events::EventKind;
use crate::reminders::ReminderChannel;

/// How an auto-assignment rule picks from the available pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Least-loaded assignee under the workload ceiling.
    WorkloadBased {
        #[serde(default)]
        max_workload: Option<u32>,
    },
    /// Least-loaded assignee sharing at least one tag with `requiredExpertise`.
    ExpertiseMatch,
    /// Assignee idle the longest (`last_active`, missing = epoch).
    RoundRobin,
    /// Least-loaded available assignee.
    Availability,
    /// Use the rule's `fallback_assignee`. Unknown strategy names land here too.
    #[serde(other)]
    Fallback,
}

impl SelectionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SelectionStrategy::WorkloadBased { .. } => "workload_based",
            SelectionStrategy::ExpertiseMatch => "expertise_match",
            SelectionStrategy::RoundRobin => "round_robin",
            SelectionStrategy::Availability => "availability",
            SelectionStrategy::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentLogic {
    pub strategy: SelectionStrategy,
    #[serde(default)]
    pub fallback_assignee: Option<String>,
}

/// Condition-gated policy that selects an assignee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoAssignmentRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub logic: AssignmentLogic,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

fn default_priority() -> i32 { 5 }
fn bool_true() -> bool { true }

impl AutoAssignmentRule {
    pub fn new(name: &str, strategy: SelectionStrategy, priority: i32) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            description: String::new(),
            conditions: Vec::new(),
            logic: AssignmentLogic {
                strategy,
                fallback_assignee: None,
            },
            priority,
            enabled: true,
            created_at: Utc::now(),
            last_used: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_fallback(mut self, assignee_id: &str) -> Self {
        self.logic.fallback_assignee = Some(assignee_id.to_string());
        self
    }

    pub fn matches(&self, task_data: &serde_json::Value) -> bool {
        self.enabled && conditions::evaluate(task_data, &self.conditions)
    }
}

/// What a fired notification rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    Notify,
    /// Notify, then publish `escalation_triggered`.
    Escalate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    #[serde(default)]
    pub kind: ActionKind,
    #[serde(default)]
    pub channel: Option<ReminderChannel>,
    /// Addresses; empty means the current assignee.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Message template with `{{task_id}}`-style placeholders.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Condition-gated policy fired on a lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: EventKind,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
}

impl NotificationRule {
    pub fn new(name: &str, trigger: EventKind, actions: Vec<NotificationAction>) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            description: String::new(),
            trigger,
            conditions: Vec::new(),
            actions,
            priority: default_priority(),
            enabled: true,
            created_at: Utc::now(),
            last_triggered: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn matches(&self, kind: EventKind, record: &serde_json::Value) -> bool {
        self.enabled && self.trigger == kind && conditions::evaluate(record, &self.conditions)
    }
}

/// Both rule families, each kept in insertion order.
#[derive(Debug, Default)]
pub struct RuleStore {
    auto_rules: Vec<AutoAssignmentRule>,
    notification_rules: Vec<NotificationRule>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Auto-assignment rules ─────────────────────────────────

    /// Upsert by id; a blank id gets one generated. Returns the id.
    pub fn add_auto_rule(&mut self, mut rule: AutoAssignmentRule) -> String {
        if rule.id.is_empty() {
            rule.id = format!("rule-{}", uuid::Uuid::new_v4());
        }
        let id = rule.id.clone();
        tracing::info!("📐 Auto-assignment rule '{}' ({}) priority {}", rule.name, id, rule.priority);
        match self.auto_rules.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = rule,
            None => self.auto_rules.push(rule),
        }
        id
    }

    pub fn remove_auto_rule(&mut self, id: &str) -> bool {
        let len = self.auto_rules.len();
        self.auto_rules.retain(|r| r.id != id);
        self.auto_rules.len() < len
    }

    pub fn set_auto_rule_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.auto_rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn auto_rules(&self) -> &[AutoAssignmentRule] {
        &self.auto_rules
    }

    pub fn auto_rule(&self, id: &str) -> Option<&AutoAssignmentRule> {
        self.auto_rules.iter().find(|r| r.id == id)
    }

    /// Enabled rules whose conditions hold, sorted by priority (stable).
    pub fn matching_auto_rules(&self, task_data: &serde_json::Value) -> Vec<AutoAssignmentRule> {
        let mut matched: Vec<_> = self
            .auto_rules
            .iter()
            .filter(|r| r.matches(task_data))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.priority);
        matched
    }

    pub(crate) fn mark_auto_rule_used(&mut self, id: &str, at: DateTime<Utc>) {
        if let Some(rule) = self.auto_rules.iter_mut().find(|r| r.id == id) {
            rule.last_used = Some(at);
        }
    }

    // ─── Notification rules ────────────────────────────────────

    /// Upsert by id; a blank id gets one generated. Returns the id.
    pub fn add_notification_rule(&mut self, mut rule: NotificationRule) -> String {
        if rule.id.is_empty() {
            rule.id = format!("notify-{}", uuid::Uuid::new_v4());
        }
        let id = rule.id.clone();
        tracing::info!("🔔 Notification rule '{}' ({}) on {}", rule.name, id, rule.trigger);
        match self.notification_rules.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = rule,
            None => self.notification_rules.push(rule),
        }
        id
    }

    pub fn remove_notification_rule(&mut self, id: &str) -> bool {
        let len = self.notification_rules.len();
        self.notification_rules.retain(|r| r.id != id);
        self.notification_rules.len() < len
    }

    pub fn set_notification_rule_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.notification_rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn notification_rules(&self) -> &[NotificationRule] {
        &self.notification_rules
    }

    /// Enabled rules for this trigger whose conditions hold, sorted by priority (stable).
    pub fn matching_notification_rules(
        &self,
        kind: EventKind,
        record: &serde_json::Value,
    ) -> Vec<NotificationRule> {
        let mut matched: Vec<_> = self
            .notification_rules
            .iter()
            .filter(|r| r.matches(kind, record))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.priority);
        matched
    }

    pub(crate) fn mark_notification_rule_triggered(&mut self, id: &str, at: DateTime<Utc>) {
        if let Some(rule) = self.notification_rules.iter_mut().find(|r| r.id == id) {
            rule.last_triggered = Some(at);
        }
    }
}
