//! Roster file: seeds the directory and both rule families from TOML.
//!
//! ```toml
//! [[assignees]]
//! id = "sol-1"
//! type = "solicitor"
//! name = "Aoife Byrne"
//! email = "aoife@example.com"
//! expertise = ["conveyancing"]
//!
//! [[auto_assignment_rules]]
//! name = "Legal by workload"
//! priority = 1
//! conditions = [{ field = "category", op = { equals = "legal" } }]
//! logic = { strategy = { kind = "workload_based", max_workload = 5 } }
//!
//! [[notification_rules]]
//! name = "Escalate overdue"
//! trigger = "task_overdue"
//! actions = [{ kind = "escalate", recipients = ["pm@example.com"] }]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use taskwarden_core::error::{Result, TaskWardenError};

use crate::directory::Assignee;
use crate::engine::AssignmentEngine;
use crate::rules::{AutoAssignmentRule, NotificationRule};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub assignees: Vec<Assignee>,
    #[serde(default)]
    pub auto_assignment_rules: Vec<AutoAssignmentRule>,
    #[serde(default)]
    pub notification_rules: Vec<NotificationRule>,
}

impl Roster {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            TaskWardenError::Config(format!("Invalid roster {}: {e}", path.display()))
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TaskWardenError::Config(format!("Invalid roster: {e}")))
    }

    /// Register everything with the engine. Stops at the first invalid assignee.
    pub fn apply(self, engine: &mut AssignmentEngine) -> Result<()> {
        let (people, autos, notifications) = (
            self.assignees.len(),
            self.auto_assignment_rules.len(),
            self.notification_rules.len(),
        );
        for assignee in self.assignees {
            engine.register_user(assignee)?;
        }
        for rule in self.auto_assignment_rules {
            engine.add_auto_assignment_rule(rule);
        }
        for rule in self.notification_rules {
            engine.add_notification_rule(rule);
        }
        tracing::info!(
            "📋 Roster loaded: {people} assignees, {autos} auto-assignment rules, {notifications} notification rules"
        );
        Ok(())
    }
}
