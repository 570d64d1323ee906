//! Assignee directory: who can own work, and how loaded they are.
//!
//! Workload counters are only moved by the lifecycle manager (`pub(crate)`),
//! so `workload` always equals the number of open assignments an actor owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskwarden_core::error::{Result, TaskWardenError};

/// Actor category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeType {
    Admin,
    Developer,
    Solicitor,
    EstateAgent,
    Agent,
    Buyer,
    Architect,
    Engineer,
}

/// Descriptive role. Not enforced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeRole {
    #[default]
    Primary,
    Secondary,
    Coordinator,
    Approver,
    Reviewer,
    Observer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Available,
    Busy,
    Away,
    Offline,
}

/// An actor capable of owning assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignee {
    pub id: String,
    #[serde(rename = "type")]
    pub assignee_type: AssigneeType,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub role: AssigneeRole,
    /// Free-text capability tags.
    #[serde(default)]
    pub expertise: Vec<String>,
    /// Open (non-terminal) assignments owned right now.
    #[serde(default)]
    pub workload: u32,
    #[serde(default)]
    pub availability: Availability,
    /// Round-robin tie-break; `None` sorts as the epoch.
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}

impl Assignee {
    pub fn new(id: &str, assignee_type: AssigneeType, name: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            assignee_type,
            name: name.to_string(),
            email: email.to_string(),
            organization_id: None,
            role: AssigneeRole::Primary,
            expertise: Vec::new(),
            workload: 0,
            availability: Availability::Available,
            last_active: None,
        }
    }

    pub fn with_expertise(mut self, tags: &[&str]) -> Self {
        self.expertise = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_workload(mut self, workload: u32) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    pub fn with_last_active(mut self, at: DateTime<Utc>) -> Self {
        self.last_active = Some(at);
        self
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }
}

/// In-memory registry of assignees, kept in registration order.
#[derive(Debug, Default)]
pub struct Directory {
    assignees: Vec<Assignee>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or replace in place if the id is already registered.
    /// A replacement keeps the engine-owned workload counter.
    pub fn register(&mut self, assignee: Assignee) -> Result<()> {
        if assignee.id.trim().is_empty() || assignee.name.trim().is_empty() {
            return Err(TaskWardenError::InvalidRequest(
                "assignee needs a non-empty id and name".into(),
            ));
        }
        match self.assignees.iter_mut().find(|a| a.id == assignee.id) {
            Some(existing) => {
                let workload = existing.workload;
                *existing = assignee;
                existing.workload = workload;
            }
            None => {
                tracing::info!("👤 Assignee registered: {} ({})", assignee.name, assignee.id);
                self.assignees.push(assignee);
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Assignee> {
        self.assignees
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| TaskWardenError::AssigneeNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assignees.iter().any(|a| a.id == id)
    }

    pub fn list(&self) -> &[Assignee] {
        &self.assignees
    }

    /// Assignees currently marked available, in registration order.
    pub fn available(&self) -> Vec<&Assignee> {
        self.assignees.iter().filter(|a| a.is_available()).collect()
    }

    pub fn set_availability(&mut self, id: &str, availability: Availability) -> Result<()> {
        let assignee = self.get_mut(id)?;
        assignee.availability = availability;
        Ok(())
    }

    /// Record activity (feeds round-robin selection).
    pub fn touch(&mut self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.get_mut(id)?.last_active = Some(at);
        Ok(())
    }

    pub fn total_workload(&self) -> u32 {
        self.assignees.iter().map(|a| a.workload).sum()
    }

    pub(crate) fn increment_workload(&mut self, id: &str) -> Result<()> {
        let assignee = self.get_mut(id)?;
        assignee.workload += 1;
        Ok(())
    }

    pub(crate) fn decrement_workload(&mut self, id: &str) -> Result<()> {
        let assignee = self.get_mut(id)?;
        assignee.workload = assignee.workload.saturating_sub(1);
        Ok(())
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Assignee> {
        self.assignees
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| TaskWardenError::AssigneeNotFound(id.to_string()))
    }
}
