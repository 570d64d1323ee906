//! TaskWarden configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TaskWardenError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskWardenConfig {
    /// Roster file with assignees and rules to seed the engine with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roster_path: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl TaskWardenConfig {
    /// Load config from the default path (~/.taskwarden/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TaskWardenError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TaskWardenError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TaskWardenError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the TaskWarden home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskwarden")
    }
}

/// Assignment selection tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Workload ceiling for `workload_based` rules that don't set their own.
    #[serde(default = "default_max_workload")]
    pub default_max_workload: u32,
}

fn default_max_workload() -> u32 { 5 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_workload: default_max_workload(),
        }
    }
}

/// Reminder scheduling and dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// How far ahead of the due date the `due_soon` reminder fires.
    #[serde(default = "default_due_soon_lead")]
    pub due_soon_lead_hours: i64,
    /// How long after the due date the `overdue` reminder fires.
    #[serde(default = "default_overdue_grace")]
    pub overdue_grace_hours: i64,
}

fn default_tick_interval() -> u64 { 60 }
fn default_due_soon_lead() -> i64 { 24 }
fn default_overdue_grace() -> i64 { 2 }

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            due_soon_lead_hours: default_due_soon_lead(),
            overdue_grace_hours: default_overdue_grace(),
        }
    }
}

/// Event fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Per-subscriber buffer; slow subscribers lose the oldest events past this.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize { 256 }

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Outbound delivery collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// "log" or "webhook".
    #[serde(default = "default_delivery_kind")]
    pub kind: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

fn default_delivery_kind() -> String { "log".into() }
fn default_delivery_timeout() -> u64 { 10 }

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            kind: default_delivery_kind(),
            webhook_url: None,
            timeout_secs: default_delivery_timeout(),
            headers: Vec::new(),
        }
    }
}
