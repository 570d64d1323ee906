//! Event notifier: lifecycle events fanned out to handlers and subscribers.
//!
//! Two delivery paths:
//! - in-process handlers, called synchronously on publish (keep them cheap: logging, counters)
//! - broadcast subscribers, each with its own bounded buffer; publish never waits on them,
//!   a subscriber that falls behind loses its oldest events.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskAssigned,
    TaskAccepted,
    TaskDelegated,
    TaskStarted,
    TaskCompleted,
    TaskCancelled,
    TaskOverdue,
    ReminderSent,
    EscalationTriggered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskAssigned => "task_assigned",
            EventKind::TaskAccepted => "task_accepted",
            EventKind::TaskDelegated => "task_delegated",
            EventKind::TaskStarted => "task_started",
            EventKind::TaskCompleted => "task_completed",
            EventKind::TaskCancelled => "task_cancelled",
            EventKind::TaskOverdue => "task_overdue",
            EventKind::ReminderSent => "reminder_sent",
            EventKind::EscalationTriggered => "escalation_triggered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub kind: EventKind,
    pub assignment_id: String,
    pub task_id: String,
    /// Current owner at publish time.
    pub assignee_id: Option<String>,
    pub reminder_id: Option<String>,
    /// Event-specific extras (delegation id, reason, rule id...).
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(kind: EventKind, assignment_id: &str, task_id: &str) -> Self {
        Self {
            kind,
            assignment_id: assignment_id.to_string(),
            task_id: task_id.to_string(),
            assignee_id: None,
            reminder_id: None,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_assignee(mut self, assignee_id: &str) -> Self {
        self.assignee_id = Some(assignee_id.to_string());
        self
    }

    pub fn with_reminder(mut self, reminder_id: &str) -> Self {
        self.reminder_id = Some(reminder_id.to_string());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Flat JSON view used when evaluating notification rule conditions.
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::json!({
            "event": self.kind.as_str(),
            "assignment_id": self.assignment_id,
            "task_id": self.task_id,
            "assignee_id": self.assignee_id,
            "reminder_id": self.reminder_id,
            "data": self.data,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

pub type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Handle returned by [`EventNotifier::on`], used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A subscriber's receiving end, optionally narrowed to some event kinds.
pub struct EventSubscription {
    rx: broadcast::Receiver<EngineEvent>,
    kinds: Option<Vec<EventKind>>,
}

impl EventSubscription {
    /// Next matching event. `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("⚠️ Event subscriber lagged, {missed} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll; `None` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!("⚠️ Event subscriber lagged, {missed} events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    fn wants(&self, event: &EngineEvent) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&event.kind))
    }
}

/// Publish/subscribe hub keyed by event kind.
pub struct EventNotifier {
    handlers: HashMap<EventKind, Vec<(HandlerId, EventHandler)>>,
    tx: broadcast::Sender<EngineEvent>,
    next_id: u64,
}

impl EventNotifier {
    /// Notifier with no handlers and the given per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            handlers: HashMap::new(),
            tx,
            next_id: 1,
        }
    }

    /// Notifier with the built-in observability handlers installed.
    pub fn with_default_handlers(capacity: usize) -> Self {
        let mut notifier = Self::new(capacity);
        notifier.on(
            EventKind::TaskAssigned,
            Arc::new(|e: &EngineEvent| {
                tracing::info!(
                    "📌 Task {} assigned to {} ({})",
                    e.task_id,
                    e.assignee_id.as_deref().unwrap_or("-"),
                    e.assignment_id
                );
            }),
        );
        notifier.on(
            EventKind::TaskCompleted,
            Arc::new(|e: &EngineEvent| {
                tracing::info!("✅ Task {} completed ({})", e.task_id, e.assignment_id);
            }),
        );
        notifier.on(
            EventKind::TaskOverdue,
            Arc::new(|e: &EngineEvent| {
                tracing::warn!(
                    "⏰ Task {} overdue, owner {}",
                    e.task_id,
                    e.assignee_id.as_deref().unwrap_or("-")
                );
            }),
        );
        notifier
    }

    /// Register a synchronous handler for one event kind.
    pub fn on(&mut self, kind: EventKind, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off(&mut self, id: HandlerId) -> bool {
        let mut removed = false;
        for list in self.handlers.values_mut() {
            let before = list.len();
            list.retain(|(hid, _)| *hid != id);
            removed |= list.len() < before;
        }
        removed
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            kinds: None,
        }
    }

    /// Subscribe to a subset of event kinds. Dropping the subscription unsubscribes.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            kinds: Some(kinds.to_vec()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run handlers, then broadcast. Never blocks.
    pub fn publish(&self, event: EngineEvent) {
        if let Some(list) = self.handlers.get(&event.kind) {
            for (_, handler) in list {
                handler(&event);
            }
        }
        let kind = event.kind;
        match self.tx.send(event) {
            Ok(receivers) => tracing::debug!("📣 {kind} → {receivers} subscribers"),
            Err(_) => tracing::debug!("📣 {kind} (no subscribers)"),
        }
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::with_default_handlers(256)
    }
}
