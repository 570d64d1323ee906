//! # TaskWarden Engine
//!
//! Task assignment, delegation lifecycle and reminder scheduling.
//! Everything lives in memory; callers own persistence.
//!
//! ## Architecture
//! ```text
//! AssignmentEngine (one mutex, SharedEngine)
//!   ├── Directory: assignees, availability, workload counters
//!   ├── RuleStore
//!   │     ├── AutoAssignmentRule → selector (workload / expertise / round-robin / availability / fallback)
//!   │     └── NotificationRule   → notify router
//!   ├── Assignments: assigned → accepted → in_progress → completed
//!   │                 └── delegated → (accept) → accepted, any open → cancelled
//!   ├── ReminderPlan: due_soon (due − 24h), overdue (due + 2h)
//!   └── EventNotifier: handlers + broadcast subscribers
//!
//! Reminder loop (tokio interval)
//!   └── claim due → Delivery (log / webhook) → record sent | failed
//! ```

pub mod assignment;
pub mod conditions;
pub mod directory;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod notify;
pub mod reminders;
pub mod roster;
pub mod rules;
pub mod selector;

pub use assignment::{Assignment, AssignmentStatus, Delegation, DelegationStatus, Priority};
pub use conditions::{Condition, Predicate};
pub use directory::{Assignee, AssigneeRole, AssigneeType, Availability, Directory};
pub use dispatch::{
    Delivery, DispatchReport, LogDelivery, Message, WebhookDelivery, delivery_from_config,
    dispatch_due, spawn_reminder_loop,
};
pub use engine::{
    AssignRequest, AssignmentEngine, AssignmentFilter, AssignmentSummary, DueReminder,
    SharedEngine,
};
pub use events::{EngineEvent, EventKind, EventNotifier, EventSubscription, HandlerId};
pub use notify::{OutboundNotification, route_event, spawn_notification_router};
pub use reminders::{Reminder, ReminderChannel, ReminderPlan, ReminderStatus, ReminderType};
pub use roster::Roster;
pub use rules::{
    ActionKind, AssignmentLogic, AutoAssignmentRule, NotificationAction, NotificationRule,
    RuleStore, SelectionStrategy,
};
