//! Notification router: turns lifecycle events into outbound messages via notification rules.
//!
//! ```text
//! EventNotifier ──broadcast──▶ router ──▶ fire_notification_rules (engine lock)
//!                                   └──▶ Delivery::deliver per action
//!                                   └──▶ escalate? publish escalation_triggered
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::directory::Assignee;
use crate::dispatch::{Delivery, Message};
use crate::engine::SharedEngine;
use crate::events::{EngineEvent, EventKind};
use crate::rules::{ActionKind, NotificationRule};

const DEFAULT_TEMPLATE: &str = "{{event}}: task {{task_id}} ({{assignee}})";

/// A rendered notification action, ready for delivery.
#[derive(Debug, Clone)]
pub struct OutboundNotification {
    pub rule_id: String,
    pub rule_name: String,
    /// Publish `escalation_triggered` once delivered.
    pub escalate: bool,
    pub message: Message,
}

/// Fill `{{task_id}}`, `{{assignment_id}}`, `{{assignee}}` and `{{event}}`.
/// Unknown placeholders are left as written.
pub fn render(template: &str, event: &EngineEvent, assignee: Option<&Assignee>) -> String {
    let who = assignee
        .map(|a| a.name.as_str())
        .or(event.assignee_id.as_deref())
        .unwrap_or("unassigned");
    template
        .replace("{{task_id}}", &event.task_id)
        .replace("{{assignment_id}}", &event.assignment_id)
        .replace("{{assignee}}", who)
        .replace("{{event}}", event.kind.as_str())
}

/// One message per action and recipient. Empty recipient lists go to the current owner.
pub(crate) fn render_actions(
    rule: &NotificationRule,
    event: &EngineEvent,
    owner: Option<&Assignee>,
) -> Vec<OutboundNotification> {
    let mut out = Vec::new();
    for action in &rule.actions {
        let recipients: Vec<String> = if action.recipients.is_empty() {
            owner.map(|o| vec![o.email.clone()]).unwrap_or_default()
        } else {
            action.recipients.clone()
        };
        if recipients.is_empty() {
            tracing::warn!(
                "Rule '{}' has no recipient for {} on {}",
                rule.name,
                event.kind,
                event.assignment_id
            );
        }
        let body = render(
            action.template.as_deref().unwrap_or(DEFAULT_TEMPLATE),
            event,
            owner,
        );
        for recipient in recipients {
            out.push(OutboundNotification {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                escalate: action.kind == ActionKind::Escalate,
                message: Message {
                    recipient,
                    channel: action.channel.unwrap_or_default(),
                    body: body.clone(),
                    assignment_id: event.assignment_id.clone(),
                    task_id: event.task_id.clone(),
                    source: format!("rule:{}", rule.name),
                },
            });
        }
    }
    out
}

/// Evaluate rules for one event, deliver what they produce and publish escalations.
/// Returns how many messages were delivered.
pub async fn route_event(
    engine: &SharedEngine,
    delivery: &dyn Delivery,
    event: &EngineEvent,
) -> usize {
    let outbound = engine
        .lock()
        .await
        .fire_notification_rules(event, Utc::now());

    let mut delivered = 0;
    let mut escalating: Vec<String> = Vec::new();
    for n in &outbound {
        match delivery.deliver(&n.message).await {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(
                "⚠️ Rule '{}' delivery to {} failed: {e}",
                n.rule_name,
                n.message.recipient
            ),
        }
        // Rules on escalation_triggered may notify but never escalate again.
        if n.escalate
            && event.kind != EventKind::EscalationTriggered
            && !escalating.contains(&n.rule_id)
        {
            escalating.push(n.rule_id.clone());
        }
    }

    if !escalating.is_empty() {
        let eng = engine.lock().await;
        for rule_id in escalating {
            tracing::warn!("🚨 Escalation on task {} by rule {}", event.task_id, rule_id);
            let mut escalation = EngineEvent::new(
                EventKind::EscalationTriggered,
                &event.assignment_id,
                &event.task_id,
            )
            .with_data(serde_json::json!({
                "rule_id": rule_id,
                "source_event": event.kind,
            }));
            escalation.assignee_id = event.assignee_id.clone();
            eng.publish(escalation);
        }
    }
    delivered
}

/// Subscribe to the engine's events and route each through the notification rules until shutdown.
///
/// The subscription is taken before this returns, so no event published afterwards is missed.
pub async fn spawn_notification_router(
    engine: SharedEngine,
    delivery: Arc<dyn Delivery>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut events = engine.lock().await.subscribe();
    tokio::spawn(async move {
        tracing::info!("🔔 Notification router started ({})", delivery.name());
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    route_event(&engine, delivery.as_ref(), &event).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("🔔 Notification router stopped");
    })
}
