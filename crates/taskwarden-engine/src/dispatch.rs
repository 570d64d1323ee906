//! Reminder dispatch: hands due reminders to a delivery collaborator.
//!
//! Claiming happens under the engine lock, delivery outside it, and each outcome is
//! recorded back under the lock as soon as that delivery finishes. One failing
//! reminder never holds up or fails the rest of its batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use taskwarden_core::config::DeliveryConfig;
use taskwarden_core::error::{Result, TaskWardenError};

use crate::engine::{DueReminder, SharedEngine};
use crate::reminders::{ReminderChannel, ReminderStatus};

/// One outbound message, from a reminder or a notification rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub recipient: String,
    pub channel: ReminderChannel,
    pub body: String,
    pub assignment_id: String,
    pub task_id: String,
    /// `reminder:<type>` or `rule:<name>`.
    pub source: String,
}

impl From<&DueReminder> for Message {
    fn from(due: &DueReminder) -> Self {
        let kind = serde_json::to_value(due.reminder_type)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        Self {
            recipient: due.recipient.clone(),
            channel: due.channel,
            body: due.message.clone(),
            assignment_id: due.assignment_id.clone(),
            task_id: due.task_id.clone(),
            source: format!("reminder:{kind}"),
        }
    }
}

/// Sends messages over email/SMS/chat. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, message: &Message) -> Result<()>;
}

/// Writes messages to the log. Default when nothing else is configured.
#[derive(Debug, Default)]
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, message: &Message) -> Result<()> {
        tracing::info!(
            "📨 [{}] → {}: {} ({})",
            message.channel,
            message.recipient,
            message.body,
            message.source
        );
        Ok(())
    }
}

/// POSTs each message as JSON to a relay that does the actual sending.
pub struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl WebhookDelivery {
    pub fn new(url: &str, headers: Vec<(String, String)>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            headers,
            timeout,
        }
    }
}

#[async_trait]
impl Delivery for WebhookDelivery {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, message: &Message) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "recipient": message.recipient,
                "channel": message.channel,
                "body": message.body,
                "assignment_id": message.assignment_id,
                "task_id": message.task_id,
                "source": message.source,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .timeout(self.timeout);

        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TaskWardenError::DeliveryFailure(format!("webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("✅ Webhook delivered to {}: {}", message.recipient, message.source);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(TaskWardenError::DeliveryFailure(format!(
                "webhook error {status}: {body}"
            )))
        }
    }
}

/// Build the configured delivery backend.
pub fn delivery_from_config(config: &DeliveryConfig) -> Result<Arc<dyn Delivery>> {
    match config.kind.as_str() {
        "log" => Ok(Arc::new(LogDelivery)),
        "webhook" => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                TaskWardenError::Config("delivery.kind = \"webhook\" needs delivery.webhook_url".into())
            })?;
            Ok(Arc::new(WebhookDelivery::new(
                url,
                config.headers.clone(),
                Duration::from_secs(config.timeout_secs),
            )))
        }
        other => Err(TaskWardenError::Config(format!(
            "unknown delivery kind '{other}' (expected log or webhook)"
        ))),
    }
}

/// Outcome counts for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Claim every reminder due at `now`, deliver them concurrently and record each outcome.
pub async fn dispatch_due(
    engine: &SharedEngine,
    delivery: &dyn Delivery,
    now: DateTime<Utc>,
) -> DispatchReport {
    let claimed = engine.lock().await.claim_due_reminders(now);
    if claimed.is_empty() {
        return DispatchReport::default();
    }
    tracing::debug!("⏰ {} reminders due, delivering via {}", claimed.len(), delivery.name());

    let outcomes = futures::future::join_all(claimed.iter().map(|due| async move {
        let outcome = delivery
            .deliver(&Message::from(due))
            .await
            .map_err(|e| e.to_string());
        engine
            .lock()
            .await
            .record_delivery(&due.reminder_id, outcome, Utc::now())
    }))
    .await;

    let mut report = DispatchReport {
        claimed: claimed.len(),
        ..DispatchReport::default()
    };
    for status in outcomes.into_iter().flatten() {
        match status {
            ReminderStatus::Sent => report.sent += 1,
            ReminderStatus::Failed => report.failed += 1,
            _ => {}
        }
    }
    if report.failed > 0 {
        tracing::warn!(
            "⚠️ Reminder pass: {} sent, {} failed of {}",
            report.sent,
            report.failed,
            report.claimed
        );
    }
    report
}

/// How long shutdown waits for in-progress reminder batches before aborting them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawn the periodic reminder loop. Each tick's batch runs in its own task so a slow
/// delivery never delays the next tick. Stops when `shutdown` flips to true or its sender
/// drops, then waits up to [`DRAIN_TIMEOUT`] for batches still delivering.
pub fn spawn_reminder_loop(
    engine: SharedEngine,
    delivery: Arc<dyn Delivery>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Reminder loop started (check every {}s)", every.as_secs());
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut batches = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let engine = engine.clone();
                    let delivery = delivery.clone();
                    batches.spawn(async move {
                        dispatch_due(&engine, delivery.as_ref(), Utc::now()).await;
                    });
                }
                Some(_) = batches.join_next(), if !batches.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if !batches.is_empty() {
            tracing::info!("⏰ Waiting for {} reminder batch(es) to finish", batches.len());
            let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
                while batches.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    "⚠️ Reminder batches still running after {}s, aborting",
                    DRAIN_TIMEOUT.as_secs()
                );
                batches.abort_all();
            }
        }
        tracing::info!("⏰ Reminder loop stopped");
    })
}
