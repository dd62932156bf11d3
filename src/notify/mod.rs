//! Outbound notifications.
//!
//! Delivery failures never roll back state; callers log or count them.

mod templates;

pub use templates::{
    assignment_message, reassignment_message, reminder_message, status_change_message,
    update_message, Message,
};

use std::time::Duration;

use async_trait::async_trait;

use crate::choice::choice_enum;
use crate::error::{TrackerError, TrackerResult};

choice_enum! {
    /// Urgency tier of a reminder.
    pub enum ReminderKind ("reminder_type") {
        Overdue => "overdue",
        DueToday => "due_today",
        DueSoon => "due_soon",
        Upcoming => "upcoming",
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. Fails with [`TrackerError::Delivery`].
    async fn send(&self, address: &str, subject: &str, body: &str) -> TrackerResult<()>;
}

/// Send `message` under `timeout`; a timeout is an ordinary delivery failure.
pub async fn deliver(
    notifier: &dyn Notifier,
    timeout: Duration,
    address: &str,
    message: &Message,
) -> TrackerResult<()> {
    match tokio::time::timeout(timeout, notifier.send(address, &message.subject, &message.body)).await {
        Ok(result) => result,
        Err(_) => Err(TrackerError::Delivery(format!(
            "send to {} timed out after {:?}",
            address, timeout
        ))),
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> TrackerResult<()> {
        tracing::info!("Notification to {}: {}", address, subject);
        tracing::debug!("Notification body:\n{}", body);
        Ok(())
    }
}
