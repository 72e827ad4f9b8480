use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::{MAX_DELIVERY_ATTEMPTS, RETRY_BACKOFF_MINUTES};
use crate::error::Result;
use crate::models::{
    DeliveryOutcome, Language, NotificationLogEntry, ReminderStatus, ReminderType, Subject,
    UserReminder,
};
use crate::notifier::{ChannelChain, DeliveryReport};
use crate::store::{ReminderStore, SubjectRepository};

pub const NO_CONTACT: &str = "no contact";

/// Fixed-backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_DELIVERY_ATTEMPTS,
            backoff: Duration::minutes(RETRY_BACKOFF_MINUTES),
        }
    }
}

impl RetryPolicy {
    /// Outcome of one more failed attempt on a reminder that has already
    /// failed `retry_count` times.
    pub fn after_failure(&self, retry_count: i32, error: String, now: DateTime<Utc>) -> DeliveryOutcome {
        let retry_count = retry_count + 1;
        if retry_count < self.max_attempts {
            DeliveryOutcome::Retry {
                retry_count,
                next_attempt: now + self.backoff,
                error,
            }
        } else {
            DeliveryOutcome::Failed { retry_count, error }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct DeliveryDispatcher {
    store: Arc<dyn ReminderStore>,
    subjects: Arc<dyn SubjectRepository>,
    channels: Arc<ChannelChain>,
    policy: RetryPolicy,
}

impl DeliveryDispatcher {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        subjects: Arc<dyn SubjectRepository>,
        channels: Arc<ChannelChain>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            subjects,
            channels,
            policy,
        }
    }

    /// Delivers up to `batch_size` due reminders, in queue order.
    pub async fn process_pending(&self, batch_size: usize, now: DateTime<Utc>) -> Result<DispatchSummary> {
        let pending = self.store.list_pending(now, batch_size).await?;
        let mut summary = DispatchSummary::default();

        for reminder in &pending {
            match self.deliver(reminder, now).await {
                Ok(Some(DeliveryOutcome::Sent { .. })) => summary.sent += 1,
                Ok(Some(DeliveryOutcome::Retry { .. })) => summary.retried += 1,
                Ok(Some(DeliveryOutcome::Failed { .. })) => summary.failed += 1,
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(reminder_id = %reminder.id, error = %e, "Could not process reminder");
                    summary.skipped += 1;
                }
            }
        }

        if !pending.is_empty() {
            tracing::info!(
                sent = summary.sent,
                retried = summary.retried,
                failed = summary.failed,
                skipped = summary.skipped,
                "Dispatch batch finished"
            );
        }
        Ok(summary)
    }

    /// Returns the recorded outcome, or `None` when the reminder was no
    /// longer pending.
    async fn deliver(&self, reminder: &UserReminder, now: DateTime<Utc>) -> Result<Option<DeliveryOutcome>> {
        if self.store.status_of(reminder.id).await? != Some(ReminderStatus::Pending) {
            tracing::debug!(reminder_id = %reminder.id, "Reminder no longer pending, skipping");
            return Ok(None);
        }

        let subject = self.subjects.find_subject(reminder.subject_id).await?;
        let Some(address) = subject.as_ref().and_then(Subject::contact) else {
            let outcome = DeliveryOutcome::Failed {
                retry_count: reminder.retry_count,
                error: NO_CONTACT.to_string(),
            };
            tracing::error!(
                reminder_id = %reminder.id,
                subject_id = %reminder.subject_id,
                "Reminder failed: subject has no contact address"
            );
            return self.record(reminder, outcome).await;
        };

        let report = self.channels.deliver(address, &reminder.message).await;

        let outcome = match (report.delivered_via(), report.final_error()) {
            (Some(channel), _) => {
                tracing::info!(
                    reminder_id = %reminder.id,
                    subject_id = %reminder.subject_id,
                    reminder_type = %reminder.reminder_type,
                    channel = %channel,
                    "Reminder sent"
                );
                DeliveryOutcome::Sent { at: now }
            }
            (None, error) => {
                let error = error.map(|e| e.to_string()).unwrap_or_default();
                let outcome = self.policy.after_failure(reminder.retry_count, error, now);
                match &outcome {
                    DeliveryOutcome::Retry { retry_count, next_attempt, error } => tracing::warn!(
                        reminder_id = %reminder.id,
                        retry_count,
                        next_attempt = %next_attempt,
                        error = %error,
                        "Delivery failed, will retry"
                    ),
                    DeliveryOutcome::Failed { retry_count, error } => tracing::error!(
                        reminder_id = %reminder.id,
                        subject_id = %reminder.subject_id,
                        retry_count,
                        error = %error,
                        "Delivery failed permanently"
                    ),
                    DeliveryOutcome::Sent { .. } => {}
                }
                outcome
            }
        };

        // Outcome first; audit rows are best effort.
        let recorded = self.record(reminder, outcome).await;
        self.log_attempts(Some(reminder), reminder.subject_id, &report, now).await;
        recorded
    }

    async fn record(&self, reminder: &UserReminder, outcome: DeliveryOutcome) -> Result<Option<DeliveryOutcome>> {
        if self.store.record_outcome(reminder.id, &outcome).await? {
            Ok(Some(outcome))
        } else {
            tracing::warn!(reminder_id = %reminder.id, "Reminder changed state during delivery");
            Ok(None)
        }
    }

    async fn log_attempts(
        &self,
        reminder: Option<&UserReminder>,
        subject_id: uuid::Uuid,
        report: &DeliveryReport,
        now: DateTime<Utc>,
    ) {
        for attempt in &report.attempts {
            let entry = NotificationLogEntry {
                reminder_id: reminder.map(|reminder| reminder.id),
                subject_id,
                channel: attempt.channel,
                delivered: attempt.result.is_ok(),
                error_message: attempt.result.as_ref().err().map(ToString::to_string),
                attempted_at: now,
            };
            if let Err(e) = self.store.log_attempt(&entry).await {
                tracing::warn!(
                    subject_id = %subject_id,
                    channel = %attempt.channel,
                    error = %e,
                    "Could not write notification log"
                );
            }
        }
    }

    /// Sends a test message straight through the channels, bypassing the
    /// queue. Returns whether any channel accepted it.
    pub async fn send_test_reminder(
        &self,
        subject: &Subject,
        reminder_type: ReminderType,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(address) = subject.contact() else {
            return Ok(false);
        };
        let message = test_message(subject.language, reminder_type);
        let report = self.channels.deliver(address, &message).await;
        self.log_attempts(None, subject.id, &report, now).await;
        Ok(report.delivered_via().is_some())
    }
}

pub fn test_message(language: Language, reminder_type: ReminderType) -> String {
    match language {
        Language::En => format!(
            "Test reminder from your pregnancy tracker. This is a sample {reminder_type} reminder. Your notifications are working!"
        ),
        Language::Fr => format!(
            "Rappel de test de votre suivi de grossesse. Ceci est un exemple de rappel {reminder_type}. Vos notifications fonctionnent!"
        ),
        Language::Rw => format!(
            "Ubutumwa bwo kugerageza buturutse kuri pregnancy tracker. Iki ni urugero rw'ubutumwa bwa {reminder_type}. Ubutumwa bwawe burakora!"
        ),
    }
}
