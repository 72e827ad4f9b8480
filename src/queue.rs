use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::gestation::GestationalAge;
use crate::models::{DedupKey, NewReminder, ReminderStatus, ReminderType, UserReminder};
use crate::schedule::ReminderRule;
use crate::store::ReminderStore;

/// Durable queue of reminders, guarded by the (subject, type, week) key.
#[derive(Clone)]
pub struct ReminderQueue {
    store: Arc<dyn ReminderStore>,
}

impl ReminderQueue {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }

    /// Read-only pre-check. Sweeps call it before doing any costly message
    /// work; `enqueue` repeats the check atomically.
    pub async fn should_fire(
        &self,
        subject_id: Uuid,
        reminder_type: ReminderType,
        week: u32,
    ) -> Result<bool> {
        let key = DedupKey {
            subject_id,
            reminder_type,
            week: week as i32,
        };
        let already = self.store.exists(key, &ReminderStatus::BLOCKING).await?;
        Ok(!already)
    }

    /// Queues `rule` for a subject. Returns `None` when the dedup key is
    /// already held, which includes losing a race with a concurrent sweep.
    pub async fn enqueue(
        &self,
        subject_id: Uuid,
        rule: &ReminderRule,
        message: String,
        age: GestationalAge,
        now: DateTime<Utc>,
    ) -> Result<Option<UserReminder>> {
        let reminder = NewReminder {
            subject_id,
            rule_code: rule.code.to_string(),
            reminder_type: rule.reminder_type,
            priority: rule.priority,
            scheduled_for: now,
            current_week: age.weeks as i32,
            current_day: Some(age.total_days as i32),
            message,
        };
        let created = self.store.insert_if_absent(reminder).await?;

        match &created {
            Some(reminder) => tracing::info!(
                subject_id = %subject_id,
                reminder_id = %reminder.id,
                rule = rule.code,
                week = age.weeks,
                "Reminder queued"
            ),
            None => tracing::debug!(
                subject_id = %subject_id,
                rule = rule.code,
                week = age.weeks,
                "Reminder already queued or sent for this week"
            ),
        }
        Ok(created)
    }

    pub async fn list_pending(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<UserReminder>> {
        self.store.list_pending(now, limit).await
    }

    pub async fn dismiss(&self, id: Uuid) -> Result<bool> {
        self.store.dismiss(id).await
    }

    pub async fn upcoming(&self, subject_id: Uuid, limit: usize) -> Result<Vec<UserReminder>> {
        self.store.upcoming(subject_id, limit).await
    }

    pub async fn history(&self, subject_id: Uuid, limit: usize) -> Result<Vec<UserReminder>> {
        self.store.history(subject_id, limit).await
    }
}
