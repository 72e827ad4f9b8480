//! In-process store used by tests. Enforces the same uniqueness rule as
//! the `user_reminders_live_key` index.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use super::{ReminderStore, SubjectRepository};
use crate::error::Result;
use crate::models::{
    DedupKey, DeliveryOutcome, NewReminder, NotificationLogEntry, PregnancyStatus, ReminderStatus,
    Subject, UserReminder,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    reminders: TokioMutex<HashMap<Uuid, UserReminder>>,
    subjects: TokioMutex<HashMap<Uuid, Subject>>,
    logs: TokioMutex<Vec<NotificationLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_subject(&self, subject: Subject) {
        self.subjects.lock().await.insert(subject.id, subject);
    }

    pub async fn reminders(&self) -> Vec<UserReminder> {
        let mut all: Vec<UserReminder> = self.reminders.lock().await.values().cloned().collect();
        all.sort_by_key(|reminder| reminder.created_at);
        all
    }

    pub async fn reminder(&self, id: Uuid) -> Option<UserReminder> {
        self.reminders.lock().await.get(&id).cloned()
    }

    pub async fn logs(&self) -> Vec<NotificationLogEntry> {
        self.logs.lock().await.clone()
    }
}

fn sort_by_queue_order(items: &mut [UserReminder]) {
    items.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.scheduled_for.cmp(&b.scheduled_for))
    });
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn exists(&self, key: DedupKey, statuses: &[ReminderStatus]) -> Result<bool> {
        let reminders = self.reminders.lock().await;
        Ok(reminders
            .values()
            .any(|reminder| reminder.dedup_key() == key && statuses.contains(&reminder.status)))
    }

    async fn insert_if_absent(&self, reminder: NewReminder) -> Result<Option<UserReminder>> {
        let mut reminders = self.reminders.lock().await;
        let key = reminder.dedup_key();
        let taken = reminders
            .values()
            .any(|existing| existing.dedup_key() == key && existing.status.blocks_refire());
        if taken {
            return Ok(None);
        }

        let created = reminder.into_reminder(Uuid::new_v4(), Utc::now());
        reminders.insert(created.id, created.clone());
        Ok(Some(created))
    }

    async fn list_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<UserReminder>> {
        let reminders = self.reminders.lock().await;
        let mut pending: Vec<UserReminder> = reminders
            .values()
            .filter(|reminder| {
                reminder.status == ReminderStatus::Pending && reminder.scheduled_for <= now
            })
            .cloned()
            .collect();
        sort_by_queue_order(&mut pending);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn status_of(&self, id: Uuid) -> Result<Option<ReminderStatus>> {
        Ok(self.reminders.lock().await.get(&id).map(|reminder| reminder.status))
    }

    async fn record_outcome(&self, id: Uuid, outcome: &DeliveryOutcome) -> Result<bool> {
        let mut reminders = self.reminders.lock().await;
        let Some(reminder) = reminders.get_mut(&id) else {
            return Ok(false);
        };
        if reminder.status != ReminderStatus::Pending {
            return Ok(false);
        }

        match outcome {
            DeliveryOutcome::Sent { at } => {
                reminder.status = ReminderStatus::Sent;
                reminder.sent_at = Some(*at);
            }
            DeliveryOutcome::Retry {
                retry_count,
                next_attempt,
                error,
            } => {
                reminder.retry_count = *retry_count;
                reminder.scheduled_for = *next_attempt;
                reminder.error_message = Some(error.clone());
            }
            DeliveryOutcome::Failed { retry_count, error } => {
                reminder.status = ReminderStatus::Failed;
                reminder.retry_count = *retry_count;
                reminder.error_message = Some(error.clone());
            }
        }
        Ok(true)
    }

    async fn dismiss(&self, id: Uuid) -> Result<bool> {
        let mut reminders = self.reminders.lock().await;
        match reminders.get_mut(&id) {
            Some(reminder) if reminder.status == ReminderStatus::Pending => {
                reminder.status = ReminderStatus::Dismissed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn log_attempt(&self, entry: &NotificationLogEntry) -> Result<()> {
        self.logs.lock().await.push(entry.clone());
        Ok(())
    }

    async fn upcoming(&self, subject_id: Uuid, limit: usize) -> Result<Vec<UserReminder>> {
        let reminders = self.reminders.lock().await;
        let mut pending: Vec<UserReminder> = reminders
            .values()
            .filter(|reminder| {
                reminder.subject_id == subject_id && reminder.status == ReminderStatus::Pending
            })
            .cloned()
            .collect();
        pending.sort_by_key(|reminder| reminder.scheduled_for);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn history(&self, subject_id: Uuid, limit: usize) -> Result<Vec<UserReminder>> {
        let reminders = self.reminders.lock().await;
        let mut all: Vec<UserReminder> = reminders
            .values()
            .filter(|reminder| reminder.subject_id == subject_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}

#[async_trait]
impl SubjectRepository for MemoryStore {
    async fn active_subjects(&self, status: PregnancyStatus) -> Result<Vec<Subject>> {
        let subjects = self.subjects.lock().await;
        let mut matching: Vec<Subject> = subjects
            .values()
            .filter(|subject| subject.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(matching)
    }

    async fn find_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        Ok(self.subjects.lock().await.get(&id).cloned())
    }
}
