//! Persistence seams. `db::PgStore` is the production implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    DedupKey, DeliveryOutcome, NewReminder, NotificationLogEntry, PregnancyStatus, ReminderStatus,
    Subject, UserReminder,
};

#[cfg(test)]
pub mod memory;

/// Reminder history: the single source of truth for what has fired.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// True when a reminder for `key` exists in one of `statuses`.
    async fn exists(&self, key: DedupKey, statuses: &[ReminderStatus]) -> Result<bool>;

    /// Inserts a pending reminder unless one already holds its dedup key.
    /// Check and insert happen as one atomic step.
    async fn insert_if_absent(&self, reminder: NewReminder) -> Result<Option<UserReminder>>;

    /// Pending reminders due at `now`, highest priority first, then oldest
    /// `scheduled_for` first.
    async fn list_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<UserReminder>>;

    async fn status_of(&self, id: Uuid) -> Result<Option<ReminderStatus>>;

    /// Applies `outcome` if the reminder is still pending. Returns false
    /// when it was not (dismissed or handled elsewhere).
    async fn record_outcome(&self, id: Uuid, outcome: &DeliveryOutcome) -> Result<bool>;

    async fn dismiss(&self, id: Uuid) -> Result<bool>;

    async fn log_attempt(&self, entry: &NotificationLogEntry) -> Result<()>;

    async fn upcoming(&self, subject_id: Uuid, limit: usize) -> Result<Vec<UserReminder>>;

    async fn history(&self, subject_id: Uuid, limit: usize) -> Result<Vec<UserReminder>>;
}

#[async_trait]
pub trait SubjectRepository: Send + Sync {
    async fn active_subjects(&self, status: PregnancyStatus) -> Result<Vec<Subject>>;

    async fn find_subject(&self, id: Uuid) -> Result<Option<Subject>>;
}
