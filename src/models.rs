use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReminderError;

/// Parses the lowercase storage form of a closed enum.
macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ReminderError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ReminderError::UnknownValue {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PregnancyStatus {
    Pregnant,
    Delivered,
    Aborted,
    Stillbirth,
    Infertile,
    Preconception,
    Menopausal,
    Nulligravid,
}

text_enum!(PregnancyStatus, "pregnancy status", {
    Pregnant => "pregnant",
    Delivered => "delivered",
    Aborted => "aborted",
    Stillbirth => "stillbirth",
    Infertile => "infertile",
    Preconception => "preconception",
    Menopausal => "menopausal",
    Nulligravid => "nulligravid",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderType {
    Anc,
    Vaccination,
    Milestone,
    Emergency,
}

text_enum!(ReminderType, "reminder type", {
    Anc => "anc",
    Vaccination => "vaccination",
    Milestone => "milestone",
    Emergency => "emergency",
});

/// Declaration order is delivery order: `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

text_enum!(Priority, "priority", {
    High => "high",
    Medium => "medium",
    Low => "low",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
    Dismissed,
}

text_enum!(ReminderStatus, "reminder status", {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
    Dismissed => "dismissed",
});

impl ReminderStatus {
    /// Statuses that hold the dedup key for a (subject, type, week).
    /// `Failed` is left out so a later sweep can try again.
    pub const BLOCKING: [ReminderStatus; 3] = [
        ReminderStatus::Pending,
        ReminderStatus::Sent,
        ReminderStatus::Dismissed,
    ];

    pub fn blocks_refire(&self) -> bool {
        Self::BLOCKING.contains(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    En,
    Fr,
    Rw,
}

text_enum!(Language, "language", {
    En => "en",
    Fr => "fr",
    Rw => "rw",
});

impl Language {
    /// Unknown or missing codes read as English.
    pub fn from_code(code: Option<&str>) -> Self {
        code.and_then(|value| value.parse().ok()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    WhatsApp,
    Sms,
    DryRun,
}

text_enum!(Channel, "channel", {
    WhatsApp => "whatsapp",
    Sms => "sms",
    DryRun => "dry_run",
});

/// A person enrolled for reminders.
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub language: Language,
    pub status: PregnancyStatus,
    pub last_menstrual_period: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
}

impl Subject {
    /// Name used in greetings.
    pub fn first_name(&self) -> &str {
        self.full_name
            .split_whitespace()
            .next()
            .unwrap_or("there")
    }

    /// A usable destination, if any.
    pub fn contact(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
    }
}

/// One firing of a schedule rule for a subject.
#[derive(Debug, Clone, PartialEq)]
pub struct UserReminder {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub rule_code: String,
    pub reminder_type: ReminderType,
    pub priority: Priority,
    pub scheduled_for: DateTime<Utc>,
    pub status: ReminderStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub current_week: i32,
    pub current_day: Option<i32>,
    pub message: String,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserReminder {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            subject_id: self.subject_id,
            reminder_type: self.reminder_type,
            week: self.current_week,
        }
    }
}

/// Values needed to enqueue a reminder.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub subject_id: Uuid,
    pub rule_code: String,
    pub reminder_type: ReminderType,
    pub priority: Priority,
    pub scheduled_for: DateTime<Utc>,
    pub current_week: i32,
    pub current_day: Option<i32>,
    pub message: String,
}

impl NewReminder {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            subject_id: self.subject_id,
            reminder_type: self.reminder_type,
            week: self.current_week,
        }
    }

    pub fn into_reminder(self, id: Uuid, created_at: DateTime<Utc>) -> UserReminder {
        UserReminder {
            id,
            subject_id: self.subject_id,
            rule_code: self.rule_code,
            reminder_type: self.reminder_type,
            priority: self.priority,
            scheduled_for: self.scheduled_for,
            status: ReminderStatus::Pending,
            sent_at: None,
            current_week: self.current_week,
            current_day: self.current_day,
            message: self.message,
            retry_count: 0,
            error_message: None,
            created_at,
        }
    }
}

/// At most one live reminder exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub subject_id: Uuid,
    pub reminder_type: ReminderType,
    pub week: i32,
}

/// State change recorded after a delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Sent {
        at: DateTime<Utc>,
    },
    Retry {
        retry_count: i32,
        next_attempt: DateTime<Utc>,
        error: String,
    },
    Failed {
        retry_count: i32,
        error: String,
    },
}

/// One channel attempt, kept for audit.
#[derive(Debug, Clone)]
pub struct NotificationLogEntry {
    pub reminder_id: Option<Uuid>,
    pub subject_id: Uuid,
    pub channel: Channel,
    pub delivered: bool,
    pub error_message: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReminderCount {
    pub label: String,
    pub count: i64,
}

/// A reminder joined with its subject's name, for reporting.
#[derive(Debug, Clone)]
pub struct ReminderActivity {
    pub subject_name: String,
    pub rule_code: String,
    pub reminder_type: ReminderType,
    pub current_week: i32,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_high_first() {
        let mut values = vec![Priority::Low, Priority::High, Priority::Medium];
        values.sort();
        assert_eq!(values, vec![Priority::High, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        assert_eq!(Language::from_code(Some("FR")), Language::Fr);
        assert_eq!(Language::from_code(Some("sw")), Language::En);
        assert_eq!(Language::from_code(None), Language::En);
    }

    #[test]
    fn status_text_is_rejected_when_unknown() {
        assert_eq!("Delivered".parse::<PregnancyStatus>().ok(), Some(PregnancyStatus::Delivered));
        assert!("married".parse::<PregnancyStatus>().is_err());
    }

    #[test]
    fn failed_reminders_do_not_hold_the_key() {
        assert!(ReminderStatus::Sent.blocks_refire());
        assert!(ReminderStatus::Pending.blocks_refire());
        assert!(ReminderStatus::Dismissed.blocks_refire());
        assert!(!ReminderStatus::Failed.blocks_refire());
    }

    #[test]
    fn contact_ignores_blank_phone() {
        let subject = Subject {
            id: Uuid::new_v4(),
            full_name: "Aline Uwase".to_string(),
            phone: Some("   ".to_string()),
            language: Language::Rw,
            status: PregnancyStatus::Pregnant,
            last_menstrual_period: None,
            delivery_date: None,
        };
        assert_eq!(subject.contact(), None);
        assert_eq!(subject.first_name(), "Aline");
    }
}
