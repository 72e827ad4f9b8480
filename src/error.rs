use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Last menstrual period {lmp} is after {as_of}")]
    FutureLmp { lmp: NaiveDate, as_of: NaiveDate },

    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("Subject {0} has no date to measure age from")]
    MissingDate(uuid::Uuid),
}

pub type Result<T> = std::result::Result<T, ReminderError>;
