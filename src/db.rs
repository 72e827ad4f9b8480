use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    DedupKey, DeliveryOutcome, Language, NewReminder, NotificationLogEntry, PregnancyStatus,
    ReminderActivity, ReminderCount, ReminderStatus, Subject, UserReminder,
};
use crate::store::{ReminderStore, SubjectRepository};

const REMINDER_COLUMNS: &str = "id, subject_id, rule_code, reminder_type, priority, scheduled_for, \
     status, sent_at, current_week, current_day, message, retry_count, error_message, created_at";

const SUBJECT_COLUMNS: &str =
    "id, full_name, phone, language, status, last_menstrual_period, delivery_date";

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Three demo subjects positioned relative to `today`: early pregnancy,
/// mid pregnancy, and six weeks after delivery.
pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    let subjects = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "seed-001",
            "Aline Uwase",
            "+250788100001",
            Language::Rw,
            PregnancyStatus::Pregnant,
            Some(today - Duration::days(8 * 7)),
            None,
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "seed-002",
            "Claudine Mukamana",
            "+250788100002",
            Language::Fr,
            PregnancyStatus::Pregnant,
            Some(today - Duration::days(22 * 7 + 3)),
            None,
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "seed-003",
            "Grace Ingabire",
            "+250788100003",
            Language::En,
            PregnancyStatus::Delivered,
            Some(today - Duration::days(46 * 7)),
            Some(today - Duration::days(6 * 7)),
        ),
    ];

    for (id, external_ref, name, phone, language, status, lmp, delivered) in subjects {
        upsert_subject(pool, id, external_ref, name, Some(phone), language, status, lmp, delivered)
            .await
            .with_context(|| format!("failed to seed {external_ref}"))?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upsert_subject(
    pool: &PgPool,
    id: Uuid,
    external_ref: &str,
    full_name: &str,
    phone: Option<&str>,
    language: Language,
    status: PregnancyStatus,
    lmp: Option<NaiveDate>,
    delivery_date: Option<NaiveDate>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO maternal_reminders.subjects
        (id, external_ref, full_name, phone, language, status, last_menstrual_period, delivery_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (external_ref) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            phone = EXCLUDED.phone,
            language = EXCLUDED.language,
            status = EXCLUDED.status,
            last_menstrual_period = EXCLUDED.last_menstrual_period,
            delivery_date = EXCLUDED.delivery_date
        "#,
    )
    .bind(id)
    .bind(external_ref)
    .bind(full_name)
    .bind(phone)
    .bind(language.as_str())
    .bind(status.as_str())
    .bind(lmp)
    .bind(delivery_date)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Imports or updates subjects keyed by `external_ref`.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        external_ref: Option<String>,
        full_name: String,
        phone: Option<String>,
        language: Option<String>,
        status: String,
        last_menstrual_period: Option<NaiveDate>,
        delivery_date: Option<NaiveDate>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("row {} is malformed", line + 1))?;
        let status: PregnancyStatus = row
            .status
            .parse()
            .with_context(|| format!("row {} has an invalid status", line + 1))?;
        let external_ref = row
            .external_ref
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if upsert_subject(
            pool,
            Uuid::new_v4(),
            &external_ref,
            &row.full_name,
            row.phone.as_deref(),
            Language::from_code(row.language.as_deref()),
            status,
            row.last_menstrual_period,
            row.delivery_date,
        )
        .await?
        {
            imported += 1;
        }
    }

    Ok(imported)
}

fn subject_from_row(row: &PgRow) -> Result<Subject> {
    let language: Option<String> = row.get("language");
    Ok(Subject {
        id: row.get("id"),
        full_name: row.get("full_name"),
        phone: row.get("phone"),
        language: Language::from_code(language.as_deref()),
        status: row.get::<String, _>("status").parse()?,
        last_menstrual_period: row.get("last_menstrual_period"),
        delivery_date: row.get("delivery_date"),
    })
}

fn reminder_from_row(row: &PgRow) -> Result<UserReminder> {
    Ok(UserReminder {
        id: row.get("id"),
        subject_id: row.get("subject_id"),
        rule_code: row.get("rule_code"),
        reminder_type: row.get::<String, _>("reminder_type").parse()?,
        priority: row.get::<String, _>("priority").parse()?,
        scheduled_for: row.get("scheduled_for"),
        status: row.get::<String, _>("status").parse()?,
        sent_at: row.get("sent_at"),
        current_week: row.get("current_week"),
        current_day: row.get("current_day"),
        message: row.get("message"),
        retry_count: row.get("retry_count"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    })
}

fn reminders_from_rows(rows: &[PgRow]) -> Result<Vec<UserReminder>> {
    rows.iter().map(reminder_from_row).collect()
}

/// Postgres-backed reminder store and subject repository.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderStore for PgStore {
    async fn exists(&self, key: DedupKey, statuses: &[ReminderStatus]) -> Result<bool> {
        let statuses: Vec<&str> = statuses.iter().map(ReminderStatus::as_str).collect();
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM maternal_reminders.user_reminders
                WHERE subject_id = $1 AND reminder_type = $2 AND current_week = $3
                  AND status = ANY($4)
            ) AS found
            "#,
        )
        .bind(key.subject_id)
        .bind(key.reminder_type.as_str())
        .bind(key.week)
        .bind(statuses)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("found"))
    }

    async fn insert_if_absent(&self, reminder: NewReminder) -> Result<Option<UserReminder>> {
        let query = format!(
            r#"
            INSERT INTO maternal_reminders.user_reminders
            (id, subject_id, rule_code, reminder_type, priority, scheduled_for, status,
             current_week, current_day, message)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9)
            ON CONFLICT (subject_id, reminder_type, current_week)
                WHERE status IN ('pending', 'sent', 'dismissed')
            DO NOTHING
            RETURNING {REMINDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(reminder.subject_id)
            .bind(&reminder.rule_code)
            .bind(reminder.reminder_type.as_str())
            .bind(reminder.priority.as_str())
            .bind(reminder.scheduled_for)
            .bind(reminder.current_week)
            .bind(reminder.current_day)
            .bind(&reminder.message)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(reminder_from_row).transpose()
    }

    async fn list_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<UserReminder>> {
        let query = format!(
            r#"
            SELECT {REMINDER_COLUMNS}
            FROM maternal_reminders.user_reminders
            WHERE status = 'pending' AND scheduled_for <= $1
            ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                     scheduled_for
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        reminders_from_rows(&rows)
    }

    async fn status_of(&self, id: Uuid) -> Result<Option<ReminderStatus>> {
        let row = sqlx::query("SELECT status FROM maternal_reminders.user_reminders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.get::<String, _>("status").parse()?)),
            None => Ok(None),
        }
    }

    async fn record_outcome(&self, id: Uuid, outcome: &DeliveryOutcome) -> Result<bool> {
        let result = match outcome {
            DeliveryOutcome::Sent { at } => {
                sqlx::query(
                    r#"
                    UPDATE maternal_reminders.user_reminders
                    SET status = 'sent', sent_at = $2, error_message = NULL
                    WHERE id = $1 AND status = 'pending'
                    "#,
                )
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?
            }
            DeliveryOutcome::Retry {
                retry_count,
                next_attempt,
                error,
            } => {
                sqlx::query(
                    r#"
                    UPDATE maternal_reminders.user_reminders
                    SET retry_count = $2, scheduled_for = $3, error_message = $4
                    WHERE id = $1 AND status = 'pending'
                    "#,
                )
                .bind(id)
                .bind(retry_count)
                .bind(next_attempt)
                .bind(error)
                .execute(&self.pool)
                .await?
            }
            DeliveryOutcome::Failed { retry_count, error } => {
                sqlx::query(
                    r#"
                    UPDATE maternal_reminders.user_reminders
                    SET status = 'failed', retry_count = $2, error_message = $3
                    WHERE id = $1 AND status = 'pending'
                    "#,
                )
                .bind(id)
                .bind(retry_count)
                .bind(error)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    async fn dismiss(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE maternal_reminders.user_reminders SET status = 'dismissed' \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn log_attempt(&self, entry: &NotificationLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO maternal_reminders.notification_logs
            (id, reminder_id, subject_id, channel, status, error_message, attempted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.reminder_id)
        .bind(entry.subject_id)
        .bind(entry.channel.as_str())
        .bind(if entry.delivered { "sent" } else { "failed" })
        .bind(&entry.error_message)
        .bind(entry.attempted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upcoming(&self, subject_id: Uuid, limit: usize) -> Result<Vec<UserReminder>> {
        let query = format!(
            "SELECT {REMINDER_COLUMNS} FROM maternal_reminders.user_reminders \
             WHERE subject_id = $1 AND status = 'pending' \
             ORDER BY scheduled_for LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(subject_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        reminders_from_rows(&rows)
    }

    async fn history(&self, subject_id: Uuid, limit: usize) -> Result<Vec<UserReminder>> {
        let query = format!(
            "SELECT {REMINDER_COLUMNS} FROM maternal_reminders.user_reminders \
             WHERE subject_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(subject_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        reminders_from_rows(&rows)
    }
}

#[async_trait]
impl SubjectRepository for PgStore {
    async fn active_subjects(&self, status: PregnancyStatus) -> Result<Vec<Subject>> {
        let query = format!(
            "SELECT {SUBJECT_COLUMNS} FROM maternal_reminders.subjects \
             WHERE status = $1 ORDER BY full_name"
        );
        let rows = sqlx::query(&query)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(subject_from_row).collect()
    }

    async fn find_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        let query = format!("SELECT {SUBJECT_COLUMNS} FROM maternal_reminders.subjects WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(subject_from_row).transpose()
    }
}

async fn fetch_counts(pool: &PgPool, column: &str, since: DateTime<Utc>) -> Result<Vec<ReminderCount>> {
    let query = format!(
        "SELECT {column} AS label, COUNT(*) AS count \
         FROM maternal_reminders.user_reminders \
         WHERE created_at >= $1 \
         GROUP BY {column} ORDER BY count DESC, label"
    );
    let rows = sqlx::query(&query).bind(since).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| ReminderCount {
            label: row.get("label"),
            count: row.get("count"),
        })
        .collect())
}

pub async fn fetch_status_counts(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<ReminderCount>> {
    fetch_counts(pool, "status", since).await
}

pub async fn fetch_type_counts(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<ReminderCount>> {
    fetch_counts(pool, "reminder_type", since).await
}

/// Reminders in `status` since the cutoff, newest first. Sent rows are
/// timed by `sent_at`, everything else by `created_at`.
pub async fn fetch_activity(
    pool: &PgPool,
    status: ReminderStatus,
    since: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ReminderActivity>> {
    let rows = sqlx::query(
        r#"
        SELECT s.full_name, r.rule_code, r.reminder_type, r.current_week, r.retry_count,
               r.error_message, COALESCE(r.sent_at, r.created_at) AS at
        FROM maternal_reminders.user_reminders r
        JOIN maternal_reminders.subjects s ON s.id = r.subject_id
        WHERE r.status = $1 AND r.created_at >= $2
        ORDER BY at DESC
        LIMIT $3
        "#,
    )
    .bind(status.as_str())
    .bind(since)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let mut activity = Vec::new();
    for row in rows {
        activity.push(ReminderActivity {
            subject_name: row.get("full_name"),
            rule_code: row.get("rule_code"),
            reminder_type: row.get::<String, _>("reminder_type").parse()?,
            current_week: row.get("current_week"),
            retry_count: row.get("retry_count"),
            error_message: row.get("error_message"),
            at: row.get("at"),
        });
    }

    Ok(activity)
}
