use std::time::Duration;

use anyhow::Context;
use chrono::Weekday;

/// A delivery that fails this many times is marked failed for good.
pub const MAX_DELIVERY_ATTEMPTS: i32 = 3;

pub const RETRY_BACKOFF_MINUTES: i64 = 30;

pub const DEFAULT_BATCH_SIZE: usize = 50;

pub const UPCOMING_LIMIT: usize = 10;
pub const HISTORY_LIMIT: usize = 20;

/// Sweep cadences, evaluated in UTC.
pub const ANC_SWEEP_HOUR: u32 = 8;
pub const VACCINATION_SWEEP_HOUR: u32 = 9;
pub const MILESTONE_SWEEP_DAY: Weekday = Weekday::Mon;
pub const MILESTONE_SWEEP_HOUR: u32 = 7;
pub const DISPATCH_INTERVAL_MINUTES: i64 = 15;

pub fn default_log_filter() -> &'static str {
    "maternal_reminders=info,sqlx=warn"
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub whatsapp_gateway_url: Option<String>,
    pub sms_gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub text_generator_url: Option<String>,
    pub send_timeout: Duration,
    pub generate_timeout: Duration,
    pub batch_size: usize,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        Ok(Self {
            database_url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            whatsapp_gateway_url: optional_var("WHATSAPP_GATEWAY_URL"),
            sms_gateway_url: optional_var("SMS_GATEWAY_URL"),
            gateway_token: optional_var("GATEWAY_TOKEN"),
            text_generator_url: optional_var("TEXT_GENERATOR_URL"),
            send_timeout: Duration::from_secs(parse_var("SEND_TIMEOUT_SECS", 20)?),
            generate_timeout: Duration::from_secs(parse_var("GENERATE_TIMEOUT_SECS", 15)?),
            batch_size: parse_var("DISPATCH_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(name) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{name} has an invalid value: {value}")),
        None => Ok(default),
    }
}
