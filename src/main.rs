use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod content;
mod db;
mod dispatcher;
mod error;
mod gestation;
mod matcher;
mod models;
mod notifier;
mod queue;
mod report;
mod schedule;
mod scheduler;
mod store;

use config::Settings;
use content::{ContentComposer, HttpTextGenerator, TextGenerator};
use dispatcher::{DeliveryDispatcher, RetryPolicy};
use models::{Channel, ReminderStatus, ReminderType, UserReminder};
use notifier::{ChannelChain, DryRunNotifier, HttpGatewayNotifier};
use queue::ReminderQueue;
use scheduler::{Scheduler, Sweep};
use store::SubjectRepository;

#[derive(Parser)]
#[command(name = "maternal-reminders")]
#[command(about = "Gestational age tracking and reminder delivery for maternal health programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gestational age for a last menstrual period
    Gestation {
        #[arg(long)]
        lmp: NaiveDate,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    #[command(flatten)]
    Database(DatabaseCommands),
}

/// Commands that need a Postgres connection.
#[derive(Subcommand)]
enum DatabaseCommands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo subjects
    Seed,
    /// Import subjects from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run one sweep now
    Sweep {
        #[arg(value_enum)]
        sweep: Sweep,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Run all sweeps on their schedules until interrupted
    Run {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// List a subject's pending reminders
    Upcoming {
        #[arg(long)]
        subject: Uuid,
        #[arg(long, default_value_t = config::UPCOMING_LIMIT)]
        limit: usize,
    },
    /// List a subject's reminders, newest first
    History {
        #[arg(long)]
        subject: Uuid,
        #[arg(long, default_value_t = config::HISTORY_LIMIT)]
        limit: usize,
    },
    /// Cancel a pending reminder
    Dismiss {
        #[arg(long)]
        reminder: Uuid,
    },
    /// Send a test message to a subject, bypassing the queue
    SendTest {
        #[arg(long)]
        subject: Uuid,
        #[arg(long, default_value = "anc")]
        reminder_type: ReminderType,
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a markdown delivery report
    Report {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn build_channels(settings: &Settings, dry_run: bool) -> ChannelChain {
    let chain = ChannelChain::new(settings.send_timeout);
    if dry_run {
        return chain.with_channel(Channel::DryRun, Arc::new(DryRunNotifier));
    }

    let mut chain = chain;
    if let Some(url) = &settings.whatsapp_gateway_url {
        chain = chain.with_channel(
            Channel::WhatsApp,
            Arc::new(HttpGatewayNotifier::new(
                Channel::WhatsApp,
                url,
                settings.gateway_token.clone(),
            )),
        );
    }
    if let Some(url) = &settings.sms_gateway_url {
        chain = chain.with_channel(
            Channel::Sms,
            Arc::new(HttpGatewayNotifier::new(
                Channel::Sms,
                url,
                settings.gateway_token.clone(),
            )),
        );
    }
    if chain.channels().is_empty() {
        tracing::warn!("No gateway configured; every delivery attempt will fail");
    }
    chain
}

fn build_dispatcher(store: &Arc<db::PgStore>, settings: &Settings, dry_run: bool) -> DeliveryDispatcher {
    DeliveryDispatcher::new(
        store.clone(),
        store.clone(),
        Arc::new(build_channels(settings, dry_run)),
        RetryPolicy::default(),
    )
}

fn build_scheduler(pool: &PgPool, settings: &Settings, dry_run: bool, batch_size: Option<usize>) -> Scheduler {
    let store = Arc::new(db::PgStore::new(pool.clone()));
    let generator = settings
        .text_generator_url
        .as_ref()
        .map(|url| Arc::new(HttpTextGenerator::new(url)) as Arc<dyn TextGenerator>);

    Scheduler::new(
        store.clone(),
        ReminderQueue::new(store.clone()),
        build_dispatcher(&store, settings, dry_run),
        ContentComposer::new(generator, settings.generate_timeout),
        batch_size.unwrap_or(settings.batch_size),
    )
}

fn print_reminders(reminders: &[UserReminder], empty: &str) {
    if reminders.is_empty() {
        println!("{empty}");
        return;
    }
    for reminder in reminders {
        println!(
            "- {} {} week {} [{}/{}] scheduled {} ({} retries)",
            reminder.id,
            reminder.rule_code,
            reminder.current_week,
            reminder.status,
            reminder.priority,
            reminder.scheduled_for.format("%Y-%m-%d %H:%M"),
            reminder.retry_count
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    match Cli::parse().command {
        Commands::Gestation { lmp, as_of } => {
            print_gestation(lmp, as_of.unwrap_or_else(|| Utc::now().date_naive()))
        }
        Commands::Database(command) => run_database_command(command).await,
    }
}

fn print_gestation(lmp: NaiveDate, as_of: NaiveDate) -> anyhow::Result<()> {
    let details = gestation::calculate(lmp, as_of)?;
    println!(
        "Week {} day {} ({} days), trimester {}",
        details.gestational_age.weeks,
        details.gestational_age.days,
        details.gestational_age.total_days,
        details.trimester.number()
    );
    println!("Expected delivery: {}", details.expected_delivery_date);
    if details.is_overdue {
        println!("Overdue by {} days.", -details.days_until_delivery);
    } else {
        println!("{} days until delivery.", details.days_until_delivery);
    }
    Ok(())
}

async fn run_database_command(command: DatabaseCommands) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match command {
        DatabaseCommands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        DatabaseCommands::Seed => {
            db::seed(&pool, Utc::now().date_naive()).await?;
            println!("Seed data inserted.");
        }
        DatabaseCommands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} subjects from {}.", csv.display());
        }
        DatabaseCommands::Sweep {
            sweep,
            dry_run,
            batch_size,
        } => {
            let scheduler = build_scheduler(&pool, &settings, dry_run, batch_size);
            let report = scheduler.run_sweep(sweep, Utc::now()).await?;
            match report.dispatch {
                Some(summary) => println!(
                    "Dispatched: {} sent, {} retrying, {} failed, {} skipped.",
                    summary.sent, summary.retried, summary.failed, summary.skipped
                ),
                None => println!(
                    "Evaluated {} subjects: {} queued, {} already fired, {} without contact, {} errors.",
                    report.evaluated,
                    report.queued,
                    report.duplicates,
                    report.unreachable,
                    report.errors
                ),
            }
        }
        DatabaseCommands::Run {
            dry_run,
            batch_size,
        } => {
            let scheduler = build_scheduler(&pool, &settings, dry_run, batch_size);
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Could not listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            scheduler.run(shutdown).await?;
            println!("Scheduler stopped.");
        }
        DatabaseCommands::Upcoming { subject, limit } => {
            let queue = ReminderQueue::new(Arc::new(db::PgStore::new(pool.clone())));
            let reminders = queue.upcoming(subject, limit).await?;
            print_reminders(&reminders, "No pending reminders.");
        }
        DatabaseCommands::History { subject, limit } => {
            let queue = ReminderQueue::new(Arc::new(db::PgStore::new(pool.clone())));
            let reminders = queue.history(subject, limit).await?;
            print_reminders(&reminders, "No reminders yet.");
        }
        DatabaseCommands::Dismiss { reminder } => {
            let queue = ReminderQueue::new(Arc::new(db::PgStore::new(pool.clone())));
            if queue.dismiss(reminder).await? {
                println!("Reminder {reminder} dismissed.");
            } else {
                println!("Reminder {reminder} is not pending; nothing changed.");
            }
        }
        DatabaseCommands::SendTest {
            subject,
            reminder_type,
            dry_run,
        } => {
            let store = Arc::new(db::PgStore::new(pool.clone()));
            let found = store
                .find_subject(subject)
                .await?
                .with_context(|| format!("subject {subject} not found"))?;
            let dispatcher = build_dispatcher(&store, &settings, dry_run);
            if dispatcher
                .send_test_reminder(&found, reminder_type, Utc::now())
                .await?
            {
                println!("Test reminder delivered to {}.", found.full_name);
            } else {
                println!("Test reminder could not be delivered to {}.", found.full_name);
            }
        }
        DatabaseCommands::Report { since_days, out } => {
            let cutoff = Utc::now() - Duration::days(since_days);
            let data = report::ReportData {
                by_status: db::fetch_status_counts(&pool, cutoff).await?,
                by_type: db::fetch_type_counts(&pool, cutoff).await?,
                failed: db::fetch_activity(&pool, ReminderStatus::Failed, cutoff, 20).await?,
                recent_sent: db::fetch_activity(&pool, ReminderStatus::Sent, cutoff, 10).await?,
            };
            let report = report::build_report(since_days, cutoff, &data);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
