//! Periodic sweeps: match subjects against the schedule, queue what is due
//! and hand the queue to the dispatcher.
//!
//! The scheduler keeps nothing in memory between ticks. Everything it needs
//! to decide whether a reminder already fired lives in the reminder store,
//! so a restart or an interrupted sweep is recovered by the next tick.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};

use crate::config::{
    ANC_SWEEP_HOUR, DISPATCH_INTERVAL_MINUTES, MILESTONE_SWEEP_DAY, MILESTONE_SWEEP_HOUR,
    VACCINATION_SWEEP_HOUR,
};
use crate::content::{milestone_prompt, ContentComposer};
use crate::dispatcher::{DeliveryDispatcher, DispatchSummary};
use crate::error::Result;
use crate::gestation::GestationalAge;
use crate::matcher;
use crate::models::Subject;
use crate::queue::ReminderQueue;
use crate::schedule::{ReminderRule, Track};
use crate::store::SubjectRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Sweep {
    #[value(name = "anc")]
    Antenatal,
    Vaccination,
    Milestone,
    Dispatch,
}

impl Sweep {
    /// Enqueue sweeps come before dispatch so a tick that fires both sends
    /// what it just queued.
    pub const ALL: [Sweep; 4] = [
        Sweep::Antenatal,
        Sweep::Vaccination,
        Sweep::Milestone,
        Sweep::Dispatch,
    ];

    pub fn track(&self) -> Option<Track> {
        match self {
            Self::Antenatal => Some(Track::Antenatal),
            Self::Vaccination => Some(Track::Vaccination),
            Self::Milestone => Some(Track::Milestone),
            Self::Dispatch => None,
        }
    }

    pub fn cadence(&self) -> Cadence {
        match self {
            Self::Antenatal => Cadence::Daily {
                hour: ANC_SWEEP_HOUR,
            },
            Self::Vaccination => Cadence::Daily {
                hour: VACCINATION_SWEEP_HOUR,
            },
            Self::Milestone => Cadence::Weekly {
                weekday: MILESTONE_SWEEP_DAY,
                hour: MILESTONE_SWEEP_HOUR,
            },
            Self::Dispatch => Cadence::Every {
                minutes: DISPATCH_INTERVAL_MINUTES,
            },
        }
    }
}

/// When a sweep fires, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily { hour: u32 },
    Weekly { weekday: Weekday, hour: u32 },
    /// Aligned to multiples of `minutes` past midnight.
    Every { minutes: i64 },
}

impl Cadence {
    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();

        match *self {
            Cadence::Daily { hour } => {
                let today = midnight + Duration::hours(i64::from(hour));
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Cadence::Weekly { weekday, hour } => {
                let ahead = (7 + weekday.num_days_from_monday() as i64
                    - now.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = midnight + Duration::days(ahead) + Duration::hours(i64::from(hour));
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::weeks(1)
                }
            }
            Cadence::Every { minutes } => {
                let step = minutes.max(1);
                let elapsed = i64::from(now.hour()) * 60 + i64::from(now.minute());
                let slot = (elapsed / step + 1) * step;
                midnight + Duration::minutes(slot.min(24 * 60))
            }
        }
    }
}

/// The earliest upcoming firing and every sweep due at that instant.
pub fn next_due(now: DateTime<Utc>) -> (DateTime<Utc>, Vec<Sweep>) {
    let fires: Vec<(Sweep, DateTime<Utc>)> = Sweep::ALL
        .iter()
        .map(|sweep| (*sweep, sweep.cadence().next_after(now)))
        .collect();
    let at = fires
        .iter()
        .map(|(_, at)| *at)
        .min()
        .unwrap_or(now);
    let due = fires
        .into_iter()
        .filter(|(_, fire)| *fire == at)
        .map(|(sweep, _)| sweep)
        .collect();
    (at, due)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evaluated: usize,
    pub queued: usize,
    pub duplicates: usize,
    /// Subjects skipped for having no contact address.
    pub unreachable: usize,
    pub errors: usize,
    pub dispatch: Option<DispatchSummary>,
}

#[derive(Debug, Default)]
struct SubjectOutcome {
    queued: usize,
    duplicates: usize,
}

pub struct Scheduler {
    subjects: Arc<dyn SubjectRepository>,
    queue: ReminderQueue,
    dispatcher: DeliveryDispatcher,
    composer: ContentComposer,
    batch_size: usize,
}

impl Scheduler {
    pub fn new(
        subjects: Arc<dyn SubjectRepository>,
        queue: ReminderQueue,
        dispatcher: DeliveryDispatcher,
        composer: ContentComposer,
        batch_size: usize,
    ) -> Self {
        Self {
            subjects,
            queue,
            dispatcher,
            composer,
            batch_size,
        }
    }

    pub async fn run_sweep(&self, sweep: Sweep, now: DateTime<Utc>) -> Result<SweepReport> {
        match sweep.track() {
            Some(track) => self.enqueue_track(track, now).await,
            None => {
                let summary = self.dispatcher.process_pending(self.batch_size, now).await?;
                Ok(SweepReport {
                    dispatch: Some(summary),
                    ..SweepReport::default()
                })
            }
        }
    }

    async fn enqueue_track(&self, track: Track, now: DateTime<Utc>) -> Result<SweepReport> {
        let subjects = self.subjects.active_subjects(track.subject_status()).await?;
        let mut report = SweepReport {
            evaluated: subjects.len(),
            ..SweepReport::default()
        };

        for subject in &subjects {
            if subject.contact().is_none() {
                report.unreachable += 1;
                tracing::debug!(subject_id = %subject.id, track = ?track, "No contact address, not queueing");
                continue;
            }

            match self.evaluate(subject, track, now).await {
                Ok(outcome) => {
                    report.queued += outcome.queued;
                    report.duplicates += outcome.duplicates;
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(subject_id = %subject.id, track = ?track, error = %e, "Skipping subject");
                }
            }
        }

        tracing::info!(
            track = ?track,
            evaluated = report.evaluated,
            queued = report.queued,
            duplicates = report.duplicates,
            unreachable = report.unreachable,
            errors = report.errors,
            "Sweep finished"
        );
        Ok(report)
    }

    /// Evaluate age, match rules, check the dedup key, enqueue.
    async fn evaluate(&self, subject: &Subject, track: Track, now: DateTime<Utc>) -> Result<SubjectOutcome> {
        let mut outcome = SubjectOutcome::default();
        let Some((age, rules)) = matcher::due_for_subject(subject, track, now.date_naive())? else {
            return Ok(outcome);
        };

        for rule in rules {
            if !self
                .queue
                .should_fire(subject.id, rule.reminder_type, age.weeks)
                .await?
            {
                outcome.duplicates += 1;
                continue;
            }

            let message = self.message_for(subject, rule, age).await;
            match self.queue.enqueue(subject.id, rule, message, age, now).await? {
                Some(_) => outcome.queued += 1,
                None => outcome.duplicates += 1,
            }
        }
        Ok(outcome)
    }

    async fn message_for(&self, subject: &Subject, rule: &ReminderRule, age: GestationalAge) -> String {
        let text = rule.render(subject.language, subject.first_name(), age.weeks);
        if rule.track != Track::Milestone {
            return text;
        }

        let prompt = milestone_prompt(age.weeks, subject.language);
        let paragraph = self.composer.compose(&prompt, subject.language).await;
        format!("{text}\n\n{paragraph}")
    }

    /// Runs sweeps on their cadences until `shutdown` resolves. A failed
    /// sweep is logged and the loop carries on.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("Scheduler started");

        loop {
            let now = Utc::now();
            let (at, due) = next_due(now);
            let wait = (at - now).to_std().unwrap_or_default();
            tracing::debug!(next = %at, sweeps = ?due, "Waiting for next sweep");

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, scheduler stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }

            for sweep in due {
                if let Err(e) = self.run_sweep(sweep, Utc::now()).await {
                    tracing::error!(sweep = ?sweep, error = %e, "Sweep failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::content::fallback_text;
    use crate::content::testing::FixedGenerator;
    use crate::content::GenerateError;
    use crate::dispatcher::RetryPolicy;
    use crate::models::{Channel, Language, PregnancyStatus, ReminderStatus, ReminderType};
    use crate::notifier::testing::ScriptedNotifier;
    use crate::notifier::ChannelChain;
    use crate::store::memory::MemoryStore;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn pregnant(name: &str, lmp: NaiveDate) -> Subject {
        Subject {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            phone: Some("+250788000111".to_string()),
            language: Language::En,
            status: PregnancyStatus::Pregnant,
            last_menstrual_period: Some(lmp),
            delivery_date: None,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        sms: Arc<ScriptedNotifier>,
        scheduler: Scheduler,
    }

    fn fixture(generated: std::result::Result<String, GenerateError>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let sms = Arc::new(ScriptedNotifier::default());
        let chain = ChannelChain::new(StdDuration::from_secs(5)).with_channel(Channel::Sms, sms.clone());
        let dispatcher = DeliveryDispatcher::new(
            store.clone(),
            store.clone(),
            Arc::new(chain),
            RetryPolicy::default(),
        );
        let composer = ContentComposer::new(
            Some(Arc::new(FixedGenerator(generated))),
            StdDuration::from_secs(15),
        );
        let scheduler = Scheduler::new(
            store.clone(),
            ReminderQueue::new(store.clone()),
            dispatcher,
            composer,
            50,
        );
        Fixture {
            store,
            sms,
            scheduler,
        }
    }

    #[tokio::test]
    async fn week_eight_subject_gets_one_anc_reminder_per_week() {
        let f = fixture(Ok("unused".into()));
        let now = at(2024, 2, 26, 8, 0);
        let subject = pregnant("Aline Uwase", now.date_naive() - Duration::days(56));
        f.store.add_subject(subject.clone()).await;

        let first = f.scheduler.run_sweep(Sweep::Antenatal, now).await.unwrap();
        assert_eq!(first.queued, 1);

        let later_same_week = now + Duration::days(1);
        let second = f.scheduler.run_sweep(Sweep::Antenatal, later_same_week).await.unwrap();
        assert_eq!(second.queued, 0);
        assert_eq!(second.duplicates, 1);

        let reminders = f.store.reminders().await;
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].rule_code, "anc-1");
        assert_eq!(reminders[0].reminder_type, ReminderType::Anc);
        assert_eq!(reminders[0].current_week, 8);
        assert!(reminders[0].message.starts_with("ANC 1 Visit Due\nHello Aline!"));
    }

    #[tokio::test]
    async fn repeated_sweeps_enqueue_at_most_once_per_key() {
        let f = fixture(Ok("unused".into()));
        let now = at(2024, 5, 6, 8, 0);
        for (name, days) in [("A", 45), ("B", 100), ("C", 150), ("D", 250), ("E", 30)] {
            f.store
                .add_subject(pregnant(name, now.date_naive() - Duration::days(days)))
                .await;
        }

        let mut queued = 0;
        for _ in 0..5 {
            queued += f.scheduler.run_sweep(Sweep::Antenatal, now).await.unwrap().queued;
        }

        let reminders = f.store.reminders().await;
        assert_eq!(queued, reminders.len());
        let mut keys: Vec<_> = reminders.iter().map(|reminder| reminder.dedup_key()).collect();
        keys.sort_by_key(|key| (key.subject_id, key.week));
        keys.dedup();
        assert_eq!(keys.len(), reminders.len());
    }

    #[tokio::test]
    async fn subjects_off_track_or_missing_dates_do_not_stop_the_sweep() {
        let f = fixture(Ok("unused".into()));
        let now = at(2024, 3, 4, 8, 0);
        let mut no_lmp = pregnant("No Date", now.date_naive());
        no_lmp.last_menstrual_period = None;
        let mut delivered = pregnant("Delivered", now.date_naive() - Duration::days(56));
        delivered.status = PregnancyStatus::Delivered;
        f.store.add_subject(no_lmp).await;
        f.store.add_subject(delivered).await;
        f.store
            .add_subject(pregnant("Due", now.date_naive() - Duration::days(100)))
            .await;

        let report = f.scheduler.run_sweep(Sweep::Antenatal, now).await.unwrap();
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.queued, 1);
    }

    #[tokio::test]
    async fn milestone_uses_fallback_when_generation_fails() {
        let f = fixture(Err(GenerateError::Transport("down".into())));
        let now = at(2024, 3, 4, 7, 0);
        f.store
            .add_subject(pregnant("Aline Uwase", now.date_naive() - Duration::days(8 * 7 + 3)))
            .await;

        let report = f.scheduler.run_sweep(Sweep::Milestone, now).await.unwrap();
        assert_eq!(report.queued, 1);

        let reminder = &f.store.reminders().await[0];
        assert_eq!(reminder.reminder_type, ReminderType::Milestone);
        assert!(reminder.message.starts_with("Week 8 Milestone\n"));
        assert!(reminder.message.ends_with(fallback_text(Language::En)));
    }

    #[tokio::test]
    async fn milestone_appends_generated_text() {
        let f = fixture(Ok("Baby is the size of a raspberry.".into()));
        let now = at(2024, 3, 4, 7, 0);
        f.store
            .add_subject(pregnant("Aline", now.date_naive() - Duration::days(8 * 7)))
            .await;

        f.scheduler.run_sweep(Sweep::Milestone, now).await.unwrap();
        let reminder = &f.store.reminders().await[0];
        assert!(reminder.message.ends_with("\n\nBaby is the size of a raspberry."));
    }

    #[tokio::test]
    async fn vaccination_sweep_uses_delivery_date() {
        let f = fixture(Ok("unused".into()));
        let now = at(2024, 3, 5, 9, 0);
        let mut mother = pregnant("Grace", now.date_naive() - Duration::days(330));
        mother.status = PregnancyStatus::Delivered;
        mother.delivery_date = Some(now.date_naive() - Duration::days(6 * 7 + 2));
        f.store.add_subject(mother).await;

        let report = f.scheduler.run_sweep(Sweep::Vaccination, now).await.unwrap();
        assert_eq!(report.queued, 1);
        assert_eq!(f.store.reminders().await[0].rule_code, "vaccine-6w");
    }

    #[tokio::test]
    async fn dispatch_sweep_sends_what_was_queued() {
        let f = fixture(Ok("unused".into()));
        let now = at(2024, 2, 26, 8, 0);
        f.store
            .add_subject(pregnant("Aline", now.date_naive() - Duration::days(56)))
            .await;

        f.scheduler.run_sweep(Sweep::Antenatal, now).await.unwrap();
        let report = f.scheduler.run_sweep(Sweep::Dispatch, now).await.unwrap();
        assert_eq!(report.dispatch.map(|summary| summary.sent), Some(1));
        assert_eq!(f.sms.calls(), 1);
        assert_eq!(f.store.reminders().await[0].status, ReminderStatus::Sent);

        // Sent still holds the key for the rest of the week.
        let again = f.scheduler.run_sweep(Sweep::Antenatal, now + Duration::hours(2)).await.unwrap();
        assert_eq!(again.queued, 0);
    }

    #[tokio::test]
    async fn subject_without_contact_is_not_queued_on_daily_sweeps() {
        let f = fixture(Ok("unused".into()));
        let start = at(2024, 2, 26, 8, 0);
        let mut unreachable = pregnant("No Phone", start.date_naive() - Duration::days(56));
        unreachable.phone = None;
        let reachable = pregnant("Grace", start.date_naive() - Duration::days(56));
        f.store.add_subject(unreachable).await;
        f.store.add_subject(reachable.clone()).await;

        for day in 0..7 {
            let now = start + Duration::days(day);
            let report = f.scheduler.run_sweep(Sweep::Antenatal, now).await.unwrap();
            assert_eq!(report.unreachable, 1);
            f.scheduler.run_sweep(Sweep::Dispatch, now).await.unwrap();
        }

        let reminders = f.store.reminders().await;
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].subject_id, reachable.id);
        assert_eq!(reminders[0].status, ReminderStatus::Sent);
        assert_eq!(f.sms.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_sweeps_queue_each_key_once() {
        let f = fixture(Ok("unused".into()));
        let now = at(2024, 5, 6, 8, 0);
        for (i, days) in [45, 50, 100, 150, 250].into_iter().enumerate() {
            f.store
                .add_subject(pregnant(&format!("Subject {i}"), now.date_naive() - Duration::days(days)))
                .await;
        }

        let (first, second) = tokio::join!(
            f.scheduler.run_sweep(Sweep::Antenatal, now),
            f.scheduler.run_sweep(Sweep::Antenatal, now)
        );
        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.queued + second.queued, 5);
        assert_eq!(first.duplicates + second.duplicates, 5);

        let reminders = f.store.reminders().await;
        assert_eq!(reminders.len(), 5);
        let mut keys: Vec<_> = reminders.iter().map(|reminder| reminder.dedup_key()).collect();
        keys.sort_by_key(|key| (key.subject_id, key.week));
        keys.dedup();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn daily_cadence_fires_at_the_hour() {
        let daily = Cadence::Daily { hour: 8 };
        assert_eq!(daily.next_after(at(2024, 1, 3, 7, 59)), at(2024, 1, 3, 8, 0));
        assert_eq!(daily.next_after(at(2024, 1, 3, 8, 0)), at(2024, 1, 4, 8, 0));
    }

    #[test]
    fn weekly_cadence_finds_next_monday() {
        let weekly = Sweep::Milestone.cadence();
        // 2024-01-03 is a Wednesday.
        assert_eq!(weekly.next_after(at(2024, 1, 3, 12, 0)), at(2024, 1, 8, 7, 0));
        assert_eq!(weekly.next_after(at(2024, 1, 8, 6, 0)), at(2024, 1, 8, 7, 0));
        assert_eq!(weekly.next_after(at(2024, 1, 8, 7, 0)), at(2024, 1, 15, 7, 0));
    }

    #[test]
    fn interval_cadence_aligns_to_quarter_hours() {
        let every = Cadence::Every { minutes: 15 };
        assert_eq!(every.next_after(at(2024, 1, 3, 10, 7)), at(2024, 1, 3, 10, 15));
        assert_eq!(every.next_after(at(2024, 1, 3, 10, 15)), at(2024, 1, 3, 10, 30));
        assert_eq!(every.next_after(at(2024, 1, 3, 23, 50)), at(2024, 1, 4, 0, 0));
    }

    #[test]
    fn coinciding_sweeps_enqueue_before_dispatch() {
        let (when, due) = next_due(at(2024, 1, 3, 7, 50));
        assert_eq!(when, at(2024, 1, 3, 8, 0));
        assert_eq!(due, vec![Sweep::Antenatal, Sweep::Dispatch]);
    }

    #[tokio::test]
    async fn run_returns_on_shutdown() {
        let f = fixture(Ok("unused".into()));
        f.scheduler.run(std::future::ready(())).await.unwrap();
    }
}
