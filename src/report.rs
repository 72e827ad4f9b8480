use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{ReminderActivity, ReminderCount};

/// Everything the delivery report shows, already fetched.
#[derive(Debug, Default)]
pub struct ReportData {
    pub by_status: Vec<ReminderCount>,
    pub by_type: Vec<ReminderCount>,
    pub failed: Vec<ReminderActivity>,
    pub recent_sent: Vec<ReminderActivity>,
}

impl ReportData {
    pub fn total(&self) -> i64 {
        self.by_status.iter().map(|count| count.count).sum()
    }

    /// Share of settled reminders (sent or failed) that were sent.
    pub fn delivery_rate(&self) -> Option<f64> {
        let count_of = |label: &str| {
            self.by_status
                .iter()
                .filter(|count| count.label == label)
                .map(|count| count.count)
                .sum::<i64>()
        };
        let sent = count_of("sent");
        let settled = sent + count_of("failed");
        if settled == 0 {
            None
        } else {
            Some(sent as f64 / settled as f64)
        }
    }
}

fn write_counts(output: &mut String, counts: &[ReminderCount], empty: &str) {
    if counts.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }
    for count in counts {
        let _ = writeln!(output, "- {}: {}", count.label, count.count);
    }
}

pub fn build_report(since_days: i64, cutoff: DateTime<Utc>, data: &ReportData) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Maternal Reminder Delivery Report");
    let _ = writeln!(
        output,
        "Reminders created since {} (last {} days): {}",
        cutoff.format("%Y-%m-%d %H:%M UTC"),
        since_days,
        data.total()
    );
    if let Some(rate) = data.delivery_rate() {
        let _ = writeln!(output, "Delivery rate: {:.1}%", rate * 100.0);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Status");
    write_counts(&mut output, &data.by_status, "No reminders in this window.");

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Type");
    write_counts(&mut output, &data.by_type, "No reminders in this window.");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Failed Deliveries");
    if data.failed.is_empty() {
        let _ = writeln!(output, "No failed deliveries.");
    } else {
        for item in &data.failed {
            let _ = writeln!(
                output,
                "- {} ({}, week {}) after {} attempts: {}",
                item.subject_name,
                item.rule_code,
                item.current_week,
                item.retry_count,
                item.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recently Sent");
    if data.recent_sent.is_empty() {
        let _ = writeln!(output, "Nothing sent in this window.");
    } else {
        for item in &data.recent_sent {
            let _ = writeln!(
                output,
                "- {} {} ({}, week {}) on {}",
                item.subject_name,
                item.reminder_type,
                item.rule_code,
                item.current_week,
                item.at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    output
}
