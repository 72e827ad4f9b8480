use chrono::NaiveDate;

use crate::error::{ReminderError, Result};
use crate::gestation::{self, GestationalAge};
use crate::models::Subject;
use crate::schedule::{ReminderRule, Track};

/// Rules on `track` that are due at `week`, in table order.
pub fn find_due_rules(track: Track, week: u32) -> Vec<&'static ReminderRule> {
    track
        .rules()
        .iter()
        .filter(|rule| rule.covers(week))
        .collect()
}

/// A subject's age on a track, or `None` when the subject is not on it.
///
/// Antenatal and milestone age is measured from the LMP. Vaccination age is
/// measured from the recorded delivery date, or from the expected delivery
/// date when none was recorded.
pub fn track_age(
    subject: &Subject,
    track: Track,
    as_of: NaiveDate,
) -> Result<Option<GestationalAge>> {
    if !Track::for_status(subject.status).contains(&track) {
        return Ok(None);
    }

    match track {
        Track::Antenatal | Track::Milestone => {
            let lmp = subject
                .last_menstrual_period
                .ok_or(ReminderError::MissingDate(subject.id))?;
            Ok(Some(gestation::calculate(lmp, as_of)?.gestational_age))
        }
        Track::Vaccination => {
            let delivered = subject
                .delivery_date
                .or_else(|| {
                    subject
                        .last_menstrual_period
                        .map(gestation::expected_delivery_date)
                })
                .ok_or(ReminderError::MissingDate(subject.id))?;
            Ok(gestation::age_since(delivered, as_of))
        }
    }
}

/// Due rules for one subject, paired with the age they were matched at.
pub fn due_for_subject(
    subject: &Subject,
    track: Track,
    as_of: NaiveDate,
) -> Result<Option<(GestationalAge, Vec<&'static ReminderRule>)>> {
    let Some(age) = track_age(subject, track, as_of)? else {
        return Ok(None);
    };
    let rules = find_due_rules(track, age.weeks);
    if rules.is_empty() {
        return Ok(None);
    }
    Ok(Some((age, rules)))
}
