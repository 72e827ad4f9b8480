//! Gestational age arithmetic.
//!
//! Everything here is a pure function of the last menstrual period (LMP)
//! and a reference date. The expected delivery date is LMP + 280 days,
//! plain day arithmetic with no calendar-month steps.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::{ReminderError, Result};

pub const PREGNANCY_LENGTH_DAYS: i64 = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Trimester {
    First,
    Second,
    Third,
}

impl Trimester {
    /// Weeks 0-12 are the first trimester, 13-28 the second.
    pub fn from_weeks(weeks: u32) -> Self {
        match weeks {
            0..=12 => Self::First,
            13..=28 => Self::Second,
            _ => Self::Third,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GestationalAge {
    pub weeks: u32,
    pub days: u32,
    pub total_days: u32,
}

impl GestationalAge {
    pub fn from_total_days(total_days: u32) -> Self {
        Self {
            weeks: total_days / 7,
            days: total_days % 7,
            total_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PregnancyDetails {
    pub last_menstrual_period: NaiveDate,
    pub as_of: NaiveDate,
    pub gestational_age: GestationalAge,
    pub trimester: Trimester,
    pub expected_delivery_date: NaiveDate,
    pub days_until_delivery: i64,
    pub is_overdue: bool,
}

pub fn expected_delivery_date(lmp: NaiveDate) -> NaiveDate {
    lmp + Duration::days(PREGNANCY_LENGTH_DAYS)
}

/// Computes the pregnancy state on `as_of`. A future LMP is rejected.
pub fn calculate(lmp: NaiveDate, as_of: NaiveDate) -> Result<PregnancyDetails> {
    let elapsed = (as_of - lmp).num_days();
    if elapsed < 0 {
        return Err(ReminderError::FutureLmp { lmp, as_of });
    }

    let gestational_age = GestationalAge::from_total_days(elapsed as u32);
    let expected_delivery_date = expected_delivery_date(lmp);
    let days_until_delivery = (expected_delivery_date - as_of).num_days();

    Ok(PregnancyDetails {
        last_menstrual_period: lmp,
        as_of,
        gestational_age,
        trimester: Trimester::from_weeks(gestational_age.weeks),
        expected_delivery_date,
        days_until_delivery,
        is_overdue: days_until_delivery < 0,
    })
}

/// Whole weeks since `since`, or `None` when `since` lies in the future.
pub fn age_since(since: NaiveDate, as_of: NaiveDate) -> Option<GestationalAge> {
    let elapsed = (as_of - since).num_days();
    (elapsed >= 0).then(|| GestationalAge::from_total_days(elapsed as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn trimester_boundaries() {
        assert_eq!(Trimester::from_weeks(12).number(), 1);
        assert_eq!(Trimester::from_weeks(13).number(), 2);
        assert_eq!(Trimester::from_weeks(28).number(), 2);
        assert_eq!(Trimester::from_weeks(29).number(), 3);
    }

    #[test]
    fn seventy_days_is_ten_weeks() {
        let as_of = date(2024, 3, 11);
        let lmp = as_of - Duration::days(70);
        let details = calculate(lmp, as_of).unwrap();
        assert_eq!(details.gestational_age.weeks, 10);
        assert_eq!(details.gestational_age.days, 0);
        assert_eq!(details.gestational_age.total_days, 70);
    }

    #[test]
    fn scenario_from_january_first() {
        let details = calculate(date(2024, 1, 1), date(2024, 3, 11)).unwrap();
        assert_eq!(details.gestational_age.weeks, 10);
        assert_eq!(details.gestational_age.days, 0);
        assert_eq!(details.trimester, Trimester::First);
        assert_eq!(details.expected_delivery_date, date(2024, 10, 7));
        assert!(!details.is_overdue);
    }

    #[test]
    fn delivery_date_is_exactly_280_days_out() {
        for lmp in [date(2023, 5, 31), date(2024, 2, 29), date(2024, 12, 31)] {
            let edd = expected_delivery_date(lmp);
            assert_eq!((edd - lmp).num_days(), 280);
        }
    }

    #[test]
    fn weeks_and_days_add_up() {
        let lmp = date(2024, 1, 1);
        for offset in 0..300 {
            let age = calculate(lmp, lmp + Duration::days(offset))
                .unwrap()
                .gestational_age;
            assert_eq!(age.weeks * 7 + age.days, age.total_days);
            assert!(age.days <= 6);
        }
    }

    #[test]
    fn future_lmp_is_rejected() {
        let err = calculate(date(2024, 5, 2), date(2024, 5, 1)).unwrap_err();
        assert!(matches!(err, ReminderError::FutureLmp { .. }));
    }

    #[test]
    fn overdue_after_delivery_date() {
        let lmp = date(2024, 1, 1);
        let details = calculate(lmp, date(2024, 10, 10)).unwrap();
        assert_eq!(details.days_until_delivery, -3);
        assert!(details.is_overdue);
        assert_eq!(details.trimester, Trimester::Third);
    }

    #[test]
    fn age_since_future_date_is_none() {
        assert!(age_since(date(2024, 6, 1), date(2024, 5, 1)).is_none());
        assert_eq!(age_since(date(2024, 5, 1), date(2024, 6, 12)).unwrap().weeks, 6);
    }
}
