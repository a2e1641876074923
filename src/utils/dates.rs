//! Calendar arithmetic on UTC dates.
//!
//! Due dates are timezone-naive calendar dates. Every comparison against
//! "today" uses the UTC date of the current instant, never a local one.

use chrono::{DateTime, Days, Months, NaiveDate, Utc};

use crate::models::RecurrenceInterval;

/// Pre-due reminders go out this many days before `due_date`.
pub const REMINDER_LEAD_DAYS: u64 = 2;

pub fn today_utc(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Due date that qualifies for a pre-due reminder when the sweep runs on `today`.
pub fn reminder_due_date(today: NaiveDate) -> Option<NaiveDate> {
    today.checked_add_days(Days::new(REMINDER_LEAD_DAYS))
}

/// Next occurrence of `date` one `interval` later.
///
/// Month-based intervals keep the day of month and clamp to the last day of
/// the target month when it is shorter (Jan 31 + 1 month = Feb 28/29).
/// Returns `None` only when the result would leave chrono's date range.
pub fn next_occurrence(date: NaiveDate, interval: RecurrenceInterval) -> Option<NaiveDate> {
    match interval {
        RecurrenceInterval::Weekly => date.checked_add_days(Days::new(7)),
        RecurrenceInterval::Biweekly => date.checked_add_days(Days::new(14)),
        RecurrenceInterval::Monthly => date.checked_add_months(Months::new(1)),
        RecurrenceInterval::Quarterly => date.checked_add_months(Months::new(3)),
        RecurrenceInterval::Yearly => date.checked_add_months(Months::new(12)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_based_intervals() {
        assert_eq!(
            next_occurrence(date(2024, 12, 28), RecurrenceInterval::Weekly),
            Some(date(2025, 1, 4))
        );
        assert_eq!(
            next_occurrence(date(2024, 2, 20), RecurrenceInterval::Biweekly),
            Some(date(2024, 3, 5))
        );
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        assert_eq!(
            next_occurrence(date(2024, 1, 31), RecurrenceInterval::Monthly),
            Some(date(2024, 2, 29))
        );
        assert_eq!(
            next_occurrence(date(2023, 1, 31), RecurrenceInterval::Monthly),
            Some(date(2023, 2, 28))
        );
        assert_eq!(
            next_occurrence(date(2024, 3, 31), RecurrenceInterval::Monthly),
            Some(date(2024, 4, 30))
        );
        assert_eq!(
            next_occurrence(date(2024, 1, 15), RecurrenceInterval::Monthly),
            Some(date(2024, 2, 15))
        );
    }

    #[test]
    fn test_quarterly_and_yearly_clamp() {
        assert_eq!(
            next_occurrence(date(2024, 11, 30), RecurrenceInterval::Quarterly),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            next_occurrence(date(2024, 2, 29), RecurrenceInterval::Yearly),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            next_occurrence(date(2023, 6, 10), RecurrenceInterval::Yearly),
            Some(date(2024, 6, 10))
        );
    }

    #[test]
    fn test_today_uses_utc_calendar_date() {
        // 23:30 UTC is already the next day in UTC+1 but must stay on the UTC date
        let now = Utc.with_ymd_and_hms(2024, 5, 31, 23, 30, 0).unwrap();
        assert_eq!(today_utc(now), date(2024, 5, 31));
        assert_eq!(reminder_due_date(today_utc(now)), Some(date(2024, 6, 2)));
    }
}
