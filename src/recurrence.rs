//! Calendar math for recurring templates and installment series.
//!
//! Every occurrence is computed from the template's original date (the
//! anchor), never from the previous occurrence, so a template dated on the
//! 31st lands on the last day of shorter months and returns to the 31st as
//! soon as the month allows it.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// How often a recurring template regenerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceRule {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceRule::Daily => "daily",
            RecurrenceRule::Weekly => "weekly",
            RecurrenceRule::Monthly => "monthly",
            RecurrenceRule::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(RecurrenceRule::Daily),
            "weekly" => Some(RecurrenceRule::Weekly),
            "monthly" => Some(RecurrenceRule::Monthly),
            "yearly" => Some(RecurrenceRule::Yearly),
            _ => None,
        }
    }

    /// The `n`-th occurrence counted from `anchor` (occurrence 0 is the anchor).
    ///
    /// Monthly and yearly rules fall back to the last day of the target month
    /// when the anchor's day does not exist there.
    pub fn nth_occurrence(self, anchor: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            RecurrenceRule::Daily => anchor.checked_add_days(Days::new(u64::from(n))),
            RecurrenceRule::Weekly => anchor.checked_add_days(Days::new(u64::from(n) * 7)),
            RecurrenceRule::Monthly => anchor.checked_add_months(Months::new(n)),
            RecurrenceRule::Yearly => anchor.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// First occurrence strictly after `after`, never the anchor itself.
    pub fn next_occurrence(self, anchor: NaiveDate, after: NaiveDate) -> Option<NaiveDate> {
        let mut n = self.periods_between(anchor, after).max(1);
        loop {
            let candidate = self.nth_occurrence(anchor, n)?;
            if candidate > after {
                return Some(candidate);
            }
            n = n.checked_add(1)?;
        }
    }

    /// Lower bound on the number of whole periods from `anchor` to `date`.
    fn periods_between(self, anchor: NaiveDate, date: NaiveDate) -> u32 {
        if date <= anchor {
            return 0;
        }
        let days = (date - anchor).num_days();
        let periods = match self {
            RecurrenceRule::Daily => days,
            RecurrenceRule::Weekly => days / 7,
            RecurrenceRule::Monthly => i64::from(months_between(anchor, date)),
            RecurrenceRule::Yearly => i64::from(date.year() - anchor.year()),
        };
        u32::try_from(periods.max(0)).unwrap_or(u32::MAX)
    }
}

/// Calendar months from `from`'s month to `to`'s month (ignores days).
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}

/// First and last day of the calendar month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date);
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn monthly_falls_back_to_last_day_of_february() {
        let anchor = d(2025, 1, 31);
        assert_eq!(
            RecurrenceRule::Monthly.next_occurrence(anchor, anchor),
            Some(d(2025, 2, 28))
        );

        let leap_anchor = d(2024, 1, 31);
        assert_eq!(
            RecurrenceRule::Monthly.next_occurrence(leap_anchor, leap_anchor),
            Some(d(2024, 2, 29))
        );
    }

    #[test]
    fn monthly_returns_to_anchor_day_after_short_month() {
        let anchor = d(2025, 1, 31);
        assert_eq!(
            RecurrenceRule::Monthly.next_occurrence(anchor, d(2025, 2, 28)),
            Some(d(2025, 3, 31))
        );
        assert_eq!(
            RecurrenceRule::Monthly.nth_occurrence(anchor, 3),
            Some(d(2025, 4, 30))
        );
    }

    #[test]
    fn yearly_leap_day_anchor() {
        let anchor = d(2024, 2, 29);
        assert_eq!(
            RecurrenceRule::Yearly.next_occurrence(anchor, anchor),
            Some(d(2025, 2, 28))
        );
        assert_eq!(
            RecurrenceRule::Yearly.nth_occurrence(anchor, 4),
            Some(d(2028, 2, 29))
        );
    }

    #[test]
    fn daily_and_weekly_step_from_anchor() {
        let anchor = d(2025, 3, 10);
        assert_eq!(
            RecurrenceRule::Daily.next_occurrence(anchor, d(2025, 3, 12)),
            Some(d(2025, 3, 13))
        );
        assert_eq!(
            RecurrenceRule::Weekly.next_occurrence(anchor, anchor),
            Some(d(2025, 3, 17))
        );
        assert_eq!(
            RecurrenceRule::Weekly.next_occurrence(anchor, d(2025, 3, 18)),
            Some(d(2025, 3, 24))
        );
    }

    #[test]
    fn next_occurrence_before_anchor_is_first_period() {
        let anchor = d(2025, 5, 15);
        assert_eq!(
            RecurrenceRule::Monthly.next_occurrence(anchor, d(2025, 1, 1)),
            Some(d(2025, 6, 15))
        );
    }

    #[test]
    fn month_bounds_cover_whole_month() {
        assert_eq!(month_bounds(d(2024, 2, 14)), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(month_bounds(d(2025, 12, 31)), (d(2025, 12, 1), d(2025, 12, 31)));
    }

    #[test]
    fn parses_known_rules_only() {
        assert_eq!(RecurrenceRule::parse("weekly"), Some(RecurrenceRule::Weekly));
        assert_eq!(RecurrenceRule::parse("hourly"), None);
    }
}
