use chrono::{Datelike, NaiveDate};

use super::recurrence_model::RecurrenceRule;

/// Number of days in `month` (1-12) of `year`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Wanted day clamped to the last day of the month ("day 31" in February is the 28th/29th).
pub fn clamp_day(year: i32, month: u32, wanted_day: u32) -> u32 {
    wanted_day.max(1).min(days_in_month(year, month))
}

/// Signed number of calendar months from `from`'s month to `to`'s month. Days are ignored.
pub fn month_offset(from: NaiveDate, to: NaiveDate) -> i64 {
    (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64)
}

/// Due date `offset` months after the month of `anchor`, on the clamped wanted day.
pub fn due_date_at_offset(anchor: NaiveDate, offset: i64, wanted_day: u32) -> Option<NaiveDate> {
    let index = anchor.year() as i64 * 12 + (anchor.month0() as i64) + offset;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = (index.rem_euclid(12) + 1) as u32;
    NaiveDate::from_ymd_opt(year, month, clamp_day(year, month, wanted_day))
}

impl RecurrenceRule {
    /// All due dates inside `[window_start, window_end]`, ascending and without duplicates.
    ///
    /// Candidates are generated from the phase anchor's month in steps of the
    /// frequency, so only in-phase months are ever produced. The enumeration
    /// starts at the block containing `window_start`, which keeps the cost
    /// proportional to the window rather than to the distance from the anchor.
    pub fn due_dates(&self, window_start: NaiveDate, window_end: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        if window_start > window_end {
            return dates;
        }

        let step = self.frequency.step_months() as i64;
        let delta = month_offset(self.phase_anchor, window_start);
        let mut k = if delta < 0 { 0 } else { delta - delta % step };

        let mut current = match due_date_at_offset(self.phase_anchor, k, self.anchor_day) {
            Some(d) => d,
            None => return dates,
        };
        while current < window_start {
            k += step;
            current = match due_date_at_offset(self.phase_anchor, k, self.anchor_day) {
                Some(d) => d,
                None => return dates,
            };
        }

        while current <= window_end {
            if dates.last() != Some(&current) {
                dates.push(current);
            }
            k += step;
            current = match due_date_at_offset(self.phase_anchor, k, self.anchor_day) {
                Some(d) => d,
                None => break,
            };
        }
        dates
    }

    /// True when `date` is itself a due date of this rule.
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        let delta = month_offset(self.phase_anchor, date);
        if delta < 0 || delta % self.frequency.step_months() as i64 != 0 {
            return false;
        }
        date.day() == clamp_day(date.year(), date.month(), self.anchor_day)
    }
}
