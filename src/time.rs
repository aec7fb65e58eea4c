use std::time::Duration;

use chrono::{Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use derive_new::new;

use crate::model::Timestamp;

/// The weekly report/reset instant: a weekday and wall-clock time expressed
/// in a fixed utc offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct WeeklySchedule {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

impl WeeklySchedule {
    /// The next boundary strictly after `now`.
    pub fn next_occurrence(&self, now: Timestamp) -> Timestamp {
        let local = now.with_timezone(&self.offset);

        let days_ahead = (i64::from(self.weekday.num_days_from_monday())
            - i64::from(local.weekday().num_days_from_monday()))
        .rem_euclid(7);

        let date = local.date_naive() + chrono::Duration::days(days_ahead);
        let candidate = date
            .and_time(self.time)
            .and_local_timezone(self.offset)
            .single()
            .expect("fixed offset conversions are unambiguous")
            .with_timezone(&Utc);

        if candidate > now {
            candidate
        } else {
            candidate + chrono::Duration::days(7)
        }
    }

    /// Time left until the next boundary.
    pub fn duration_until_next(&self, now: Timestamp) -> Duration {
        (self.next_occurrence(now) - now)
            .to_std()
            .expect("duration is positive since the next occurrence is in the future")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn schedule() -> WeeklySchedule {
        // Saturday 21:00 at +03:00, i.e. 18:00 utc.
        WeeklySchedule::new(
            Weekday::Sat,
            NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        )
    }

    #[test]
    fn boundary_later_in_the_same_week() {
        // Wednesday 2024-03-13, noon utc.
        let now = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();

        let next = schedule().next_occurrence(now);

        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 16, 18, 0, 0).unwrap());
    }

    #[test]
    fn boundary_already_passed_rolls_to_next_week() {
        // Saturday 2024-03-16, 19:30 utc is past 21:00 at +03:00.
        let now = Utc.with_ymd_and_hms(2024, 3, 16, 19, 30, 0).unwrap();

        let next = schedule().next_occurrence(now);

        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 23, 18, 0, 0).unwrap());
    }

    #[test]
    fn boundary_is_strictly_in_the_future() {
        let boundary = Utc.with_ymd_and_hms(2024, 3, 16, 18, 0, 0).unwrap();

        let next = schedule().next_occurrence(boundary);

        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2024, 3, 23, 18, 0, 0).unwrap(),
            "an occurrence at the exact boundary instant belongs to the next week"
        );
    }

    #[test]
    fn offset_shifts_the_utc_instant() {
        let west = WeeklySchedule::new(
            Weekday::Sat,
            NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            FixedOffset::west_opt(5 * 3600).unwrap(),
        );
        let now = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();

        let next = west.next_occurrence(now);

        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 17, 2, 0, 0).unwrap());
    }

    #[test]
    fn duration_until_next_matches_the_occurrence() {
        let now = Utc.with_ymd_and_hms(2024, 3, 16, 17, 0, 0).unwrap();

        let wait = schedule().duration_until_next(now);

        assert_eq!(wait, Duration::from_secs(3600));
    }
}
