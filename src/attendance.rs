use crate::model::{Attendance, AttendanceStatus, DayRecord, DayStats};
use chrono::NaiveDate;
use std::collections::HashSet;

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

pub fn parse_date_key(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_KEY_FORMAT)
}

impl Attendance {
    pub fn day(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.days.get(&date_key(date))
    }

    pub fn status(&self, date: NaiveDate, student_id: &str) -> Option<AttendanceStatus> {
        self.day(date).and_then(|d| d.get(student_id).copied())
    }

    /// True when the date has a non-empty Day Record. Display only.
    pub fn has_activity(&self, date: NaiveDate) -> bool {
        self.day(date).map(|d| !d.is_empty()).unwrap_or(false)
    }

    /// Toggle semantics: the same status again clears the entry, any other
    /// status overwrites it. Returns the resulting status.
    pub fn toggle(
        &mut self,
        date: NaiveDate,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Option<AttendanceStatus> {
        let key = date_key(date);
        let day = self.days.entry(key.clone()).or_default();
        let next = if day.get(student_id) == Some(&status) {
            day.remove(student_id);
            None
        } else {
            day.insert(student_id.to_string(), status);
            Some(status)
        };
        if day.is_empty() {
            self.days.remove(&key);
        }
        next
    }

    /// Unconditionally stamps `present` for every id. Returns how many ids were
    /// stamped.
    pub fn mark_present<'a, I>(&mut self, date: NaiveDate, student_ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ids = student_ids.into_iter().peekable();
        if ids.peek().is_none() {
            return 0;
        }
        let day = self.days.entry(date_key(date)).or_default();
        let mut stamped = 0;
        for id in ids {
            day.insert(id.to_string(), AttendanceStatus::Present);
            stamped += 1;
        }
        stamped
    }

    pub fn stats<'a, I>(&self, date: NaiveDate, student_ids: I) -> DayStats
    where
        I: IntoIterator<Item = &'a str>,
    {
        let day = self.day(date);
        let mut stats = DayStats::default();
        for id in student_ids {
            match day.and_then(|d| d.get(id)) {
                Some(AttendanceStatus::Present) => stats.present += 1,
                Some(AttendanceStatus::Absent) => stats.absent += 1,
                Some(AttendanceStatus::Late) => stats.late += 1,
                Some(AttendanceStatus::Excused) => stats.excused += 1,
                None => stats.none += 1,
            }
        }
        stats
    }

    /// Removes `student_id` from every Day Record and drops records left
    /// empty. Returns (entries removed, days removed).
    pub fn remove_student(&mut self, student_id: &str) -> (usize, usize) {
        let mut entries = 0;
        let mut emptied = 0;
        self.days.retain(|_, day| {
            if day.remove(student_id).is_some() {
                entries += 1;
                if day.is_empty() {
                    emptied += 1;
                    return false;
                }
            }
            true
        });
        (entries, emptied)
    }

    /// Keeps only entries whose student id is in `known`. Returns the number
    /// of entries dropped.
    pub fn retain_students(&mut self, known: &HashSet<&str>) -> usize {
        let mut dropped = 0;
        self.days.retain(|_, day| {
            let before = day.len();
            day.retain(|id, _| known.contains(id.as_str()));
            dropped += before - day.len();
            !day.is_empty()
        });
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn date_keys_are_plain_calendar_dates() {
        assert_eq!(date_key(d(2024, 3, 5)), "2024-03-05");
        assert_eq!(parse_date_key(" 2024-03-05 ").ok(), Some(d(2024, 3, 5)));
        assert!(parse_date_key("2024-3-5T00:00").is_err());
        assert!(parse_date_key("05/03/2024").is_err());
    }

    #[test]
    fn toggling_same_status_twice_clears_entry() {
        let mut a = Attendance::default();
        let date = d(2024, 3, 5);
        assert_eq!(a.toggle(date, "s1", AttendanceStatus::Absent), Some(AttendanceStatus::Absent));
        assert_eq!(a.toggle(date, "s1", AttendanceStatus::Absent), None);
        assert_eq!(a.status(date, "s1"), None);
        assert!(a.days.is_empty());
    }

    #[test]
    fn different_status_overwrites() {
        let mut a = Attendance::default();
        let date = d(2024, 3, 5);
        a.toggle(date, "s1", AttendanceStatus::Late);
        a.toggle(date, "s1", AttendanceStatus::Excused);
        let day = a.day(date).expect("day");
        assert_eq!(day.len(), 1);
        assert_eq!(day.get("s1"), Some(&AttendanceStatus::Excused));
    }

    #[test]
    fn clearing_one_student_keeps_others() {
        let mut a = Attendance::default();
        let date = d(2024, 3, 5);
        a.toggle(date, "s1", AttendanceStatus::Present);
        a.toggle(date, "s2", AttendanceStatus::Absent);
        a.toggle(date, "s1", AttendanceStatus::Present);
        assert_eq!(a.status(date, "s2"), Some(AttendanceStatus::Absent));
        assert!(a.has_activity(date));
    }

    #[test]
    fn mark_present_then_stats_counts_everyone_present() {
        let mut a = Attendance::default();
        let date = d(2024, 9, 16);
        a.toggle(date, "s2", AttendanceStatus::Absent);
        let ids = ["s1", "s2", "s3"];
        assert_eq!(a.mark_present(date, ids), 3);
        let stats = a.stats(date, ids);
        assert_eq!(
            stats,
            DayStats {
                present: 3,
                ..DayStats::default()
            }
        );
    }

    #[test]
    fn mark_present_with_no_ids_creates_nothing() {
        let mut a = Attendance::default();
        assert_eq!(a.mark_present(d(2024, 9, 16), std::iter::empty::<&str>()), 0);
        assert!(a.days.is_empty());
    }

    #[test]
    fn stats_put_every_student_in_one_bucket() {
        let mut a = Attendance::default();
        let date = d(2024, 1, 8);
        a.toggle(date, "a", AttendanceStatus::Present);
        a.toggle(date, "b", AttendanceStatus::Absent);
        a.toggle(date, "c", AttendanceStatus::Late);
        a.toggle(date, "d", AttendanceStatus::Excused);
        let ids = ["a", "b", "c", "d", "e"];
        let stats = a.stats(date, ids);
        assert_eq!((stats.present, stats.absent, stats.late, stats.excused), (1, 1, 1, 1));
        assert_eq!(stats.none, 1);
        assert_eq!(stats.total(), ids.len());
    }

    #[test]
    fn remove_student_drops_emptied_days_only() {
        let mut a = Attendance::default();
        a.toggle(d(2024, 3, 5), "s1", AttendanceStatus::Present);
        a.toggle(d(2024, 3, 6), "s1", AttendanceStatus::Late);
        a.toggle(d(2024, 3, 6), "s2", AttendanceStatus::Present);
        a.toggle(d(2024, 3, 7), "s2", AttendanceStatus::Absent);

        assert_eq!(a.remove_student("s1"), (2, 1));
        assert!(a.day(d(2024, 3, 5)).is_none());
        assert_eq!(a.status(d(2024, 3, 6), "s2"), Some(AttendanceStatus::Present));
        assert_eq!(a.status(d(2024, 3, 7), "s2"), Some(AttendanceStatus::Absent));
        assert_eq!(a.remove_student("s1"), (0, 0));
    }

    #[test]
    fn retain_students_drops_orphans() {
        let mut a = Attendance::default();
        a.toggle(d(2024, 3, 5), "gone", AttendanceStatus::Present);
        a.toggle(d(2024, 3, 6), "gone", AttendanceStatus::Present);
        a.toggle(d(2024, 3, 6), "kept", AttendanceStatus::Present);
        let known: HashSet<&str> = ["kept"].into_iter().collect();
        assert_eq!(a.retain_students(&known), 2);
        assert_eq!(a.days.len(), 1);
    }
}
