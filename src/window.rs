//! Date windows for search queries and the time keys archive files are named by.

use std::fmt;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    SingleDay,
    TrailingWeek,
}

/// Inclusive, date-only search window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn compute(reference: NaiveDate, mode: WindowMode) -> Self {
        match mode {
            WindowMode::SingleDay => Self {
                start: reference,
                end: reference,
            },
            WindowMode::TrailingWeek => Self {
                // NaiveDate::MIN is the only date that can underflow here
                start: reference.checked_sub_days(Days::new(6)).unwrap_or(NaiveDate::MIN),
                end: reference,
            },
        }
    }

    /// First and last second of the window in UTC, the zone feed timestamps are compared in.
    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.from_utc_datetime(&self.start.and_time(NaiveTime::default()));
        let end = Utc.from_utc_datetime(&self.end.and_time(NaiveTime::default()))
            + chrono::Duration::seconds(86_399);
        (start, end)
    }

    pub fn contains_instant(&self, ts: DateTime<Utc>) -> bool {
        let (start, end) = self.utc_bounds();
        ts >= start && ts <= end
    }
}

/// How often a topic is digested, which decides both its window and its archive key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly,
}

impl Cadence {
    pub fn window_mode(self) -> WindowMode {
        match self {
            Cadence::Daily => WindowMode::SingleDay,
            Cadence::Weekly => WindowMode::TrailingWeek,
        }
    }
}

/// Daily runs cover yesterday, weekly runs the seven days up to today.
pub fn default_reference(cadence: Cadence, today: NaiveDate) -> NaiveDate {
    match cadence {
        Cadence::Daily => today.pred_opt().unwrap_or(today),
        Cadence::Weekly => today,
    }
}

/// Archive file stem: `2025-01-14` for daily digests, `2025-W03` for weekly ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKey {
    Day(NaiveDate),
    Week { year: i32, week: u32 },
}

impl TimeKey {
    pub fn for_cadence(cadence: Cadence, reference: NaiveDate) -> Self {
        match cadence {
            Cadence::Daily => TimeKey::Day(reference),
            Cadence::Weekly => {
                let iso = reference.iso_week();
                TimeKey::Week {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some((year, week)) = raw.split_once("-W") {
            let year: i32 = year.parse().ok()?;
            let week: u32 = week.parse().ok()?;
            // rejects week 53 in years that only have 52
            NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
            return Some(TimeKey::Week { year, week });
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(TimeKey::Day)
    }

    pub fn previous(&self) -> Option<Self> {
        match *self {
            TimeKey::Day(d) => d.pred_opt().map(TimeKey::Day),
            TimeKey::Week { year, week } => {
                let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
                let prev = monday.checked_sub_days(Days::new(7))?;
                Some(TimeKey::for_cadence(Cadence::Weekly, prev))
            }
        }
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeKey::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            TimeKey::Week { year, week } => write!(f, "{}-W{:02}", year, week),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn single_day_window_is_one_date() {
        let w = DateWindow::compute(date(2025, 3, 4), WindowMode::SingleDay);
        assert_eq!(w.start, date(2025, 3, 4));
        assert_eq!(w.end, date(2025, 3, 4));
    }

    #[test]
    fn trailing_week_spans_seven_days() {
        for reference in [date(2025, 3, 4), date(2024, 3, 2), date(2025, 1, 3)] {
            let w = DateWindow::compute(reference, WindowMode::TrailingWeek);
            assert_eq!(w.end, reference);
            assert_eq!((w.end - w.start).num_days(), 6);
        }
        let w = DateWindow::compute(date(2024, 3, 2), WindowMode::TrailingWeek);
        assert_eq!(w.start, date(2024, 2, 25));
    }

    #[test]
    fn utc_bounds_cover_whole_days() {
        let w = DateWindow::compute(date(2025, 3, 4), WindowMode::SingleDay);
        let (start, end) = w.utc_bounds();
        assert_eq!(start.to_rfc3339(), "2025-03-04T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-03-04T23:59:59+00:00");
        assert!(w.contains_instant(end));
        assert!(!w.contains_instant(end + chrono::Duration::seconds(1)));
        assert!(!w.contains_instant(start - chrono::Duration::seconds(1)));
    }

    #[test]
    fn week_keys_use_iso_week_year() {
        // 2024-12-30 is a Monday in ISO week 1 of 2025
        let key = TimeKey::for_cadence(Cadence::Weekly, date(2024, 12, 30));
        assert_eq!(key.to_string(), "2025-W01");
        assert_eq!(key.previous().unwrap().to_string(), "2024-W52");

        let key = TimeKey::for_cadence(Cadence::Weekly, date(2025, 3, 4));
        assert_eq!(key.to_string(), "2025-W10");
    }

    #[test]
    fn default_reference_depends_on_cadence() {
        assert_eq!(default_reference(Cadence::Daily, date(2025, 3, 1)), date(2025, 2, 28));
        assert_eq!(default_reference(Cadence::Weekly, date(2025, 3, 1)), date(2025, 3, 1));
    }

    #[test]
    fn parse_accepts_both_key_shapes() {
        assert_eq!(
            TimeKey::parse("2025-01-14"),
            Some(TimeKey::Day(date(2025, 1, 14)))
        );
        assert_eq!(
            TimeKey::parse("2025-W03"),
            Some(TimeKey::Week { year: 2025, week: 3 })
        );
        assert_eq!(TimeKey::parse("2025-W60"), None);
        assert_eq!(TimeKey::parse("yesterday"), None);
    }
}
