use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::VitalsError;
use crate::models::parse_date;

/// Zone that decides where one tracking day ends and the next begins.
pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::America::Los_Angeles;

/// Calendar date of `now` in `tz`.
#[must_use]
pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Monday of the ISO week containing `date`.
#[must_use]
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn parse_time_zone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| VitalsError::validation(format!("Unknown time zone '{name}'")).into())
}

/// Source of "today" for every date-relative computation.
///
/// Production code reads the wall clock in the reference zone; tests pin a date.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceClock {
    tz: Tz,
    pinned: Option<NaiveDate>,
}

impl Default for ReferenceClock {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_ZONE)
    }
}

impl ReferenceClock {
    #[must_use]
    pub fn new(tz: Tz) -> Self {
        Self { tz, pinned: None }
    }

    #[must_use]
    pub fn pinned(tz: Tz, today: NaiveDate) -> Self {
        Self {
            tz,
            pinned: Some(today),
        }
    }

    #[must_use]
    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.pinned
            .unwrap_or_else(|| today_in(self.tz, Utc::now()))
    }

    /// Parse an optional `YYYY-MM-DD` string, defaulting to today.
    pub fn date_or_today(&self, date: Option<&str>) -> Result<NaiveDate> {
        match date {
            Some(s) if !s.trim().is_empty() => parse_date(s),
            _ => Ok(self.today()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_today_in_pacific_lags_utc() {
        // 2024-03-01 05:30 UTC is still Feb 29 in Los Angeles
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 5, 30, 0).unwrap();
        assert_eq!(
            today_in(DEFAULT_TIME_ZONE, now),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            today_in(chrono_tz::UTC, now),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_today_in_respects_dst() {
        // PDT is UTC-7: 06:59 UTC on July 4th is 23:59 on July 3rd
        let now = Utc.with_ymd_and_hms(2024, 7, 4, 6, 59, 0).unwrap();
        assert_eq!(
            today_in(DEFAULT_TIME_ZONE, now),
            NaiveDate::from_ymd_opt(2024, 7, 3).unwrap()
        );
    }

    #[test]
    fn test_start_of_week() {
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(start_of_week(sunday), monday);
        assert_eq!(start_of_week(monday), monday);
    }

    #[test]
    fn test_pinned_clock() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let clock = ReferenceClock::pinned(DEFAULT_TIME_ZONE, day);
        assert_eq!(clock.today(), day);
        assert_eq!(clock.date_or_today(None).unwrap(), day);
        assert_eq!(clock.date_or_today(Some("")).unwrap(), day);
        assert_eq!(
            clock.date_or_today(Some("2024-12-25")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 25).unwrap()
        );
        assert!(clock.date_or_today(Some("yesterday")).is_err());
    }

    #[test]
    fn test_parse_time_zone() {
        assert_eq!(parse_time_zone("Europe/Berlin").unwrap(), chrono_tz::Europe::Berlin);
        assert!(parse_time_zone("Mars/Olympus").is_err());
    }
}
