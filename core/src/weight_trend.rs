//! Weight history as raw points or as week/month/quarter/year averages.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::clock::start_of_week;
use crate::error::VitalsError;
use crate::models::{WeightEntry, round_places};

pub const DEFAULT_HISTORY_DAYS: i64 = 90;
pub const WEEKLY_LOOKBACK_DAYS: i64 = 56;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub weight: f64,
    /// Difference from the previous point; always null for averages.
    pub change: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Week,
    Month,
    Quarter,
    Year,
}

impl FromStr for Aggregation {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            _ => Err(VitalsError::validation(format!(
                "Invalid aggregation '{s}'. Must be one of: week, month, quarter, year"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryQuery {
    Range { start: NaiveDate, end: NaiveDate },
    LastDays(i64),
    Aggregated(Aggregation),
    Limit(usize),
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self::LastDays(DEFAULT_HISTORY_DAYS)
    }
}

impl HistoryQuery {
    /// Resolve request parameters. Aggregation beats limit, limit beats an
    /// explicit range, a range beats `days`. A range needs both ends.
    #[must_use]
    pub fn from_params(
        days: Option<i64>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        aggregation: Option<Aggregation>,
        limit: Option<usize>,
    ) -> Self {
        if let Some(agg) = aggregation {
            return Self::Aggregated(agg);
        }
        if let Some(n) = limit {
            return Self::Limit(n);
        }
        if let (Some(start), Some(end)) = (start, end) {
            return Self::Range { start, end };
        }
        match days {
            Some(n) if n > 0 => Self::LastDays(n),
            _ => Self::default(),
        }
    }

    /// Inclusive bounds of the rows this query can touch, for narrowing the fetch.
    #[must_use]
    pub fn date_bounds(&self, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match *self {
            Self::Range { start, end } => (Some(start), Some(end)),
            Self::LastDays(n) => (days_before(today, n), None),
            Self::Aggregated(Aggregation::Week) => (Some(week_cutoff(today)), None),
            Self::Aggregated(Aggregation::Month) => (
                NaiveDate::from_ymd_opt(today.year(), 1, 1),
                NaiveDate::from_ymd_opt(today.year(), 12, 31),
            ),
            Self::Aggregated(Aggregation::Quarter) => (
                NaiveDate::from_ymd_opt(today.year() - 1, 1, 1),
                NaiveDate::from_ymd_opt(today.year() + 1, 12, 31),
            ),
            Self::Aggregated(Aggregation::Year) | Self::Limit(_) => (None, None),
        }
    }
}

/// `today - n days`, or `None` when that falls outside the calendar range,
/// which callers treat as "no lower bound".
fn days_before(today: NaiveDate, n: i64) -> Option<NaiveDate> {
    Duration::try_days(n).and_then(|d| today.checked_sub_signed(d))
}

/// Compute the trend for `query`. `entries` may be in any order and may
/// include rows outside the query's range.
#[must_use]
pub fn trend(query: &HistoryQuery, today: NaiveDate, entries: &[WeightEntry]) -> Vec<TrendPoint> {
    match *query {
        HistoryQuery::Range { start, end } => {
            raw_points(entries.iter().filter(|e| e.date >= start && e.date <= end))
        }
        HistoryQuery::LastDays(n) => {
            let cutoff = days_before(today, n);
            raw_points(entries.iter().filter(|e| cutoff.is_none_or(|c| e.date >= c)))
        }
        HistoryQuery::Limit(n) => latest_dates(entries, n),
        HistoryQuery::Aggregated(Aggregation::Week) => weekly(today, entries),
        HistoryQuery::Aggregated(Aggregation::Month) => monthly(today, entries),
        HistoryQuery::Aggregated(Aggregation::Quarter) => quarterly(today, entries),
        HistoryQuery::Aggregated(Aggregation::Year) => yearly(entries),
    }
}

/// One point per entry, ascending, with day-over-day change.
fn raw_points<'a>(entries: impl Iterator<Item = &'a WeightEntry>) -> Vec<TrendPoint> {
    let mut sorted: Vec<&WeightEntry> = entries.collect();
    sorted.sort_by_key(|e| (e.date, e.id));

    let mut points = Vec::with_capacity(sorted.len());
    let mut previous: Option<f64> = None;
    for entry in sorted {
        points.push(TrendPoint {
            date: entry.date,
            weight: entry.weight,
            change: previous.map(|p| round_places(entry.weight - p, 2)),
        });
        previous = Some(entry.weight);
    }
    points
}

/// The `n` most recent dates with data, one entry per date (the most
/// recently created wins), ascending.
fn latest_dates(entries: &[WeightEntry], n: usize) -> Vec<TrendPoint> {
    let mut by_date: BTreeMap<NaiveDate, &WeightEntry> = BTreeMap::new();
    for entry in entries {
        by_date
            .entry(entry.date)
            .and_modify(|current| {
                if (entry.created_at.as_str(), entry.id) > (current.created_at.as_str(), current.id) {
                    *current = entry;
                }
            })
            .or_insert(entry);
    }
    let skip = by_date.len().saturating_sub(n);
    raw_points(by_date.into_values().skip(skip))
}

fn week_cutoff(today: NaiveDate) -> NaiveDate {
    start_of_week(today) - Duration::days(WEEKLY_LOOKBACK_DAYS)
}

#[allow(clippy::cast_precision_loss)]
fn mean(weights: &[f64]) -> f64 {
    weights.iter().sum::<f64>() / weights.len() as f64
}

fn averaged<K: Ord>(buckets: BTreeMap<K, Vec<f64>>, to_date: impl Fn(&K) -> Option<NaiveDate>) -> Vec<TrendPoint> {
    buckets
        .iter()
        .filter_map(|(key, weights)| {
            Some(TrendPoint {
                date: to_date(key)?,
                weight: round_places(mean(weights), 1),
                change: None,
            })
        })
        .collect()
}

/// Seven-day buckets counted from a cutoff eight weeks before this week's
/// Monday. The current week forms the last bucket.
fn weekly(today: NaiveDate, entries: &[WeightEntry]) -> Vec<TrendPoint> {
    let cutoff = week_cutoff(today);
    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.date >= cutoff) {
        let bucket = (entry.date - cutoff).num_days().div_euclid(7);
        buckets.entry(bucket).or_default().push(entry.weight);
    }
    averaged(buckets, |bucket| {
        Some(start_of_week(cutoff + Duration::days(bucket * 7)))
    })
}

fn monthly(today: NaiveDate, entries: &[WeightEntry]) -> Vec<TrendPoint> {
    let year = today.year();
    let mut buckets: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.date.year() == year) {
        buckets.entry(entry.date.month()).or_default().push(entry.weight);
    }
    averaged(buckets, |month| NaiveDate::from_ymd_opt(year, *month, 1))
}

fn quarterly(today: NaiveDate, entries: &[WeightEntry]) -> Vec<TrendPoint> {
    let years = (today.year() - 1)..=(today.year() + 1);
    let mut buckets: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| years.contains(&e.date.year())) {
        let quarter = (entry.date.month() - 1) / 3 + 1;
        buckets
            .entry((entry.date.year(), quarter))
            .or_default()
            .push(entry.weight);
    }
    averaged(buckets, |(year, quarter)| {
        NaiveDate::from_ymd_opt(*year, (quarter - 1) * 3 + 1, 1)
    })
}

fn yearly(entries: &[WeightEntry]) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for entry in entries {
        buckets.entry(entry.date.year()).or_default().push(entry.weight);
    }
    averaged(buckets, |year| NaiveDate::from_ymd_opt(*year, 1, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weight(id: i64, date: NaiveDate, kg: f64) -> WeightEntry {
        WeightEntry {
            id,
            user_id: 1,
            date,
            weight: kg,
            created_at: format!("2024-01-01T00:00:{id:02}+00:00"),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_raw_points_change() {
        let today = day(2024, 6, 15);
        let entries = vec![
            weight(2, day(2024, 6, 14), 79.6),
            weight(1, day(2024, 6, 13), 80.0),
            weight(3, day(2024, 6, 15), 79.9),
        ];
        let points = trend(&HistoryQuery::default(), today, &entries);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, day(2024, 6, 13));
        assert_eq!(points[0].change, None);
        assert!((points[1].change.unwrap() + 0.4).abs() < 1e-9);
        assert!((points[2].change.unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_last_days_window() {
        let today = day(2024, 6, 15);
        let entries = vec![
            weight(1, day(2024, 3, 1), 82.0),
            weight(2, day(2024, 6, 5), 80.0),
            weight(3, day(2024, 6, 15), 79.0),
        ];
        let points = trend(&HistoryQuery::LastDays(10), today, &entries);
        let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(2024, 6, 5), day(2024, 6, 15)]);
        // first point in the returned set has no change even if older data exists
        assert_eq!(points[0].change, None);

        let default = trend(&HistoryQuery::default(), today, &entries);
        assert_eq!(default.len(), 2);
    }

    #[test]
    fn test_huge_day_window_is_unbounded() {
        let today = day(2024, 6, 15);
        let entries = vec![
            weight(1, day(1990, 1, 1), 90.0),
            weight(2, day(2024, 6, 15), 79.0),
        ];
        for days in [100_000_000, i64::MAX] {
            let query = HistoryQuery::from_params(Some(days), None, None, None, None);
            assert_eq!(query, HistoryQuery::LastDays(days));
            assert_eq!(query.date_bounds(today), (None, None));
            let points = trend(&query, today, &entries);
            assert_eq!(points.len(), 2);
            assert!((points[1].change.unwrap() + 11.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_explicit_range_inclusive() {
        let entries = vec![
            weight(1, day(2024, 1, 1), 82.0),
            weight(2, day(2024, 1, 5), 81.0),
            weight(3, day(2024, 1, 10), 80.0),
        ];
        let query = HistoryQuery::Range {
            start: day(2024, 1, 1),
            end: day(2024, 1, 5),
        };
        let points = trend(&query, day(2024, 6, 1), &entries);
        assert_eq!(points.len(), 2);
        assert!((points[1].change.unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_limit_returns_most_recent_ascending() {
        let today = day(2024, 6, 15);
        let entries: Vec<WeightEntry> = (0..7)
            .map(|i| weight(i, today - Duration::days(6 - i), 80.0 - 0.1 * i as f64))
            .collect();
        let points = trend(&HistoryQuery::Limit(5), today, &entries);
        assert_eq!(points.len(), 5);
        assert_eq!(points[0].date, today - Duration::days(4));
        assert_eq!(points[4].date, today);
        assert!(points.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_limit_collapses_same_date_latest_created_wins() {
        let today = day(2024, 6, 15);
        let entries = vec![
            weight(1, today, 80.0),
            weight(5, today, 79.0),
            weight(3, today - Duration::days(1), 81.0),
        ];
        let points = trend(&HistoryQuery::Limit(10), today, &entries);
        assert_eq!(points.len(), 2);
        assert!((points[1].weight - 79.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_limit_zero_is_empty() {
        let entries = vec![weight(1, day(2024, 6, 15), 80.0)];
        assert!(trend(&HistoryQuery::Limit(0), day(2024, 6, 15), &entries).is_empty());
    }

    #[test]
    fn test_weekly_buckets() {
        // Wednesday; this week's Monday is June 10, cutoff is April 15
        let today = day(2024, 6, 12);
        let entries = vec![
            weight(1, day(2024, 4, 14), 90.0),
            weight(2, day(2024, 4, 15), 84.0),
            weight(3, day(2024, 4, 17), 83.0),
            weight(4, day(2024, 5, 1), 82.0),
            weight(5, day(2024, 6, 11), 80.0),
        ];
        let points = trend(&HistoryQuery::Aggregated(Aggregation::Week), today, &entries);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, day(2024, 4, 15));
        assert!((points[0].weight - 83.5).abs() < 1e-9);
        assert_eq!(points[1].date, day(2024, 4, 29));
        assert_eq!(points[2].date, day(2024, 6, 10));
        assert!(points.iter().all(|p| p.change.is_none()));
    }

    #[test]
    fn test_monthly_current_year_only() {
        let today = day(2024, 6, 12);
        let entries = vec![
            weight(1, day(2023, 12, 31), 90.0),
            weight(2, day(2024, 1, 3), 85.0),
            weight(3, day(2024, 1, 20), 84.0),
            weight(4, day(2024, 3, 2), 83.33),
        ];
        let points = trend(&HistoryQuery::Aggregated(Aggregation::Month), today, &entries);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, day(2024, 1, 1));
        assert!((points[0].weight - 84.5).abs() < 1e-9);
        assert_eq!(points[1].date, day(2024, 3, 1));
        assert!((points[1].weight - 83.3).abs() < 1e-9);
    }

    #[test]
    fn test_quarterly_three_years() {
        let today = day(2024, 6, 12);
        let entries = vec![
            weight(1, day(2022, 5, 1), 99.0),
            weight(2, day(2023, 11, 1), 90.0),
            weight(3, day(2024, 4, 1), 86.0),
            weight(4, day(2024, 6, 30), 84.0),
            weight(5, day(2025, 1, 15), 80.0),
        ];
        let points = trend(&HistoryQuery::Aggregated(Aggregation::Quarter), today, &entries);
        let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![day(2023, 10, 1), day(2024, 4, 1), day(2025, 1, 1)]
        );
        assert!((points[1].weight - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_yearly_all_years() {
        let entries = vec![
            weight(1, day(2019, 5, 1), 99.0),
            weight(2, day(2024, 1, 1), 86.0),
            weight(3, day(2024, 12, 31), 84.0),
        ];
        let points = trend(
            &HistoryQuery::Aggregated(Aggregation::Year),
            day(2024, 6, 12),
            &entries,
        );
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, day(2019, 1, 1));
        assert!((points[1].weight - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_params_precedence() {
        let s = Some(day(2024, 1, 1));
        let e = Some(day(2024, 2, 1));
        assert_eq!(
            HistoryQuery::from_params(Some(7), s, e, Some(Aggregation::Year), Some(3)),
            HistoryQuery::Aggregated(Aggregation::Year)
        );
        assert_eq!(
            HistoryQuery::from_params(Some(7), s, e, None, Some(3)),
            HistoryQuery::Limit(3)
        );
        assert_eq!(
            HistoryQuery::from_params(Some(7), s, e, None, None),
            HistoryQuery::Range {
                start: day(2024, 1, 1),
                end: day(2024, 2, 1)
            }
        );
        assert_eq!(
            HistoryQuery::from_params(Some(7), s, None, None, None),
            HistoryQuery::LastDays(7)
        );
        assert_eq!(
            HistoryQuery::from_params(Some(0), None, None, None, None),
            HistoryQuery::LastDays(DEFAULT_HISTORY_DAYS)
        );
    }

    #[test]
    fn test_aggregation_parse() {
        assert_eq!("Week".parse::<Aggregation>().unwrap(), Aggregation::Week);
        assert!("fortnight".parse::<Aggregation>().is_err());
    }

    #[test]
    fn test_trend_point_serializes_null_change() {
        let point = TrendPoint {
            date: day(2024, 6, 1),
            weight: 80.5,
            change: None,
        };
        let value = serde_json::to_value(point).unwrap();
        assert_eq!(value["date"], "2024-06-01");
        assert!(value["change"].is_null());
    }
}
