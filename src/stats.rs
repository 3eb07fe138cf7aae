//! Pure numeric helpers shared by the analyzers. No I/O, no state.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Render a duration in the largest sensible unit, rounded. Boundaries are
/// strict `<` checks, so 3600 seconds is "1 hr", not "60 min".
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{seconds} sec")
    } else if seconds < 3600 {
        format!("{} min", (seconds as f64 / 60.0).round() as u64)
    } else if seconds < 86_400 {
        format!("{} hr", (seconds as f64 / 3600.0).round() as u64)
    } else {
        format!("{} day", (seconds as f64 / 86_400.0).round() as u64)
    }
}

/// Abbreviate large counts: 1_500_000 -> "1.5M", 1_500 -> "1.5K".
pub fn format_number(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// Rounded percentage change between two observations. Defined as 0 when
/// `previous` is 0 rather than an error.
pub fn percentage_change(current: f64, previous: f64) -> i64 {
    if previous == 0.0 {
        return 0;
    }
    ((current - previous) / previous * 100.0).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

pub fn trend_direction(change: i64) -> TrendDirection {
    if change > 5 {
        TrendDirection::Up
    } else if change < -5 {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePeriod {
    Hour,
    Day,
    Week,
    Month,
}

#[derive(Debug, Serialize)]
pub struct PeriodGroup<T> {
    pub period: String,
    pub items: Vec<T>,
    pub count: usize,
}

/// Bucket rows by their timestamp truncated to the requested granularity.
/// Week keys anchor to the start of the calendar week (Sunday). Group order
/// is unspecified; callers sort downstream if they care.
pub fn group_by_time_period<T, F>(
    rows: Vec<T>,
    period: TimePeriod,
    timestamp_of: F,
) -> Vec<PeriodGroup<T>>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    let mut groups: HashMap<String, Vec<T>> = HashMap::new();
    for row in rows {
        let ts = timestamp_of(&row);
        let key = period_key(ts, period);
        groups.entry(key).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(period, items)| {
            let count = items.len();
            PeriodGroup {
                period,
                items,
                count,
            }
        })
        .collect()
}

fn period_key(ts: DateTime<Utc>, period: TimePeriod) -> String {
    match period {
        TimePeriod::Hour => format!(
            "{:04}-{:02}-{:02}-{:02}",
            ts.year(),
            ts.month(),
            ts.day(),
            ts.hour()
        ),
        TimePeriod::Day => format!("{:04}-{:02}-{:02}", ts.year(), ts.month(), ts.day()),
        TimePeriod::Week => {
            let week_start = ts - ChronoDuration::days(ts.weekday().num_days_from_sunday() as i64);
            format!(
                "{:04}-{:02}-{:02}",
                week_start.year(),
                week_start.month(),
                week_start.day()
            )
        }
        TimePeriod::Month => format!("{:04}-{:02}", ts.year(), ts.month()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryStats {
    pub mean: i64,
    pub median: i64,
    pub mode: i64,
    pub min: i64,
    pub max: i64,
    pub std: i64,
}

/// Population statistics over integer samples. An empty input yields
/// all-zero fields; this is a deliberate contract, not an oversight.
pub fn calculate_stats(values: &[i64]) -> SummaryStats {
    if values.is_empty() {
        return SummaryStats {
            mean: 0,
            median: 0,
            mode: 0,
            min: 0,
            max: 0,
            std: 0,
        };
    }

    let n = values.len();
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mean = values.iter().sum::<i64>() as f64 / n as f64;
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    } else {
        sorted[n / 2] as f64
    };

    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;

    SummaryStats {
        mean: mean.round() as i64,
        median: median.round() as i64,
        mode: mode_first_encountered(values),
        min: sorted[0],
        max: sorted[n - 1],
        std: variance.sqrt().round() as i64,
    }
}

/// Rounded share of a total; 0 when the denominator is 0.
pub fn percentage(count: usize, total: usize) -> i64 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as i64
}

/// Count occurrences preserving first-encountered order, the deterministic
/// stand-in for iterating a JS `Map` in insertion order.
pub fn ordered_tally<'a, I>(values: I) -> Vec<(String, usize)>
where
    I: Iterator<Item = &'a str>,
{
    let mut tally: Vec<(String, usize)> = Vec::new();
    for value in values {
        match tally.iter().position(|(v, _)| v == value) {
            Some(i) => tally[i].1 += 1,
            None => tally.push((value.to_string(), 1)),
        }
    }
    tally
}

/// Highest-count entry of an ordered tally; ties break to the entry
/// encountered first.
pub fn most_common(tally: &[(String, usize)]) -> Option<&str> {
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in tally {
        if best.map_or(true, |(_, best_count)| *count > best_count) {
            best = Some((value, *count));
        }
    }
    best.map(|(value, _)| value)
}

/// Most frequent value; ties break to the value encountered first, which
/// keeps results deterministic for a given input order.
fn mode_first_encountered(values: &[i64]) -> i64 {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &v in values {
        *counts.entry(v).or_insert(0) += 1;
    }

    let mut best = values[0];
    let mut best_count = 0;
    let mut seen = HashSet::new();
    for &v in values {
        if !seen.insert(v) {
            continue;
        }
        let count = counts[&v];
        if count > best_count {
            best = v;
            best_count = count;
        }
    }
    best
}
