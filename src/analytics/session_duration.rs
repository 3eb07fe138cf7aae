//! Session-duration distribution: buckets closed sessions by how long they
//! lasted and summarizes the spread.

use crate::analytics::types::{
    BrowserStat, BucketCount, BucketRange, CustomBucketCount, CustomDurationAnalysis,
    CustomDurationRequest, DeviceStat, DurationAnalysis, DurationGroup, DurationStats,
    EffectiveParams, Period,
};
use crate::analytics::validate::QueryPlan;
use crate::analytics::{parse_date_ms, AnalyticsState};
use crate::config::{BucketSpec, EngineConfig};
use crate::error::AppResult;
use crate::stats;
use crate::store::queries::{self, SessionFilter};
use crate::store::SessionRow;
use chrono::{DateTime, TimeZone, Timelike, Utc};

/// Cap on rows pulled by the ad hoc (POST) mode, which has no query plan.
const CUSTOM_MODE_LIMIT: i64 = 20_000;

pub async fn analyze(
    state: &AnalyticsState,
    days: i64,
    plan: &QueryPlan,
    config: &EngineConfig,
) -> AppResult<DurationAnalysis> {
    let now = Utc::now();
    let since_ms = now.timestamp_millis() - days * 86_400_000;

    let sessions = state
        .run_query(
            plan.timeout_ms,
            queries::recent_closed_sessions(&state.pool, since_ms, plan.limit),
        )
        .await?;

    let durations = effective_durations(&sessions);
    Ok(DurationAnalysis {
        distribution: bucket_distribution(&durations, &config.session_duration.buckets),
        stats: duration_stats(&sessions, &durations),
        device_stats: device_breakdown(&sessions),
        browser_stats: browser_breakdown(&sessions),
        period: Period::ending_at(days, now),
        effective: EffectiveParams {
            days,
            limit: plan.limit,
            min_steps: None,
            max_steps: None,
        },
    })
}

/// Duration in seconds for each session: the stored value when present,
/// otherwise derived from start/end. Non-positive durations are dropped.
pub(crate) fn effective_durations(sessions: &[SessionRow]) -> Vec<i64> {
    sessions
        .iter()
        .filter_map(|session| {
            let duration = match session.duration {
                Some(d) => d,
                None => match session.end_time {
                    Some(end) => ((end - session.start_time) as f64 / 1000.0).round() as i64,
                    None => 0,
                },
            };
            (duration > 0).then_some(duration)
        })
        .collect()
}

/// Histogram over the configured buckets. Buckets are half-open
/// `(prev_max, max]` from an implicit floor of 0; the final `max: None`
/// bucket is unbounded, so the counts always sum to `durations.len()`.
pub(crate) fn bucket_distribution(durations: &[i64], buckets: &[BucketSpec]) -> Vec<BucketCount> {
    let total = durations.len();
    let mut distribution = Vec::with_capacity(buckets.len());
    let mut prev_max: u64 = 0;

    for bucket in buckets {
        let count = durations
            .iter()
            .filter(|&&d| {
                let d = d as u64;
                d > prev_max && bucket.max.map_or(true, |max| d <= max)
            })
            .count();
        distribution.push(BucketCount {
            label: bucket.label.clone(),
            count,
            percentage: stats::percentage(count, total),
            color: bucket.color.clone(),
            range: BucketRange {
                min: prev_max,
                max: bucket.max,
            },
        });
        if let Some(max) = bucket.max {
            prev_max = max;
        }
    }

    distribution
}

fn duration_stats(sessions: &[SessionRow], durations: &[i64]) -> DurationStats {
    let total = durations.len();
    let mut sorted = durations.to_vec();
    sorted.sort_unstable();

    DurationStats {
        total_sessions: sessions.len(),
        valid_durations: total,
        average_duration: if total == 0 {
            0
        } else {
            (durations.iter().sum::<i64>() as f64 / total as f64).round() as i64
        },
        median_duration: if total == 0 { 0 } else { sorted[total / 2] },
        min_duration: sorted.first().copied().unwrap_or(0),
        max_duration: sorted.last().copied().unwrap_or(0),
        bounce_rate: stats::percentage(
            sessions.iter().filter(|s| s.is_bounce).count(),
            sessions.len(),
        ),
    }
}

fn device_breakdown(sessions: &[SessionRow]) -> Vec<DeviceStat> {
    struct Agg {
        count: usize,
        total_duration: i64,
        total_page_views: i64,
    }

    let mut tallies: Vec<(String, Agg)> = Vec::new();
    for session in sessions {
        let device = session.device_type.as_deref().unwrap_or("unknown");
        match tallies.iter().position(|(d, _)| d == device) {
            Some(i) => {
                let agg = &mut tallies[i].1;
                agg.count += 1;
                agg.total_duration += session.duration.unwrap_or(0);
                agg.total_page_views += session.page_views;
            }
            None => tallies.push((
                device.to_string(),
                Agg {
                    count: 1,
                    total_duration: session.duration.unwrap_or(0),
                    total_page_views: session.page_views,
                },
            )),
        }
    }

    let total = sessions.len();
    let mut breakdown: Vec<DeviceStat> = tallies
        .into_iter()
        .map(|(device, agg)| DeviceStat {
            device,
            count: agg.count,
            avg_duration: (agg.total_duration as f64 / agg.count as f64).round() as i64,
            avg_page_views: (agg.total_page_views as f64 / agg.count as f64).round() as i64,
            percentage: stats::percentage(agg.count, total),
        })
        .collect();
    breakdown.sort_by(|a, b| b.count.cmp(&a.count));
    breakdown
}

fn browser_breakdown(sessions: &[SessionRow]) -> Vec<BrowserStat> {
    let total = sessions.len();
    let mut tally = stats::ordered_tally(
        sessions
            .iter()
            .map(|s| s.browser.as_deref().unwrap_or("unknown")),
    );
    tally.sort_by(|a, b| b.1.cmp(&a.1));
    tally
        .into_iter()
        .take(10)
        .map(|(browser, count)| BrowserStat {
            browser,
            count,
            percentage: stats::percentage(count, total),
        })
        .collect()
}

/// Ad hoc analysis: caller-supplied filters, grouping, and bucket layout.
pub async fn analyze_custom(
    state: &AnalyticsState,
    req: CustomDurationRequest,
    config: &EngineConfig,
) -> AppResult<CustomDurationAnalysis> {
    let filter = SessionFilter {
        start_ms: parse_date_ms(req.start_date.as_deref())?,
        end_ms: parse_date_ms(req.end_date.as_deref())?,
        device_type: req.filters.device_type.clone(),
        browser: req.filters.browser.clone(),
        country: req.filters.country.clone(),
        user_id: None,
        min_duration: req.filters.min_duration,
        max_duration: req.filters.max_duration,
    };

    let sessions = state
        .run_query(
            config.performance.query_timeout_ms,
            queries::filtered_sessions(&state.pool, filter, CUSTOM_MODE_LIMIT),
        )
        .await?;

    let grouped_analysis = req
        .group_by
        .as_deref()
        .map(|group_by| group_sessions(&sessions, group_by));

    let custom_distribution = req.custom_buckets.map(|buckets| {
        let durations = effective_durations(&sessions);
        let total = durations.len();
        let mut distribution = Vec::with_capacity(buckets.len());
        let mut prev_max: u64 = 0;
        for bucket in buckets {
            let count = durations
                .iter()
                .filter(|&&d| {
                    let d = d as u64;
                    d > prev_max && bucket.max.map_or(true, |max| d <= max)
                })
                .count();
            distribution.push(CustomBucketCount {
                label: bucket.label,
                count,
                percentage: stats::percentage(count, total),
                range: BucketRange {
                    min: prev_max,
                    max: bucket.max,
                },
            });
            if let Some(max) = bucket.max {
                prev_max = max;
            }
        }
        distribution
    });

    Ok(CustomDurationAnalysis {
        total_sessions: sessions.len(),
        grouped_analysis,
        custom_distribution,
    })
}

fn group_sessions(sessions: &[SessionRow], group_by: &str) -> Vec<DurationGroup> {
    let mut groups: Vec<(String, Vec<&SessionRow>)> = Vec::new();
    for session in sessions {
        let key = group_key(session, group_by);
        match groups.iter().position(|(k, _)| *k == key) {
            Some(i) => groups[i].1.push(session),
            None => groups.push((key, vec![session])),
        }
    }

    let mut out: Vec<DurationGroup> = groups
        .into_iter()
        .map(|(group, members)| {
            let count = members.len();
            let total_duration: i64 = members.iter().map(|s| s.duration.unwrap_or(0)).sum();
            let total_page_views: i64 = members.iter().map(|s| s.page_views).sum();
            let bounces = members.iter().filter(|s| s.is_bounce).count();
            DurationGroup {
                group,
                count,
                avg_duration: (total_duration as f64 / count as f64).round() as i64,
                avg_page_views: (total_page_views as f64 / count as f64).round() as i64,
                bounce_rate: stats::percentage(bounces, count),
            }
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

fn group_key(session: &SessionRow, group_by: &str) -> String {
    match group_by {
        "device" => session
            .device_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        "browser" => session
            .browser
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        "country" => session
            .country
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        "hour" => start_of(session).hour().to_string(),
        "day" => start_of(session).format("%Y-%m-%d").to_string(),
        _ => "unknown".to_string(),
    }
}

fn start_of(session: &SessionRow) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(session.start_time)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
