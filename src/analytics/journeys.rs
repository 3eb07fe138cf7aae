//! Journey reconstruction and path aggregation: rebuilds ordered
//! per-session journeys from flat event rows and ranks the navigation
//! paths, entry points, and exit points users take through content.

use crate::analytics::types::{
    CustomJourneyAnalysis, CustomJourneyRequest, EffectiveParams, EntryPoint, EventTypeCount,
    ExitPoint, JourneyAnalysis, JourneyStats, LengthBucket, PathEntry, Period, SessionGroup,
};
use crate::analytics::validate::QueryPlan;
use crate::analytics::{parse_date_ms, AnalyticsState};
use crate::config::EngineConfig;
use crate::error::AppResult;
use crate::stats;
use crate::store::queries::{self, SessionFilter};
use crate::store::{EventRow, SessionRow};
use chrono::{TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Event types counted as conversions when they appear anywhere in a journey.
const CONVERSION_EVENTS: [&str; 4] = ["like", "share", "comment", "bookmark"];

/// A path key covers at most this many leading steps.
const PATH_KEY_STEPS: usize = 5;

/// Cap on rows pulled by the ad hoc (POST) mode, which has no query plan.
const CUSTOM_MODE_LIMIT: i64 = 10_000;

static EVENT_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("page_view", "view"),
        ("scroll", "scroll"),
        ("click", "click"),
        ("like", "like"),
        ("share", "share"),
        ("comment", "comment"),
        ("bookmark", "bookmark"),
        ("search", "search"),
        ("reading_time", "reading"),
        ("reading_progress", "progress"),
        ("content_interaction", "interaction"),
        ("page_exit", "exit"),
    ])
});

/// One event projected into its journey, with resolved content metadata.
#[derive(Debug, Clone)]
pub struct JourneyStep {
    pub event_type: String,
    pub content_id: Option<String>,
    pub content_title: Option<String>,
    pub timestamp: i64,
    /// 1-based position within the journey.
    pub order: usize,
}

/// Ordered, length-bounded projection of one session's events. Derived for
/// the duration of a single aggregation pass, never persisted.
#[derive(Debug, Clone)]
pub struct Journey {
    pub session_id: String,
    pub user_id: Option<String>,
    pub steps: Vec<JourneyStep>,
    pub duration: i64,
    pub device_type: Option<String>,
    pub start_time: i64,
    pub end_time: Option<i64>,
}

pub async fn analyze(
    state: &AnalyticsState,
    days: i64,
    min_steps: usize,
    max_steps: usize,
    plan: &QueryPlan,
    config: &EngineConfig,
) -> AppResult<JourneyAnalysis> {
    let now = Utc::now();
    let since_ms = now.timestamp_millis() - days * 86_400_000;

    let (sessions, events, titles) = state
        .run_query(plan.timeout_ms, async {
            let sessions = queries::recent_sessions_with_events(
                &state.pool,
                since_ms,
                min_steps as i64,
                plan.limit,
            )
            .await?;
            let session_ids: Vec<String> =
                sessions.iter().map(|s| s.session_id.clone()).collect();
            let events = queries::events_for_sessions(&state.pool, &session_ids, None).await?;

            let mut content_ids: Vec<String> =
                events.iter().filter_map(|e| e.content_id.clone()).collect();
            content_ids.sort_unstable();
            content_ids.dedup();
            let titles = state.titles.resolve(&state.pool, content_ids).await?;

            Ok((sessions, events, titles))
        })
        .await?;

    let journeys = build_journeys(&sessions, events, &titles, min_steps, max_steps);

    let (top_journeys, unique_paths) =
        aggregate_paths(&journeys, config.user_journeys.max_paths_to_show);
    Ok(JourneyAnalysis {
        top_journeys,
        top_entry_points: entry_points(&journeys),
        top_exit_points: exit_points(&journeys),
        length_distribution: length_distribution(&journeys),
        stats: journey_stats(&journeys, sessions.len(), unique_paths),
        period: Period::ending_at(days, now),
        effective: EffectiveParams {
            days,
            limit: plan.limit,
            min_steps: Some(min_steps),
            max_steps: Some(max_steps),
        },
    })
}

/// Rebuild journeys from flat rows. Events arrive ascending by timestamp;
/// each journey takes the first `max_steps` of its session's events, and
/// the `min_steps` floor applies after that truncation, so a long session
/// whose truncated prefix still clears the floor is kept.
pub(crate) fn build_journeys(
    sessions: &[SessionRow],
    events: Vec<EventRow>,
    titles: &HashMap<String, String>,
    min_steps: usize,
    max_steps: usize,
) -> Vec<Journey> {
    let mut by_session: HashMap<String, Vec<EventRow>> = HashMap::new();
    for event in events {
        by_session
            .entry(event.session_id.clone())
            .or_default()
            .push(event);
    }

    sessions
        .iter()
        .filter_map(|session| {
            let session_events = by_session.remove(&session.session_id).unwrap_or_default();
            let steps: Vec<JourneyStep> = session_events
                .into_iter()
                .take(max_steps)
                .enumerate()
                .map(|(i, event)| JourneyStep {
                    content_title: event
                        .content_id
                        .as_ref()
                        .and_then(|id| titles.get(id).cloned()),
                    event_type: event.event_type,
                    content_id: event.content_id,
                    timestamp: event.timestamp,
                    order: i + 1,
                })
                .collect();

            (steps.len() >= min_steps).then(|| Journey {
                session_id: session.session_id.clone(),
                user_id: session.user_id.clone(),
                steps,
                duration: session.duration.unwrap_or(0),
                device_type: session.device_type.clone(),
                start_time: session.start_time,
                end_time: session.end_time,
            })
        })
        .collect()
}

pub(crate) fn event_label<'a>(event_type: &'a str) -> &'a str {
    EVENT_LABELS.get(event_type).copied().unwrap_or(event_type)
}

fn step_label(step: &JourneyStep) -> String {
    if step.event_type == "page_view" {
        if let Some(title) = &step.content_title {
            let truncated: String = title.chars().take(30).collect();
            return format!("📄 {truncated}...");
        }
    }
    event_label(&step.event_type).to_string()
}

/// Two journeys share a path key iff their first five rendered steps are
/// textually identical.
pub(crate) fn path_key(journey: &Journey) -> String {
    journey
        .steps
        .iter()
        .take(PATH_KEY_STEPS)
        .map(step_label)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Entry/exit points use the resolved title when the step references known
/// content, otherwise the event label.
fn point_label(step: &JourneyStep) -> String {
    step.content_title
        .clone()
        .unwrap_or_else(|| event_label(&step.event_type).to_string())
}

struct PathAgg {
    count: usize,
    total_duration: i64,
    total_steps: usize,
    devices: Vec<(String, usize)>,
}

fn aggregate_paths(journeys: &[Journey], max_paths: usize) -> (Vec<PathEntry>, usize) {
    let mut paths: Vec<(String, PathAgg)> = Vec::new();
    for journey in journeys {
        let key = path_key(journey);
        let idx = match paths.iter().position(|(k, _)| *k == key) {
            Some(i) => i,
            None => {
                paths.push((
                    key,
                    PathAgg {
                        count: 0,
                        total_duration: 0,
                        total_steps: 0,
                        devices: Vec::new(),
                    },
                ));
                paths.len() - 1
            }
        };
        let agg = &mut paths[idx].1;
        agg.count += 1;
        agg.total_duration += journey.duration;
        agg.total_steps += journey.steps.len();
        if let Some(device) = &journey.device_type {
            match agg.devices.iter().position(|(d, _)| d == device) {
                Some(i) => agg.devices[i].1 += 1,
                None => agg.devices.push((device.clone(), 1)),
            }
        }
    }

    let unique_paths = paths.len();
    let total = journeys.len();
    let mut entries: Vec<PathEntry> = paths
        .into_iter()
        .map(|(path, agg)| PathEntry {
            path,
            count: agg.count,
            percentage: stats::percentage(agg.count, total),
            avg_duration: (agg.total_duration as f64 / agg.count as f64).round() as i64,
            avg_steps: (agg.total_steps as f64 / agg.count as f64).round() as i64,
            top_device: stats::most_common(&agg.devices)
                .unwrap_or("unknown")
                .to_string(),
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries.truncate(max_paths);
    (entries, unique_paths)
}

fn entry_points(journeys: &[Journey]) -> Vec<EntryPoint> {
    let labels: Vec<String> = journeys
        .iter()
        .filter_map(|j| j.steps.first().map(point_label))
        .collect();
    ranked_points(&labels, journeys.len())
        .into_iter()
        .map(|(entry, count, percentage)| EntryPoint {
            entry,
            count,
            percentage,
        })
        .collect()
}

fn exit_points(journeys: &[Journey]) -> Vec<ExitPoint> {
    let labels: Vec<String> = journeys
        .iter()
        .filter_map(|j| j.steps.last().map(point_label))
        .collect();
    ranked_points(&labels, journeys.len())
        .into_iter()
        .map(|(exit, count, percentage)| ExitPoint {
            exit,
            count,
            percentage,
        })
        .collect()
}

fn ranked_points(labels: &[String], total: usize) -> Vec<(String, usize, i64)> {
    let mut tally = stats::ordered_tally(labels.iter().map(String::as_str));
    tally.sort_by(|a, b| b.1.cmp(&a.1));
    tally
        .into_iter()
        .take(10)
        .map(|(label, count)| (label, count, stats::percentage(count, total)))
        .collect()
}

fn length_distribution(journeys: &[Journey]) -> Vec<LengthBucket> {
    let total = journeys.len();
    (2..=10)
        .map(|length| {
            let count = journeys.iter().filter(|j| j.steps.len() == length).count();
            LengthBucket {
                length,
                count,
                percentage: stats::percentage(count, total),
            }
        })
        .collect()
}

fn journey_stats(journeys: &[Journey], total_sessions: usize, unique_paths: usize) -> JourneyStats {
    let total = journeys.len();
    let total_length: usize = journeys.iter().map(|j| j.steps.len()).sum();
    let total_duration: i64 = journeys.iter().map(|j| j.duration).sum();

    let device_tally = stats::ordered_tally(
        journeys
            .iter()
            .filter_map(|j| j.device_type.as_deref()),
    );

    JourneyStats {
        total_journeys: total,
        total_sessions,
        avg_journey_length: if total == 0 {
            0
        } else {
            (total_length as f64 / total as f64).round() as i64
        },
        avg_journey_duration: if total == 0 {
            0
        } else {
            (total_duration as f64 / total as f64).round() as i64
        },
        unique_paths,
        most_common_device: stats::most_common(&device_tally)
            .unwrap_or("unknown")
            .to_string(),
        conversion_events: journeys
            .iter()
            .filter(|j| {
                j.steps
                    .iter()
                    .any(|s| CONVERSION_EVENTS.contains(&s.event_type.as_str()))
            })
            .count(),
    }
}

/// Ad hoc analysis: caller-supplied filters and grouping over raw
/// sessions/events, without journey reconstruction.
pub async fn analyze_custom(
    state: &AnalyticsState,
    req: CustomJourneyRequest,
    config: &EngineConfig,
) -> AppResult<CustomJourneyAnalysis> {
    let filter = SessionFilter {
        start_ms: parse_date_ms(req.filters.start_date.as_deref())?,
        end_ms: parse_date_ms(req.filters.end_date.as_deref())?,
        device_type: req.filters.device_type.clone(),
        browser: None,
        country: None,
        user_id: req.filters.user_id.clone(),
        min_duration: req.filters.min_duration,
        max_duration: None,
    };

    let (sessions, events) = state
        .run_query(config.performance.query_timeout_ms, async {
            let sessions =
                queries::filtered_sessions(&state.pool, filter, CUSTOM_MODE_LIMIT).await?;
            let session_ids: Vec<String> =
                sessions.iter().map(|s| s.session_id.clone()).collect();
            let events = queries::events_for_sessions(
                &state.pool,
                &session_ids,
                req.filters.event_types.clone(),
            )
            .await?;
            Ok((sessions, events))
        })
        .await?;

    let grouped_analysis = req
        .group_by
        .as_deref()
        .map(|group_by| group_sessions(&sessions, group_by));

    Ok(CustomJourneyAnalysis {
        total_sessions: sessions.len(),
        total_events: events.len(),
        grouped_analysis,
        top_events: top_events(&events),
    })
}

fn group_sessions(sessions: &[SessionRow], group_by: &str) -> Vec<SessionGroup> {
    let mut groups: Vec<(String, Vec<&SessionRow>)> = Vec::new();
    for session in sessions {
        let key = match group_by {
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
            "hour" => Utc
                .timestamp_millis_opt(session.start_time)
                .single()
                .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
                .hour()
                .to_string(),
            _ => "unknown".to_string(),
        };
        match groups.iter().position(|(k, _)| *k == key) {
            Some(i) => groups[i].1.push(session),
            None => groups.push((key, vec![session])),
        }
    }

    groups
        .into_iter()
        .map(|(group, members)| {
            let count = members.len();
            let total_duration: i64 = members.iter().map(|s| s.duration.unwrap_or(0)).sum();
            SessionGroup {
                group,
                session_count: count,
                avg_duration: (total_duration as f64 / count as f64).round() as i64,
            }
        })
        .collect()
}

fn top_events(events: &[EventRow]) -> Vec<EventTypeCount> {
    let total = events.len();
    let mut tally = stats::ordered_tally(events.iter().map(|e| e.event_type.as_str()));
    tally.sort_by(|a, b| b.1.cmp(&a.1));
    tally
        .into_iter()
        .take(10)
        .map(|(event_type, count)| EventTypeCount {
            event: event_label(&event_type).to_string(),
            count,
            percentage: stats::percentage(count, total),
        })
        .collect()
}
