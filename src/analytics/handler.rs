use crate::analytics::types::{
    CustomDurationRequest, CustomJourneyRequest, DurationQueryParams, JourneyQueryParams,
};
use crate::analytics::validate::{self, QueryType, RawQuery};
use crate::analytics::{journeys, session_duration, AnalyticsState};
use crate::cache;
use crate::config::ConfigPatch;
use crate::error::{AppError, AppResult};
use crate::export::{self, ExportFormat};
use crate::stats;
use crate::store::queries;
use axum::extract::{Query, State};
use axum::http::header;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

fn envelope(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

fn to_value<T: Serialize>(data: &T) -> AppResult<Value> {
    serde_json::to_value(data).map_err(|e| AppError::Internal(format!("serialize response: {e}")))
}

/// GET /v1/analytics/session-duration
pub async fn session_duration_analysis(
    State(state): State<Arc<AnalyticsState>>,
    Query(params): Query<DurationQueryParams>,
) -> AppResult<Json<Value>> {
    let config = state.config.snapshot();

    let raw = RawQuery {
        days: params.days,
        limit: params.limit,
        ..Default::default()
    };
    let errors = validate::validate(QueryType::SessionDuration, &raw, &config);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let days = params
        .days
        .unwrap_or(config.session_duration.default_period_days);
    let limit = params
        .limit
        .unwrap_or(config.session_duration.max_sessions_to_analyze);
    let plan = validate::optimize(QueryType::SessionDuration, limit, &config);

    let key = cache::cache_key(
        QueryType::SessionDuration.as_str(),
        &json!({ "days": days, "limit": plan.limit }),
    );
    if let Some(cached) = state.cache.get(&key, &config) {
        return Ok(envelope(cached));
    }

    let analysis = session_duration::analyze(&state, days, &plan, &config)
        .await
        .map_err(|e| {
            tracing::error!(days, limit = plan.limit, error = %e, "session duration analysis failed");
            e
        })?;
    let value = to_value(&analysis)?;
    state.cache.set(key, value.clone(), &config);
    Ok(envelope(value))
}

/// POST /v1/analytics/session-duration - ad hoc filters and buckets, never cached.
pub async fn custom_session_duration_analysis(
    State(state): State<Arc<AnalyticsState>>,
    Json(req): Json<CustomDurationRequest>,
) -> AppResult<Json<Value>> {
    let config = state.config.snapshot();
    let analysis = session_duration::analyze_custom(&state, req, &config)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "custom session duration analysis failed");
            e
        })?;
    Ok(envelope(to_value(&analysis)?))
}

/// GET /v1/analytics/user-journeys
pub async fn user_journeys_analysis(
    State(state): State<Arc<AnalyticsState>>,
    Query(params): Query<JourneyQueryParams>,
) -> AppResult<Json<Value>> {
    let config = state.config.snapshot();

    let raw = RawQuery {
        days: params.days,
        limit: params.limit,
        min_steps: params.min_steps,
        max_steps: params.max_steps,
    };
    let errors = validate::validate(QueryType::UserJourneys, &raw, &config);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let days = params
        .days
        .unwrap_or(config.user_journeys.default_period_days);
    let limit = params
        .limit
        .unwrap_or(config.user_journeys.max_sessions_to_analyze);
    let min_steps = params
        .min_steps
        .map(|v| v.max(0) as usize)
        .unwrap_or(config.user_journeys.min_steps);
    let max_steps = params
        .max_steps
        .map(|v| v.max(0) as usize)
        .unwrap_or(config.user_journeys.max_steps);
    let plan = validate::optimize(QueryType::UserJourneys, limit, &config);

    let key = cache::cache_key(
        QueryType::UserJourneys.as_str(),
        &json!({
            "days": days,
            "limit": plan.limit,
            "minSteps": min_steps,
            "maxSteps": max_steps,
        }),
    );
    if let Some(cached) = state.cache.get(&key, &config) {
        return Ok(envelope(cached));
    }

    let analysis = journeys::analyze(&state, days, min_steps, max_steps, &plan, &config)
        .await
        .map_err(|e| {
            tracing::error!(
                days,
                limit = plan.limit,
                min_steps,
                max_steps,
                error = %e,
                "journey analysis failed"
            );
            e
        })?;
    let value = to_value(&analysis)?;
    state.cache.set(key, value.clone(), &config);
    Ok(envelope(value))
}

/// POST /v1/analytics/user-journeys - ad hoc grouping, never cached.
pub async fn custom_user_journeys_analysis(
    State(state): State<Arc<AnalyticsState>>,
    Json(req): Json<CustomJourneyRequest>,
) -> AppResult<Json<Value>> {
    let config = state.config.snapshot();
    let analysis = journeys::analyze_custom(&state, req, &config)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "custom journey analysis failed");
            e
        })?;
    Ok(envelope(to_value(&analysis)?))
}

// ── Export ──

#[derive(Debug, Deserialize)]
pub struct ExportQueryParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub format: Option<String>,
    pub days: Option<i64>,
}

/// GET /v1/analytics/export - serialize recent rows for download.
pub async fn export_data(
    State(state): State<Arc<AnalyticsState>>,
    Query(params): Query<ExportQueryParams>,
) -> AppResult<(HeaderMap, String)> {
    let config = state.config.snapshot();

    let format_name = params.format.as_deref().unwrap_or("csv");
    if !config.export.formats.iter().any(|f| f == format_name) {
        return Err(AppError::validation(format!(
            "unsupported export format: {format_name}"
        )));
    }
    let format = ExportFormat::parse(format_name).ok_or_else(|| {
        AppError::validation(format!("unsupported export format: {format_name}"))
    })?;

    let days = params.days.unwrap_or(30);
    if days > 365 {
        return Err(AppError::validation(
            "requested period cannot exceed 365 days",
        ));
    }

    let kind = params.kind.as_deref().unwrap_or("summary").to_string();
    if !matches!(kind.as_str(), "sessions" | "events" | "summary") {
        return Err(AppError::validation(format!("unknown export type: {kind}")));
    }
    let now = Utc::now();
    let since_ms = now.timestamp_millis() - days * 86_400_000;
    let limit = config.export.max_records as i64;

    let rows = state
        .run_query(config.performance.query_timeout_ms, async {
            match kind.as_str() {
                "sessions" => {
                    let sessions =
                        queries::recent_closed_sessions(&state.pool, since_ms, limit).await?;
                    Ok(sessions
                        .iter()
                        .enumerate()
                        .map(|(i, s)| {
                            json!({
                                "session_index": i + 1,
                                "duration_seconds": s.duration.unwrap_or(0),
                                "device_type": s.device_type.as_deref().unwrap_or("unknown"),
                                "browser": s.browser.as_deref().unwrap_or("unknown"),
                                "country": s.country.as_deref().unwrap_or("unknown"),
                                "page_views": s.page_views,
                                "events_count": s.events_count,
                                "is_bounce": s.is_bounce,
                            })
                        })
                        .collect::<Vec<_>>())
                }
                "events" => {
                    let events = queries::recent_events(&state.pool, since_ms, limit).await?;
                    Ok(events
                        .iter()
                        .enumerate()
                        .map(|(i, e)| {
                            json!({
                                "event_index": i + 1,
                                "event_type": e.event_type,
                                "content_id": e.content_id.as_deref().unwrap_or(""),
                                "timestamp": e.timestamp,
                                "page_url": e.page_url.as_deref().unwrap_or(""),
                            })
                        })
                        .collect::<Vec<_>>())
                }
                _ => {
                    let sessions =
                        queries::recent_closed_sessions(&state.pool, since_ms, limit).await?;
                    Ok(device_summary(&sessions))
                }
            }
        })
        .await
        .map_err(|e| {
            tracing::error!(kind = %kind, days, error = %e, "export failed");
            e
        })?;

    let body = export::format_for_export(&Value::Array(rows), format);

    let start = (now - chrono::Duration::days(days)).format("%Y-%m-%d");
    let end = now.format("%Y-%m-%d");
    let filename = format!("{kind}_{start}_{end}.{}", format.extension());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        format.content_type().parse().expect("static content type"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{filename}\"")
            .parse()
            .map_err(|_| AppError::Internal("invalid export filename".to_string()))?,
    );
    headers.insert(header::CACHE_CONTROL, "no-cache".parse().expect("static"));

    Ok((headers, body))
}

fn device_summary(sessions: &[crate::store::SessionRow]) -> Vec<Value> {
    let mut groups: Vec<(String, Vec<&crate::store::SessionRow>)> = Vec::new();
    for session in sessions {
        let device = session
            .device_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        match groups.iter().position(|(d, _)| *d == device) {
            Some(i) => groups[i].1.push(session),
            None => groups.push((device, vec![session])),
        }
    }

    let total = sessions.len();
    groups
        .into_iter()
        .map(|(device, members)| {
            let count = members.len();
            let total_duration: i64 = members.iter().map(|s| s.duration.unwrap_or(0)).sum();
            let bounces = members.iter().filter(|s| s.is_bounce).count();
            let avg_duration = (total_duration as f64 / count as f64).round() as i64;
            json!({
                "device_type": device,
                "total_sessions": count,
                "avg_duration_seconds": avg_duration,
                "avg_duration_label": stats::format_duration(avg_duration.max(0) as u64),
                "bounce_rate": stats::percentage(bounces, count),
                "share_of_sessions": stats::percentage(count, total),
            })
        })
        .collect()
}

// ── Admin configuration ──

/// GET /v1/admin/config
pub async fn get_engine_config(
    State(state): State<Arc<AnalyticsState>>,
) -> AppResult<Json<Value>> {
    let snapshot = state.config.snapshot();
    Ok(envelope(to_value(&*snapshot)?))
}

/// PUT /v1/admin/config - shallow section merge; flushes the query cache.
pub async fn update_engine_config(
    State(state): State<Arc<AnalyticsState>>,
    Json(patch): Json<ConfigPatch>,
) -> AppResult<Json<Value>> {
    let next = state.config.update(patch, &state.cache);
    tracing::info!("engine configuration updated, query cache cleared");
    Ok(envelope(to_value(&*next)?))
}

// ── Health ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub db_ok: bool,
    pub cache_entries: usize,
}

/// GET /health
pub async fn health(State(state): State<Arc<AnalyticsState>>) -> Json<HealthResponse> {
    let db_ok = match state.pool.get().await {
        Ok(conn) => conn
            .interact(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false),
        Err(_) => false,
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        db_ok,
        cache_entries: state.cache.entry_count(),
    })
}
