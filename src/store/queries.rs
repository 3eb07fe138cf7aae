use crate::error::{AppError, AppResult};
use crate::store::{EventRow, SessionRow};
use deadpool_sqlite::Pool;
use rusqlite::params;
use std::collections::HashMap;

const SESSION_COLUMNS: &str = "session_id, user_id, start_time, end_time, duration, \
     device_type, browser, country, page_views, events_count, is_bounce";

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        duration: row.get(4)?,
        device_type: row.get(5)?,
        browser: row.get(6)?,
        country: row.get(7)?,
        page_views: row.get(8)?,
        events_count: row.get(9)?,
        is_bounce: row.get::<_, i64>(10)? != 0,
    })
}

async fn get_conn(pool: &Pool) -> AppResult<deadpool_sqlite::Object> {
    pool.get()
        .await
        .map_err(|e| AppError::Internal(format!("pool error: {e}")))
}

/// Closed sessions (duration or end time recorded) that started within the
/// window, most recent first.
pub async fn recent_closed_sessions(
    pool: &Pool,
    since_ms: i64,
    limit: i64,
) -> AppResult<Vec<SessionRow>> {
    let conn = get_conn(pool).await?;
    let rows = conn
        .interact(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE start_time >= ?1
                   AND (duration IS NOT NULL OR end_time IS NOT NULL)
                 ORDER BY start_time DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![since_ms, limit], session_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await??;
    Ok(rows)
}

/// Sessions in the window carrying at least `min_events` recorded events,
/// most recent first.
pub async fn recent_sessions_with_events(
    pool: &Pool,
    since_ms: i64,
    min_events: i64,
    limit: i64,
) -> AppResult<Vec<SessionRow>> {
    let conn = get_conn(pool).await?;
    let rows = conn
        .interact(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE start_time >= ?1 AND events_count >= ?2
                 ORDER BY start_time DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![since_ms, min_events, limit], session_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await??;
    Ok(rows)
}

/// Ad hoc session filter for the custom (POST) analysis modes.
#[derive(Debug, Default, Clone)]
pub struct SessionFilter {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub user_id: Option<String>,
    pub min_duration: Option<i64>,
    pub max_duration: Option<i64>,
}

pub async fn filtered_sessions(
    pool: &Pool,
    filter: SessionFilter,
    limit: i64,
) -> AppResult<Vec<SessionRow>> {
    let conn = get_conn(pool).await?;
    let rows = conn
        .interact(move |conn| {
            let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE 1=1");
            let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(start_ms) = filter.start_ms {
                sql.push_str(&format!(" AND start_time >= ?{}", bind_values.len() + 1));
                bind_values.push(Box::new(start_ms));
            }
            if let Some(end_ms) = filter.end_ms {
                sql.push_str(&format!(" AND end_time <= ?{}", bind_values.len() + 1));
                bind_values.push(Box::new(end_ms));
            }
            if let Some(ref device_type) = filter.device_type {
                sql.push_str(&format!(" AND device_type = ?{}", bind_values.len() + 1));
                bind_values.push(Box::new(device_type.clone()));
            }
            if let Some(ref browser) = filter.browser {
                sql.push_str(&format!(" AND browser = ?{}", bind_values.len() + 1));
                bind_values.push(Box::new(browser.clone()));
            }
            if let Some(ref country) = filter.country {
                sql.push_str(&format!(" AND country = ?{}", bind_values.len() + 1));
                bind_values.push(Box::new(country.clone()));
            }
            if let Some(ref user_id) = filter.user_id {
                sql.push_str(&format!(" AND user_id = ?{}", bind_values.len() + 1));
                bind_values.push(Box::new(user_id.clone()));
            }
            if let Some(min_duration) = filter.min_duration {
                sql.push_str(&format!(" AND duration >= ?{}", bind_values.len() + 1));
                bind_values.push(Box::new(min_duration));
            }
            if let Some(max_duration) = filter.max_duration {
                sql.push_str(&format!(" AND duration <= ?{}", bind_values.len() + 1));
                bind_values.push(Box::new(max_duration));
            }

            sql.push_str(&format!(
                " ORDER BY start_time DESC LIMIT ?{}",
                bind_values.len() + 1
            ));
            bind_values.push(Box::new(limit));

            let mut stmt = conn.prepare(&sql)?;
            let params_ref: Vec<&dyn rusqlite::types::ToSql> =
                bind_values.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(params_ref.as_slice(), session_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await??;
    Ok(rows)
}

/// All events belonging to the given sessions, ascending by timestamp.
/// Ascending order within a session is load-bearing for journey building.
pub async fn events_for_sessions(
    pool: &Pool,
    session_ids: &[String],
    event_types: Option<Vec<String>>,
) -> AppResult<Vec<EventRow>> {
    if session_ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids_json = serde_json::to_string(session_ids)
        .map_err(|e| AppError::Internal(format!("serialize session ids: {e}")))?;
    let types_json = match &event_types {
        Some(types) => Some(
            serde_json::to_string(types)
                .map_err(|e| AppError::Internal(format!("serialize event types: {e}")))?,
        ),
        None => None,
    };

    let conn = get_conn(pool).await?;
    let rows = conn
        .interact(move |conn| {
            let sql = match types_json {
                Some(_) => {
                    "SELECT session_id, event_type, content_id, timestamp, page_url FROM events
                     WHERE session_id IN (SELECT value FROM json_each(?1))
                       AND event_type IN (SELECT value FROM json_each(?2))
                     ORDER BY timestamp ASC"
                }
                None => {
                    "SELECT session_id, event_type, content_id, timestamp, page_url FROM events
                     WHERE session_id IN (SELECT value FROM json_each(?1))
                     ORDER BY timestamp ASC"
                }
            };
            let mut stmt = conn.prepare(sql)?;
            let map_row = |row: &rusqlite::Row<'_>| {
                Ok(EventRow {
                    session_id: row.get(0)?,
                    event_type: row.get(1)?,
                    content_id: row.get(2)?,
                    timestamp: row.get(3)?,
                    page_url: row.get(4)?,
                })
            };
            let rows = match types_json {
                Some(tj) => stmt.query_map(params![ids_json, tj], map_row)?,
                None => stmt.query_map(params![ids_json], map_row)?,
            };
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await??;
    Ok(rows)
}

/// Recent events across all sessions, newest first. Used by the export
/// surface.
pub async fn recent_events(pool: &Pool, since_ms: i64, limit: i64) -> AppResult<Vec<EventRow>> {
    let conn = get_conn(pool).await?;
    let rows = conn
        .interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, event_type, content_id, timestamp, page_url FROM events
                 WHERE timestamp >= ?1
                 ORDER BY timestamp DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![since_ms, limit], |row| {
                Ok(EventRow {
                    session_id: row.get(0)?,
                    event_type: row.get(1)?,
                    content_id: row.get(2)?,
                    timestamp: row.get(3)?,
                    page_url: row.get(4)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await??;
    Ok(rows)
}

/// Resolve content titles for a set of content ids in one batched lookup.
pub async fn content_titles(pool: &Pool, ids: &[String]) -> AppResult<HashMap<String, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let ids_json = serde_json::to_string(ids)
        .map_err(|e| AppError::Internal(format!("serialize content ids: {e}")))?;

    let conn = get_conn(pool).await?;
    let titles = conn
        .interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title FROM content_items
                 WHERE id IN (SELECT value FROM json_each(?1))",
            )?;
            let rows = stmt.query_map(params![ids_json], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<HashMap<_, _>, _>>()
        })
        .await??;
    Ok(titles)
}
