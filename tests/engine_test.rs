//! End-to-end analyzer tests against a seeded temp-file SQLite store. The
//! seeding below plays the role of the host application's tracking
//! pipeline; the engine itself only reads.

use chrono::Utc;
use deadpool_sqlite::Pool;
use meander::analytics::types::{CustomDurationRequest, CustomJourneyRequest};
use meander::analytics::validate::{self, QueryType};
use meander::analytics::{journeys, session_duration, AnalyticsState};
use meander::config::EngineConfig;
use meander::store;
use std::sync::Arc;

async fn setup_state() -> Arc<AnalyticsState> {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let db_path = tmp.path().to_path_buf();
    // Keep the temp file alive for the duration of the test process.
    std::mem::forget(tmp);

    let pool = store::sqlite::create_pool(&meander::config::DatabaseConfig { path: db_path })
        .expect("create pool");
    store::sqlite::init_pool(&pool).await.expect("init pool");

    Arc::new(AnalyticsState::new(pool, EngineConfig::default()))
}

#[allow(clippy::too_many_arguments)]
async fn seed_session(
    pool: &Pool,
    session_id: &str,
    start_ms: i64,
    duration_secs: Option<i64>,
    device: Option<&str>,
    browser: Option<&str>,
    events_count: i64,
    is_bounce: bool,
) {
    let conn = pool.get().await.unwrap();
    let session_id = session_id.to_string();
    let device = device.map(str::to_string);
    let browser = browser.map(str::to_string);
    conn.interact(move |conn| {
        conn.execute(
            "INSERT INTO sessions
                 (session_id, user_id, start_time, end_time, duration, device_type, browser,
                  country, page_views, events_count, is_bounce)
             VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?6, NULL, 1, ?7, ?8)",
            rusqlite::params![
                session_id,
                start_ms,
                duration_secs.map(|d| start_ms + d * 1000),
                duration_secs,
                device,
                browser,
                events_count,
                is_bounce as i64,
            ],
        )
    })
    .await
    .unwrap()
    .unwrap();
}

async fn seed_event(pool: &Pool, session_id: &str, event_type: &str, content_id: Option<&str>, ts: i64) {
    let conn = pool.get().await.unwrap();
    let session_id = session_id.to_string();
    let event_type = event_type.to_string();
    let content_id = content_id.map(str::to_string);
    conn.interact(move |conn| {
        conn.execute(
            "INSERT INTO events (session_id, event_type, content_id, timestamp, page_url, payload)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
            rusqlite::params![session_id, event_type, content_id, ts],
        )
    })
    .await
    .unwrap()
    .unwrap();
}

async fn seed_content(pool: &Pool, id: &str, title: &str) {
    let conn = pool.get().await.unwrap();
    let id = id.to_string();
    let title = title.to_string();
    conn.interact(move |conn| {
        conn.execute(
            "INSERT INTO content_items (id, title) VALUES (?1, ?2)",
            rusqlite::params![id, title],
        )
    })
    .await
    .unwrap()
    .unwrap();
}

async fn seed_journey(pool: &Pool, session_id: &str, start_ms: i64, event_types: &[&str]) {
    seed_session(
        pool,
        session_id,
        start_ms,
        Some(120),
        Some("mobile"),
        Some("chrome"),
        event_types.len() as i64,
        false,
    )
    .await;
    for (i, event_type) in event_types.iter().enumerate() {
        seed_event(pool, session_id, event_type, None, start_ms + i as i64 * 1000).await;
    }
}

#[tokio::test]
async fn session_duration_distribution_matches_default_buckets() {
    let state = setup_state().await;
    let now_ms = Utc::now().timestamp_millis();

    for (i, duration) in [15i64, 45, 2400, 7200].iter().enumerate() {
        seed_session(
            &state.pool,
            &format!("s{i}"),
            now_ms - 3_600_000,
            Some(*duration),
            Some("mobile"),
            Some("chrome"),
            1,
            false,
        )
        .await;
    }

    let config = state.config.snapshot();
    let plan = validate::optimize(QueryType::SessionDuration, 10_000, &config);
    let analysis = session_duration::analyze(&state, 30, &plan, &config)
        .await
        .unwrap();

    // 15s and 45s land in the first two buckets; 2400s (40 min) in the
    // 30-60 min bucket; 7200s in the unbounded tail.
    let counts: Vec<usize> = analysis.distribution.iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![1, 1, 0, 0, 0, 1, 1]);

    // Bucket counts sum to the number of sessions analyzed.
    let total: usize = counts.iter().sum();
    assert_eq!(total, analysis.stats.valid_durations);
    assert_eq!(analysis.stats.total_sessions, 4);

    // Every percentage uses the same total = 4 denominator.
    for bucket in &analysis.distribution {
        assert_eq!(
            bucket.percentage,
            (bucket.count as f64 / 4.0 * 100.0).round() as i64
        );
    }

    assert_eq!(analysis.effective.days, 30);
    assert_eq!(analysis.effective.limit, 10_000);
}

#[tokio::test]
async fn session_duration_ignores_open_and_out_of_range_sessions() {
    let state = setup_state().await;
    let now_ms = Utc::now().timestamp_millis();

    seed_session(&state.pool, "recent", now_ms - 3_600_000, Some(90), None, None, 1, false).await;
    // Open session: no duration, no end time.
    seed_session(&state.pool, "open", now_ms - 3_600_000, None, None, None, 1, false).await;
    // Outside the 30-day window.
    seed_session(
        &state.pool,
        "ancient",
        now_ms - 40 * 86_400_000,
        Some(90),
        None,
        None,
        1,
        false,
    )
    .await;

    let config = state.config.snapshot();
    let plan = validate::optimize(QueryType::SessionDuration, 10_000, &config);
    let analysis = session_duration::analyze(&state, 30, &plan, &config)
        .await
        .unwrap();

    assert_eq!(analysis.stats.total_sessions, 1);
    assert_eq!(analysis.stats.valid_durations, 1);
}

#[tokio::test]
async fn three_journeys_produce_three_distinct_paths() {
    let state = setup_state().await;
    let now_ms = Utc::now().timestamp_millis();

    seed_journey(
        &state.pool,
        "j1",
        now_ms - 3_600_000,
        &["page_view", "scroll", "like", "share"],
    )
    .await;
    seed_journey(
        &state.pool,
        "j2",
        now_ms - 3_500_000,
        &["page_view", "page_view", "comment"],
    )
    .await;
    seed_journey(
        &state.pool,
        "j3",
        now_ms - 3_400_000,
        &["search", "page_view", "bookmark"],
    )
    .await;

    let config = state.config.snapshot();
    let plan = validate::optimize(QueryType::UserJourneys, 5_000, &config);
    let analysis = journeys::analyze(&state, 30, 2, 10, &plan, &config)
        .await
        .unwrap();

    assert_eq!(analysis.stats.total_journeys, 3);
    assert_eq!(analysis.stats.unique_paths, 3);
    assert_eq!(analysis.top_journeys.len(), 3);
    assert!(analysis.top_journeys.iter().all(|p| p.count == 1));

    // Top-N path counts never exceed the journey total.
    let top_sum: usize = analysis.top_journeys.iter().map(|p| p.count).sum();
    assert!(top_sum <= analysis.stats.total_journeys);
    for path in &analysis.top_journeys {
        assert_eq!(
            path.percentage,
            (path.count as f64 / 3.0 * 100.0).round() as i64
        );
    }

    // All three journeys contain a conversion event.
    assert_eq!(analysis.stats.conversion_events, 3);
    assert_eq!(analysis.stats.most_common_device, "mobile");

    // Length distribution: two 3-step journeys, one 4-step.
    let len3 = analysis
        .length_distribution
        .iter()
        .find(|b| b.length == 3)
        .unwrap();
    let len4 = analysis
        .length_distribution
        .iter()
        .find(|b| b.length == 4)
        .unwrap();
    assert_eq!(len3.count, 2);
    assert_eq!(len4.count, 1);
}

#[tokio::test]
async fn journey_steps_resolve_content_titles_in_path_keys() {
    let state = setup_state().await;
    let now_ms = Utc::now().timestamp_millis();

    seed_content(&state.pool, "c1", "Getting Started").await;
    seed_session(
        &state.pool,
        "j1",
        now_ms - 3_600_000,
        Some(60),
        Some("desktop"),
        None,
        2,
        false,
    )
    .await;
    seed_event(&state.pool, "j1", "page_view", Some("c1"), now_ms - 3_600_000).await;
    seed_event(&state.pool, "j1", "like", Some("c1"), now_ms - 3_599_000).await;

    let config = state.config.snapshot();
    let plan = validate::optimize(QueryType::UserJourneys, 5_000, &config);
    let analysis = journeys::analyze(&state, 30, 2, 10, &plan, &config)
        .await
        .unwrap();

    assert_eq!(analysis.top_journeys.len(), 1);
    assert_eq!(analysis.top_journeys[0].path, "📄 Getting Started... → like");
    // Entry point uses the raw title, exit point the event label.
    assert_eq!(analysis.top_entry_points[0].entry, "Getting Started");
    assert_eq!(analysis.top_exit_points[0].exit, "Getting Started");
}

#[tokio::test]
async fn journeys_truncate_to_max_steps_before_the_min_steps_filter() {
    let state = setup_state().await;
    let now_ms = Utc::now().timestamp_millis();

    let many: Vec<&str> = std::iter::repeat("page_view").take(12).collect();
    seed_journey(&state.pool, "long", now_ms - 3_600_000, &many).await;
    seed_journey(&state.pool, "short", now_ms - 3_500_000, &["page_view"]).await;

    let config = state.config.snapshot();
    let plan = validate::optimize(QueryType::UserJourneys, 5_000, &config);
    let analysis = journeys::analyze(&state, 30, 2, 10, &plan, &config)
        .await
        .unwrap();

    // The 12-event session is kept (truncated to 10); the 1-event session
    // never reaches the journey set.
    assert_eq!(analysis.stats.total_journeys, 1);
    assert_eq!(analysis.stats.avg_journey_length, 10);
    let len10 = analysis
        .length_distribution
        .iter()
        .find(|b| b.length == 10)
        .unwrap();
    assert_eq!(len10.count, 1);
}

#[tokio::test]
async fn custom_duration_mode_groups_and_rebuckets() {
    let state = setup_state().await;
    let now_ms = Utc::now().timestamp_millis();

    seed_session(&state.pool, "m1", now_ms - 1000, Some(30), Some("mobile"), None, 1, true).await;
    seed_session(&state.pool, "m2", now_ms - 2000, Some(90), Some("mobile"), None, 1, false).await;
    seed_session(&state.pool, "d1", now_ms - 3000, Some(400), Some("desktop"), None, 1, false)
        .await;

    let config = state.config.snapshot();
    let req: CustomDurationRequest = serde_json::from_value(serde_json::json!({
        "groupBy": "device",
        "customBuckets": [
            { "max": 60, "label": "short" },
            { "max": 300, "label": "medium" },
            { "max": null, "label": "long" }
        ]
    }))
    .unwrap();

    let analysis = session_duration::analyze_custom(&state, req, &config)
        .await
        .unwrap();

    assert_eq!(analysis.total_sessions, 3);
    let groups = analysis.grouped_analysis.unwrap();
    assert_eq!(groups[0].group, "mobile");
    assert_eq!(groups[0].count, 2);
    assert_eq!(groups[0].avg_duration, 60);
    assert_eq!(groups[0].bounce_rate, 50);

    let distribution = analysis.custom_distribution.unwrap();
    let counts: Vec<usize> = distribution.iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![1, 1, 1]);
}

#[tokio::test]
async fn custom_journey_mode_counts_events_and_groups_sessions() {
    let state = setup_state().await;
    let now_ms = Utc::now().timestamp_millis();

    seed_journey(&state.pool, "j1", now_ms - 3_600_000, &["page_view", "scroll", "like"]).await;
    seed_journey(&state.pool, "j2", now_ms - 3_500_000, &["page_view", "scroll"]).await;

    let config = state.config.snapshot();
    let req: CustomJourneyRequest = serde_json::from_value(serde_json::json!({
        "groupBy": "device",
        "filters": {}
    }))
    .unwrap();

    let analysis = journeys::analyze_custom(&state, req, &config).await.unwrap();

    assert_eq!(analysis.total_sessions, 2);
    assert_eq!(analysis.total_events, 5);

    let top = &analysis.top_events;
    assert_eq!(top[0].event, "view");
    assert_eq!(top[0].count, 2);
    assert_eq!(top[0].percentage, 40);

    let groups = analysis.grouped_analysis.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].group, "mobile");
    assert_eq!(groups[0].session_count, 2);
}

#[tokio::test]
async fn event_type_filter_narrows_custom_journey_mode() {
    let state = setup_state().await;
    let now_ms = Utc::now().timestamp_millis();

    seed_journey(&state.pool, "j1", now_ms - 3_600_000, &["page_view", "scroll", "like"]).await;

    let config = state.config.snapshot();
    let req: CustomJourneyRequest = serde_json::from_value(serde_json::json!({
        "filters": { "eventTypes": ["like"] }
    }))
    .unwrap();

    let analysis = journeys::analyze_custom(&state, req, &config).await.unwrap();
    assert_eq!(analysis.total_events, 1);
    assert_eq!(analysis.top_events[0].event, "like");
}
