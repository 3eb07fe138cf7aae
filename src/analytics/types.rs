use serde::{Deserialize, Serialize};

// ── Query parameters ──

/// GET /v1/analytics/session-duration
#[derive(Debug, Deserialize)]
pub struct DurationQueryParams {
    pub days: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /v1/analytics/user-journeys
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyQueryParams {
    pub days: Option<i64>,
    pub limit: Option<i64>,
    pub min_steps: Option<i64>,
    pub max_steps: Option<i64>,
}

/// Window and effective (post-clamp) parameters echoed back with every
/// analysis so callers can detect silent clamping.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub days: i64,
    pub start_date: String,
    pub end_date: String,
}

impl Period {
    pub fn ending_at(days: i64, end: chrono::DateTime<chrono::Utc>) -> Self {
        let start = end - chrono::Duration::days(days);
        Self {
            days,
            start_date: start.to_rfc3339(),
            end_date: end.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveParams {
    pub days: i64,
    pub limit: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

// ── Session-duration analysis ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationAnalysis {
    pub distribution: Vec<BucketCount>,
    pub stats: DurationStats,
    pub device_stats: Vec<DeviceStat>,
    pub browser_stats: Vec<BrowserStat>,
    pub period: Period,
    pub effective: EffectiveParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCount {
    pub label: String,
    pub count: usize,
    pub percentage: i64,
    pub color: String,
    pub range: BucketRange,
}

#[derive(Debug, Serialize)]
pub struct BucketRange {
    pub min: u64,
    pub max: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationStats {
    pub total_sessions: usize,
    pub valid_durations: usize,
    pub average_duration: i64,
    pub median_duration: i64,
    pub min_duration: i64,
    pub max_duration: i64,
    pub bounce_rate: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStat {
    pub device: String,
    pub count: usize,
    pub avg_duration: i64,
    pub avg_page_views: i64,
    pub percentage: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserStat {
    pub browser: String,
    pub count: usize,
    pub percentage: i64,
}

/// POST /v1/analytics/session-duration - ad hoc analysis body.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomDurationRequest {
    pub custom_buckets: Option<Vec<CustomBucket>>,
    #[serde(default)]
    pub filters: DurationFilters,
    pub group_by: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomBucket {
    pub max: Option<u64>,
    pub label: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DurationFilters {
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub min_duration: Option<i64>,
    pub max_duration: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDurationAnalysis {
    pub total_sessions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouped_analysis: Option<Vec<DurationGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_distribution: Option<Vec<CustomBucketCount>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationGroup {
    pub group: String,
    pub count: usize,
    pub avg_duration: i64,
    pub avg_page_views: i64,
    pub bounce_rate: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomBucketCount {
    pub label: String,
    pub count: usize,
    pub percentage: i64,
    pub range: BucketRange,
}

// ── Journey analysis ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyAnalysis {
    pub top_journeys: Vec<PathEntry>,
    pub top_entry_points: Vec<EntryPoint>,
    pub top_exit_points: Vec<ExitPoint>,
    pub length_distribution: Vec<LengthBucket>,
    pub stats: JourneyStats,
    pub period: Period,
    pub effective: EffectiveParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEntry {
    pub path: String,
    pub count: usize,
    pub percentage: i64,
    pub avg_duration: i64,
    pub avg_steps: i64,
    pub top_device: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub entry: String,
    pub count: usize,
    pub percentage: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitPoint {
    pub exit: String,
    pub count: usize,
    pub percentage: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LengthBucket {
    pub length: usize,
    pub count: usize,
    pub percentage: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyStats {
    pub total_journeys: usize,
    pub total_sessions: usize,
    pub avg_journey_length: i64,
    pub avg_journey_duration: i64,
    pub unique_paths: usize,
    pub most_common_device: String,
    pub conversion_events: usize,
}

/// POST /v1/analytics/user-journeys - ad hoc analysis body.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomJourneyRequest {
    #[serde(default)]
    pub filters: JourneyFilters,
    /// Accepted for compatibility; the ad hoc mode does not reconstruct
    /// journeys, so length bounds have nothing to apply to.
    pub path_length: Option<PathLength>,
    pub group_by: Option<String>,
    #[serde(default)]
    pub include_content_details: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JourneyFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub device_type: Option<String>,
    pub user_id: Option<String>,
    pub min_duration: Option<i64>,
    pub event_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PathLength {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomJourneyAnalysis {
    pub total_sessions: usize,
    pub total_events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouped_analysis: Option<Vec<SessionGroup>>,
    pub top_events: Vec<EventTypeCount>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGroup {
    pub group: String,
    pub session_count: usize,
    pub avg_duration: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeCount {
    pub event: String,
    pub count: usize,
    pub percentage: i64,
}
