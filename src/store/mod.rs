pub mod migrations;
pub mod queries;
pub mod sqlite;

/// Read projection of one row in the external `sessions` table.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub session_id: String,
    pub user_id: Option<String>,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub duration: Option<i64>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub page_views: i64,
    pub events_count: i64,
    pub is_bounce: bool,
}

/// Read projection of one row in the external `events` table. Rows are
/// always fetched in ascending timestamp order within a session.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub session_id: String,
    pub event_type: String,
    pub content_id: Option<String>,
    pub timestamp: i64,
    pub page_url: Option<String>,
}
