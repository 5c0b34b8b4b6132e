// src/models/live.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'live_sessions' table in the database.
/// Video signaling is delegated to the streaming provider; this stores
/// the schedule, status machine and stream endpoints only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LiveSession {
    pub id: i64,
    pub course_id: i64,
    pub instructor_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_start: chrono::DateTime<chrono::Utc>,
    pub scheduled_end: chrono::DateTime<chrono::Utc>,
    pub actual_start: Option<chrono::DateTime<chrono::Utc>>,
    pub actual_end: Option<chrono::DateTime<chrono::Utc>>,
    /// 'scheduled', 'live', 'ended' or 'canceled'.
    pub status: String,
    /// Issued when the session goes live; never exposed to students.
    #[serde(skip)]
    pub stream_key: Option<String>,
    pub play_url: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLiveSessionRequest {
    pub course_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub scheduled_start: chrono::DateTime<chrono::Utc>,
    pub scheduled_end: chrono::DateTime<chrono::Utc>,
}

/// Query parameters for listing live sessions.
#[derive(Debug, Deserialize)]
pub struct LiveListParams {
    pub course_id: Option<i64>,
    /// When true, only sessions that have not ended.
    pub upcoming: Option<bool>,
}

/// Represents the 'live_attendance' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LiveAttendance {
    pub id: i64,
    pub user_id: i64,
    pub session_id: i64,
    pub registered_at: Option<chrono::DateTime<chrono::Utc>>,
    pub attended: bool,
}
