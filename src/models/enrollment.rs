// src/models/enrollment.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'enrollments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    /// 'active', 'completed' or 'expired'.
    pub status: String,
    pub enrolled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Enrollment list row joined with course info.
#[derive(Debug, Serialize, FromRow)]
pub struct EnrollmentListItem {
    pub id: i64,
    pub course_id: i64,
    pub course_title: String,
    pub instructor_name: String,
    pub status: String,
    pub enrolled_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'lesson_progress' table in the database.
/// `last_position_seconds` doubles as the video watch-history position.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LessonProgress {
    pub id: i64,
    pub enrollment_id: i64,
    pub lesson_id: i64,
    /// 'not_started', 'in_progress' or 'completed'.
    pub status: String,
    pub progress_percent: i32,
    pub last_position_seconds: i32,
    pub last_accessed: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for upserting lesson progress.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProgressRequest {
    #[validate(range(min = 0, max = 100))]
    pub progress_percent: i32,
    #[validate(range(min = 0))]
    pub last_position_seconds: Option<i32>,
}

/// Per-course progress summary.
#[derive(Debug, Serialize)]
pub struct CourseProgressSummary {
    pub course_id: i64,
    pub total_lessons: i64,
    pub completed_lessons: i64,
    pub percent: f64,
}
