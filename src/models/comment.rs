// src/models/comment.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// What a comment (or notification) is attached to. An explicit tagged
/// kind plus id, checked against the matching table — never a free-form
/// (type-name, id) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentTarget {
    Course,
    Lesson,
    Quiz,
    LiveSession,
}

impl CommentTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentTarget::Course => "course",
            CommentTarget::Lesson => "lesson",
            CommentTarget::Quiz => "quiz",
            CommentTarget::LiveSession => "live_session",
        }
    }

    /// The table existence checks run against. Static strings only; these
    /// are interpolated into SQL.
    pub fn table(&self) -> &'static str {
        match self {
            CommentTarget::Course => "courses",
            CommentTarget::Lesson => "lessons",
            CommentTarget::Quiz => "quizzes",
            CommentTarget::LiveSession => "live_sessions",
        }
    }
}

/// Represents the 'comments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub target_kind: String,
    pub target_id: i64,
    pub content: String,
    pub parent_id: Option<i64>,
    pub root_id: Option<i64>,
    pub is_removed: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    pub target_kind: CommentTarget,
    pub target_id: i64,

    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_id: Option<i64>,
}

/// DTO for displaying a comment with author info.
#[derive(Debug, Serialize, FromRow)]
pub struct CommentResponse {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub target_kind: String,
    pub target_id: i64,
    pub content: String,
    pub parent_id: Option<i64>,
    pub root_id: Option<i64>,
    pub likes_count: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Query parameters for listing comments.
#[derive(Debug, Deserialize)]
pub struct CommentListParams {
    pub target_kind: CommentTarget,
    pub target_id: i64,
}

/// Represents the 'notifications' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    /// 'reply', 'like', 'course' or 'system'.
    pub kind: String,
    pub target_kind: Option<String>,
    pub target_id: Option<i64>,
    pub message: String,
    pub is_read: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Query parameters for listing notifications.
#[derive(Debug, Deserialize)]
pub struct NotificationListParams {
    /// When true, only unread notifications.
    pub unread: Option<bool>,
    pub limit: Option<i64>,
}
