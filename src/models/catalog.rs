// src/models/catalog.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'categories' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub instructor_id: i64,
    pub category_id: Option<i64>,
    pub description: String,
    pub cover_url: Option<String>,
    /// 'draft', 'published' or 'archived'.
    pub status: String,
    pub price: f64,
    pub is_free: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Course list row joined with the instructor's username.
#[derive(Debug, Serialize, FromRow)]
pub struct CourseListItem {
    pub id: i64,
    pub title: String,
    pub instructor_id: i64,
    pub instructor_name: String,
    pub category_id: Option<i64>,
    pub cover_url: Option<String>,
    pub status: String,
    pub price: f64,
    pub is_free: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 20000))]
    pub description: String,
    pub category_id: Option<i64>,
    #[validate(length(max = 500))]
    pub cover_url: Option<String>,
    pub price: Option<f64>,
    pub is_free: Option<bool>,
}

/// DTO for updating a course. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 20000))]
    pub description: Option<String>,
    pub category_id: Option<i64>,
    #[validate(length(max = 500))]
    pub cover_url: Option<String>,
    /// 'draft', 'published' or 'archived'.
    pub status: Option<String>,
    pub price: Option<f64>,
    pub is_free: Option<bool>,
}

/// Query parameters for listing courses.
#[derive(Debug, Deserialize)]
pub struct CourseListParams {
    pub category_id: Option<i64>,
    /// Search keyword for title match.
    pub q: Option<String>,
    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
}

/// Represents the 'sections' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSectionRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub position: Option<i32>,
}

/// DTO for updating a section. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSectionRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub position: Option<i32>,
}

/// Represents the 'lessons' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub section_id: i64,
    pub title: String,
    /// 'video', 'document' or 'quiz'.
    pub lesson_type: String,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: i32,
    pub position: i32,
    pub is_free_preview: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub lesson_type: Option<String>,
    #[validate(length(max = 50000))]
    pub content: Option<String>,
    #[validate(length(max = 500))]
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    pub position: Option<i32>,
    pub is_free_preview: Option<bool>,
}

/// DTO for updating a lesson. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 50000))]
    pub content: Option<String>,
    #[validate(length(max = 500))]
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    pub position: Option<i32>,
    pub is_free_preview: Option<bool>,
}

/// Full course detail: the course plus its content tree.
#[derive(Debug, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub sections: Vec<SectionWithLessons>,
}

#[derive(Debug, Serialize)]
pub struct SectionWithLessons {
    #[serde(flatten)]
    pub section: Section,
    pub lessons: Vec<Lesson>,
}
