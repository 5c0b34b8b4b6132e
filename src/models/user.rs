// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// User role: 'student', 'teacher' or 'admin'.
    pub role: String,

    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Aggregated profile data for the current user, with the role-specific
/// profile flattened in.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Student-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
    /// Teacher-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,

    #[validate(email(message = "Invalid email address."))]
    pub email: String,

    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,

    /// 'student' (default) or 'teacher'. Admin accounts are seeded from env.
    pub role: Option<String>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for updating the current user's profile. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    #[validate(length(max = 500))]
    pub avatar_url: Option<String>,

    // Role-specific fields; ignored when they don't apply to the caller.
    #[validate(length(max = 20))]
    pub student_number: Option<String>,
    #[validate(length(max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 100))]
    pub department: Option<String>,
}

/// DTO for Admin changing a user's role.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub role: Option<String>,
    pub password: Option<String>,
}
