// src/handlers/profile.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{AdminUpdateUserRequest, MeResponse, UpdateProfileRequest, User},
    utils::{hash::hash_password, jwt::Claims},
};

/// Get current user's profile, with the role-specific profile joined in.
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let me = sqlx::query_as::<_, MeRow>(
        r#"
        SELECT
            u.id, u.username, u.email, u.role, u.phone, u.bio, u.avatar_url, u.created_at,
            sp.student_number,
            tp.title, tp.department
        FROM users u
        LEFT JOIN student_profiles sp ON sp.user_id = u.id
        LEFT JOIN teacher_profiles tp ON tp.user_id = u.id
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(MeResponse {
        id: me.id,
        username: me.username,
        email: me.email,
        role: me.role,
        phone: me.phone,
        bio: me.bio,
        avatar_url: me.avatar_url,
        created_at: me.created_at,
        student_number: me.student_number,
        title: me.title,
        department: me.department,
    }))
}

#[derive(sqlx::FromRow)]
struct MeRow {
    id: i64,
    username: String,
    email: String,
    role: String,
    phone: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    student_number: Option<String>,
    title: Option<String>,
    department: Option<String>,
}

/// Update the current user's profile. Role-specific fields only land in
/// the profile table matching the caller's role.
pub async fn update_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id();
    let mut tx = pool.begin().await?;

    if payload.phone.is_some() || payload.bio.is_some() || payload.avatar_url.is_some() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut separated = builder.separated(", ");

        if let Some(phone) = &payload.phone {
            separated.push("phone = ");
            separated.push_bind_unseparated(phone);
        }
        if let Some(bio) = &payload.bio {
            separated.push("bio = ");
            separated.push_bind_unseparated(bio);
        }
        if let Some(avatar_url) = &payload.avatar_url {
            separated.push("avatar_url = ");
            separated.push_bind_unseparated(avatar_url);
        }
        separated.push("updated_at = NOW()");

        builder.push(" WHERE id = ");
        builder.push_bind(user_id);
        builder.build().execute(&mut *tx).await?;
    }

    if claims.role == "student" {
        if let Some(student_number) = &payload.student_number {
            sqlx::query("UPDATE student_profiles SET student_number = $1 WHERE user_id = $2")
                .bind(student_number)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
    } else if claims.role == "teacher" {
        if payload.title.is_some() || payload.department.is_some() {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("UPDATE teacher_profiles SET ");
            let mut separated = builder.separated(", ");
            if let Some(title) = &payload.title {
                separated.push("title = ");
                separated.push_bind_unseparated(title);
            }
            if let Some(department) = &payload.department {
                separated.push("department = ");
                separated.push_bind_unseparated(department);
            }
            builder.push(" WHERE user_id = ");
            builder.push_bind(user_id);
            builder.build().execute(&mut *tx).await?;
        }
    }

    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password, role, phone, bio, avatar_url, created_at, updated_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// Updates a user's role or resets their password.
/// Admin only.
pub async fn update_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let _exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    if let Some(new_role) = &payload.role {
        if !["student", "teacher", "admin"].contains(&new_role.as_str()) {
            return Err(AppError::BadRequest("Invalid role".to_string()));
        }
        sqlx::query("UPDATE users SET role = $1, updated_at = NOW() WHERE id = $2")
            .bind(new_role)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_password) = &payload.password {
        let hashed = hash_password(new_password)?;
        sqlx::query("UPDATE users SET password = $1, updated_at = NOW() WHERE id = $2")
            .bind(hashed)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a user by ID.
/// Admin only. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id() {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
