// src/handlers/notification.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::comment::{Notification, NotificationListParams},
    utils::jwt::Claims,
};

/// List the current user's notifications, newest first.
pub async fn list_notifications(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<NotificationListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(50).min(200);

    let notifications = if params.unread.unwrap_or(false) {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, recipient_id, sender_id, kind, target_kind, target_id, message, is_read, created_at
            FROM notifications
            WHERE recipient_id = $1 AND NOT is_read
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(claims.user_id())
        .bind(limit)
        .fetch_all(&pool)
        .await?
    } else {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, recipient_id, sender_id, kind, target_kind, target_id, message, is_read, created_at
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(claims.user_id())
        .bind(limit)
        .fetch_all(&pool)
        .await?
    };

    Ok(Json(notifications))
}

/// Count of unread notifications, for the badge.
pub async fn unread_count(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT is_read",
    )
    .bind(claims.user_id())
    .fetch_one(&pool)
    .await?;

    Ok(Json(json!({ "unread": count })))
}

/// Mark one notification read. Only the recipient's own.
pub async fn mark_read(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2",
    )
    .bind(id)
    .bind(claims.user_id())
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Mark all of the current user's notifications read.
pub async fn mark_all_read(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND NOT is_read",
    )
    .bind(claims.user_id())
    .execute(&pool)
    .await?;

    Ok(Json(json!({ "marked": result.rows_affected() })))
}
