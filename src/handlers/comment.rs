// src/handlers/comment.rs
//
// Comments hang off a tagged target (course, lesson, quiz or live
// session). Replies carry both parent_id and root_id so a thread loads
// in one query. Deleting is a soft removal; likes toggle.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::comment::{
        Comment, CommentListParams, CommentResponse, CommentTarget, CreateCommentRequest,
    },
    policy::{self, Role},
    utils::{html::clean_html, jwt::Claims},
};

async fn target_exists(
    pool: &PgPool,
    target: CommentTarget,
    target_id: i64,
) -> Result<bool, AppError> {
    // `table()` only ever yields fixed table names.
    let query = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", target.table());
    let exists: bool = sqlx::query_scalar(&query)
        .bind(target_id)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

async fn notify(
    tx: &mut Transaction<'_, Postgres>,
    recipient_id: i64,
    sender_id: i64,
    kind: &str,
    target_kind: &str,
    target_id: i64,
    message: &str,
) -> Result<(), AppError> {
    // Users are not notified about their own actions.
    if recipient_id == sender_id {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO notifications (recipient_id, sender_id, kind, target_kind, target_id, message)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(recipient_id)
    .bind(sender_id)
    .bind(kind)
    .bind(target_kind)
    .bind(target_id)
    .bind(message)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Post a comment, or a reply when parent_id is set. Replying notifies
/// the parent's author.
pub async fn create_comment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if !target_exists(&pool, payload.target_kind, payload.target_id).await? {
        return Err(AppError::NotFound(format!(
            "{} not found",
            payload.target_kind.as_str()
        )));
    }

    // A reply must land on the same target; its root is the parent's
    // root, or the parent itself for a first-level reply.
    let parent = match payload.parent_id {
        None => None,
        Some(parent_id) => {
            let parent = sqlx::query_as::<_, Comment>(
                r#"
                SELECT id, user_id, target_kind, target_id, content, parent_id, root_id,
                       is_removed, created_at, updated_at
                FROM comments
                WHERE id = $1
                "#,
            )
            .bind(parent_id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::NotFound("Parent comment not found".to_string()))?;

            if parent.target_kind != payload.target_kind.as_str()
                || parent.target_id != payload.target_id
            {
                return Err(AppError::BadRequest(
                    "Reply must target the same content as its parent".to_string(),
                ));
            }
            Some(parent)
        }
    };

    let root_id = parent.as_ref().map(|p| p.root_id.unwrap_or(p.id));

    let mut tx = pool.begin().await?;

    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (user_id, target_kind, target_id, content, parent_id, root_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, user_id, target_kind, target_id, content, parent_id, root_id,
                  is_removed, created_at, updated_at
        "#,
    )
    .bind(claims.user_id())
    .bind(payload.target_kind.as_str())
    .bind(payload.target_id)
    .bind(clean_html(&payload.content))
    .bind(payload.parent_id)
    .bind(root_id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(parent) = &parent {
        notify(
            &mut tx,
            parent.user_id,
            claims.user_id(),
            "reply",
            payload.target_kind.as_str(),
            payload.target_id,
            "Someone replied to your comment",
        )
        .await?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// List comments on a target, oldest first, with author names and like
/// counts. Removed comments keep their slot with blanked content so
/// threads stay intact.
pub async fn list_comments(
    State(pool): State<PgPool>,
    Query(params): Query<CommentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut comments = sqlx::query_as::<_, CommentResponse>(
        r#"
        SELECT c.id, c.user_id, u.username, c.target_kind, c.target_id,
               CASE WHEN c.is_removed THEN '' ELSE c.content END AS content,
               c.parent_id, c.root_id,
               (SELECT COUNT(*) FROM comment_likes cl WHERE cl.comment_id = c.id) AS likes_count,
               c.created_at
        FROM comments c
        JOIN users u ON u.id = c.user_id
        WHERE c.target_kind = $1 AND c.target_id = $2
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(params.target_kind.as_str())
    .bind(params.target_id)
    .fetch_all(&pool)
    .await?;

    // Removed leaf comments carry no information; drop the ones nothing
    // replies to.
    let replied_to: std::collections::HashSet<i64> =
        comments.iter().filter_map(|c| c.parent_id).collect();
    comments.retain(|c| !c.content.is_empty() || replied_to.contains(&c.id));

    Ok(Json(comments))
}

/// Soft-delete a comment. The author or an admin.
pub async fn delete_comment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let author_id: Option<i64> =
        sqlx::query_scalar("SELECT user_id FROM comments WHERE id = $1 AND NOT is_removed")
            .bind(id)
            .fetch_optional(&pool)
            .await?;
    let author_id = author_id.ok_or(AppError::NotFound("Comment not found".to_string()))?;

    if !policy::can_remove_comment(Role::parse(&claims.role), claims.user_id(), author_id) {
        return Err(AppError::Forbidden(
            "You cannot remove this comment".to_string(),
        ));
    }

    sqlx::query("UPDATE comments SET is_removed = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Toggle a like on a comment. Liking notifies the comment's author.
/// Returns the new state and count.
pub async fn toggle_like(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    #[derive(sqlx::FromRow)]
    struct TargetRow {
        user_id: i64,
        target_kind: String,
        target_id: i64,
    }
    let comment = sqlx::query_as::<_, TargetRow>(
        "SELECT user_id, target_kind, target_id FROM comments WHERE id = $1 AND NOT is_removed",
    )
    .bind(comment_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Comment not found".to_string()))?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query("INSERT INTO comment_likes (user_id, comment_id) VALUES ($1, $2)")
        .bind(claims.user_id())
        .bind(comment_id)
        .execute(&mut *tx)
        .await;

    let liked = match inserted {
        Ok(_) => {
            notify(
                &mut tx,
                comment.user_id,
                claims.user_id(),
                "like",
                &comment.target_kind,
                comment.target_id,
                "Someone liked your comment",
            )
            .await?;
            true
        }
        Err(e) if is_unique_violation(&e) => {
            // Second like from the same user is the un-like, but the
            // failed insert poisoned the transaction; finish outside it.
            tx.rollback().await?;
            sqlx::query("DELETE FROM comment_likes WHERE user_id = $1 AND comment_id = $2")
                .bind(claims.user_id())
                .bind(comment_id)
                .execute(&pool)
                .await?;
            let likes_count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM comment_likes WHERE comment_id = $1")
                    .bind(comment_id)
                    .fetch_one(&pool)
                    .await?;
            return Ok(Json(json!({ "liked": false, "likes_count": likes_count })));
        }
        Err(e) => return Err(AppError::from(e)),
    };

    tx.commit().await?;

    let likes_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM comment_likes WHERE comment_id = $1")
            .bind(comment_id)
            .fetch_one(&pool)
            .await?;

    Ok(Json(json!({ "liked": liked, "likes_count": likes_count })))
}
