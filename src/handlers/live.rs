// src/handlers/live.rs
//
// Live session scheduling and attendance. Status machine:
// scheduled -> live -> ended, with scheduled -> canceled. The stream key
// is minted when the session goes live and only ever shown to its
// instructor; students get the play URL when they join.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::live::{CreateLiveSessionRequest, LiveAttendance, LiveListParams, LiveSession},
    policy::{self, Role},
    utils::jwt::Claims,
};

const SESSION_COLUMNS: &str = "id, course_id, instructor_id, title, description, \
     scheduled_start, scheduled_end, actual_start, actual_end, status, \
     stream_key, play_url, created_at";

async fn fetch_session(pool: &PgPool, id: i64) -> Result<LiveSession, AppError> {
    sqlx::query_as::<_, LiveSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM live_sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Live session not found".to_string()))
}

fn require_instructor(claims: &Claims, session: &LiveSession) -> Result<(), AppError> {
    if !policy::can_manage_course(
        Role::parse(&claims.role),
        claims.user_id(),
        session.instructor_id,
    ) {
        return Err(AppError::Forbidden(
            "You do not own this session".to_string(),
        ));
    }
    Ok(())
}

/// Schedule a live session for a course the caller teaches.
pub async fn create_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateLiveSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.scheduled_end <= payload.scheduled_start {
        return Err(AppError::BadRequest(
            "Session must end after it starts".to_string(),
        ));
    }

    let instructor_id: Option<i64> =
        sqlx::query_scalar("SELECT instructor_id FROM courses WHERE id = $1")
            .bind(payload.course_id)
            .fetch_optional(&pool)
            .await?;
    let instructor_id = instructor_id.ok_or(AppError::NotFound("Course not found".to_string()))?;

    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), instructor_id) {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    let session = sqlx::query_as::<_, LiveSession>(&format!(
        r#"
        INSERT INTO live_sessions (course_id, instructor_id, title, description,
                                   scheduled_start, scheduled_end)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(payload.course_id)
    .bind(claims.user_id())
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.scheduled_start)
    .bind(payload.scheduled_end)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// List live sessions, optionally per course or only upcoming/running.
pub async fn list_sessions(
    State(pool): State<PgPool>,
    Query(params): Query<LiveListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(format!(
        "SELECT {SESSION_COLUMNS} FROM live_sessions WHERE status <> 'canceled'"
    ));

    if let Some(course_id) = params.course_id {
        builder.push(" AND course_id = ");
        builder.push_bind(course_id);
    }
    if params.upcoming.unwrap_or(false) {
        builder.push(" AND status IN ('scheduled', 'live')");
    }
    builder.push(" ORDER BY scheduled_start ASC");

    let sessions: Vec<LiveSession> = builder.build_query_as().fetch_all(&pool).await?;

    Ok(Json(sessions))
}

pub async fn get_session(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = fetch_session(&pool, id).await?;
    Ok(Json(session))
}

/// Go live: mints the stream key and returns it to the instructor. Only
/// valid from 'scheduled'.
pub async fn start_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = fetch_session(&pool, id).await?;
    require_instructor(&claims, &session)?;

    if session.status != "scheduled" {
        return Err(AppError::BadRequest(format!(
            "Cannot start a session that is {}",
            session.status
        )));
    }

    let stream_key = Uuid::new_v4().to_string();
    let play_url = format!("/live/{}/play", id);

    sqlx::query(
        r#"
        UPDATE live_sessions
        SET status = 'live', actual_start = NOW(), stream_key = $1, play_url = $2
        WHERE id = $3
        "#,
    )
    .bind(&stream_key)
    .bind(&play_url)
    .bind(id)
    .execute(&pool)
    .await?;

    Ok(Json(json!({
        "status": "live",
        "stream_key": stream_key,
        "play_url": play_url,
    })))
}

/// End a live session. Attendance flips to attended for everyone who
/// joined while it ran.
pub async fn end_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = fetch_session(&pool, id).await?;
    require_instructor(&claims, &session)?;

    if session.status != "live" {
        return Err(AppError::BadRequest(
            "Session is not live".to_string(),
        ));
    }

    sqlx::query("UPDATE live_sessions SET status = 'ended', actual_end = NOW() WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::OK)
}

/// Cancel a session that has not started.
pub async fn cancel_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = fetch_session(&pool, id).await?;
    require_instructor(&claims, &session)?;

    if session.status != "scheduled" {
        return Err(AppError::BadRequest(
            "Only scheduled sessions can be canceled".to_string(),
        ));
    }

    sqlx::query("UPDATE live_sessions SET status = 'canceled' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::OK)
}

/// Register interest in an upcoming session.
pub async fn register(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = fetch_session(&pool, id).await?;
    if session.status == "ended" || session.status == "canceled" {
        return Err(AppError::BadRequest(
            "Session is over".to_string(),
        ));
    }

    let attendance = sqlx::query_as::<_, LiveAttendance>(
        r#"
        INSERT INTO live_attendance (user_id, session_id)
        VALUES ($1, $2)
        RETURNING id, user_id, session_id, registered_at, attended
        "#,
    )
    .bind(claims.user_id())
    .bind(id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Already registered".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(attendance)))
}

/// Join a running session: marks attendance and hands back the play URL.
pub async fn join_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = fetch_session(&pool, id).await?;
    if session.status != "live" {
        return Err(AppError::BadRequest(
            "Session is not live".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO live_attendance (user_id, session_id, attended)
        VALUES ($1, $2, TRUE)
        ON CONFLICT (user_id, session_id) DO UPDATE SET attended = TRUE
        "#,
    )
    .bind(claims.user_id())
    .bind(id)
    .execute(&pool)
    .await?;

    Ok(Json(json!({ "play_url": session.play_url })))
}

/// Attendance roster for a session. Instructor only.
pub async fn list_attendance(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = fetch_session(&pool, id).await?;
    require_instructor(&claims, &session)?;

    #[derive(serde::Serialize, sqlx::FromRow)]
    struct AttendanceRow {
        user_id: i64,
        username: String,
        registered_at: Option<chrono::DateTime<chrono::Utc>>,
        attended: bool,
    }

    let roster = sqlx::query_as::<_, AttendanceRow>(
        r#"
        SELECT la.user_id, u.username, la.registered_at, la.attended
        FROM live_attendance la
        JOIN users u ON u.id = la.user_id
        WHERE la.session_id = $1
        ORDER BY la.registered_at
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(roster))
}
