// src/handlers/enrollment.rs
//
// Enrollment ledger and per-lesson progress. Progress rows are upserted
// under the (enrollment, lesson) unique key; a course flips to completed
// when every lesson reaches completed.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::enrollment::{
        CourseProgressSummary, Enrollment, EnrollmentListItem, LessonProgress,
        UpdateProgressRequest,
    },
    utils::jwt::Claims,
};

/// Enroll the current user into a course. Free courses enroll directly;
/// paid courses would go through a payment flow, which this service does
/// not implement, so they enroll directly as well.
pub async fn enroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&pool)
            .await?;

    match status.as_deref() {
        None => return Err(AppError::NotFound("Course not found".to_string())),
        Some("published") => {}
        Some(_) => {
            return Err(AppError::BadRequest(
                "Course is not open for enrollment".to_string(),
            ));
        }
    }

    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        INSERT INTO enrollments (student_id, course_id)
        VALUES ($1, $2)
        RETURNING id, student_id, course_id, status, enrolled_at, completed_at
        "#,
    )
    .bind(claims.user_id())
    .bind(course_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Already enrolled in this course".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// List the current user's enrollments with course info.
pub async fn list_my_enrollments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let enrollments = sqlx::query_as::<_, EnrollmentListItem>(
        r#"
        SELECT e.id, e.course_id, c.title AS course_title,
               u.username AS instructor_name, e.status, e.enrolled_at
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        JOIN users u ON u.id = c.instructor_id
        WHERE e.student_id = $1
        ORDER BY e.enrolled_at DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(enrollments))
}

/// Upsert progress on a lesson. Requires an active enrollment in the
/// lesson's course. Reaching 100% marks the lesson completed, and the
/// enrollment completes once every lesson in the course is completed.
pub async fn update_lesson_progress(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(lesson_id): Path<i64>,
    Json(payload): Json<UpdateProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let enrollment_id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT e.id
        FROM lessons l
        JOIN sections s ON s.id = l.section_id
        JOIN enrollments e ON e.course_id = s.course_id AND e.student_id = $1
        WHERE l.id = $2
        "#,
    )
    .bind(claims.user_id())
    .bind(lesson_id)
    .fetch_optional(&pool)
    .await?;

    let enrollment_id = enrollment_id.ok_or(AppError::Forbidden(
        "Not enrolled in this course".to_string(),
    ))?;

    let status = if payload.progress_percent >= 100 {
        "completed"
    } else if payload.progress_percent > 0 {
        "in_progress"
    } else {
        "not_started"
    };

    let mut tx = pool.begin().await?;

    let progress = sqlx::query_as::<_, LessonProgress>(
        r#"
        INSERT INTO lesson_progress (enrollment_id, lesson_id, status, progress_percent, last_position_seconds, last_accessed)
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (enrollment_id, lesson_id) DO UPDATE SET
            status = EXCLUDED.status,
            progress_percent = GREATEST(lesson_progress.progress_percent, EXCLUDED.progress_percent),
            last_position_seconds = EXCLUDED.last_position_seconds,
            last_accessed = NOW()
        RETURNING id, enrollment_id, lesson_id, status, progress_percent, last_position_seconds, last_accessed
        "#,
    )
    .bind(enrollment_id)
    .bind(lesson_id)
    .bind(status)
    .bind(payload.progress_percent)
    .bind(payload.last_position_seconds.unwrap_or(0))
    .fetch_one(&mut *tx)
    .await?;

    if status == "completed" {
        // Complete the enrollment once nothing in the course is left.
        let remaining: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM lessons l
            JOIN sections s ON s.id = l.section_id
            JOIN enrollments e ON e.course_id = s.course_id
            WHERE e.id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM lesson_progress lp
                  WHERE lp.enrollment_id = e.id
                    AND lp.lesson_id = l.id
                    AND lp.status = 'completed'
              )
            "#,
        )
        .bind(enrollment_id)
        .fetch_one(&mut *tx)
        .await?;

        if remaining == 0 {
            sqlx::query(
                "UPDATE enrollments SET status = 'completed', completed_at = NOW() WHERE id = $1 AND status = 'active'",
            )
            .bind(enrollment_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    Ok(Json(progress))
}

/// Progress summary for one of the current user's enrolled courses.
pub async fn get_course_progress(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment_id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM enrollments WHERE student_id = $1 AND course_id = $2",
    )
    .bind(claims.user_id())
    .bind(course_id)
    .fetch_optional(&pool)
    .await?;

    let enrollment_id = enrollment_id.ok_or(AppError::NotFound(
        "Not enrolled in this course".to_string(),
    ))?;

    let total_lessons: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM lessons l
        JOIN sections s ON s.id = l.section_id
        WHERE s.course_id = $1
        "#,
    )
    .bind(course_id)
    .fetch_one(&pool)
    .await?;

    let completed_lessons: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM lesson_progress WHERE enrollment_id = $1 AND status = 'completed'",
    )
    .bind(enrollment_id)
    .fetch_one(&pool)
    .await?;

    let percent = if total_lessons > 0 {
        (completed_lessons as f64 / total_lessons as f64 * 10000.0).round() / 100.0
    } else {
        0.0
    };

    Ok(Json(CourseProgressSummary {
        course_id,
        total_lessons,
        completed_lessons,
        percent,
    }))
}

/// Lesson progress rows for one of the current user's enrollments.
pub async fn list_lesson_progress(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let rows = sqlx::query_as::<_, LessonProgress>(
        r#"
        SELECT lp.id, lp.enrollment_id, lp.lesson_id, lp.status,
               lp.progress_percent, lp.last_position_seconds, lp.last_accessed
        FROM lesson_progress lp
        JOIN enrollments e ON e.id = lp.enrollment_id
        WHERE e.student_id = $1 AND e.course_id = $2
        ORDER BY lp.lesson_id
        "#,
    )
    .bind(claims.user_id())
    .bind(course_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(rows))
}
