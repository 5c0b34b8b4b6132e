// src/handlers/attempt.rs
//
// Attempt lifecycle: start, answer, submit, grade, statistics. An
// attempt's score is the sum of its answers' scores. Timed quizzes are
// enforced lazily: any touch of an expired in-progress attempt finalizes
// it as timed_out with whatever was answered before the deadline.

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{TimeDelta, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::{AppError, is_unique_violation},
    handlers::quiz::fetch_quiz_with_owner,
    models::quiz::{
        Answer, AnswerResponse, AttemptDetail, GradeAnswerRequest, Question, Quiz, QuizAttempt,
        RecentAttempt, StudentPerformance, SubmitAnswerRequest,
    },
    policy::{self, QuizAccess, Role},
    scoring::{self, QuestionType},
    stats::{
        self, AnswerCountRow, AttemptStatRow, ChoiceStatRow, QuestionStatRow, STATUS_COMPLETED,
        STATUS_IN_PROGRESS, STATUS_TIMED_OUT,
    },
    utils::jwt::Claims,
};

const ATTEMPT_COLUMNS: &str =
    "id, user_id, quiz_id, attempt_number, status, start_time, end_time, score, passed";

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

async fn fetch_attempt(pool: &PgPool, id: i64) -> Result<QuizAttempt, AppError> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

fn attempt_deadline(attempt: &QuizAttempt, quiz: &Quiz) -> Option<chrono::DateTime<Utc>> {
    if quiz.time_limit_minutes > 0 {
        Some(attempt.start_time + TimeDelta::minutes(quiz.time_limit_minutes as i64))
    } else {
        None
    }
}

/// Totals the attempt's stored answer scores. An attempt with no
/// answers scores zero.
async fn compute_attempt_score(
    tx: &mut Transaction<'_, Postgres>,
    attempt_id: i64,
) -> Result<f64, AppError> {
    let earned: Option<f64> =
        sqlx::query_scalar("SELECT SUM(score) FROM answers WHERE attempt_id = $1")
            .bind(attempt_id)
            .fetch_one(&mut **tx)
            .await?;

    Ok(round2(earned.unwrap_or(0.0)))
}

/// Finalizes an attempt in place. Timed-out attempts keep their computed
/// score but never pass.
async fn finalize_attempt(
    tx: &mut Transaction<'_, Postgres>,
    attempt: &QuizAttempt,
    quiz: &Quiz,
    status: &str,
) -> Result<QuizAttempt, AppError> {
    let score = compute_attempt_score(tx, attempt.id).await?;
    let passed = status == STATUS_COMPLETED && score >= quiz.pass_score;

    let updated = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        UPDATE quiz_attempts
        SET status = $1, end_time = NOW(), score = $2, passed = $3
        WHERE id = $4
        RETURNING {ATTEMPT_COLUMNS}
        "#
    ))
    .bind(status)
    .bind(score)
    .bind(passed)
    .bind(attempt.id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(updated)
}

/// Applies the lazy time limit: an in-progress attempt past its deadline
/// is finalized as timed_out before the caller proceeds. Returns the
/// attempt as it now stands.
async fn enforce_time_limit(
    pool: &PgPool,
    attempt: QuizAttempt,
    quiz: &Quiz,
) -> Result<QuizAttempt, AppError> {
    if attempt.status != STATUS_IN_PROGRESS {
        return Ok(attempt);
    }
    let Some(deadline) = attempt_deadline(&attempt, quiz) else {
        return Ok(attempt);
    };
    if Utc::now() <= deadline {
        return Ok(attempt);
    }

    let mut tx = pool.begin().await?;
    let updated = finalize_attempt(&mut tx, &attempt, quiz, STATUS_TIMED_OUT).await?;
    tx.commit().await?;
    tracing::info!(attempt_id = attempt.id, "attempt timed out");
    Ok(updated)
}

async fn load_answers(pool: &PgPool, attempt_id: i64) -> Result<Vec<AnswerResponse>, AppError> {
    let answers = sqlx::query_as::<_, Answer>(
        r#"
        SELECT id, attempt_id, question_id, text_answer, is_correct, score, feedback, created_at
        FROM answers
        WHERE attempt_id = $1
        ORDER BY id
        "#,
    )
    .bind(attempt_id)
    .fetch_all(pool)
    .await?;

    #[derive(sqlx::FromRow)]
    struct SelectedRow {
        answer_id: i64,
        choice_id: i64,
    }
    let selected = sqlx::query_as::<_, SelectedRow>(
        r#"
        SELECT ac.answer_id, ac.choice_id
        FROM answer_choices ac
        JOIN answers a ON a.id = ac.answer_id
        WHERE a.attempt_id = $1
        "#,
    )
    .bind(attempt_id)
    .fetch_all(pool)
    .await?;

    Ok(answers
        .into_iter()
        .map(|answer| {
            let selected_choice_ids = selected
                .iter()
                .filter(|s| s.answer_id == answer.id)
                .map(|s| s.choice_id)
                .collect();
            AnswerResponse {
                answer,
                selected_choice_ids,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Attempt lifecycle

/// Start a fresh attempt on a quiz. Attempt numbers are 1-based and
/// gapless per (user, quiz); the unique index arbitrates concurrent
/// starts, with one retry before giving up with 409.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (quiz, owner) = fetch_quiz_with_owner(&pool, quiz_id).await?;
    let user_id = claims.user_id();
    let role = Role::parse(&claims.role);

    let access = match quiz.lesson_id {
        None => QuizAccess::Standalone {
            instructor_id: quiz.instructor_id,
        },
        Some(lesson_id) => {
            #[derive(sqlx::FromRow)]
            struct AccessRow {
                course_is_free: bool,
                enrolled: bool,
            }
            let row = sqlx::query_as::<_, AccessRow>(
                r#"
                SELECT c.is_free AS course_is_free,
                       EXISTS (
                           SELECT 1 FROM enrollments e
                           WHERE e.course_id = c.id AND e.student_id = $2
                       ) AS enrolled
                FROM lessons l
                JOIN sections s ON s.id = l.section_id
                JOIN courses c ON c.id = s.course_id
                WHERE l.id = $1
                "#,
            )
            .bind(lesson_id)
            .bind(user_id)
            .fetch_one(&pool)
            .await?;
            QuizAccess::Lesson {
                course_instructor_id: owner.instructor_id(),
                course_is_free: row.course_is_free,
                enrolled: row.enrolled,
            }
        }
    };

    if !policy::can_start_attempt(role, user_id, &access) {
        return Err(AppError::BadRequest(
            "Enroll in the course to take this quiz".to_string(),
        ));
    }

    for round in 0..2 {
        let used: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM quiz_attempts WHERE user_id = $1 AND quiz_id = $2",
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_one(&pool)
        .await?;

        // 0 means unlimited.
        if quiz.max_attempts > 0 && used >= quiz.max_attempts as i64 {
            return Err(AppError::BadRequest(
                "Maximum attempts reached".to_string(),
            ));
        }

        let inserted = sqlx::query_as::<_, QuizAttempt>(&format!(
            r#"
            INSERT INTO quiz_attempts (user_id, quiz_id, attempt_number)
            VALUES ($1, $2, $3)
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(quiz_id)
        .bind((used + 1) as i32)
        .fetch_one(&pool)
        .await;

        match inserted {
            Ok(attempt) => return Ok((StatusCode::CREATED, Json(attempt))),
            Err(e) if is_unique_violation(&e) && round == 0 => {
                // A concurrent start took this number; recount once.
                continue;
            }
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(
                    "Another attempt is being started, try again".to_string(),
                ));
            }
            Err(e) => return Err(AppError::from(e)),
        }
    }
    unreachable!("attempt insert loop always returns");
}

/// Submit one answer within an in-progress attempt. Objective questions
/// are auto-scored immediately; short answers wait for manual grading.
/// Answering the same question twice is a 409.
pub async fn submit_answer(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id).await?;
    if attempt.user_id != claims.user_id() {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }

    let (quiz, _) = fetch_quiz_with_owner(&pool, attempt.quiz_id).await?;
    let attempt = enforce_time_limit(&pool, attempt, &quiz).await?;
    if attempt.status != STATUS_IN_PROGRESS {
        return Err(AppError::BadRequest(
            "Attempt is no longer in progress".to_string(),
        ));
    }

    let question = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, question_text, question_type, points, explanation, position
        FROM questions
        WHERE id = $1 AND quiz_id = $2
        "#,
    )
    .bind(payload.question_id)
    .bind(quiz.id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound(
        "Question not found in this quiz".to_string(),
    ))?;

    let question_type = QuestionType::parse(&question.question_type).ok_or_else(|| {
        AppError::InternalServerError(format!(
            "Unknown question type '{}'",
            question.question_type
        ))
    })?;

    let selected: HashSet<i64> = payload
        .selected_choice_ids
        .clone()
        .unwrap_or_default()
        .into_iter()
        .collect();

    if question_type.is_objective() {
        if selected.is_empty() {
            return Err(AppError::BadRequest(
                "Select at least one choice".to_string(),
            ));
        }
        if question_type != QuestionType::MultipleChoice && selected.len() > 1 {
            return Err(AppError::BadRequest(
                "This question takes exactly one choice".to_string(),
            ));
        }
    } else if payload.text_answer.as_deref().unwrap_or("").trim().is_empty() {
        return Err(AppError::BadRequest(
            "A text answer is required".to_string(),
        ));
    }

    let valid_choices: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM choices WHERE question_id = $1")
            .bind(question.id)
            .fetch_all(&pool)
            .await?;
    let valid: HashSet<i64> = valid_choices.iter().copied().collect();
    if !selected.is_subset(&valid) {
        return Err(AppError::BadRequest(
            "Choice does not belong to this question".to_string(),
        ));
    }

    let correct: HashSet<i64> =
        sqlx::query_scalar("SELECT id FROM choices WHERE question_id = $1 AND is_correct")
            .bind(question.id)
            .fetch_all(&pool)
            .await?
            .into_iter()
            .collect();

    let graded = scoring::score_selection(question_type, question.points, &correct, &selected);

    let mut tx = pool.begin().await?;

    let answer = sqlx::query_as::<_, Answer>(
        r#"
        INSERT INTO answers (attempt_id, question_id, text_answer, is_correct, score)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, attempt_id, question_id, text_answer, is_correct, score, feedback, created_at
        "#,
    )
    .bind(attempt.id)
    .bind(question.id)
    .bind(&payload.text_answer)
    .bind(graded.is_correct)
    .bind(graded.score)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Question already answered".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    for choice_id in &selected {
        sqlx::query("INSERT INTO answer_choices (answer_id, choice_id) VALUES ($1, $2)")
            .bind(answer.id)
            .bind(choice_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(AnswerResponse {
            answer,
            selected_choice_ids: selected.into_iter().collect(),
        }),
    ))
}

/// Submit the attempt: totals the answer scores, decides pass/fail
/// against the quiz's pass_score and closes the attempt. Submitting
/// past the time limit finalizes as timed_out instead.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id).await?;
    if attempt.user_id != claims.user_id() {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }
    if attempt.status != STATUS_IN_PROGRESS {
        return Err(AppError::BadRequest(
            "Attempt already submitted".to_string(),
        ));
    }

    let (quiz, _) = fetch_quiz_with_owner(&pool, attempt.quiz_id).await?;

    let expired = attempt_deadline(&attempt, &quiz)
        .map(|deadline| Utc::now() > deadline)
        .unwrap_or(false);
    let status = if expired {
        STATUS_TIMED_OUT
    } else {
        STATUS_COMPLETED
    };

    let mut tx = pool.begin().await?;
    let updated = finalize_attempt(&mut tx, &attempt, &quiz, status).await?;
    tx.commit().await?;

    let answers = load_answers(&pool, updated.id).await?;
    Ok(Json(AttemptDetail {
        attempt: updated,
        answers,
    }))
}

/// Get an attempt with its answers. The attempt's owner or a quiz
/// reviewer only.
pub async fn get_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id).await?;
    let (quiz, owner) = fetch_quiz_with_owner(&pool, attempt.quiz_id).await?;

    let role = Role::parse(&claims.role);
    let is_owner = attempt.user_id == claims.user_id();
    if !is_owner && !policy::can_review_quiz(role, claims.user_id(), &owner) {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }

    let attempt = enforce_time_limit(&pool, attempt, &quiz).await?;
    let answers = load_answers(&pool, attempt.id).await?;

    Ok(Json(AttemptDetail { attempt, answers }))
}

/// The current user's attempts on a quiz, newest first.
pub async fn list_my_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
        WHERE user_id = $1 AND quiz_id = $2
        ORDER BY attempt_number DESC
        "#
    ))
    .bind(claims.user_id())
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}

/// All attempts on a quiz. Reviewer only.
pub async fn list_quiz_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (_, owner) = fetch_quiz_with_owner(&pool, quiz_id).await?;
    if !policy::can_review_quiz(Role::parse(&claims.role), claims.user_id(), &owner) {
        return Err(AppError::Forbidden(
            "You do not own this quiz".to_string(),
        ));
    }

    let attempts = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
        WHERE quiz_id = $1
        ORDER BY start_time DESC
        "#
    ))
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}

// ---------------------------------------------------------------------------
// Manual grading

/// Manually grade a short answer. Reviewer only. The raw score is
/// clamped into [0, points]; if the attempt is already finalized its
/// total, and pass/fail for completed attempts, are recomputed.
pub async fn grade_answer(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(answer_id): Path<i64>,
    Json(payload): Json<GradeAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    #[derive(sqlx::FromRow)]
    struct GradeRow {
        attempt_id: i64,
        quiz_id: i64,
        question_type: String,
        points: i32,
        attempt_status: String,
    }

    let row = sqlx::query_as::<_, GradeRow>(
        r#"
        SELECT a.attempt_id, q.quiz_id, q.question_type, q.points,
               qa.status AS attempt_status
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        JOIN quiz_attempts qa ON qa.id = a.attempt_id
        WHERE a.id = $1
        "#,
    )
    .bind(answer_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Answer not found".to_string()))?;

    let (quiz, owner) = fetch_quiz_with_owner(&pool, row.quiz_id).await?;
    if !policy::can_review_quiz(Role::parse(&claims.role), claims.user_id(), &owner) {
        return Err(AppError::Forbidden(
            "You do not own this quiz".to_string(),
        ));
    }

    if row.question_type != "short_answer" {
        return Err(AppError::BadRequest(
            "Only short answers are graded manually".to_string(),
        ));
    }

    let graded = scoring::grade_manual(row.points, payload.score);

    let mut tx = pool.begin().await?;

    let answer = sqlx::query_as::<_, Answer>(
        r#"
        UPDATE answers
        SET score = $1, is_correct = $2, feedback = $3
        WHERE id = $4
        RETURNING id, attempt_id, question_id, text_answer, is_correct, score, feedback, created_at
        "#,
    )
    .bind(graded.score)
    .bind(graded.is_correct)
    .bind(&payload.feedback)
    .bind(answer_id)
    .fetch_one(&mut *tx)
    .await?;

    // Re-derive the attempt total from stored answers, leaving the
    // status and end_time as they were.
    if row.attempt_status != STATUS_IN_PROGRESS {
        let score = compute_attempt_score(&mut tx, row.attempt_id).await?;
        let passed = row.attempt_status == STATUS_COMPLETED && score >= quiz.pass_score;
        sqlx::query("UPDATE quiz_attempts SET score = $1, passed = $2 WHERE id = $3")
            .bind(score)
            .bind(passed)
            .bind(row.attempt_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(Json(answer))
}

// ---------------------------------------------------------------------------
// Statistics

/// Aggregated statistics for a quiz. Reviewer only.
pub async fn get_quiz_statistics(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (quiz, owner) = fetch_quiz_with_owner(&pool, quiz_id).await?;
    if !policy::can_review_quiz(Role::parse(&claims.role), claims.user_id(), &owner) {
        return Err(AppError::Forbidden(
            "You do not own this quiz".to_string(),
        ));
    }

    let attempts = sqlx::query_as::<_, AttemptStatRow>(
        "SELECT status, score, passed, start_time, end_time FROM quiz_attempts WHERE quiz_id = $1",
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    let questions = sqlx::query_as::<_, QuestionStatRow>(
        r#"
        SELECT id, question_text, question_type, points
        FROM questions
        WHERE quiz_id = $1
        ORDER BY position, id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    let answer_counts = sqlx::query_as::<_, AnswerCountRow>(
        r#"
        SELECT a.question_id,
               COUNT(*) AS total,
               COUNT(*) FILTER (WHERE a.is_correct) AS correct
        FROM answers a
        JOIN quiz_attempts qa ON qa.id = a.attempt_id
        WHERE qa.quiz_id = $1 AND qa.status = 'completed'
        GROUP BY a.question_id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    let choices = sqlx::query_as::<_, ChoiceStatRow>(
        r#"
        SELECT c.id, c.question_id, c.choice_text, c.is_correct,
               COUNT(ac.answer_id) FILTER (WHERE qa.status = 'completed') AS selection_count
        FROM choices c
        JOIN questions q ON q.id = c.question_id
        LEFT JOIN answer_choices ac ON ac.choice_id = c.id
        LEFT JOIN answers a ON a.id = ac.answer_id
        LEFT JOIN quiz_attempts qa ON qa.id = a.attempt_id
        WHERE q.quiz_id = $1
        GROUP BY c.id, c.question_id, c.choice_text, c.is_correct
        ORDER BY c.id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    let statistics = stats::build_statistics(
        quiz_id,
        quiz.title,
        &attempts,
        &questions,
        &answer_counts,
        &choices,
    );

    Ok(Json(statistics))
}

/// The current user's performance across all quizzes they attempted.
pub async fn my_performance(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    #[derive(sqlx::FromRow)]
    struct TotalsRow {
        total_quizzes: i64,
        total_attempts: i64,
        passed_quizzes: i64,
        average_score: Option<f64>,
    }

    let totals = sqlx::query_as::<_, TotalsRow>(
        r#"
        SELECT COUNT(DISTINCT quiz_id) AS total_quizzes,
               COUNT(*) AS total_attempts,
               COUNT(DISTINCT quiz_id) FILTER (WHERE passed) AS passed_quizzes,
               AVG(score) FILTER (WHERE status = 'completed') AS average_score
        FROM quiz_attempts
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    let recent_attempts = sqlx::query_as::<_, RecentAttempt>(
        r#"
        SELECT qa.quiz_id, q.title AS quiz_title, qa.score, qa.passed, qa.end_time
        FROM quiz_attempts qa
        JOIN quizzes q ON q.id = qa.quiz_id
        WHERE qa.user_id = $1 AND qa.status <> 'in_progress'
        ORDER BY qa.end_time DESC NULLS LAST
        LIMIT 5
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    let pass_rate = if totals.total_quizzes > 0 {
        round2(totals.passed_quizzes as f64 / totals.total_quizzes as f64 * 100.0)
    } else {
        0.0
    };

    Ok(Json(StudentPerformance {
        total_quizzes: totals.total_quizzes,
        total_attempts: totals.total_attempts,
        passed_quizzes: totals.passed_quizzes,
        average_score: round2(totals.average_score.unwrap_or(0.0)),
        pass_rate,
        recent_attempts,
    }))
}
