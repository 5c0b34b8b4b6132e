// src/handlers/quiz.rs
//
// Quiz, question and choice authoring. A quiz is either attached to a
// lesson (one quiz per lesson, owned by the course instructor) or
// standalone (owned by its creator). Answer keys are only serialized for
// users who can manage the quiz.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::quiz::{
        Choice, CreateChoiceRequest, CreateQuestionRequest, CreateQuizRequest, PublicChoice,
        Question, QuestionDetail, Quiz, QuizDetail, UpdateChoiceRequest, UpdateQuestionRequest,
        UpdateQuizRequest,
    },
    policy::{self, QuizOwner, Role},
    scoring::QuestionType,
    utils::{html::clean_html, jwt::Claims},
};

const QUIZ_COLUMNS: &str = "id, lesson_id, instructor_id, title, description, time_limit_minutes, \
     pass_score, allow_multiple_attempts, max_attempts, randomize_questions, \
     show_correct_answers, created_at, updated_at";

/// Fetches a quiz and resolves its owner. Lesson quizzes resolve to the
/// course instructor, standalone quizzes to their creator.
pub async fn fetch_quiz_with_owner(
    pool: &PgPool,
    quiz_id: i64,
) -> Result<(Quiz, QuizOwner), AppError> {
    let quiz = sqlx::query_as::<_, Quiz>(&format!(
        "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1"
    ))
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let owner = match quiz.lesson_id {
        None => QuizOwner::Standalone {
            instructor_id: quiz.instructor_id,
        },
        Some(lesson_id) => {
            let course_instructor_id: i64 = sqlx::query_scalar(
                r#"
                SELECT c.instructor_id
                FROM lessons l
                JOIN sections s ON s.id = l.section_id
                JOIN courses c ON c.id = s.course_id
                WHERE l.id = $1
                "#,
            )
            .bind(lesson_id)
            .fetch_one(pool)
            .await?;
            QuizOwner::Lesson {
                course_instructor_id,
            }
        }
    };

    Ok((quiz, owner))
}

async fn require_manage(
    pool: &PgPool,
    claims: &Claims,
    quiz_id: i64,
) -> Result<(Quiz, QuizOwner), AppError> {
    let (quiz, owner) = fetch_quiz_with_owner(pool, quiz_id).await?;
    if !policy::can_manage_quiz(Role::parse(&claims.role), claims.user_id(), &owner) {
        return Err(AppError::Forbidden(
            "You do not own this quiz".to_string(),
        ));
    }
    Ok((quiz, owner))
}

fn validate_question_type(s: &str) -> Result<QuestionType, AppError> {
    QuestionType::parse(s)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid question type '{s}'")))
}

async fn insert_question(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    quiz_id: i64,
    payload: &CreateQuestionRequest,
) -> Result<Question, AppError> {
    validate_question_type(&payload.question_type)?;

    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions (quiz_id, question_text, question_type, points, explanation, position)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, quiz_id, question_text, question_type, points, explanation, position
        "#,
    )
    .bind(quiz_id)
    .bind(clean_html(&payload.question_text))
    .bind(&payload.question_type)
    .bind(payload.points.unwrap_or(1))
    .bind(&payload.explanation)
    .bind(payload.position.unwrap_or(0))
    .fetch_one(&mut **tx)
    .await?;

    if let Some(choices) = &payload.choices {
        for choice in choices {
            sqlx::query("INSERT INTO choices (question_id, choice_text, is_correct) VALUES ($1, $2, $3)")
                .bind(question.id)
                .bind(&choice.choice_text)
                .bind(choice.is_correct.unwrap_or(false))
                .execute(&mut **tx)
                .await?;
        }
    }

    Ok(question)
}

// ---------------------------------------------------------------------------
// Quizzes

/// Create a quiz, optionally with nested questions and choices, in one
/// transaction. Teachers and admins only; attaching to a lesson requires
/// owning the lesson's course.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let role = Role::parse(&claims.role);
    if role == Role::Student {
        return Err(AppError::Forbidden(
            "Only teachers can create quizzes".to_string(),
        ));
    }

    if let Some(lesson_id) = payload.lesson_id {
        let course_instructor_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT c.instructor_id
            FROM lessons l
            JOIN sections s ON s.id = l.section_id
            JOIN courses c ON c.id = s.course_id
            WHERE l.id = $1
            "#,
        )
        .bind(lesson_id)
        .fetch_optional(&pool)
        .await?;

        let course_instructor_id =
            course_instructor_id.ok_or(AppError::NotFound("Lesson not found".to_string()))?;
        if !policy::can_manage_course(role, claims.user_id(), course_instructor_id) {
            return Err(AppError::Forbidden(
                "You do not own this course".to_string(),
            ));
        }
    }

    let mut tx = pool.begin().await?;

    let quiz = sqlx::query_as::<_, Quiz>(&format!(
        r#"
        INSERT INTO quizzes (lesson_id, instructor_id, title, description, time_limit_minutes,
                             pass_score, allow_multiple_attempts, max_attempts,
                             randomize_questions, show_correct_answers)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {QUIZ_COLUMNS}
        "#
    ))
    .bind(payload.lesson_id)
    .bind(claims.user_id())
    .bind(&payload.title)
    .bind(payload.description.as_deref().map(clean_html))
    .bind(payload.time_limit_minutes.unwrap_or(0))
    .bind(payload.pass_score.unwrap_or(60.0))
    .bind(payload.allow_multiple_attempts.unwrap_or(true))
    .bind(payload.max_attempts.unwrap_or(3))
    .bind(payload.randomize_questions.unwrap_or(false))
    .bind(payload.show_correct_answers.unwrap_or(true))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("This lesson already has a quiz".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    if let Some(questions) = &payload.questions {
        for question in questions {
            insert_question(&mut tx, quiz.id, question).await?;
        }
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Role-scoped quiz listing: admins see everything, teachers their own,
/// students the quizzes of courses they are enrolled in.
pub async fn list_my_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = match Role::parse(&claims.role) {
        Role::Admin => {
            sqlx::query_as::<_, Quiz>(&format!(
                "SELECT {QUIZ_COLUMNS} FROM quizzes ORDER BY created_at DESC"
            ))
            .fetch_all(&pool)
            .await?
        }
        Role::Teacher => {
            sqlx::query_as::<_, Quiz>(&format!(
                "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE instructor_id = $1 ORDER BY created_at DESC"
            ))
            .bind(claims.user_id())
            .fetch_all(&pool)
            .await?
        }
        Role::Student => {
            sqlx::query_as::<_, Quiz>(&format!(
                r#"
                SELECT {QUIZ_COLUMNS} FROM quizzes
                WHERE lesson_id IN (
                    SELECT l.id
                    FROM lessons l
                    JOIN sections s ON s.id = l.section_id
                    JOIN enrollments e ON e.course_id = s.course_id
                    WHERE e.student_id = $1
                )
                ORDER BY created_at DESC
                "#
            ))
            .bind(claims.user_id())
            .fetch_all(&pool)
            .await?
        }
    };

    Ok(Json(quizzes))
}

/// Get a quiz with questions and choices. Learners see choices without
/// the is_correct flag and no explanations; owners and admins see the
/// full answer key.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (quiz, owner) = fetch_quiz_with_owner(&pool, id).await?;
    let reviewer = policy::can_view_answer_key(Role::parse(&claims.role), claims.user_id(), &owner);

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, question_text, question_type, points, explanation, position
        FROM questions
        WHERE quiz_id = $1
        ORDER BY position, id
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let choices = sqlx::query_as::<_, Choice>(
        r#"
        SELECT c.id, c.question_id, c.choice_text, c.is_correct
        FROM choices c
        JOIN questions q ON q.id = c.question_id
        WHERE q.quiz_id = $1
        ORDER BY c.id
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let questions = questions
        .into_iter()
        .map(|q| {
            let question_choices = choices
                .iter()
                .filter(|c| c.question_id == q.id)
                .map(|c| {
                    if reviewer {
                        json!(c)
                    } else {
                        json!(PublicChoice {
                            id: c.id,
                            question_id: c.question_id,
                            choice_text: c.choice_text.clone(),
                        })
                    }
                })
                .collect();
            QuestionDetail {
                id: q.id,
                quiz_id: q.quiz_id,
                question_text: q.question_text,
                question_type: q.question_type,
                points: q.points,
                explanation: if reviewer { q.explanation } else { None },
                position: q.position,
                choices: question_choices,
            }
        })
        .collect();

    Ok(Json(QuizDetail { quiz, questions }))
}

/// Update a quiz. Owner or admin.
pub async fn update_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    require_manage(&pool, &claims, id).await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE quizzes SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }
    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(&description));
    }
    if let Some(time_limit_minutes) = payload.time_limit_minutes {
        separated.push("time_limit_minutes = ");
        separated.push_bind_unseparated(time_limit_minutes);
    }
    if let Some(pass_score) = payload.pass_score {
        separated.push("pass_score = ");
        separated.push_bind_unseparated(pass_score);
    }
    if let Some(allow_multiple_attempts) = payload.allow_multiple_attempts {
        separated.push("allow_multiple_attempts = ");
        separated.push_bind_unseparated(allow_multiple_attempts);
    }
    if let Some(max_attempts) = payload.max_attempts {
        separated.push("max_attempts = ");
        separated.push_bind_unseparated(max_attempts);
    }
    if let Some(randomize_questions) = payload.randomize_questions {
        separated.push("randomize_questions = ");
        separated.push_bind_unseparated(randomize_questions);
    }
    if let Some(show_correct_answers) = payload.show_correct_answers {
        separated.push("show_correct_answers = ");
        separated.push_bind_unseparated(show_correct_answers);
    }
    separated.push("updated_at = NOW()");

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool).await?;

    Ok(StatusCode::OK)
}

/// Delete a quiz and everything under it. Owner or admin.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_manage(&pool, &claims, id).await?;

    sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Questions

/// Add a question (with optional nested choices) to a quiz. Owner or admin.
pub async fn create_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    require_manage(&pool, &claims, quiz_id).await?;

    let mut tx = pool.begin().await?;
    let question = insert_question(&mut tx, quiz_id, &payload).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Update a question. Owner or admin.
pub async fn update_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let quiz_id: Option<i64> = sqlx::query_scalar("SELECT quiz_id FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;
    let quiz_id = quiz_id.ok_or(AppError::NotFound("Question not found".to_string()))?;

    require_manage(&pool, &claims, quiz_id).await?;

    if let Some(question_type) = &payload.question_type {
        validate_question_type(question_type)?;
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");
    let mut any = false;

    if let Some(question_text) = payload.question_text {
        separated.push("question_text = ");
        separated.push_bind_unseparated(clean_html(&question_text));
        any = true;
    }
    if let Some(question_type) = payload.question_type {
        separated.push("question_type = ");
        separated.push_bind_unseparated(question_type);
        any = true;
    }
    if let Some(points) = payload.points {
        separated.push("points = ");
        separated.push_bind_unseparated(points);
        any = true;
    }
    if let Some(explanation) = payload.explanation {
        separated.push("explanation = ");
        separated.push_bind_unseparated(explanation);
        any = true;
    }
    if let Some(position) = payload.position {
        separated.push("position = ");
        separated.push_bind_unseparated(position);
        any = true;
    }

    if !any {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool).await?;

    Ok(StatusCode::OK)
}

/// Delete a question. Owner or admin.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id: Option<i64> = sqlx::query_scalar("SELECT quiz_id FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;
    let quiz_id = quiz_id.ok_or(AppError::NotFound("Question not found".to_string()))?;

    require_manage(&pool, &claims, quiz_id).await?;

    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Choices

/// Add a choice to a question. Owner or admin.
pub async fn create_choice(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
    Json(payload): Json<CreateChoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let quiz_id: Option<i64> = sqlx::query_scalar("SELECT quiz_id FROM questions WHERE id = $1")
        .bind(question_id)
        .fetch_optional(&pool)
        .await?;
    let quiz_id = quiz_id.ok_or(AppError::NotFound("Question not found".to_string()))?;

    require_manage(&pool, &claims, quiz_id).await?;

    let choice = sqlx::query_as::<_, Choice>(
        r#"
        INSERT INTO choices (question_id, choice_text, is_correct)
        VALUES ($1, $2, $3)
        RETURNING id, question_id, choice_text, is_correct
        "#,
    )
    .bind(question_id)
    .bind(&payload.choice_text)
    .bind(payload.is_correct.unwrap_or(false))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(choice)))
}

/// Update a choice. Owner or admin.
pub async fn update_choice(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateChoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let quiz_id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT q.quiz_id
        FROM choices c
        JOIN questions q ON q.id = c.question_id
        WHERE c.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;
    let quiz_id = quiz_id.ok_or(AppError::NotFound("Choice not found".to_string()))?;

    require_manage(&pool, &claims, quiz_id).await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE choices SET ");
    let mut separated = builder.separated(", ");
    let mut any = false;

    if let Some(choice_text) = payload.choice_text {
        separated.push("choice_text = ");
        separated.push_bind_unseparated(choice_text);
        any = true;
    }
    if let Some(is_correct) = payload.is_correct {
        separated.push("is_correct = ");
        separated.push_bind_unseparated(is_correct);
        any = true;
    }

    if !any {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool).await?;

    Ok(StatusCode::OK)
}

/// Delete a choice. Owner or admin.
pub async fn delete_choice(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT q.quiz_id
        FROM choices c
        JOIN questions q ON q.id = c.question_id
        WHERE c.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;
    let quiz_id = quiz_id.ok_or(AppError::NotFound("Choice not found".to_string()))?;

    require_manage(&pool, &claims, quiz_id).await?;

    sqlx::query("DELETE FROM choices WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
