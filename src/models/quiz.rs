// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table in the database.
///
/// `lesson_id` is NULL for standalone quizzes, which are owned directly
/// by `instructor_id`; lesson quizzes are owned by the lesson's course
/// instructor. Ownership is resolved once into `policy::QuizOwner`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub lesson_id: Option<i64>,
    pub instructor_id: i64,
    pub title: String,
    pub description: Option<String>,
    /// 0 = unlimited.
    pub time_limit_minutes: i32,
    pub pass_score: f64,
    pub allow_multiple_attempts: bool,
    /// 0 = unlimited.
    pub max_attempts: i32,
    pub randomize_questions: bool,
    pub show_correct_answers: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub question_text: String,
    /// 'single_choice', 'multiple_choice', 'true_false' or 'short_answer'.
    pub question_type: String,
    pub points: i32,
    pub explanation: Option<String>,
    /// Ordering key, not unique.
    pub position: i32,
}

/// Represents the 'choices' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
    pub is_correct: bool,
}

/// DTO for sending a choice to learners (hides is_correct).
#[derive(Debug, Serialize, FromRow)]
pub struct PublicChoice {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
}

/// Question with its choices; answer keys included only for reviewers.
#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    pub id: i64,
    pub quiz_id: i64,
    pub question_text: String,
    pub question_type: String,
    pub points: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub position: i32,
    pub choices: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionDetail>,
}

/// DTO for creating a choice, standalone or nested under a question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateChoiceRequest {
    #[validate(length(min = 1, max = 255))]
    pub choice_text: String,
    pub is_correct: Option<bool>,
}

/// DTO for creating a question, standalone or nested under a quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 10000))]
    pub question_text: String,
    pub question_type: String,
    #[validate(range(min = 1))]
    pub points: Option<i32>,
    #[validate(length(max = 10000))]
    pub explanation: Option<String>,
    pub position: Option<i32>,
    #[validate(nested)]
    pub choices: Option<Vec<CreateChoiceRequest>>,
}

/// DTO for creating a quiz, optionally with nested questions and choices.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    pub lesson_id: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub time_limit_minutes: Option<i32>,
    #[validate(range(min = 0.0))]
    pub pass_score: Option<f64>,
    pub allow_multiple_attempts: Option<bool>,
    #[validate(range(min = 0))]
    pub max_attempts: Option<i32>,
    pub randomize_questions: Option<bool>,
    pub show_correct_answers: Option<bool>,
    #[validate(nested)]
    pub questions: Option<Vec<CreateQuestionRequest>>,
}

/// DTO for updating a quiz. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub time_limit_minutes: Option<i32>,
    #[validate(range(min = 0.0))]
    pub pass_score: Option<f64>,
    pub allow_multiple_attempts: Option<bool>,
    #[validate(range(min = 0))]
    pub max_attempts: Option<i32>,
    pub randomize_questions: Option<bool>,
    pub show_correct_answers: Option<bool>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 10000))]
    pub question_text: Option<String>,
    pub question_type: Option<String>,
    #[validate(range(min = 1))]
    pub points: Option<i32>,
    #[validate(length(max = 10000))]
    pub explanation: Option<String>,
    pub position: Option<i32>,
}

/// DTO for updating a choice. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChoiceRequest {
    #[validate(length(min = 1, max = 255))]
    pub choice_text: Option<String>,
    pub is_correct: Option<bool>,
}

/// Represents the 'quiz_attempts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    /// 1-based, gapless per (user, quiz).
    pub attempt_number: i32,
    /// 'in_progress', 'completed' or 'timed_out'.
    pub status: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub score: f64,
    pub passed: bool,
}

/// Represents the 'answers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub text_answer: Option<String>,
    pub is_correct: bool,
    pub score: f64,
    pub feedback: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Answer plus the ids of the choices it selected.
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    #[serde(flatten)]
    pub answer: Answer,
    pub selected_choice_ids: Vec<i64>,
}

/// DTO for submitting one answer within an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    /// Objective questions: the selected choice ids.
    pub selected_choice_ids: Option<Vec<i64>>,
    /// Short-answer questions: the free text.
    pub text_answer: Option<String>,
}

/// DTO for manually grading a short answer.
#[derive(Debug, Deserialize)]
pub struct GradeAnswerRequest {
    pub score: f64,
    pub feedback: Option<String>,
}

/// Attempt with its answers, returned from submit/get.
#[derive(Debug, Serialize)]
pub struct AttemptDetail {
    #[serde(flatten)]
    pub attempt: QuizAttempt,
    pub answers: Vec<AnswerResponse>,
}

/// Student performance summary over completed attempts.
#[derive(Debug, Serialize)]
pub struct StudentPerformance {
    pub total_quizzes: i64,
    pub total_attempts: i64,
    pub passed_quizzes: i64,
    pub average_score: f64,
    pub pass_rate: f64,
    pub recent_attempts: Vec<RecentAttempt>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct RecentAttempt {
    pub quiz_id: i64,
    pub quiz_title: String,
    pub score: f64,
    pub passed: bool,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}
