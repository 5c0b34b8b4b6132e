// tests/quiz_flow_tests.rs

use std::net::SocketAddr;

use edu_platform::{config::Config, routes, state::AppState};
use sqlx::postgres::PgPoolOptions;

async fn spawn_app() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "quiz_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        admin_username: None,
        admin_email: None,
        admin_password: None,
        upload_dir: std::env::temp_dir()
            .join("edu_platform_test_media")
            .to_string_lossy()
            .into_owned(),
        max_upload_bytes: 1024 * 1024,
    };

    let state = AppState { pool, config };
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    address
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

async fn register_and_login(
    client: &reqwest::Client,
    address: &str,
    username: &str,
    role: &str,
) -> String {
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "password123",
            "role": role,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let login = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({"username": username, "password": "password123"}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    login["token"].as_str().unwrap().to_string()
}

/// Creates a standalone quiz with one question of each kind:
/// single_choice (10), multiple_choice with two correct choices (10) and
/// short_answer (10). Pass mark is 15 of the 30 total points. Returns
/// the quiz detail as the teacher sees it.
async fn seed_quiz(
    client: &reqwest::Client,
    address: &str,
    teacher_token: &str,
    max_attempts: i32,
) -> serde_json::Value {
    let response = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(teacher_token)
        .json(&serde_json::json!({
            "title": "Rust fundamentals",
            "pass_score": 15.0,
            "max_attempts": max_attempts,
            "questions": [
                {
                    "question_text": "Which keyword binds a value?",
                    "question_type": "single_choice",
                    "points": 10,
                    "position": 1,
                    "choices": [
                        {"choice_text": "let", "is_correct": true},
                        {"choice_text": "var"},
                        {"choice_text": "def"},
                    ],
                },
                {
                    "question_text": "Which types are Copy?",
                    "question_type": "multiple_choice",
                    "points": 10,
                    "position": 2,
                    "choices": [
                        {"choice_text": "i32", "is_correct": true},
                        {"choice_text": "bool", "is_correct": true},
                        {"choice_text": "String"},
                        {"choice_text": "Vec<u8>"},
                    ],
                },
                {
                    "question_text": "Explain borrowing.",
                    "question_type": "short_answer",
                    "points": 10,
                    "position": 3,
                },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let quiz = response.json::<serde_json::Value>().await.unwrap();
    let quiz_id = quiz["id"].as_i64().unwrap();

    client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(teacher_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap()
}

/// The choice ids of a question, keyed off the teacher's view.
fn choice_ids(question: &serde_json::Value, correct_only: bool) -> Vec<i64> {
    question["choices"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| !correct_only || c["is_correct"].as_bool() == Some(true))
        .map(|c| c["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn full_attempt_scoring_and_regrade_flow() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let teacher_token =
        register_and_login(&client, &address, &unique_name("t"), "teacher").await;
    let student_token =
        register_and_login(&client, &address, &unique_name("s"), "student").await;

    let quiz = seed_quiz(&client, &address, &teacher_token, 3).await;
    let quiz_id = quiz["id"].as_i64().unwrap();
    let questions = quiz["questions"].as_array().unwrap();
    let (q1, q2, q3) = (&questions[0], &questions[1], &questions[2]);

    // Students see choices without the answer key
    let student_view = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    for question in student_view["questions"].as_array().unwrap() {
        for choice in question["choices"].as_array().unwrap() {
            assert!(choice.get("is_correct").is_none(), "answer key leaked");
        }
        assert!(question.get("explanation").is_none());
    }

    // Start the attempt (standalone quizzes are open to any signed-in user)
    let attempt = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(attempt.status().as_u16(), 201);
    let attempt = attempt.json::<serde_json::Value>().await.unwrap();
    let attempt_id = attempt["id"].as_i64().unwrap();
    assert_eq!(attempt["attempt_number"], 1);
    assert_eq!(attempt["status"], "in_progress");

    // Selecting more than one choice on a single-choice question is invalid
    let response = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "question_id": q1["id"],
            "selected_choice_ids": choice_ids(q1, false),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Q1: the correct single choice earns full points
    let answer = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "question_id": q1["id"],
            "selected_choice_ids": choice_ids(q1, true),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(answer.status().as_u16(), 201);
    let answer = answer.json::<serde_json::Value>().await.unwrap();
    assert_eq!(answer["score"], 10.0);
    assert_eq!(answer["is_correct"], true);

    // Answering the same question again is a conflict
    let duplicate = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "question_id": q1["id"],
            "selected_choice_ids": choice_ids(q1, true),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status().as_u16(), 409);

    // Q2: one correct plus one wrong selection cancels to zero
    let all_q2 = choice_ids(q2, false);
    let correct_q2 = choice_ids(q2, true);
    let wrong = *all_q2.iter().find(|id| !correct_q2.contains(id)).unwrap();
    let answer = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "question_id": q2["id"],
            "selected_choice_ids": [correct_q2[0], wrong],
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(answer["score"], 0.0);
    assert_eq!(answer["is_correct"], false);

    // Q3: short answers wait for manual grading
    let answer = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "question_id": q3["id"],
            "text_answer": "References without ownership transfer.",
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(answer["score"], 0.0);
    let short_answer_id = answer["id"].as_i64().unwrap();

    // Submit: the score is the raw sum of answer scores, 10 of 30
    // points, below the 15-point pass mark
    let submitted = client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(submitted["status"], "completed");
    assert_eq!(submitted["score"], 10.0);
    assert_eq!(submitted["passed"], false);

    // Submitting twice is rejected
    let response = client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Students cannot grade
    let response = client
        .put(format!("{}/api/answers/{}/grade", address, short_answer_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({"score": 10.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // The teacher grades the short answer; an over-the-top raw score is
    // clamped to the question's points and the attempt is recomputed.
    let graded = client
        .put(format!("{}/api/answers/{}/grade", address, short_answer_id))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({"score": 15.0, "feedback": "Good enough."}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(graded["score"], 10.0);
    assert_eq!(graded["is_correct"], true);
    assert_eq!(graded["feedback"], "Good enough.");

    // 20 points clears the 15-point pass mark: the attempt now passes
    let attempt = client
        .get(format!("{}/api/attempts/{}", address, attempt_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(attempt["score"], 20.0);
    assert_eq!(attempt["passed"], true);
}

#[tokio::test]
async fn attempt_limits_and_gapless_numbering() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let teacher_token =
        register_and_login(&client, &address, &unique_name("t"), "teacher").await;
    let student_token =
        register_and_login(&client, &address, &unique_name("s"), "student").await;

    let quiz = seed_quiz(&client, &address, &teacher_token, 2).await;
    let quiz_id = quiz["id"].as_i64().unwrap();

    for expected_number in 1..=2 {
        let attempt = client
            .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
            .bearer_auth(&student_token)
            .send()
            .await
            .unwrap();
        assert_eq!(attempt.status().as_u16(), 201);
        let attempt = attempt.json::<serde_json::Value>().await.unwrap();
        assert_eq!(attempt["attempt_number"], expected_number);

        let response = client
            .post(format!(
                "{}/api/attempts/{}/submit",
                address,
                attempt["id"].as_i64().unwrap()
            ))
            .bearer_auth(&student_token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    // The third start exceeds max_attempts
    let response = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let attempts = client
        .get(format!("{}/api/quizzes/{}/attempts/mine", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let mut numbers: Vec<i64> = attempts
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["attempt_number"].as_i64().unwrap())
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn concurrent_starts_never_duplicate_numbers() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let teacher_token =
        register_and_login(&client, &address, &unique_name("t"), "teacher").await;
    let student_token =
        register_and_login(&client, &address, &unique_name("s"), "student").await;

    let quiz = seed_quiz(&client, &address, &teacher_token, 0).await;
    let quiz_id = quiz["id"].as_i64().unwrap();
    let url = format!("{}/api/quizzes/{}/attempts", address, quiz_id);

    let (a, b, c) = tokio::join!(
        client.post(&url).bearer_auth(&student_token).send(),
        client.post(&url).bearer_auth(&student_token).send(),
        client.post(&url).bearer_auth(&student_token).send(),
    );

    // Every racer gets a clean answer: a fresh attempt or a conflict.
    // Never a 500.
    for response in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert!(
            [201, 409].contains(&response.status().as_u16()),
            "unexpected status {}",
            response.status()
        );
    }

    let attempts = client
        .get(format!("{}/api/quizzes/{}/attempts/mine", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let mut numbers: Vec<i64> = attempts
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["attempt_number"].as_i64().unwrap())
        .collect();
    numbers.sort_unstable();
    let expected: Vec<i64> = (1..=numbers.len() as i64).collect();
    assert_eq!(numbers, expected, "attempt numbers must be gapless");
}

#[tokio::test]
async fn retakes_limited_by_max_attempts_alone() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let teacher_token =
        register_and_login(&client, &address, &unique_name("t"), "teacher").await;
    let student_token =
        register_and_login(&client, &address, &unique_name("s"), "student").await;

    let quiz = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({
            "title": "Two tries",
            "allow_multiple_attempts": false,
            "max_attempts": 2,
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let quiz_id = quiz["id"].as_i64().unwrap();

    let first = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 201);
    let first = first.json::<serde_json::Value>().await.unwrap();
    assert_eq!(first["attempt_number"], 1);

    // allow_multiple_attempts is recorded but only max_attempts gates the
    // count, and each start creates a fresh attempt even while the first
    // is still open.
    let second = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 201);
    let second = second.json::<serde_json::Value>().await.unwrap();
    assert_eq!(second["attempt_number"], 2);
    assert_eq!(second["status"], "in_progress");

    let third = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(third.status().as_u16(), 400);
}

#[tokio::test]
async fn lesson_quiz_requires_enrollment() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let teacher_token =
        register_and_login(&client, &address, &unique_name("t"), "teacher").await;
    let student_token =
        register_and_login(&client, &address, &unique_name("s"), "student").await;

    // Paid course with one quiz lesson, published
    let course = client
        .post(format!("{}/api/courses", address))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({
            "title": "Paid course",
            "description": "d",
            "price": 49.0,
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let course_id = course["id"].as_i64().unwrap();

    let section = client
        .post(format!("{}/api/courses/{}/sections", address, course_id))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({"title": "Week 1"}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let lesson = client
        .post(format!(
            "{}/api/sections/{}/lessons",
            address,
            section["id"].as_i64().unwrap()
        ))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({"title": "Checkpoint", "lesson_type": "quiz"}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    client
        .put(format!("{}/api/courses/{}", address, course_id))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({"status": "published"}))
        .send()
        .await
        .unwrap();

    let quiz = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({
            "title": "Checkpoint quiz",
            "lesson_id": lesson["id"],
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let quiz_id = quiz["id"].as_i64().unwrap();

    // A second quiz on the same lesson is rejected
    let response = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({"title": "Dup", "lesson_id": lesson["id"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // Unenrolled student is turned away
    let response = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Enrolled student may start
    client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    let response = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    // The teacher can start their own lesson quiz without enrolling
    let response = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&teacher_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn expired_attempt_times_out_lazily() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .unwrap();

    let teacher_token =
        register_and_login(&client, &address, &unique_name("t"), "teacher").await;
    let student_token =
        register_and_login(&client, &address, &unique_name("s"), "student").await;

    let quiz = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(&teacher_token)
        .json(&serde_json::json!({
            "title": "Timed quiz",
            "time_limit_minutes": 5,
            "questions": [{
                "question_text": "2 + 2?",
                "question_type": "single_choice",
                "points": 10,
                "choices": [
                    {"choice_text": "4", "is_correct": true},
                    {"choice_text": "5"},
                ],
            }],
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let quiz_id = quiz["id"].as_i64().unwrap();

    let attempt = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let attempt_id = attempt["id"].as_i64().unwrap();

    // Backdate the start past the time limit
    sqlx::query("UPDATE quiz_attempts SET start_time = NOW() - INTERVAL '10 minutes' WHERE id = $1")
        .bind(attempt_id)
        .execute(&pool)
        .await
        .unwrap();

    // Answering now is rejected and the attempt is closed as timed_out
    let quiz_detail = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&teacher_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let question = &quiz_detail["questions"][0];
    let choice_id = question["choices"][0]["id"].as_i64().unwrap();

    let response = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "question_id": question["id"],
            "selected_choice_ids": [choice_id],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let attempt = client
        .get(format!("{}/api/attempts/{}", address, attempt_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(attempt["status"], "timed_out");
    assert_eq!(attempt["passed"], false);
}

#[tokio::test]
async fn statistics_reflect_attempts_and_survive_empty_quizzes() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let teacher_token =
        register_and_login(&client, &address, &unique_name("t"), "teacher").await;
    let student_token =
        register_and_login(&client, &address, &unique_name("s"), "student").await;

    let quiz = seed_quiz(&client, &address, &teacher_token, 3).await;
    let quiz_id = quiz["id"].as_i64().unwrap();
    let questions = quiz["questions"].as_array().unwrap();
    let q1 = &questions[0];

    // Before any attempts: all zeros, no division blowups
    let stats = client
        .get(format!("{}/api/quizzes/{}/statistics", address, quiz_id))
        .bearer_auth(&teacher_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(stats["total_attempts"], 0);
    assert_eq!(stats["pass_rate"], 0.0);
    assert_eq!(stats["average_score"], 0.0);
    assert_eq!(stats["average_completion_time"], 0.0);
    assert_eq!(stats["questions"][0]["correct_rate"], 0.0);

    // Students cannot read statistics
    let response = client
        .get(format!("{}/api/quizzes/{}/statistics", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // One completed attempt answering only Q1 correctly: 10 points
    let attempt = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let attempt_id = attempt["id"].as_i64().unwrap();
    let correct: Vec<i64> = q1["choices"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["is_correct"].as_bool() == Some(true))
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({"question_id": q1["id"], "selected_choice_ids": correct}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();

    // Plus one abandoned in-progress attempt from a second student
    let other_token = register_and_login(&client, &address, &unique_name("s2"), "student").await;
    client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();

    let stats = client
        .get(format!("{}/api/quizzes/{}/statistics", address, quiz_id))
        .bearer_auth(&teacher_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    assert_eq!(stats["total_attempts"], 2);
    assert_eq!(stats["completed_attempts"], 1);
    assert_eq!(stats["passed_attempts"], 0);
    assert_eq!(stats["pass_rate"], 0.0);
    assert_eq!(stats["average_score"], 10.0);
    // Distribution covers all attempts: the in-progress zero and the
    // 10-point completed one both land in the lowest bucket
    assert_eq!(stats["score_distribution"]["0-20"], 2);
    assert_eq!(stats["score_distribution"]["20-40"], 0);

    let q1_stats = &stats["questions"][0];
    assert_eq!(q1_stats["total_answers"], 1);
    assert_eq!(q1_stats["correct_answers"], 1);
    assert_eq!(q1_stats["correct_rate"], 100.0);
    let picked = q1_stats["choices"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["is_correct"].as_bool() == Some(true))
        .unwrap();
    assert_eq!(picked["selection_count"], 1);
    assert_eq!(picked["selection_rate"], 100.0);

    // Unanswered questions report zero rates
    assert_eq!(stats["questions"][2]["total_answers"], 0);
    assert_eq!(stats["questions"][2]["correct_rate"], 0.0);
}
