// src/routes.rs

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::{delete, get, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{
        attempt, auth, catalog, comment, enrollment, live, notification, profile, quiz, upload,
    },
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Nests all sub-routers (auth, catalog, assessment, social, live, admin).
/// * Applies global middleware (Trace, CORS) and rate limiting on auth.
/// * Injects global state (database pool + config).
///
/// Serve the result with `into_make_service_with_connect_info::<SocketAddr>()`
/// so the rate limiter can key on the peer address.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    // Brute-force protection on the credential endpoints only.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(10)
            .finish()
            .unwrap(),
    );

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(GovernorLayer::new(governor_conf));

    let user_routes = Router::new()
        .route("/me", get(profile::get_me).put(profile::update_me))
        .route("/me/performance", get(attempt::my_performance))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let category_routes = Router::new().route("/", get(catalog::list_categories));

    let course_routes = Router::new()
        .route("/", get(catalog::list_courses))
        .route("/{id}", get(catalog::get_course))
        .merge(
            Router::new()
                .route("/", post(catalog::create_course))
                .route("/mine", get(catalog::list_my_courses))
                .route(
                    "/{id}",
                    put(catalog::update_course).delete(catalog::delete_course),
                )
                .route("/{id}/sections", post(catalog::create_section))
                .route("/{id}/enroll", post(enrollment::enroll))
                .route("/{id}/progress", get(enrollment::get_course_progress))
                .route(
                    "/{id}/lessons/progress",
                    get(enrollment::list_lesson_progress),
                )
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let section_routes = Router::new()
        .route(
            "/{id}",
            put(catalog::update_section).delete(catalog::delete_section),
        )
        .route("/{id}/lessons", post(catalog::create_lesson))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let lesson_routes = Router::new()
        .route(
            "/{id}",
            put(catalog::update_lesson).delete(catalog::delete_lesson),
        )
        .route("/{id}/progress", put(enrollment::update_lesson_progress))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let enrollment_routes = Router::new()
        .route("/mine", get(enrollment::list_my_enrollments))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let quiz_routes = Router::new()
        .route("/", post(quiz::create_quiz))
        .route("/mine", get(quiz::list_my_quizzes))
        .route(
            "/{id}",
            get(quiz::get_quiz)
                .put(quiz::update_quiz)
                .delete(quiz::delete_quiz),
        )
        .route("/{id}/questions", post(quiz::create_question))
        .route(
            "/{id}/attempts",
            post(attempt::start_attempt).get(attempt::list_quiz_attempts),
        )
        .route("/{id}/attempts/mine", get(attempt::list_my_attempts))
        .route("/{id}/statistics", get(attempt::get_quiz_statistics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let question_routes = Router::new()
        .route(
            "/{id}",
            put(quiz::update_question).delete(quiz::delete_question),
        )
        .route("/{id}/choices", post(quiz::create_choice))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let choice_routes = Router::new()
        .route("/{id}", put(quiz::update_choice).delete(quiz::delete_choice))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let attempt_routes = Router::new()
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/answers", post(attempt::submit_answer))
        .route("/{id}/submit", post(attempt::submit_attempt))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let answer_routes = Router::new()
        .route("/{id}/grade", put(attempt::grade_answer))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let comment_routes = Router::new()
        .route("/", get(comment::list_comments))
        .merge(
            Router::new()
                .route("/", post(comment::create_comment))
                .route("/{id}", delete(comment::delete_comment))
                .route("/{id}/like", post(comment::toggle_like))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let notification_routes = Router::new()
        .route("/", get(notification::list_notifications))
        .route("/unread", get(notification::unread_count))
        .route("/read-all", put(notification::mark_all_read))
        .route("/{id}/read", put(notification::mark_read))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let live_routes = Router::new()
        .route("/", get(live::list_sessions))
        .route("/{id}", get(live::get_session))
        .merge(
            Router::new()
                .route("/", post(live::create_session))
                .route("/{id}/start", post(live::start_session))
                .route("/{id}/end", post(live::end_session))
                .route("/{id}/cancel", post(live::cancel_session))
                .route("/{id}/register", post(live::register))
                .route("/{id}/join", post(live::join_session))
                .route("/{id}/attendance", get(live::list_attendance))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let upload_routes = Router::new()
        .route("/", post(upload::upload_file))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes + 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/users", get(profile::list_users))
        .route(
            "/users/{id}",
            put(profile::update_user).delete(profile::delete_user),
        )
        .route("/categories", post(catalog::create_category))
        .route("/categories/{id}", delete(catalog::delete_category))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/categories", category_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/sections", section_routes)
        .nest("/api/lessons", lesson_routes)
        .nest("/api/enrollments", enrollment_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/choices", choice_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/answers", answer_routes)
        .nest("/api/comments", comment_routes)
        .nest("/api/notifications", notification_routes)
        .nest("/api/live", live_routes)
        .nest("/api/upload", upload_routes)
        .nest("/api/admin", admin_routes)
        .nest_service("/media", ServeDir::new(&state.config.upload_dir))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
