// src/handlers/catalog.rs
//
// Category / course / section / lesson CRUD. The content tree is authored
// by teachers; reads are public for published courses.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::catalog::{
        Category, Course, CourseDetail, CourseListItem, CourseListParams, CreateCategoryRequest,
        CreateCourseRequest, CreateLessonRequest, CreateSectionRequest, Lesson, Section,
        SectionWithLessons, UpdateCourseRequest, UpdateLessonRequest, UpdateSectionRequest,
    },
    policy::{self, Role},
    utils::{html::clean_html, jwt::Claims},
};

/// Fetches a course row or 404s. Shared by the ownership-gated mutations.
async fn fetch_course(pool: &PgPool, id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>(
        r#"
        SELECT id, title, instructor_id, category_id, description, cover_url,
               status, price, is_free, created_at, updated_at
        FROM courses
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))
}

/// Resolves a section to its owning course, 404 when missing.
async fn fetch_section_course(pool: &PgPool, section_id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>(
        r#"
        SELECT c.id, c.title, c.instructor_id, c.category_id, c.description, c.cover_url,
               c.status, c.price, c.is_free, c.created_at, c.updated_at
        FROM sections s
        JOIN courses c ON c.id = s.course_id
        WHERE s.id = $1
        "#,
    )
    .bind(section_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Section not found".to_string()))
}

/// Resolves a lesson to its owning course, 404 when missing.
async fn fetch_lesson_course(pool: &PgPool, lesson_id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>(
        r#"
        SELECT c.id, c.title, c.instructor_id, c.category_id, c.description, c.cover_url,
               c.status, c.price, c.is_free, c.created_at, c.updated_at
        FROM lessons l
        JOIN sections s ON s.id = l.section_id
        JOIN courses c ON c.id = s.course_id
        WHERE l.id = $1
        "#,
    )
    .bind(lesson_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Lesson not found".to_string()))
}

// ---------------------------------------------------------------------------
// Categories

pub async fn list_categories(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name, description, created_at FROM categories ORDER BY name",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(categories))
}

/// Admin only.
pub async fn create_category(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let category = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, description)
        VALUES ($1, $2)
        RETURNING id, name, description, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Category '{}' already exists", payload.name))
        } else {
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// Admin only.
pub async fn delete_category(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Category not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Courses

/// List published courses, optionally filtered by category or keyword.
pub async fn list_courses(
    State(pool): State<PgPool>,
    Query(params): Query<CourseListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20).min(100);

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
        SELECT c.id, c.title, c.instructor_id, u.username AS instructor_name,
               c.category_id, c.cover_url, c.status, c.price, c.is_free, c.created_at
        FROM courses c
        JOIN users u ON u.id = c.instructor_id
        WHERE c.status = 'published'
        "#,
    );

    if let Some(category_id) = params.category_id {
        builder.push(" AND c.category_id = ");
        builder.push_bind(category_id);
    }
    if let Some(q) = &params.q {
        builder.push(" AND c.title ILIKE ");
        builder.push_bind(format!("%{}%", q));
    }

    builder.push(" ORDER BY c.created_at DESC LIMIT ");
    builder.push_bind(limit);

    let courses: Vec<CourseListItem> = builder.build_query_as().fetch_all(&pool).await?;

    Ok(Json(courses))
}

/// List courses taught by the current user.
pub async fn list_my_courses(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let courses = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, title, instructor_id, category_id, description, cover_url,
               status, price, is_free, created_at, updated_at
        FROM courses
        WHERE instructor_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(courses))
}

/// Get a single course with its sections and lessons.
pub async fn get_course(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = fetch_course(&pool, id).await?;

    let sections = sqlx::query_as::<_, Section>(
        "SELECT id, course_id, title, description, position FROM sections WHERE course_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let lessons = sqlx::query_as::<_, Lesson>(
        r#"
        SELECT l.id, l.section_id, l.title, l.lesson_type, l.content, l.video_url,
               l.duration_minutes, l.position, l.is_free_preview
        FROM lessons l
        JOIN sections s ON s.id = l.section_id
        WHERE s.course_id = $1
        ORDER BY l.position
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let sections = sections
        .into_iter()
        .map(|section| {
            let lessons = lessons
                .iter()
                .filter(|l| l.section_id == section.id)
                .cloned()
                .collect();
            SectionWithLessons { section, lessons }
        })
        .collect();

    Ok(Json(CourseDetail { course, sections }))
}

/// Create a course. Teachers and admins only.
pub async fn create_course(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let role = Role::parse(&claims.role);
    if role == Role::Student {
        return Err(AppError::Forbidden(
            "Only teachers can create courses".to_string(),
        ));
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (title, instructor_id, category_id, description, cover_url, price, is_free)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, title, instructor_id, category_id, description, cover_url,
                  status, price, is_free, created_at, updated_at
        "#,
    )
    .bind(&payload.title)
    .bind(claims.user_id())
    .bind(payload.category_id)
    .bind(clean_html(&payload.description))
    .bind(&payload.cover_url)
    .bind(payload.price.unwrap_or(0.0))
    .bind(payload.is_free.unwrap_or(false))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create course: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(course)))
}

/// Update a course. Owner or admin.
pub async fn update_course(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let course = fetch_course(&pool, id).await?;
    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), course.instructor_id)
    {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    if let Some(status) = &payload.status {
        if !["draft", "published", "archived"].contains(&status.as_str()) {
            return Err(AppError::BadRequest("Invalid status".to_string()));
        }
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE courses SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }
    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(&description));
    }
    if let Some(category_id) = payload.category_id {
        separated.push("category_id = ");
        separated.push_bind_unseparated(category_id);
    }
    if let Some(cover_url) = payload.cover_url {
        separated.push("cover_url = ");
        separated.push_bind_unseparated(cover_url);
    }
    if let Some(status) = payload.status {
        separated.push("status = ");
        separated.push_bind_unseparated(status);
    }
    if let Some(price) = payload.price {
        separated.push("price = ");
        separated.push_bind_unseparated(price);
    }
    if let Some(is_free) = payload.is_free {
        separated.push("is_free = ");
        separated.push_bind_unseparated(is_free);
    }
    separated.push("updated_at = NOW()");

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool).await?;

    Ok(StatusCode::OK)
}

/// Delete a course. Owner or admin.
pub async fn delete_course(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = fetch_course(&pool, id).await?;
    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), course.instructor_id)
    {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Sections

/// Add a section to a course. Owner or admin.
pub async fn create_section(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateSectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let course = fetch_course(&pool, course_id).await?;
    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), course.instructor_id)
    {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    let section = sqlx::query_as::<_, Section>(
        r#"
        INSERT INTO sections (course_id, title, description, position)
        VALUES ($1, $2, $3, $4)
        RETURNING id, course_id, title, description, position
        "#,
    )
    .bind(course_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.position.unwrap_or(0))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(section)))
}

/// Update a section. Owner or admin.
pub async fn update_section(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let course = fetch_section_course(&pool, id).await?;
    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), course.instructor_id)
    {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE sections SET ");
    let mut separated = builder.separated(", ");
    let mut any = false;

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
        any = true;
    }
    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
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

/// Delete a section. Owner or admin.
pub async fn delete_section(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = fetch_section_course(&pool, id).await?;
    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), course.instructor_id)
    {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    sqlx::query("DELETE FROM sections WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Lessons

/// Add a lesson to a section. Owner or admin.
pub async fn create_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(section_id): Path<i64>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let course = fetch_section_course(&pool, section_id).await?;
    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), course.instructor_id)
    {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    let lesson_type = payload.lesson_type.as_deref().unwrap_or("video");
    if !["video", "document", "quiz"].contains(&lesson_type) {
        return Err(AppError::BadRequest("Invalid lesson type".to_string()));
    }

    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons (section_id, title, lesson_type, content, video_url,
                             duration_minutes, position, is_free_preview)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, section_id, title, lesson_type, content, video_url,
                  duration_minutes, position, is_free_preview
        "#,
    )
    .bind(section_id)
    .bind(&payload.title)
    .bind(lesson_type)
    .bind(payload.content.as_deref().map(clean_html))
    .bind(&payload.video_url)
    .bind(payload.duration_minutes.unwrap_or(0))
    .bind(payload.position.unwrap_or(0))
    .bind(payload.is_free_preview.unwrap_or(false))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(lesson)))
}

/// Update a lesson. Owner or admin.
pub async fn update_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let course = fetch_lesson_course(&pool, id).await?;
    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), course.instructor_id)
    {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE lessons SET ");
    let mut separated = builder.separated(", ");
    let mut any = false;

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
        any = true;
    }
    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(clean_html(&content));
        any = true;
    }
    if let Some(video_url) = payload.video_url {
        separated.push("video_url = ");
        separated.push_bind_unseparated(video_url);
        any = true;
    }
    if let Some(duration_minutes) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration_minutes);
        any = true;
    }
    if let Some(position) = payload.position {
        separated.push("position = ");
        separated.push_bind_unseparated(position);
        any = true;
    }
    if let Some(is_free_preview) = payload.is_free_preview {
        separated.push("is_free_preview = ");
        separated.push_bind_unseparated(is_free_preview);
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

/// Delete a lesson. Owner or admin.
pub async fn delete_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = fetch_lesson_course(&pool, id).await?;
    if !policy::can_manage_course(Role::parse(&claims.role), claims.user_id(), course.instructor_id)
    {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }

    sqlx::query("DELETE FROM lessons WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
