// src/handlers/upload.rs
//
// Media upload gateway. Files land under the configured upload directory
// with a generated name; the stored file is served back through the
// static /media route. Only a whitelist of extensions is accepted.

use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::{config::Config, error::AppError, utils::jwt::Claims};

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "mp4", "webm", "pdf"];

fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Accept a multipart upload in the `file` field and return its public
/// URL. Any signed-in user may upload.
pub async fn upload_file(
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or(AppError::BadRequest("Missing file name".to_string()))?;

        let extension = extension_of(&filename).ok_or(AppError::BadRequest(
            "File has no extension".to_string(),
        ))?;
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::BadRequest(format!(
                "File type '{extension}' is not allowed"
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;

        if data.is_empty() {
            return Err(AppError::BadRequest("Empty file".to_string()));
        }
        if data.len() > config.max_upload_bytes {
            return Err(AppError::BadRequest(format!(
                "File exceeds the {} byte limit",
                config.max_upload_bytes
            )));
        }

        let stored_name = format!("{}.{}", uuid::Uuid::new_v4(), extension);
        let dir = std::path::Path::new(&config.upload_dir);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        let path = dir.join(&stored_name);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        tracing::info!(
            user_id = claims.user_id(),
            file = %stored_name,
            size = data.len(),
            "file uploaded"
        );

        return Ok((
            StatusCode::CREATED,
            Json(json!({
                "filename": stored_name,
                "url": format!("/media/{stored_name}"),
                "size": data.len(),
            })),
        ));
    }

    Err(AppError::BadRequest(
        "Expected a multipart field named 'file'".to_string(),
    ))
}
