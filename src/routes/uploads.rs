use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Public serving of attachment blobs under `/uploads/...`, standing in for
/// the original static uploads directory.
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> AppResult<(HeaderMap, Vec<u8>)> {
    // keys never contain traversal segments (see attachment_key), so a path
    // that does cannot name a stored blob
    if path.split('/').any(|segment| segment == "..") {
        return Err(AppError::not_found());
    }

    let key = format!("uploads/{path}");
    let bytes = state
        .storage
        .get_object(&key)
        .await
        .map_err(|_| AppError::not_found())?;

    let mime = mime_guess::from_path(&path).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(disposition) = inline_content_disposition(&path) {
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }

    Ok((headers, bytes))
}

fn inline_content_disposition(path: &str) -> Option<String> {
    let filename = path.rsplit('/').next().filter(|name| !name.is_empty())?;

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}
