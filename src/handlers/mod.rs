pub mod api;
pub mod dashboard;

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::StatusCode,
};

use crate::{catalog::Upload, error::AppError};

/// Collect the `file` (or `image`) and `quality` fields of an upload form.
/// A missing or non-numeric quality falls back to `default_quality`; values
/// outside 1–100 are clamped. The file is read chunk by chunk and rejected as
/// soon as it passes `max_upload_bytes`.
pub async fn read_upload(
    mut multipart: Multipart,
    default_quality: u8,
    max_upload_bytes: u64,
) -> Result<Upload, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut quality = default_quality;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, 0, max_upload_bytes))?
    {
        let field_name = field.name().unwrap_or("").to_owned();

        match field_name.as_str() {
            "file" | "image" => {
                let file_name = field.file_name().unwrap_or("image").to_owned();
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| multipart_error(e, bytes.len() as u64, max_upload_bytes))?
                {
                    bytes.extend_from_slice(&chunk);
                    if bytes.len() as u64 > max_upload_bytes {
                        return Err(AppError::FileTooLarge {
                            size: bytes.len() as u64,
                            limit: max_upload_bytes,
                        });
                    }
                }
                file = Some((file_name, bytes));
            }
            "quality" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, 0, max_upload_bytes))?;
                match value.trim().parse::<i64>() {
                    Ok(q) => quality = q.clamp(1, 100) as u8,
                    Err(_) => tracing::debug!("Ignoring non-numeric quality '{}'", value),
                }
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("No file selected".into()))?;

    Ok(Upload {
        file_name,
        bytes,
        quality,
    })
}

/// Body-limit failures surface from axum as multipart errors; report them as
/// oversized uploads rather than malformed ones.
fn multipart_error(error: MultipartError, received: u64, limit: u64) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge {
            size: received,
            limit,
        }
    } else {
        AppError::BadRequest(format!("malformed upload: {}", error.body_text()))
    }
}
