use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::store::StoreError;

/// Every failure an upload, delete, import or read can produce.
///
/// None of these are fatal: handlers turn them into a flash message or a JSON
/// error body, and the catalog records an `error` activity entry.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Could not read the image: {0}")]
    InvalidImage(String),

    #[error("Unsupported file type '{0}'. Please upload a JPEG, PNG, WEBP or GIF image.")]
    UnsupportedFileType(String),

    #[error("File too large: received {size} bytes, uploads must be at most {limit} bytes.")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Failed to save '{key}': {source}")]
    StorageWriteFailure {
        key: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Failed to load '{key}': {source}")]
    StorageReadFailure {
        key: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Invalid image record: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Image {0} not found.")]
    NotFound(String),

    #[error("Compression task failed: {0}")]
    Task(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidImage(_) | Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StorageWriteFailure { .. } | Self::StorageReadFailure { .. } | Self::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_map_to_client_statuses() {
        assert_eq!(
            AppError::FileTooLarge { size: 10, limit: 5 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::UnsupportedFileType("bmp".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            AppError::InvalidImage("truncated".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn storage_errors_are_server_errors() {
        let err = AppError::StorageWriteFailure {
            key: "compressedImages",
            source: StoreError::Unavailable("disk full".into()),
        };
        assert!(err.status().is_server_error());
        assert!(err.to_string().contains("compressedImages"));
    }
}
