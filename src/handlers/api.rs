use crate::{
    analytics::AnalyticsSnapshot,
    error::AppError,
    handlers::read_upload,
    models::{ActivityLogEntry, ActivityStatus, ImageRecord, NewImageRecord},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub image: ImageRecord,
    pub requested_quality: u8,
    pub did_shrink: bool,
}

/// GET /api/images
pub async fn list_images(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ImageRecord>>, AppError> {
    match state.catalog.images().await {
        Ok(images) => Ok(Json(images)),
        Err(e) => {
            state.catalog.log_load_failure(&e).await;
            Err(e)
        }
    }
}

/// POST /api/images/upload
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let upload = match read_upload(
        multipart,
        state.config.default_quality,
        state.config.max_upload_bytes,
    )
    .await
    {
        Ok(upload) => upload,
        Err(e) => {
            state
                .catalog
                .log_activity("Upload", ActivityStatus::Error, e.to_string())
                .await;
            return Err(e);
        }
    };

    let outcome = state.catalog.upload(upload).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            image: outcome.record,
            requested_quality: outcome.requested_quality,
            did_shrink: outcome.did_shrink,
        }),
    ))
}

/// POST /api/images
///
/// Stores a record compressed elsewhere. The record schema is enforced here.
pub async fn import_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewImageRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<ImageRecord>), AppError> {
    let new = match payload {
        Ok(Json(new)) => new,
        Err(rejection) => {
            let e = import_rejection(rejection);
            state
                .catalog
                .log_activity("Import", ActivityStatus::Error, e.to_string())
                .await;
            return Err(e);
        }
    };

    let record = state.catalog.import(new).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Well-formed JSON that does not fit the record schema is a validation
/// failure; anything else is a bad request.
fn import_rejection(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
        other => AppError::BadRequest(other.body_text()),
    }
}

/// DELETE /api/images/:id
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.catalog.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(id))
    }
}

/// GET /api/analytics
pub async fn analytics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnalyticsSnapshot>, AppError> {
    match state.catalog.analytics().await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            state.catalog.log_load_failure(&e).await;
            Err(e)
        }
    }
}

/// GET /api/activity
pub async fn activity(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ActivityLogEntry>>, AppError> {
    Ok(Json(state.catalog.activity().await?))
}
