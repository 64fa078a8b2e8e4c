use crate::{
    analytics::{AnalyticsSnapshot, CompressionExtreme},
    compress::decode_data_url,
    error::AppError,
    format::{format_bytes, format_date, format_percent, format_signed_bytes},
    handlers::read_upload,
    models::{ActivityLogEntry, ActivityStatus, ImageRecord},
    AppState,
};
use askama::Template;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use std::sync::Arc;

// ── Template structs ───────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    images: Vec<ImageCard>,
    default_quality: u8,
    max_upload: String,
    flash_success: Option<String>,
    flash_error: Option<String>,
}

#[derive(Template)]
#[template(path = "analytics.html")]
struct AnalyticsTemplate {
    total_images: u64,
    total_original: String,
    total_compressed: String,
    total_saved: String,
    average_compression: String,
    // Pre-computed breakdowns: (name, count, pct_of_total)
    quality_rows: Vec<(String, u64, u64)>,
    reduction_rows: Vec<(String, u64, u64)>,
    file_type_rows: Vec<(String, u64, u64)>,
    best: ExtremeView,
    worst: ExtremeView,
    activity: Vec<ActivityRow>,
}

struct ImageCard {
    id: String,
    file_name: String,
    file_type: String,
    original_size: String,
    compressed_size: String,
    quality: u8,
    efficiency: i64,
    grew: bool,
    created_at: String,
    compressed_url: String,
}

impl From<&ImageRecord> for ImageCard {
    fn from(image: &ImageRecord) -> Self {
        Self {
            id: image.id.clone(),
            file_name: image.file_name.clone(),
            file_type: image.file_type.as_str().to_uppercase(),
            original_size: format_bytes(image.original_size),
            compressed_size: format_bytes(image.compressed_size),
            quality: image.quality,
            efficiency: image.compression_efficiency,
            grew: image.compressed_size >= image.original_size,
            created_at: format_date(&image.created_at),
            compressed_url: image.compressed_url.clone(),
        }
    }
}

struct ExtremeView {
    efficiency: String,
    quality: u8,
    original_size: String,
    compressed_size: String,
    saved: String,
}

impl From<&CompressionExtreme> for ExtremeView {
    fn from(extreme: &CompressionExtreme) -> Self {
        Self {
            efficiency: format_percent(extreme.efficiency),
            quality: extreme.quality,
            original_size: format_bytes(extreme.original_size),
            compressed_size: format_bytes(extreme.compressed_size),
            saved: format_signed_bytes(extreme.space_saved()),
        }
    }
}

struct ActivityRow {
    timestamp: String,
    action: String,
    status: &'static str,
    details: String,
}

impl From<&ActivityLogEntry> for ActivityRow {
    fn from(entry: &ActivityLogEntry) -> Self {
        Self {
            timestamp: format_date(&entry.timestamp),
            action: entry.action.clone(),
            status: entry.status.as_str(),
            details: entry.details.clone(),
        }
    }
}

// ── Dashboard ──────────────────────────────────────────────────────────────

/// GET /
pub async fn dashboard(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    // Read and clear flash cookies
    let flash_success = jar.get("flash_success").map(|c| c.value().to_owned());
    let flash_error = jar.get("flash_error").map(|c| c.value().to_owned());

    let clear_success = Cookie::build(("flash_success", ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();
    let clear_error = Cookie::build(("flash_error", ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();

    let images = match state.catalog.images().await {
        Ok(images) => images,
        Err(e) => {
            tracing::error!("Failed to load images: {:?}", e);
            state.catalog.log_load_failure(&e).await;
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load images").into_response();
        }
    };

    let tmpl = DashboardTemplate {
        images: images.iter().map(ImageCard::from).collect(),
        default_quality: state.config.default_quality,
        max_upload: format_bytes(state.config.max_upload_bytes),
        flash_success,
        flash_error,
    };

    (jar.remove(clear_success).remove(clear_error), tmpl).into_response()
}

// ── Upload ─────────────────────────────────────────────────────────────────

/// POST /images
pub async fn upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    multipart: Multipart,
) -> Response {
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
            return set_flash_and_redirect(jar, None, Some(&e.to_string()), "/");
        }
    };

    match state.catalog.upload(upload).await {
        Ok(outcome) => {
            let record = &outcome.record;
            let mut msg = format!(
                "Compressed {}: {} -> {} ({}% smaller, quality {}).",
                record.file_name,
                format_bytes(record.original_size),
                format_bytes(record.compressed_size),
                record.compression_efficiency,
                record.quality
            );
            if record.quality != outcome.requested_quality {
                msg.push_str(&format!(
                    " Quality was lowered from {} to shrink the file.",
                    outcome.requested_quality
                ));
            }
            if !outcome.did_shrink {
                return set_flash_and_redirect(
                    jar,
                    Some(&msg),
                    Some("The compressed image is not smaller than the original."),
                    "/",
                );
            }
            set_flash_and_redirect(jar, Some(&msg), None, "/")
        }
        Err(e) => set_flash_and_redirect(jar, None, Some(&e.to_string()), "/"),
    }
}

// ── Delete ─────────────────────────────────────────────────────────────────

/// POST /images/:id/delete
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    match state.catalog.delete(&id).await {
        Ok(true) => set_flash_and_redirect(jar, Some("Image deleted."), None, "/"),
        Ok(false) => set_flash_and_redirect(jar, None, Some("Image not found."), "/"),
        Err(e) => {
            tracing::error!("Failed to delete image {}: {:?}", id, e);
            set_flash_and_redirect(jar, None, Some("Failed to delete image."), "/")
        }
    }
}

// ── Download ───────────────────────────────────────────────────────────────

/// GET /images/:id/download
pub async fn download(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let result = match state.catalog.find(&id).await {
        Ok(Some(image)) => decode_data_url(&image.compressed_url).map(|body| (image, body)),
        Ok(None) => Err(AppError::NotFound(id.clone())),
        Err(e) => Err(e),
    };

    match result {
        Ok((image, (media_type, bytes))) => {
            state
                .catalog
                .log_activity(
                    "Download",
                    ActivityStatus::Success,
                    format!("Downloaded compressed image: {}", image.file_name),
                )
                .await;
            let disposition = format!(
                "attachment; filename=\"compressed_{}\"",
                image.file_name.replace('"', "")
            );
            (
                [
                    (header::CONTENT_TYPE, media_type),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            state
                .catalog
                .log_activity(
                    "Download",
                    ActivityStatus::Error,
                    format!("Failed to download image {id}: {e}"),
                )
                .await;
            (e.status(), e.to_string()).into_response()
        }
    }
}

// ── Analytics ──────────────────────────────────────────────────────────────

/// GET /analytics
pub async fn analytics(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = match state.catalog.analytics().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to load analytics: {:?}", e);
            state.catalog.log_load_failure(&e).await;
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load analytics.",
            )
                .into_response();
        }
    };

    let activity = match state.catalog.activity().await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Activity log unavailable: {:?}", e);
            Vec::new()
        }
    };

    analytics_view(&snapshot, &activity).into_response()
}

fn analytics_view(snapshot: &AnalyticsSnapshot, activity: &[ActivityLogEntry]) -> AnalyticsTemplate {
    let total = snapshot.total_images;
    let q = snapshot.quality_distribution;
    let s = snapshot.size_reduction_stats;

    let quality_rows = with_pct(
        vec![
            ("High (80–100)".to_owned(), q.high),
            ("Medium (50–79)".to_owned(), q.medium),
            ("Low (1–49)".to_owned(), q.low),
        ],
        total,
    );
    let reduction_rows = with_pct(
        vec![
            ("Excellent (≥70%)".to_owned(), s.excellent),
            ("Good (50–69%)".to_owned(), s.good),
            ("Moderate (30–49%)".to_owned(), s.moderate),
            ("Low (<30%)".to_owned(), s.low),
        ],
        total,
    );

    let mut file_types: Vec<(String, u64)> = snapshot
        .file_type_distribution
        .iter()
        .map(|(name, count)| (name.to_uppercase(), *count))
        .collect();
    file_types.sort_by(|a, b| b.1.cmp(&a.1));

    AnalyticsTemplate {
        total_images: total,
        total_original: format_bytes(snapshot.total_original_size),
        total_compressed: format_bytes(snapshot.total_compressed_size),
        total_saved: format_signed_bytes(
            snapshot.total_original_size as i64 - snapshot.total_compressed_size as i64,
        ),
        average_compression: format_percent(snapshot.average_compression),
        quality_rows,
        reduction_rows,
        file_type_rows: with_pct(file_types, total),
        best: ExtremeView::from(&snapshot.best_compression),
        worst: ExtremeView::from(&snapshot.worst_compression),
        activity: activity.iter().map(ActivityRow::from).collect(),
    }
}

// ── Private helpers ────────────────────────────────────────────────────────

/// Set a flash cookie and redirect to the given path.
fn set_flash_and_redirect(
    jar: CookieJar,
    success: Option<&str>,
    error: Option<&str>,
    destination: &str,
) -> Response {
    let mut jar = jar;

    if let Some(msg) = success {
        let c = Cookie::build(("flash_success", msg.to_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(30))
            .build();
        jar = jar.add(c);
    }

    if let Some(msg) = error {
        let c = Cookie::build(("flash_error", msg.to_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(30))
            .build();
        jar = jar.add(c);
    }

    (jar, Redirect::to(destination)).into_response()
}

/// Attach a percentage-of-total column to each breakdown row.
fn with_pct(items: Vec<(String, u64)>, total: u64) -> Vec<(String, u64, u64)> {
    items
        .into_iter()
        .map(|(name, count)| {
            let pct = if total > 0 { count * 100 / total } else { 0 };
            (name, count, pct)
        })
        .collect()
}
