use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod analytics;
mod catalog;
mod compress;
mod config;
mod db;
mod error;
mod format;
mod handlers;
mod models;
mod store;

use catalog::ImageCatalog;
use db::SqliteStore;
use handlers::{api, dashboard};
use store::{KeyValueStore, MemoryStore};

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    /// Single owner of the persisted image list and activity log.
    pub catalog: ImageCatalog,
    pub config: config::AppConfig,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent — env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgdash=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting imgdash on {}:{}", config.host, config.port);
    tracing::info!(
        "Uploads up to {} bytes, longest side {} px",
        config.max_upload_bytes,
        config.max_dimension
    );

    // DATABASE_URL=memory keeps everything in process; otherwise open SQLite
    // and run embedded migrations (files in migrations/)
    let store: Arc<dyn KeyValueStore> = if config.database_url == "memory" {
        tracing::warn!("Using in-memory storage; data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::new(db::connect(&config.database_url).await?))
    };

    let catalog = ImageCatalog::new(store, config.upload_limits());
    match catalog.images().await {
        Ok(images) => tracing::info!("Catalog holds {} image(s)", images.len()),
        Err(e) => tracing::warn!("Catalog could not be read at startup: {}", e),
    }

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState { catalog, config });
    let app = build_router(state);

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>) -> Router {
    // Leave room for multipart framing so oversized files reach the catalog's
    // own size check and get a proper error.
    let body_limit = state.config.max_upload_bytes as usize + 64 * 1024;

    let api_router = Router::new()
        .route(
            "/images",
            get(api::list_images).post(api::import_image),
        )
        .route("/images/upload", post(api::upload_image))
        .route("/images/:id", delete(api::delete_image))
        .route("/analytics", get(api::analytics))
        .route("/activity", get(api::activity));

    Router::new()
        .route("/", get(dashboard::dashboard))
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .route("/images", post(dashboard::upload))
        .route("/images/:id/delete", post(dashboard::delete_image))
        .route("/images/:id/download", get(dashboard::download))
        .route("/analytics", get(dashboard::analytics))
        .nest("/api", api_router)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
