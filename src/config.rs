use anyhow::{Context, Result};

use crate::catalog::UploadLimits;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./imgdash.db", or "memory"
    /// for a process-local store
    pub database_url: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Largest accepted upload in bytes (default 5 MiB)
    pub max_upload_bytes: u64,

    /// Longest side of a compressed image in pixels
    pub max_dimension: u32,

    /// Initial position of the quality slider on the dashboard, 1–100
    pub default_quality: u8,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (5 * 1024 * 1024).to_string())
            .parse::<u64>()
            .context("MAX_UPLOAD_BYTES must be a number of bytes")?;

        let max_dimension = std::env::var("MAX_DIMENSION")
            .unwrap_or_else(|_| "1200".into())
            .parse::<u32>()
            .context("MAX_DIMENSION must be a positive number of pixels")?;
        if max_dimension == 0 {
            anyhow::bail!("MAX_DIMENSION must be greater than 0");
        }

        let default_quality = std::env::var("DEFAULT_QUALITY")
            .unwrap_or_else(|_| "80".into())
            .parse::<u8>()
            .context("DEFAULT_QUALITY must be between 1 and 100")?;
        if !(1..=100).contains(&default_quality) {
            anyhow::bail!("DEFAULT_QUALITY must be between 1 and 100");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./imgdash.db".into()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            max_upload_bytes,
            max_dimension,
            default_quality,
        })
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_upload_bytes: self.max_upload_bytes,
            max_dimension: self.max_dimension,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let limits = UploadLimits::default();
        Self {
            database_url: "sqlite:./imgdash.db".into(),
            host: "0.0.0.0".into(),
            port: 3000,
            max_upload_bytes: limits.max_upload_bytes,
            max_dimension: limits.max_dimension,
            default_quality: 80,
        }
    }
}
