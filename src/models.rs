use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

use crate::error::AppError;

/// Most recent activity entries kept; older ones are dropped on append.
pub const ACTIVITY_LOG_CAPACITY: usize = 100;

// ── File types ─────────────────────────────────────────────────────────────

/// Source formats accepted by the dashboard. Parsed case-insensitively and
/// always serialized lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FileType {
    Jpg,
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    /// Type from the extension of an uploaded file name.
    pub fn from_file_name(file_name: &str) -> Result<Self, AppError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| AppError::UnsupportedFileType(file_name.to_owned()))?;
        ext.parse()
    }

    /// Type from sniffed image content, for uploads without a usable name.
    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::WebP => Some(Self::Webp),
            ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }
}

impl FromStr for FileType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" => Ok(Self::Jpg),
            "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "gif" => Ok(Self::Gif),
            _ => Err(AppError::UnsupportedFileType(s.to_owned())),
        }
    }
}

impl TryFrom<String> for FileType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileType> for String {
    fn from(value: FileType) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Image records ──────────────────────────────────────────────────────────

/// One compressed image, as persisted under `compressedImages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub file_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Quality actually used, which may be lower than the one requested.
    pub quality: u8,
    #[serde(alias = "compressionPercentage")]
    pub compression_efficiency: i64,
    pub file_type: FileType,
    pub compressed_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl ImageRecord {
    /// Unrounded size reduction in percent. Negative when the output grew.
    pub fn efficiency(&self) -> f64 {
        reduction_percent(self.original_size, self.compressed_size)
    }
}

pub fn reduction_percent(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    (original_size as f64 - compressed_size as f64) * 100.0 / original_size as f64
}

/// Rounded size reduction stored on each record.
pub fn compression_efficiency(original_size: u64, compressed_size: u64) -> i64 {
    reduction_percent(original_size, compressed_size).round() as i64
}

/// An already-compressed record submitted through the JSON API. Unlike the
/// upload path, this boundary enforces the full record schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImageRecord {
    pub file_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub quality: i64,
    #[serde(default, alias = "compressionPercentage")]
    pub compression_efficiency: Option<i64>,
    pub file_type: String,
    pub compressed_url: String,
}

impl NewImageRecord {
    pub fn into_record(self, id: String, created_at: DateTime<Utc>) -> Result<ImageRecord, AppError> {
        let file_name = self.file_name.trim().to_owned();
        if file_name.is_empty() {
            return Err(AppError::Validation("File name is required".into()));
        }
        if self.original_size < 1 {
            return Err(AppError::Validation(
                "Original size must be greater than 0".into(),
            ));
        }
        if self.compressed_size < 1 {
            return Err(AppError::Validation(
                "Compressed size must be greater than 0".into(),
            ));
        }
        if self.compressed_size > self.original_size {
            return Err(AppError::Validation(
                "Compressed size must be less than or equal to original size".into(),
            ));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(AppError::Validation(
                "Quality must be between 1 and 100".into(),
            ));
        }

        // Always derived from the sizes; a supplied value must agree with it.
        let compression_efficiency = compression_efficiency(self.original_size, self.compressed_size);
        if let Some(supplied) = self.compression_efficiency {
            if !(0..=100).contains(&supplied) {
                return Err(AppError::Validation(
                    "Compression efficiency must be between 0 and 100".into(),
                ));
            }
            if supplied != compression_efficiency {
                return Err(AppError::Validation(format!(
                    "Compression efficiency {supplied} does not match the sizes ({compression_efficiency})"
                )));
            }
        }

        let file_type = self
            .file_type
            .parse::<FileType>()
            .map_err(|_| AppError::Validation(format!("Unsupported file type '{}'", self.file_type)))?;

        let compressed_url = self.compressed_url.trim().to_owned();
        if compressed_url.is_empty() {
            return Err(AppError::Validation("Compressed URL is required".into()));
        }

        Ok(ImageRecord {
            id,
            file_name,
            original_size: self.original_size,
            compressed_size: self.compressed_size,
            quality: self.quality as u8,
            compression_efficiency,
            file_type,
            compressed_url,
            created_at,
            deleted: false,
        })
    }
}

// ── Activity log ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One entry of the `activityLogs` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub status: ActivityStatus,
    #[serde(default)]
    pub details: String,
}
