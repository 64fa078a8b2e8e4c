use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, RgbImage};

use crate::error::AppError;

/// Lowest quality the adapter will ever fall back to.
pub const FLOOR_QUALITY: u8 = 10;

/// How far the first retry lowers the requested quality.
pub const QUALITY_STEP: u8 = 10;

pub const DEFAULT_MAX_DIMENSION: u32 = 1200;

/// Result of one compression. Output is always JPEG.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub bytes: Vec<u8>,
    pub size: u64,
    pub quality_used: u8,
    /// False when even the floor-quality encode was not smaller than the
    /// source. Such output is still returned.
    pub did_shrink: bool,
    pub width: u32,
    pub height: u32,
}

impl CompressionOutcome {
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.bytes))
    }
}

/// Output dimensions preserving aspect ratio with the larger side capped at
/// `max_dimension`. Never upscales.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let scaled = |side: u32, long: u32| -> u32 {
        ((side as f64 * max_dimension as f64 / long as f64).round() as u32).max(1)
    };

    if width > height && width > max_dimension {
        (max_dimension, scaled(height, width))
    } else if height > max_dimension {
        (scaled(width, height), max_dimension)
    } else {
        (width, height)
    }
}

/// Decode `source`, downscale it and re-encode it as JPEG.
///
/// The requested quality is tried first. If the output is not smaller than
/// `source_size`, the encode is retried at `max(10, quality - 10)` and then at
/// the floor quality, whose result is accepted unconditionally.
pub fn compress(
    source: &[u8],
    source_size: u64,
    requested_quality: u8,
    max_dimension: u32,
) -> Result<CompressionOutcome, AppError> {
    let decoded =
        image::load_from_memory(source).map_err(|e| AppError::InvalidImage(e.to_string()))?;

    let (width, height) = fit_within(decoded.width(), decoded.height(), max_dimension);
    let canvas = if (width, height) == (decoded.width(), decoded.height()) {
        decoded.to_rgb8()
    } else {
        decoded
            .resize_exact(width, height, FilterType::Lanczos3)
            .to_rgb8()
    };

    let accept = |bytes: Vec<u8>, quality_used: u8| {
        let size = bytes.len() as u64;
        CompressionOutcome {
            bytes,
            size,
            quality_used,
            did_shrink: size < source_size,
            width,
            height,
        }
    };

    let quality = requested_quality.clamp(1, 100);
    let first = encode_jpeg(&canvas, quality)?;
    if (first.len() as u64) < source_size {
        return Ok(accept(first, quality));
    }

    let lower = quality.saturating_sub(QUALITY_STEP).max(FLOOR_QUALITY);
    tracing::debug!(
        "Quality {} produced {} bytes (source {}), retrying at {}",
        quality,
        first.len(),
        source_size,
        lower
    );
    let second = encode_jpeg(&canvas, lower)?;
    if (second.len() as u64) < source_size {
        return Ok(accept(second, lower));
    }

    let floor = if lower == FLOOR_QUALITY {
        second
    } else {
        encode_jpeg(&canvas, FLOOR_QUALITY)?
    };
    let outcome = accept(floor, FLOOR_QUALITY);
    if !outcome.did_shrink {
        tracing::warn!(
            "Floor quality output ({} bytes) is not smaller than the source ({} bytes)",
            outcome.size,
            source_size
        );
    }
    Ok(outcome)
}

/// Run [`compress`] on the blocking pool. Nothing is persisted by this call,
/// so dropping the future never leaves a partial record behind.
pub async fn compress_in_background(
    source: Vec<u8>,
    source_size: u64,
    requested_quality: u8,
    max_dimension: u32,
) -> Result<CompressionOutcome, AppError> {
    tokio::task::spawn_blocking(move || {
        compress(&source, source_size, requested_quality, max_dimension)
    })
    .await
    .map_err(|e| AppError::Task(e.to_string()))?
}

/// Split a base64 data URL into its media type and decoded bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), AppError> {
    let malformed = || AppError::InvalidImage("stored image is not a base64 data URL".into());

    let rest = url.strip_prefix("data:").ok_or_else(malformed)?;
    let (meta, payload) = rest.split_once(',').ok_or_else(malformed)?;
    let media_type = meta.strip_suffix(";base64").ok_or_else(malformed)?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::InvalidImage(e.to_string()))?;

    let media_type = if media_type.is_empty() {
        "application/octet-stream"
    } else {
        media_type
    };
    Ok((media_type.to_owned(), bytes))
}

fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(canvas)
        .map_err(|e| AppError::InvalidImage(e.to_string()))?;
    Ok(buf)
}
