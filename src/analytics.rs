//! Summary statistics over the image list.
//!
//! Everything here is recomputed from scratch on every call; the snapshot has
//! no identity of its own and is never updated incrementally.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::ImageRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub total_images: u64,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    /// Overall reduction across all images in percent, one decimal.
    pub average_compression: f64,
    pub quality_distribution: QualityDistribution,
    pub file_type_distribution: BTreeMap<String, u64>,
    pub size_reduction_stats: SizeReductionStats,
    pub best_compression: CompressionExtreme,
    pub worst_compression: CompressionExtreme,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityDistribution {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeReductionStats {
    pub excellent: u64,
    pub good: u64,
    pub moderate: u64,
    pub low: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionExtreme {
    pub efficiency: f64,
    pub quality: u8,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressionExtreme {
    fn empty(efficiency: f64) -> Self {
        Self {
            efficiency,
            quality: 0,
            original_size: 0,
            compressed_size: 0,
        }
    }

    fn of(record: &ImageRecord, efficiency: f64) -> Self {
        Self {
            efficiency,
            quality: record.quality,
            original_size: record.original_size,
            compressed_size: record.compressed_size,
        }
    }

    pub fn space_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

// ── Tiers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    pub fn of(quality: u8) -> Self {
        match quality {
            80..=u8::MAX => Self::High,
            50..=79 => Self::Medium,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionTier {
    Excellent,
    Good,
    Moderate,
    Low,
}

impl CompressionTier {
    pub fn of(efficiency: f64) -> Self {
        if efficiency >= 70.0 {
            Self::Excellent
        } else if efficiency >= 50.0 {
            Self::Good
        } else if efficiency >= 30.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

// ── Aggregation ────────────────────────────────────────────────────────────

/// Derive the full snapshot from `records`, skipping soft-deleted entries.
///
/// Best and worst are tracked with strict comparisons, so on ties the record
/// that appears first in `records` wins.
pub fn aggregate(records: &[ImageRecord]) -> AnalyticsSnapshot {
    let mut total_images = 0u64;
    let mut total_original_size = 0u64;
    let mut total_compressed_size = 0u64;
    let mut quality_distribution = QualityDistribution::default();
    let mut file_type_distribution = BTreeMap::new();
    let mut size_reduction_stats = SizeReductionStats::default();
    let mut best: Option<CompressionExtreme> = None;
    let mut worst: Option<CompressionExtreme> = None;

    for record in records.iter().filter(|r| !r.deleted) {
        total_images += 1;
        total_original_size += record.original_size;
        total_compressed_size += record.compressed_size;

        let efficiency = record.efficiency();

        match QualityTier::of(record.quality) {
            QualityTier::High => quality_distribution.high += 1,
            QualityTier::Medium => quality_distribution.medium += 1,
            QualityTier::Low => quality_distribution.low += 1,
        }

        *file_type_distribution
            .entry(record.file_type.as_str().to_ascii_lowercase())
            .or_insert(0) += 1;

        match CompressionTier::of(efficiency) {
            CompressionTier::Excellent => size_reduction_stats.excellent += 1,
            CompressionTier::Good => size_reduction_stats.good += 1,
            CompressionTier::Moderate => size_reduction_stats.moderate += 1,
            CompressionTier::Low => size_reduction_stats.low += 1,
        }

        if best.map_or(true, |b| efficiency > b.efficiency) {
            best = Some(CompressionExtreme::of(record, efficiency));
        }
        if worst.map_or(true, |w| efficiency < w.efficiency) {
            worst = Some(CompressionExtreme::of(record, efficiency));
        }
    }

    AnalyticsSnapshot {
        total_images,
        total_original_size,
        total_compressed_size,
        average_compression: average_compression(total_original_size, total_compressed_size),
        quality_distribution,
        file_type_distribution,
        size_reduction_stats,
        best_compression: best.unwrap_or_else(|| CompressionExtreme::empty(0.0)),
        worst_compression: worst.unwrap_or_else(|| CompressionExtreme::empty(100.0)),
    }
}

fn average_compression(total_original: u64, total_compressed: u64) -> f64 {
    if total_original == 0 {
        return 0.0;
    }
    let pct = (1.0 - total_compressed as f64 / total_original as f64) * 100.0;
    (pct * 10.0).round() / 10.0
}
