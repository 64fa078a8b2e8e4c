use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    analytics::{self, AnalyticsSnapshot},
    compress::{self, DEFAULT_MAX_DIMENSION},
    error::AppError,
    models::{
        compression_efficiency, ActivityLogEntry, ActivityStatus, FileType, ImageRecord,
        NewImageRecord, ACTIVITY_LOG_CAPACITY,
    },
    store::{load_list, save_list, KeyValueStore, ACTIVITY_KEY, IMAGES_KEY},
};

/// Limits applied to every upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_upload_bytes: u64,
    pub max_dimension: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 5 * 1024 * 1024,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// A file received from the dashboard or the API.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub quality: u8,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: ImageRecord,
    pub requested_quality: u8,
    pub did_shrink: bool,
}

/// Owner of the persisted image list and activity log.
///
/// Every mutation reads the whole list, builds a new one and writes it back in
/// full. The writer lock serialises those cycles so concurrent requests cannot
/// lose each other's updates.
pub struct ImageCatalog {
    store: Arc<dyn KeyValueStore>,
    limits: UploadLimits,
    writer: Mutex<()>,
}

impl ImageCatalog {
    pub fn new(store: Arc<dyn KeyValueStore>, limits: UploadLimits) -> Self {
        Self {
            store,
            limits,
            writer: Mutex::new(()),
        }
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    /// Live (non-deleted) images, newest first.
    pub async fn images(&self) -> Result<Vec<ImageRecord>, AppError> {
        let mut images: Vec<ImageRecord> = load_list(self.store.as_ref(), IMAGES_KEY).await?;
        images.retain(|image| !image.deleted);
        Ok(images)
    }

    pub async fn find(&self, id: &str) -> Result<Option<ImageRecord>, AppError> {
        Ok(self.images().await?.into_iter().find(|image| image.id == id))
    }

    /// Recompute analytics from the full persisted list.
    pub async fn analytics(&self) -> Result<AnalyticsSnapshot, AppError> {
        let images: Vec<ImageRecord> = load_list(self.store.as_ref(), IMAGES_KEY).await?;
        Ok(analytics::aggregate(&images))
    }

    pub async fn activity(&self) -> Result<Vec<ActivityLogEntry>, AppError> {
        load_list(self.store.as_ref(), ACTIVITY_KEY).await
    }

    // ── Mutations ──────────────────────────────────────────────────────────

    /// Validate, compress and persist an uploaded image.
    pub async fn upload(&self, upload: Upload) -> Result<UploadOutcome, AppError> {
        let file_name = upload.file_name.clone();
        let result = self.try_upload(upload).await;

        match &result {
            Ok(outcome) => {
                let record = &outcome.record;
                let mut details = format!(
                    "Compressed {} with {}% reduction at quality {}",
                    record.file_name, record.compression_efficiency, record.quality
                );
                if !outcome.did_shrink {
                    details.push_str(" (output is not smaller than the original)");
                }
                self.log_activity("Upload", ActivityStatus::Success, details)
                    .await;
            }
            Err(e) => {
                tracing::warn!("Upload of '{}' failed: {}", file_name, e);
                self.log_activity("Upload", ActivityStatus::Error, e.to_string())
                    .await;
            }
        }

        result
    }

    async fn try_upload(&self, upload: Upload) -> Result<UploadOutcome, AppError> {
        let original_size = upload.bytes.len() as u64;
        if original_size > self.limits.max_upload_bytes {
            return Err(AppError::FileTooLarge {
                size: original_size,
                limit: self.limits.max_upload_bytes,
            });
        }
        if original_size == 0 {
            return Err(AppError::InvalidImage("the file is empty".into()));
        }

        let file_type = match FileType::from_file_name(&upload.file_name) {
            Ok(file_type) => file_type,
            Err(e) => image::guess_format(&upload.bytes)
                .ok()
                .and_then(FileType::from_format)
                .ok_or(e)?,
        };

        let outcome = compress::compress_in_background(
            upload.bytes,
            original_size,
            upload.quality,
            self.limits.max_dimension,
        )
        .await?;

        let compressed_url = outcome.data_url();
        let file_name = upload.file_name.trim().to_owned();

        let _guard = self.writer.lock().await;
        let mut images: Vec<ImageRecord> = load_list(self.store.as_ref(), IMAGES_KEY).await?;
        let now = Utc::now();
        let record = ImageRecord {
            id: next_id(&images, now),
            file_name,
            original_size,
            compressed_size: outcome.size,
            quality: outcome.quality_used,
            compression_efficiency: compression_efficiency(original_size, outcome.size),
            file_type,
            compressed_url,
            created_at: now,
            deleted: false,
        };
        images.insert(0, record.clone());
        save_list(self.store.as_ref(), IMAGES_KEY, &images).await?;

        tracing::info!(
            "Stored image {} ({} -> {} bytes, {}x{}, quality {})",
            record.id,
            record.original_size,
            record.compressed_size,
            outcome.width,
            outcome.height,
            record.quality
        );

        Ok(UploadOutcome {
            record,
            requested_quality: upload.quality,
            did_shrink: outcome.did_shrink,
        })
    }

    /// Persist an already-compressed record after schema validation.
    pub async fn import(&self, new: NewImageRecord) -> Result<ImageRecord, AppError> {
        let result = self.try_import(new).await;
        match &result {
            Ok(record) => {
                self.log_activity(
                    "Import",
                    ActivityStatus::Success,
                    format!("Imported {}", record.file_name),
                )
                .await
            }
            Err(e) => {
                self.log_activity("Import", ActivityStatus::Error, e.to_string())
                    .await
            }
        }
        result
    }

    async fn try_import(&self, new: NewImageRecord) -> Result<ImageRecord, AppError> {
        let _guard = self.writer.lock().await;
        let mut images: Vec<ImageRecord> = load_list(self.store.as_ref(), IMAGES_KEY).await?;
        let now = Utc::now();
        let record = new.into_record(next_id(&images, now), now)?;
        images.insert(0, record.clone());
        save_list(self.store.as_ref(), IMAGES_KEY, &images).await?;
        Ok(record)
    }

    /// Soft-delete an image. Returns `false` if no live image has that id.
    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.try_delete(id).await;
        match &result {
            Ok(true) => {
                self.log_activity(
                    "Delete",
                    ActivityStatus::Success,
                    format!("Deleted image with ID: {id}"),
                )
                .await
            }
            Ok(false) => {
                self.log_activity(
                    "Delete",
                    ActivityStatus::Error,
                    format!("No image with ID: {id}"),
                )
                .await
            }
            Err(e) => {
                self.log_activity("Delete", ActivityStatus::Error, e.to_string())
                    .await
            }
        }
        result
    }

    async fn try_delete(&self, id: &str) -> Result<bool, AppError> {
        let _guard = self.writer.lock().await;
        let mut images: Vec<ImageRecord> = load_list(self.store.as_ref(), IMAGES_KEY).await?;

        let Some(image) = images.iter_mut().find(|image| image.id == id && !image.deleted) else {
            return Ok(false);
        };
        image.deleted = true;

        save_list(self.store.as_ref(), IMAGES_KEY, &images).await?;
        Ok(true)
    }

    /// Append an entry to the activity log, keeping only the most recent
    /// entries. Failures are logged and swallowed so they never mask the
    /// outcome of the operation being recorded.
    pub async fn log_activity(
        &self,
        action: &str,
        status: ActivityStatus,
        details: impl Into<String>,
    ) {
        let entry = ActivityLogEntry {
            timestamp: Utc::now(),
            action: action.to_owned(),
            status,
            details: details.into(),
        };
        if let Err(e) = self.append_activity(entry).await {
            tracing::error!("Failed to record activity '{}': {}", action, e);
        }
    }

    /// Record that one of the persisted lists could not be read.
    pub async fn log_load_failure(&self, error: &AppError) {
        self.log_activity("Error loading data", ActivityStatus::Error, error.to_string())
            .await;
    }

    async fn append_activity(&self, entry: ActivityLogEntry) -> Result<(), AppError> {
        let _guard = self.writer.lock().await;
        // An unreadable log is replaced rather than blocking new entries.
        let mut entries: Vec<ActivityLogEntry> =
            match load_list(self.store.as_ref(), ACTIVITY_KEY).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Resetting activity log: {}", e);
                    Vec::new()
                }
            };
        entries.insert(0, entry);
        entries.truncate(ACTIVITY_LOG_CAPACITY);
        save_list(self.store.as_ref(), ACTIVITY_KEY, &entries).await
    }
}

/// Millisecond timestamp id, bumped until it is unique within `images`.
fn next_id(images: &[ImageRecord], now: DateTime<Utc>) -> String {
    let mut candidate = now.timestamp_millis();
    while images.iter().any(|image| image.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode png");
        buf
    }

    fn catalog() -> ImageCatalog {
        ImageCatalog::new(Arc::new(MemoryStore::new()), UploadLimits::default())
    }

    fn upload(name: &str, bytes: Vec<u8>) -> Upload {
        Upload {
            file_name: name.into(),
            bytes,
            quality: 80,
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: String) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".into()))
        }
    }

    #[tokio::test]
    async fn upload_persists_record_and_logs_success() {
        let catalog = catalog();
        let outcome = catalog.upload(upload("Photo.PNG", png(300, 200))).await.unwrap();

        assert_eq!(outcome.record.file_type, FileType::Png);
        assert_eq!(outcome.requested_quality, 80);
        assert!(outcome.record.compressed_url.starts_with("data:image/jpeg;base64,"));

        let images = catalog.images().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0], outcome.record);

        let activity = catalog.activity().await.unwrap();
        assert_eq!(activity[0].action, "Upload");
        assert_eq!(activity[0].status, ActivityStatus::Success);
        assert!(activity[0].details.contains("Photo.PNG"));
    }

    #[tokio::test]
    async fn newest_upload_comes_first_with_unique_ids() {
        let catalog = catalog();
        let first = catalog.upload(upload("a.png", png(40, 40))).await.unwrap();
        let second = catalog.upload(upload("b.png", png(40, 40))).await.unwrap();

        assert_ne!(first.record.id, second.record.id);
        let images = catalog.images().await.unwrap();
        assert_eq!(images[0].file_name, "b.png");
        assert_eq!(images[1].file_name, "a.png");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_and_logged() {
        let catalog = ImageCatalog::new(
            Arc::new(MemoryStore::new()),
            UploadLimits {
                max_upload_bytes: 10,
                max_dimension: 1200,
            },
        );
        let err = catalog.upload(upload("big.png", png(40, 40))).await.unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { limit: 10, .. }));

        assert!(catalog.images().await.unwrap().is_empty());
        let activity = catalog.activity().await.unwrap();
        assert_eq!(activity[0].status, ActivityStatus::Error);
    }

    #[tokio::test]
    async fn unsupported_type_is_rejected() {
        let catalog = catalog();
        let err = catalog
            .upload(upload("notes.txt", b"hello".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFileType(_)));
    }

    #[tokio::test]
    async fn missing_extension_falls_back_to_content_sniffing() {
        let catalog = catalog();
        let outcome = catalog.upload(upload("blob", png(20, 20))).await.unwrap();
        assert_eq!(outcome.record.file_type, FileType::Png);
    }

    #[tokio::test]
    async fn corrupt_image_is_invalid_and_nothing_is_stored() {
        let catalog = catalog();
        let err = catalog
            .upload(upload("broken.jpg", vec![0xFF, 0xD8, 0x00, 0x01]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidImage(_)));
        assert!(catalog.images().await.unwrap().is_empty());
        assert_eq!(catalog.activity().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_is_soft_and_hides_the_record() {
        let catalog = catalog();
        let outcome = catalog.upload(upload("a.png", png(30, 30))).await.unwrap();
        let id = outcome.record.id.clone();

        assert!(catalog.delete(&id).await.unwrap());
        assert!(catalog.images().await.unwrap().is_empty());
        assert!(catalog.find(&id).await.unwrap().is_none());
        assert_eq!(catalog.analytics().await.unwrap().total_images, 0);

        // Already deleted.
        assert!(!catalog.delete(&id).await.unwrap());

        let activity = catalog.activity().await.unwrap();
        assert_eq!(activity[1].status, ActivityStatus::Success);
        assert_eq!(activity[0].status, ActivityStatus::Error);
    }

    #[tokio::test]
    async fn analytics_reflect_uploads() {
        let catalog = catalog();
        catalog.upload(upload("a.png", png(50, 50))).await.unwrap();
        catalog.upload(upload("b.png", png(60, 40))).await.unwrap();

        let snapshot = catalog.analytics().await.unwrap();
        assert_eq!(snapshot.total_images, 2);
        assert_eq!(snapshot.file_type_distribution.get("png"), Some(&2));
        let q = snapshot.quality_distribution;
        assert_eq!(q.high + q.medium + q.low, 2);
        assert_eq!(
            snapshot.total_original_size,
            catalog
                .images()
                .await
                .unwrap()
                .iter()
                .map(|image| image.original_size)
                .sum::<u64>()
        );
    }

    #[tokio::test]
    async fn import_enforces_schema() {
        let catalog = catalog();
        let bad = NewImageRecord {
            file_name: "x.png".into(),
            original_size: 100,
            compressed_size: 200,
            quality: 80,
            compression_efficiency: None,
            file_type: "png".into(),
            compressed_url: "data:image/jpeg;base64,AA==".into(),
        };
        assert!(matches!(
            catalog.import(bad.clone()).await,
            Err(AppError::Validation(_))
        ));

        let good = NewImageRecord {
            compressed_size: 40,
            ..bad
        };
        let record = catalog.import(good).await.unwrap();
        assert_eq!(record.compression_efficiency, 60);
        assert_eq!(catalog.images().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_do_not_lose_records() {
        const IMPORTS: usize = 24;
        const UPLOADS: usize = 4;

        let catalog = Arc::new(catalog());
        let mut tasks = tokio::task::JoinSet::new();

        for i in 0..IMPORTS {
            let catalog = Arc::clone(&catalog);
            tasks.spawn(async move {
                let new = NewImageRecord {
                    file_name: format!("import-{i}.jpg"),
                    original_size: 1000,
                    compressed_size: 400,
                    quality: 70,
                    compression_efficiency: None,
                    file_type: "jpg".into(),
                    compressed_url: "data:image/jpeg;base64,AA==".into(),
                };
                catalog.import(new).await.map(|record| record.id)
            });
        }
        for i in 0..UPLOADS {
            let catalog = Arc::clone(&catalog);
            tasks.spawn(async move {
                catalog
                    .upload(upload(&format!("upload-{i}.png"), png(32, 32)))
                    .await
                    .map(|outcome| outcome.record.id)
            });
        }

        let mut returned = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            returned.push(joined.unwrap().unwrap());
        }

        let images = catalog.images().await.unwrap();
        assert_eq!(images.len(), IMPORTS + UPLOADS);

        let mut ids: Vec<&str> = images.iter().map(|image| image.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), IMPORTS + UPLOADS);

        returned.sort_unstable();
        let mut stored: Vec<String> = images.into_iter().map(|image| image.id).collect();
        stored.sort_unstable();
        assert_eq!(returned, stored);

        // Every operation also logged exactly one activity entry.
        assert_eq!(catalog.activity().await.unwrap().len(), IMPORTS + UPLOADS);
    }

    #[tokio::test]
    async fn activity_log_is_capped() {
        let catalog = catalog();
        for i in 0..(ACTIVITY_LOG_CAPACITY + 5) {
            catalog
                .log_activity("Tick", ActivityStatus::Success, i.to_string())
                .await;
        }

        let activity = catalog.activity().await.unwrap();
        assert_eq!(activity.len(), ACTIVITY_LOG_CAPACITY);
        assert_eq!(activity[0].details, (ACTIVITY_LOG_CAPACITY + 4).to_string());
    }

    #[tokio::test]
    async fn rejected_write_surfaces_storage_failure() {
        let catalog = ImageCatalog::new(Arc::new(ReadOnlyStore), UploadLimits::default());
        let err = catalog.upload(upload("a.png", png(20, 20))).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::StorageWriteFailure {
                key: IMAGES_KEY,
                ..
            }
        ));
    }

    #[test]
    fn next_id_skips_taken_timestamps() {
        let now = Utc::now();
        let taken = ImageRecord {
            id: now.timestamp_millis().to_string(),
            file_name: "a.jpg".into(),
            original_size: 10,
            compressed_size: 5,
            quality: 80,
            compression_efficiency: 50,
            file_type: FileType::Jpg,
            compressed_url: String::new(),
            created_at: now,
            deleted: false,
        };
        assert_eq!(
            next_id(&[taken], now),
            (now.timestamp_millis() + 1).to_string()
        );
    }
}
