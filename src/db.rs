use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use crate::store::{KeyValueStore, StoreError};

// ── Pool ───────────────────────────────────────────────────────────────────

/// Open (creating if needed) the SQLite database and apply the embedded
/// migrations.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(
            database_url
                .parse::<SqliteConnectOptions>()?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
        )
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

// ── Key-value table ────────────────────────────────────────────────────────

/// `KeyValueStore` over the `kv_store` table. Each key holds one whole JSON
/// document that is replaced on every write.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("database pool is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_open()?;
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.ensure_open()?;
        sqlx::query(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        pool
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_key() {
        let store = SqliteStore::new(memory_pool().await);
        assert!(store.get("compressedImages").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_replaces_the_previous_document() {
        let store = SqliteStore::new(memory_pool().await);
        store.set("activityLogs", "[]".into()).await.unwrap();
        store
            .set("activityLogs", r#"[{"action":"Upload"}]"#.into())
            .await
            .unwrap();

        assert_eq!(
            store.get("activityLogs").await.unwrap().as_deref(),
            Some(r#"[{"action":"Upload"}]"#)
        );
    }

    #[tokio::test]
    async fn closed_pool_is_unavailable() {
        let pool = memory_pool().await;
        let store = SqliteStore::new(pool.clone());
        pool.close().await;

        assert!(matches!(
            store.get("compressedImages").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.set("compressedImages", "[]".into()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
