//! Durable key/value storage for controller state that must survive power
//! loss. Every write is its own transaction: open, upsert, commit.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::error;

/// Namespace all controller keys live under.
pub const NAMESPACE: &str = "dutchBucket";

pub const KEY_MAX_RES_TEMP: &str = "maxResTemp";
pub const KEY_START_COUNTER: &str = "startCounter";
pub const KEY_NUTRIENT_REMINDER_EPOCH: &str = "nRE";

#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
    namespace: String,
}

/// Snapshot of every persisted field, loaded once at boot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PersistedState {
    pub max_res_temp: f32,
    pub start_counter: u32,
    pub nutrient_reminder_epoch: u64,
}

impl Store {
    /// db_url examples:
    /// - "sqlite:/home/pi/dutch-bucket/state.db"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self {
            pool,
            namespace: NAMESPACE.to_string(),
        })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Raw access
    // ----------------------------

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE namespace = ? AND key = ?")
            .bind(&self.namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("get '{key}' failed"))?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| format!("put '{key}': begin failed"))?;

        sqlx::query(
            r#"
            INSERT INTO kv (namespace, key, value)
            VALUES (?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET value=excluded.value
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("put '{key}' failed"))?;

        tx.commit()
            .await
            .with_context(|| format!("put '{key}': commit failed"))?;
        Ok(())
    }

    // ----------------------------
    // Typed helpers
    // ----------------------------

    pub async fn get_f32(&self, key: &str, default: f32) -> Result<f32> {
        self.get_parsed(key, default).await
    }

    pub async fn get_u32(&self, key: &str, default: u32) -> Result<u32> {
        self.get_parsed(key, default).await
    }

    pub async fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        self.get_parsed(key, default).await
    }

    pub async fn put_f32(&self, key: &str, value: f32) -> Result<()> {
        self.put(key, &value.to_string()).await
    }

    pub async fn put_u32(&self, key: &str, value: u32) -> Result<()> {
        self.put(key, &value.to_string()).await
    }

    pub async fn put_u64(&self, key: &str, value: u64) -> Result<()> {
        self.put(key, &value.to_string()).await
    }

    /// Load every persisted field. Missing keys read as zero, and so does a
    /// key whose value no longer parses. Only a failing database is an error.
    pub async fn load_state(&self) -> Result<PersistedState> {
        Ok(PersistedState {
            max_res_temp: self.get_f32(KEY_MAX_RES_TEMP, 0.0).await?,
            start_counter: self.get_u32(KEY_START_COUNTER, 0).await?,
            nutrient_reminder_epoch: self.get_u64(KEY_NUTRIENT_REMINDER_EPOCH, 0).await?,
        })
    }

    /// A value that fails to parse is logged and replaced by `default`.
    async fn get_parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
    {
        let Some(raw) = self.get(key).await? else {
            return Ok(default);
        };
        match raw.parse() {
            Ok(v) => Ok(v),
            Err(_) => {
                error!(key, value = %raw, "stored value is malformed, using default");
                Ok(default)
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> Store {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn missing_keys_load_as_defaults() {
        let store = memory_store().await;
        let st = store.load_state().await.unwrap();
        assert_eq!(st, PersistedState::default());
    }

    #[tokio::test]
    async fn put_then_get_returns_value() {
        let store = memory_store().await;
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn put_overwrites_existing_value() {
        let store = memory_store().await;
        store.put_u32(KEY_START_COUNTER, 1).await.unwrap();
        store.put_u32(KEY_START_COUNTER, 2).await.unwrap();
        assert_eq!(store.get_u32(KEY_START_COUNTER, 0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn typed_values_round_trip_through_load_state() {
        let store = memory_store().await;
        store.put_f32(KEY_MAX_RES_TEMP, 75.5).await.unwrap();
        store.put_u32(KEY_START_COUNTER, 7).await.unwrap();
        store
            .put_u64(KEY_NUTRIENT_REMINDER_EPOCH, 1_701_209_600)
            .await
            .unwrap();

        let st = store.load_state().await.unwrap();
        assert_eq!(st.max_res_temp, 75.5);
        assert_eq!(st.start_counter, 7);
        assert_eq!(st.nutrient_reminder_epoch, 1_701_209_600);
    }

    #[tokio::test]
    async fn malformed_value_reads_as_default() {
        let store = memory_store().await;
        store.put(KEY_START_COUNTER, "not-a-number").await.unwrap();
        assert_eq!(store.get_u32(KEY_START_COUNTER, 9).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn malformed_key_loads_as_default_without_touching_others() {
        let store = memory_store().await;
        store.put(KEY_MAX_RES_TEMP, "hot").await.unwrap();
        store.put_u32(KEY_START_COUNTER, 3).await.unwrap();
        store
            .put_u64(KEY_NUTRIENT_REMINDER_EPOCH, 1_701_209_600)
            .await
            .unwrap();

        let st = store.load_state().await.unwrap();
        assert_eq!(st.max_res_temp, 0.0);
        assert_eq!(st.start_counter, 3);
        assert_eq!(st.nutrient_reminder_epoch, 1_701_209_600);
    }
}
