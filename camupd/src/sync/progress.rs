use std::{fmt, fs, path::Path};

use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const LAST_UPLOAD_KEY: &str = "last_upload_at";

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture time, in Unix milliseconds, up to which every item is known uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(i64);

impl Watermark {
    /// Value reported before anything has been uploaded.
    pub const MIN: Watermark = Watermark(i64::MIN);

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn from_datetime(at: OffsetDateTime) -> Self {
        let millis = at.unix_timestamp_nanos() / 1_000_000;
        Self(millis.clamp(i128::from(i64::MIN + 1), i128::from(i64::MAX)) as i64)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// The value one millisecond earlier.
    pub fn just_before(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    pub fn is_min(self) -> bool {
        self == Self::MIN
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_min() {
            return f.write_str("never");
        }
        let formatted = OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .ok()
            .and_then(|at| at.format(&Rfc3339).ok());
        match formatted {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Generic integer settings persisted in SQLite.
#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(db_path: &Path) -> Result<Self, ProgressError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), ProgressError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn get_i64(&self, key: &str) -> Result<Option<i64>, ProgressError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("value")?),
            None => None,
        })
    }

    /// Single-statement upsert that never lowers an existing value.
    pub async fn raise_i64(&self, key: &str, value: i64) -> Result<(), ProgressError> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
             WHERE excluded.value > settings.value",
        )
        .bind(key)
        .bind(value)
        .bind(now_unix())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Durable upload watermark.
#[derive(Clone)]
pub struct ProgressStore {
    settings: SettingsStore,
}

impl ProgressStore {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }

    pub async fn load(&self) -> Result<Watermark, ProgressError> {
        Ok(self
            .settings
            .get_i64(LAST_UPLOAD_KEY)
            .await?
            .map(Watermark::from_millis)
            .unwrap_or(Watermark::MIN))
    }

    /// Persists `watermark` unless the stored value is already later.
    pub async fn save(&self, watermark: Watermark) -> Result<(), ProgressError> {
        if watermark.is_min() {
            return Ok(());
        }
        self.settings
            .raise_i64(LAST_UPLOAD_KEY, watermark.as_millis())
            .await
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn make_store() -> ProgressStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let settings = SettingsStore::from_pool(pool);
        settings.init().await.unwrap();
        ProgressStore::new(settings)
    }

    #[tokio::test]
    async fn load_returns_min_when_never_written() {
        let store = make_store().await;
        assert_eq!(store.load().await.unwrap(), Watermark::MIN);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = make_store().await;
        store.save(Watermark::from_millis(1_700_000_000_000)).await.unwrap();
        assert_eq!(
            store.load().await.unwrap(),
            Watermark::from_millis(1_700_000_000_000)
        );
    }

    #[tokio::test]
    async fn save_never_lowers_the_watermark() {
        let store = make_store().await;
        store.save(Watermark::from_millis(2_000)).await.unwrap();
        store.save(Watermark::from_millis(1_000)).await.unwrap();
        store.save(Watermark::MIN).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Watermark::from_millis(2_000));

        store.save(Watermark::from_millis(3_000)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Watermark::from_millis(3_000));
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("state/progress.db");
        {
            let store = ProgressStore::new(SettingsStore::open(&db).await.unwrap());
            store.save(Watermark::from_millis(42)).await.unwrap();
        }
        let store = ProgressStore::new(SettingsStore::open(&db).await.unwrap());
        assert_eq!(store.load().await.unwrap(), Watermark::from_millis(42));
    }

    #[test]
    fn watermark_from_datetime_uses_millis() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(
            Watermark::from_datetime(at).as_millis(),
            1_700_000_000_000
        );
        assert!(Watermark::MIN < Watermark::from_datetime(OffsetDateTime::UNIX_EPOCH));
    }

    #[test]
    fn watermark_display() {
        assert_eq!(Watermark::MIN.to_string(), "never");
        assert_eq!(
            Watermark::from_millis(0).to_string(),
            "1970-01-01T00:00:00Z"
        );
    }
}
