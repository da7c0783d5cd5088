use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::Executor;

use crate::quota;

const MIGRATIONS: [&str; 1] = [include_str!("../migrations/0_data.sql")];

type Tx<'a> = sqlx::Transaction<'a, sqlx::Sqlite>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("profile not found: {uid}")]
    NotFound { uid: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub free_requests_used: u32,
    pub free_requests_reset_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl quota::Usage for Profile {
    fn used(&self) -> u32 {
        self.free_requests_used
    }

    fn window_start(&self) -> DateTime<Utc> {
        self.free_requests_reset_at
    }
}

#[derive(Debug, Clone)]
pub struct NewRequest<'a> {
    pub user_id: &'a str,
    pub input_text: &'a str,
    pub output_text: Option<&'a str>,
    pub used_free_request: bool,
}

#[cfg(test)]
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RequestRow {
    pub id: i64,
    pub user_id: String,
    pub input_text: String,
    pub output_text: Option<String>,
    pub used_free_request: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-user quota state and the request audit log.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fails with [`StoreError::NotFound`] when the profile does not exist.
    async fn profile(&self, uid: &str) -> Result<Profile, StoreError>;

    /// Creates the profile unless it already exists, then returns it.
    async fn create_profile(
        &self,
        uid: &str,
        email: Option<&str>,
        window_start: DateTime<Utc>,
    ) -> Result<Profile, StoreError>;

    async fn reset_window(
        &self,
        uid: &str,
        window_start: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Charges one free request against the window starting at
    /// `window_start`, resetting first if the stored window is older.
    /// The stored count never exceeds `limit`. Returns the new count.
    async fn charge_free_request(
        &self,
        uid: &str,
        window_start: DateTime<Utc>,
        limit: u32,
    ) -> Result<u32, StoreError>;

    async fn save_api_key(
        &self,
        uid: &str,
        api_key: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn log_request(&self, entry: &NewRequest<'_>) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct Storage {
    pool: sqlx::Pool<sqlx::Sqlite>,
}

impl Storage {
    pub async fn connect<P: AsRef<Path>>(
        file_path: P,
        busy_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let file_path = file_path.as_ref();
        if let Some(parent) = file_path.parent() {
            let ctx = format!(
                "Failed to create parent directory \
                for database file: {file_path:?}"
            );
            fs::create_dir_all(parent).context(ctx)?;
        }
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(file_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);
        let pool = sqlx::SqlitePool::connect_with(options).await?;
        Self::migrate(pool).await
    }

    /// Single-connection in-memory database. Each call gets a fresh one.
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let options =
            sqlx::sqlite::SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: sqlx::Pool<sqlx::Sqlite>) -> anyhow::Result<Self> {
        let selph = Self { pool };
        for migration in MIGRATIONS {
            selph
                .pool
                .execute(migration)
                .await
                .context("Failed to run migration")?;
        }
        Ok(selph)
    }

    /// Most recent first.
    #[cfg(test)]
    pub async fn requests(
        &self,
        uid: &str,
        limit: u32,
    ) -> Result<Vec<RequestRow>, StoreError> {
        let rows = sqlx::query_as::<_, RequestRow>(
            "SELECT * FROM requests WHERE user_id = ?
                ORDER BY id DESC LIMIT ?",
        )
        .bind(uid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl ProfileStore for Storage {
    async fn profile(&self, uid: &str) -> Result<Profile, StoreError> {
        sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                uid: uid.to_string(),
            })
    }

    async fn create_profile(
        &self,
        uid: &str,
        email: Option<&str>,
        window_start: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        let now = Utc::now();
        let tx = self.pool.begin().await?;
        let (tx, profile) =
            create_profile(tx, uid, email, window_start, now).await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn reset_window(
        &self,
        uid: &str,
        window_start: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE profiles SET
                free_requests_used = 0,
                free_requests_reset_at = ?,
                updated_at = ?
                WHERE id = ?",
        )
        .bind(window_start)
        .bind(Utc::now())
        .bind(uid)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                uid: uid.to_string(),
            });
        }
        Ok(())
    }

    async fn charge_free_request(
        &self,
        uid: &str,
        window_start: DateTime<Utc>,
        limit: u32,
    ) -> Result<u32, StoreError> {
        // One statement, so concurrent charges cannot lose an update.
        let used: Option<u32> = sqlx::query_scalar(
            "UPDATE profiles SET
                free_requests_used = CASE
                    WHEN free_requests_reset_at < ?1 THEN MIN(1, ?2)
                    ELSE MIN(free_requests_used + 1, ?2)
                    END,
                free_requests_reset_at = CASE
                    WHEN free_requests_reset_at < ?1 THEN ?1
                    ELSE free_requests_reset_at
                    END,
                updated_at = ?3
                WHERE id = ?4
                RETURNING free_requests_used",
        )
        .bind(window_start)
        .bind(limit)
        .bind(Utc::now())
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        used.ok_or_else(|| StoreError::NotFound {
            uid: uid.to_string(),
        })
    }

    async fn save_api_key(
        &self,
        uid: &str,
        api_key: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE profiles SET api_key = ?, updated_at = ? WHERE id = ?",
        )
        .bind(api_key)
        .bind(Utc::now())
        .bind(uid)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                uid: uid.to_string(),
            });
        }
        Ok(())
    }

    async fn log_request(&self, entry: &NewRequest<'_>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO requests
                (user_id, input_text, output_text, used_free_request, created_at)
                VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.user_id)
        .bind(entry.input_text)
        .bind(entry.output_text)
        .bind(entry.used_free_request)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn create_profile<'a>(
    mut tx: Tx<'a>,
    uid: &str,
    email: Option<&str>,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(Tx<'a>, Profile), StoreError> {
    sqlx::query(
        "INSERT INTO profiles
            (id, email, api_key, free_requests_used,
             free_requests_reset_at, created_at, updated_at)
            VALUES (?, ?, NULL, 0, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING",
    )
    .bind(uid)
    .bind(email)
    .bind(window_start)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    let profile: Profile = sqlx::query_as("SELECT * FROM profiles WHERE id = ?")
        .bind(uid)
        .fetch_one(&mut *tx)
        .await?;
    Ok((tx, profile))
}
