//! SQLite storage for alert subscriptions.

use crate::config::{Comparison, Subscription};
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Threshold must not be negative: {0}")]
    InvalidThreshold(i64),
}

type SubscriptionRow = (i64, String, i64, NaiveDateTime, NaiveDateTime);

fn into_subscription(row: SubscriptionRow) -> Subscription {
    let (id, subscriber_id, threshold_gwei, created_at, updated_at) = row;
    Subscription {
        id,
        subscriber_id,
        threshold_gwei,
        created_at,
        updated_at,
    }
}

/// Database connection for subscriptions.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database at the given URL and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create the subscription table if absent. Safe to call repeatedly.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gas_alert_subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subscriber_id TEXT NOT NULL UNIQUE,
                threshold_gwei INTEGER NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subscriptions_threshold
            ON gas_alert_subscriptions(threshold_gwei)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace the threshold for a subscriber.
    ///
    /// A single `INSERT .. ON CONFLICT` statement, so concurrent upserts for the
    /// same subscriber never lose an update or create a second row.
    pub async fn upsert_subscription(
        &self,
        subscriber_id: &str,
        threshold_gwei: i64,
    ) -> Result<(), StoreError> {
        if threshold_gwei < 0 {
            return Err(StoreError::InvalidThreshold(threshold_gwei));
        }

        sqlx::query(
            r#"
            INSERT INTO gas_alert_subscriptions (subscriber_id, threshold_gwei)
            VALUES (?, ?)
            ON CONFLICT(subscriber_id)
            DO UPDATE SET threshold_gwei = excluded.threshold_gwei, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(subscriber_id)
        .bind(threshold_gwei)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Subscribers whose threshold is satisfied by `reference_rate`.
    pub async fn query_matching(
        &self,
        reference_rate: i64,
        comparison: Comparison,
    ) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT subscriber_id FROM gas_alert_subscriptions WHERE {}",
            comparison.threshold_predicate()
        );

        let rows = sqlx::query_scalar::<_, String>(&sql)
            .bind(reference_rate)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Get the subscription for a subscriber, if any.
    pub async fn get_subscription(
        &self,
        subscriber_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, subscriber_id, threshold_gwei, created_at, updated_at FROM gas_alert_subscriptions WHERE subscriber_id = ?",
        )
        .bind(subscriber_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_subscription))
    }

    /// Close the pool; later calls fail with [`StoreError::Sqlx`].
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Number of stored subscriptions.
    pub async fn count_subscriptions(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM gas_alert_subscriptions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
