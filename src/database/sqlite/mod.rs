use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::database::sqlite::models::{AnalyticsSummary, NewQueryRecord, QueryRecord};
use crate::database::sqlite::queries::QueryLogQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Query analytics backed by SQLite
#[derive(Debug, Clone)]
pub struct AnalyticsStore {
    pool: DbPool,
}

impl AnalyticsStore {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open `metadata.db` inside the base directory, creating both as needed
    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    /// Record an answered question with the sources it cited
    #[inline]
    pub async fn log_query(
        &self,
        question: &str,
        response_time: Duration,
        sources: &[String],
    ) -> Result<QueryRecord> {
        let response_ms = i64::try_from(response_time.as_millis()).unwrap_or(i64::MAX);
        QueryLogQueries::create(
            &self.pool,
            NewQueryRecord {
                question: question.to_string(),
                response_ms,
                sources: sources.to_vec(),
            },
        )
        .await
    }

    #[inline]
    pub async fn summary(&self) -> Result<AnalyticsSummary> {
        QueryLogQueries::summary(&self.pool).await
    }

    #[inline]
    pub async fn recent(&self, limit: u32) -> Result<Vec<QueryRecord>> {
        QueryLogQueries::list_recent(&self.pool, i64::from(limit)).await
    }

    #[inline]
    pub async fn clear(&self) -> Result<u64> {
        QueryLogQueries::clear(&self.pool).await
    }
}
