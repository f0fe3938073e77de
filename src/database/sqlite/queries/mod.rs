
use super::models::{AnalyticsSummary, NewQueryRecord, QueryRecord, SourceUsage};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

/// Number of sources reported in [`AnalyticsSummary::top_sources`]
pub const TOP_SOURCES_LIMIT: i64 = 5;

pub struct QueryLogQueries;

impl QueryLogQueries {
    /// Insert a query and its cited sources in one transaction
    #[inline]
    pub async fn create(pool: &SqlitePool, new_record: NewQueryRecord) -> Result<QueryRecord> {
        let now = Utc::now().naive_utc();
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin query log transaction")?;

        let id = sqlx::query(
            "INSERT INTO query_log (question, response_ms, created_date) VALUES (?, ?, ?)",
        )
        .bind(&new_record.question)
        .bind(new_record.response_ms)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to log query")?
        .last_insert_rowid();

        for (position, source) in (0_i64..).zip(&new_record.sources) {
            sqlx::query("INSERT INTO query_sources (query_id, position, source) VALUES (?, ?, ?)")
                .bind(id)
                .bind(position)
                .bind(source)
                .execute(&mut *tx)
                .await
                .context("Failed to log query source")?;
        }

        tx.commit()
            .await
            .context("Failed to commit query log transaction")?;

        debug!(
            "Logged query {} with {} sources",
            id,
            new_record.sources.len()
        );

        Ok(QueryRecord {
            id,
            question: new_record.question,
            response_ms: new_record.response_ms,
            created_date: now,
            sources: new_record.sources,
        })
    }

    /// Most recent queries first
    #[inline]
    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<QueryRecord>> {
        let mut records = sqlx::query_as::<_, QueryRecord>(
            r#"
            SELECT id, question, response_ms, created_date
            FROM query_log
            ORDER BY created_date DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list recent queries")?;

        for record in &mut records {
            record.sources = Self::sources_for(pool, record.id).await?;
        }

        Ok(records)
    }

    #[inline]
    pub async fn sources_for(pool: &SqlitePool, query_id: i64) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT source FROM query_sources WHERE query_id = ? ORDER BY position",
        )
        .bind(query_id)
        .fetch_all(pool)
        .await
        .context("Failed to get query sources")
    }

    #[inline]
    pub async fn summary(pool: &SqlitePool) -> Result<AnalyticsSummary> {
        let (total_queries, avg_response_ms): (i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(AVG(response_ms), 0.0) FROM query_log",
        )
        .fetch_one(pool)
        .await
        .context("Failed to aggregate query log")?;

        let top_sources = sqlx::query_as::<_, SourceUsage>(
            r#"
            SELECT source, COUNT(*) AS uses
            FROM query_sources
            GROUP BY source
            ORDER BY uses DESC, source ASC
            LIMIT ?
            "#,
        )
        .bind(TOP_SOURCES_LIMIT)
        .fetch_all(pool)
        .await
        .context("Failed to rank sources")?;

        Ok(AnalyticsSummary {
            total_queries,
            avg_response_ms,
            top_sources,
        })
    }

    /// Delete every logged query, returning how many were removed
    #[inline]
    pub async fn clear(pool: &SqlitePool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM query_log")
            .execute(pool)
            .await
            .context("Failed to clear query log")?;
        Ok(result.rows_affected())
    }
}
