
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One answered question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct QueryRecord {
    pub id: i64,
    pub question: String,
    pub response_ms: i64,
    pub created_date: NaiveDateTime,
    /// Cited sources in the order they were returned
    #[sqlx(skip)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQueryRecord {
    pub question: String,
    pub response_ms: i64,
    pub sources: Vec<String>,
}

/// How often a source was cited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SourceUsage {
    pub source: String,
    pub uses: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_queries: i64,
    /// Mean response time; zero when nothing has been logged
    pub avg_response_ms: f64,
    /// Most cited sources, most used first
    pub top_sources: Vec<SourceUsage>,
}

impl std::fmt::Display for SourceUsage {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} uses)", self.source, self.uses)
    }
}
