//! Postgres-backed session memory
//!
//! Retention is enforced on every insert inside the same transaction, so the
//! table never holds more than the configured number of sessions.

use crate::error::OrchestrationError;
use crate::memory::record::{
    describe_patterns, rank_similar, records_to_evict, suggest_ordering, SessionRecord,
    SessionSummary,
};
use crate::memory::SessionMemory;
use crate::models::ToolId;
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Postgres, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

const SELECT_RECORDS: &str = r#"
    SELECT record_id, query, subject_name, tools_used, final_answer,
           execution_verified, quality_score, created_at
    FROM analysis_sessions
    ORDER BY created_at ASC
"#;

pub struct PostgresSessionMemory {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
    max_sessions: usize,
    keep_best: usize,
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> OrchestrationError {
    move |e| OrchestrationError::DatabaseError(format!("{}: {}", context, e))
}

impl PostgresSessionMemory {
    /// Create a lazily-connecting pool; nothing touches the database until
    /// the first query.
    pub fn connect_lazy(url: &str, max_sessions: usize, keep_best: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(db_error("Failed to create session memory pool"))?;

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
            max_sessions,
            keep_best,
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS analysis_sessions (
                      record_id UUID PRIMARY KEY,
                      query TEXT NOT NULL,
                      subject_name TEXT NOT NULL,
                      tools_used TEXT[] NOT NULL,
                      final_answer TEXT NOT NULL,
                      execution_verified BOOLEAN NOT NULL,
                      quality_score REAL NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_analysis_sessions_subject
                    ON analysis_sessions (subject_name, created_at);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(db_error("Failed to initialize session memory schema"))?;

        Ok(())
    }

    fn record_from_row(row: &PgRow) -> SessionRecord {
        let tools: Vec<String> = row.try_get("tools_used").unwrap_or_default();

        SessionRecord {
            record_id: row.try_get("record_id").unwrap_or_else(|_| Uuid::new_v4()),
            query: row.try_get("query").unwrap_or_default(),
            tools_used: tools
                .iter()
                .filter_map(|t| t.parse::<ToolId>().ok())
                .collect(),
            final_answer: row.try_get("final_answer").unwrap_or_default(),
            subject_name: row.try_get("subject_name").unwrap_or_default(),
            execution_verified: row.try_get("execution_verified").unwrap_or(false),
            quality_score: row.try_get("quality_score").unwrap_or(0.0),
            created_at: row
                .try_get("created_at")
                .unwrap_or_else(|_| chrono::Utc::now()),
        }
    }

    async fn load_records<'e, E>(executor: E) -> Result<Vec<SessionRecord>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query(SELECT_RECORDS)
            .fetch_all(executor)
            .await
            .map_err(db_error("Failed to load session memory"))?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn all_records(&self) -> Result<Vec<SessionRecord>> {
        self.ensure_schema().await?;
        Self::load_records(&self.pool).await
    }
}

#[async_trait]
impl SessionMemory for PostgresSessionMemory {
    async fn recall(&self, query: &str, top_k: usize) -> Result<Vec<SessionRecord>> {
        let records = self.all_records().await?;
        Ok(rank_similar(query, &records, top_k))
    }

    async fn suggest_ordering(&self, subject_name: &str) -> Result<Option<String>> {
        let records = self.all_records().await?;
        Ok(suggest_ordering(subject_name, &records))
    }

    async fn recent_patterns(&self) -> Result<String> {
        let records = self.all_records().await?;
        Ok(describe_patterns(&records))
    }

    async fn persist(&self, summary: SessionSummary) -> Result<()> {
        self.ensure_schema().await?;

        let record = SessionRecord::from_summary(summary);
        let tools: Vec<String> = record
            .tools_used
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin session memory transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO analysis_sessions
              (record_id, query, subject_name, tools_used, final_answer, execution_verified, quality_score, created_at)
            VALUES
              ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.record_id)
        .bind(&record.query)
        .bind(&record.subject_name)
        .bind(&tools)
        .bind(&record.final_answer)
        .bind(record.execution_verified)
        .bind(record.quality_score)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert session record"))?;

        let records = Self::load_records(&mut *tx).await?;
        let evicted = records_to_evict(&records, self.max_sessions, self.keep_best);
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicting session records");
            sqlx::query("DELETE FROM analysis_sessions WHERE record_id = ANY($1)")
                .bind(&evicted)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to evict session records"))?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit session record"))?;

        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        if self.pool.is_closed() {
            warn!("Session memory pool already closed");
            return Ok(());
        }
        self.pool.close().await;
        Ok(())
    }
}
