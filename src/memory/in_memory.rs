//! In-memory session memory for development and tests

use crate::memory::record::{
    describe_patterns, rank_similar, records_to_evict, suggest_ordering, SessionRecord,
    SessionSummary,
};
use crate::error::OrchestrationError;
use crate::memory::SessionMemory;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct InMemorySessionMemory {
    records: Arc<RwLock<Vec<SessionRecord>>>,
    max_sessions: usize,
    keep_best: usize,
}

impl InMemorySessionMemory {
    pub fn new(max_sessions: usize, keep_best: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            max_sessions,
            keep_best,
        }
    }

    /// Snapshot of the retained records, oldest first.
    pub async fn records(&self) -> Vec<SessionRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl SessionMemory for InMemorySessionMemory {
    async fn recall(&self, query: &str, top_k: usize) -> Result<Vec<SessionRecord>> {
        let records = self.records.read().await;
        Ok(rank_similar(query, &records, top_k))
    }

    async fn suggest_ordering(&self, subject_name: &str) -> Result<Option<String>> {
        let records = self.records.read().await;
        Ok(suggest_ordering(subject_name, &records))
    }

    async fn recent_patterns(&self) -> Result<String> {
        let records = self.records.read().await;
        Ok(describe_patterns(&records))
    }

    async fn persist(&self, summary: SessionSummary) -> Result<()> {
        if summary.query.trim().is_empty() {
            return Err(OrchestrationError::MemoryError(
                "cannot persist a session without a query".to_string(),
            ));
        }

        let mut records = self.records.write().await;
        records.push(SessionRecord::from_summary(summary));

        let evicted = records_to_evict(&records, self.max_sessions, self.keep_best);
        if !evicted.is_empty() {
            records.retain(|r| !evicted.contains(&r.record_id));
        }

        Ok(())
    }
}
