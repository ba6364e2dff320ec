//! Audit logging
//!
//! Every finished session is stored with its full ledger and reasoning trace.

use crate::error::OrchestrationError;
use crate::ledger::LedgerEntry;
use crate::models::AuditRecord;
use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Default number of records kept in memory.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1_000;

#[derive(Default)]
struct AuditStore {
    records: HashMap<Uuid, AuditRecord>,
    /// Insertion order, oldest first.
    order: VecDeque<Uuid>,
}

/// Audit trail storage.
///
/// Holds at most `capacity` records; the oldest record is dropped when a new
/// one would exceed it.
pub struct AuditLog {
    store: Arc<RwLock<AuditStore>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(AuditStore::default())),
            capacity: capacity.max(1),
        }
    }

    /// Store a session record. Records are append-only.
    pub async fn record(&self, record: AuditRecord) -> Result<Uuid> {
        let audit_id = record.audit_id;
        let mut store = self.store.write().await;
        if store.records.contains_key(&audit_id) {
            return Err(OrchestrationError::AuditError(format!(
                "audit record {} already exists",
                audit_id
            )));
        }

        while store.order.len() >= self.capacity {
            match store.order.pop_front() {
                Some(oldest) => {
                    store.records.remove(&oldest);
                    debug!(audit_id = %oldest, "Audit capacity reached, dropping oldest record");
                }
                None => break,
            }
        }

        store.records.insert(audit_id, record);
        store.order.push_back(audit_id);
        Ok(audit_id)
    }

    /// Retrieve a record by audit ID
    pub async fn get(&self, audit_id: Uuid) -> Result<Option<AuditRecord>> {
        let store = self.store.read().await;
        Ok(store.records.get(&audit_id).cloned())
    }

    /// All retained records for a session, oldest first
    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AuditRecord>> {
        let store = self.store.read().await;

        Ok(store
            .order
            .iter()
            .filter_map(|id| store.records.get(id))
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect())
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.records.len()
    }

    /// Verify a record's integrity via the ledger hash
    pub async fn verify_integrity(&self, audit_id: Uuid) -> Result<bool> {
        let store = self.store.read().await;

        if let Some(record) = store.records.get(&audit_id) {
            Ok(compute_ledger_hash(&record.ledger) == record.ledger_hash)
        } else {
            Ok(false)
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA256 of the ledger, streamed as JSON into the hasher
pub fn compute_ledger_hash(entries: &[LedgerEntry]) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), entries).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EntryKind, ExecutionLedger};
    use crate::models::{OutcomeKind, Subject, ToolId};
    use chrono::Utc;

    fn record(ledger: &ExecutionLedger) -> AuditRecord {
        AuditRecord {
            audit_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            query: "삼성전자 전망".to_string(),
            subject: Subject {
                name: "삼성전자".to_string(),
                code: "005930".to_string(),
                defaulted: false,
            },
            kind: OutcomeKind::Fallback,
            execution_verified: false,
            final_answer: "answer".to_string(),
            ledger: Arc::new(ledger.entries().to_vec()),
            ledger_hash: compute_ledger_hash(ledger.entries()),
            reasoning_trace: Arc::new(vec!["INPUT: query received".to_string()]),
            created_at: Utc::now(),
            execution_time_ms: 12,
        }
    }

    #[tokio::test]
    async fn test_record_and_verify() {
        let mut ledger = ExecutionLedger::new();
        ledger.append(ToolId::PriceAnalysis, EntryKind::Executed, "up 3%".to_string(), 7.0);

        let log = AuditLog::new();
        let rec = record(&ledger);
        let session_id = rec.session_id;
        let audit_id = log.record(rec).await.unwrap();

        assert!(log.verify_integrity(audit_id).await.unwrap());

        let listed = log.list_for_session(session_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].audit_id, audit_id);
        assert_eq!(listed[0].ledger.len(), 1);
        assert!(log.list_for_session(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tampered_ledger_fails_verification() {
        let mut ledger = ExecutionLedger::new();
        ledger.append(ToolId::PriceAnalysis, EntryKind::Executed, "up 3%".to_string(), 7.0);

        let mut rec = record(&ledger);
        let mut entries = ledger.entries().to_vec();
        entries[0].observation = "down 9%".to_string();
        rec.ledger = Arc::new(entries);

        let log = AuditLog::new();
        let audit_id = log.record(rec).await.unwrap();
        assert!(!log.verify_integrity(audit_id).await.unwrap());
        assert!(!log.verify_integrity(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_records_are_append_only() {
        let log = AuditLog::new();
        let rec = record(&ExecutionLedger::new());
        log.record(rec.clone()).await.unwrap();

        let result = log.record(rec).await;
        assert!(matches!(result, Err(OrchestrationError::AuditError(_))));
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_oldest_record_is_dropped_at_capacity() {
        let log = AuditLog::with_capacity(2);
        let ledger = ExecutionLedger::new();

        let first = log.record(record(&ledger)).await.unwrap();
        let second = log.record(record(&ledger)).await.unwrap();
        let third = log.record(record(&ledger)).await.unwrap();

        assert_eq!(log.len().await, 2);
        assert!(log.get(first).await.unwrap().is_none());
        assert!(log.get(second).await.unwrap().is_some());
        assert!(log.get(third).await.unwrap().is_some());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let mut a = ExecutionLedger::new();
        let mut b = ExecutionLedger::new();
        for ledger in [&mut a, &mut b] {
            ledger.append(ToolId::DiscourseAnalysis, EntryKind::Executed, "55/100".to_string(), 6.5);
        }
        assert_eq!(compute_ledger_hash(a.entries()), compute_ledger_hash(b.entries()));
        assert_eq!(compute_ledger_hash(a.entries()).len(), 64);
    }
}
