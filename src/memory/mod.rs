//! Session Memory
//!
//! Records completed sessions and supplies historical hints (similar past
//! sessions and the best-known tool ordering) to later sessions.

pub mod in_memory;
pub mod postgres;
pub mod record;

pub use in_memory::InMemorySessionMemory;
pub use postgres::PostgresSessionMemory;
pub use record::{SessionRecord, SessionSummary};

use crate::config::MemoryConfig;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait SessionMemory: Send + Sync {
    /// Past sessions most similar to `query`, best first.
    async fn recall(&self, query: &str, top_k: usize) -> Result<Vec<SessionRecord>>;

    /// Best-known tool ordering for a subject, if any verified session exists.
    async fn suggest_ordering(&self, subject_name: &str) -> Result<Option<String>>;

    /// Digest of the retained sessions, most recent first.
    async fn recent_patterns(&self) -> Result<String>;

    async fn persist(&self, summary: SessionSummary) -> Result<()>;

    /// Flush buffered state before shutdown.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Pick the backend: Postgres when a database URL is configured and the pool
/// can be created, in-memory otherwise.
pub fn build_session_memory(config: &MemoryConfig) -> Arc<dyn SessionMemory> {
    if let Some(url) = config.database_url.as_deref() {
        match PostgresSessionMemory::connect_lazy(url, config.max_sessions, config.keep_best) {
            Ok(memory) => {
                info!("Session memory backend: postgres");
                return Arc::new(memory);
            }
            Err(error) => {
                warn!(
                    %error,
                    "Failed to initialize postgres session memory, falling back to in-memory"
                );
            }
        }
    }

    info!("Session memory backend: in-memory");
    Arc::new(InMemorySessionMemory::new(config.max_sessions, config.keep_best))
}
