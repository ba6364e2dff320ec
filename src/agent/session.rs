use crate::ledger::ExecutionLedger;
use crate::models::Subject;
use std::time::Instant;
use uuid::Uuid;

/// One query lifecycle. Owned exclusively by the task running it; nothing
/// here is shared across sessions.
pub struct Session {
    pub session_id: Uuid,
    pub query: String,
    pub subject: Subject,
    pub iteration: u32,
    pub terminal: bool,
    pub ledger: ExecutionLedger,
    pub trace: Vec<String>,
    started: Instant,
}

impl Session {
    pub fn new(query: &str, subject: Subject) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            query: query.to_string(),
            subject,
            iteration: 0,
            terminal: false,
            ledger: ExecutionLedger::new(),
            trace: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn note(&mut self, line: impl Into<String>) {
        self.trace.push(line.into());
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
