//! Company Analysis Agent
//!
//! A tool-using reasoning loop that answers natural-language questions about
//! a listed company by coordinating three analysis tools:
//! - investor discourse sentiment
//! - analyst research reports
//! - price history
//!
//! A language model proposes each step; the loop enforces at-most-once
//! execution, requires every primary tool before accepting a final answer,
//! caps the session at a fixed iteration budget and falls back to
//! aggregation when that budget runs out. Finished sessions are remembered
//! to advise later ones and are stored in a tamper-evident audit log.
//!
//! UNIFIED LOOP:
//! INPUT → REQUEST → DECIDE → EXECUTE | DENY → ... → COMPLETE | FALLBACK

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod directive;
pub mod error;
pub mod execution;
pub mod fallback;
pub mod gemini;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod policy;
pub mod subject;
pub mod tools;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use agent::{create_orchestrator, Orchestrator};
pub use config::AgentConfig;
pub use models::*;
