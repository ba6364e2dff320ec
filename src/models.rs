//! Core data models for the company analysis agent

use crate::ledger::LedgerEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

//
// ================= Tools =================
//

/// Closed set of tools the loop can invoke.
///
/// The first three are primary tools: each must run before a terminal answer
/// is accepted, and each runs at most once (research may be retried once
/// after a soft failure). `MemoryAdvisory` is advisory only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ToolId {
    DiscourseAnalysis,
    ResearchAnalysis,
    PriceAnalysis,
    MemoryAdvisory,
}

impl ToolId {
    pub const ALL: [ToolId; 4] = [
        ToolId::DiscourseAnalysis,
        ToolId::ResearchAnalysis,
        ToolId::PriceAnalysis,
        ToolId::MemoryAdvisory,
    ];

    pub const PRIMARY: [ToolId; 3] = [
        ToolId::DiscourseAnalysis,
        ToolId::ResearchAnalysis,
        ToolId::PriceAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::DiscourseAnalysis => "discourse-analysis",
            ToolId::ResearchAnalysis => "research-analysis",
            ToolId::PriceAnalysis => "price-analysis",
            ToolId::MemoryAdvisory => "memory-advisory",
        }
    }

    pub fn is_primary(&self) -> bool {
        !matches!(self, ToolId::MemoryAdvisory)
    }

    /// Standard question handed to the tool when a directive leaves
    /// `Action Input` empty.
    pub fn default_argument(&self, subject_name: &str, query: &str) -> String {
        match self {
            ToolId::DiscourseAnalysis => format!(
                "What is the recent investor sentiment and market interest around {}?",
                subject_name
            ),
            ToolId::ResearchAnalysis => format!("Recent analyst view on {} stock", subject_name),
            ToolId::PriceAnalysis => format!(
                "Current price situation of {} and price changes over the last two months",
                subject_name
            ),
            ToolId::MemoryAdvisory => query.to_string(),
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = String;

    /// Accepts the canonical kebab-case ids, snake/space variants, and the
    /// pipeline names older prompts still produce.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .trim_matches(|c| c == '`' || c == '"' || c == '\'' || c == '*')
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "discourseanalysis" | "naverdiscussionragpipeline" | "discussionanalysis" => {
                Ok(ToolId::DiscourseAnalysis)
            }
            "researchanalysis" | "researchragtool" => Ok(ToolId::ResearchAnalysis),
            "priceanalysis" | "stockpriceragtool" => Ok(ToolId::PriceAnalysis),
            "memoryadvisory" | "memorytool" => Ok(ToolId::MemoryAdvisory),
            _ => Err(s.trim().to_string()),
        }
    }
}

//
// ================= Subject =================
//

/// Company the session is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    pub code: String,
    /// True when the query matched nothing and the default subject was used.
    #[serde(default)]
    pub defaulted: bool,
}

//
// ================= Outcome =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Terminal answer accepted with all primary tools executed.
    Verified,
    /// Budget exhausted; answer produced by the fallback aggregator.
    Fallback,
    /// Budget exhausted with nothing recorded.
    Failed,
    /// Session abandoned between iterations.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub session_id: Uuid,
    pub audit_id: Option<Uuid>,
    pub subject: Subject,
    pub kind: OutcomeKind,
    pub answer: String,
    pub execution_verified: bool,
    pub iterations: u32,
    pub ledger: Vec<LedgerEntry>,
    pub reasoning_trace: Vec<String>,
    pub execution_time_ms: u64,
}

//
// ================= Audit =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub session_id: Uuid,
    pub query: String,
    pub subject: Subject,
    pub kind: OutcomeKind,
    pub execution_verified: bool,
    pub final_answer: String,

    pub ledger: Arc<Vec<LedgerEntry>>,
    pub ledger_hash: String,
    pub reasoning_trace: Arc<Vec<String>>,

    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_id_parsing() {
        assert_eq!("discourse-analysis".parse::<ToolId>(), Ok(ToolId::DiscourseAnalysis));
        assert_eq!("Research_Analysis".parse::<ToolId>(), Ok(ToolId::ResearchAnalysis));
        assert_eq!("`price-analysis`".parse::<ToolId>(), Ok(ToolId::PriceAnalysis));
        assert_eq!("StockPriceRAGTool".parse::<ToolId>(), Ok(ToolId::PriceAnalysis));
        assert_eq!("MemoryTool".parse::<ToolId>(), Ok(ToolId::MemoryAdvisory));
        assert_eq!("weather".parse::<ToolId>(), Err("weather".to_string()));
    }

    #[test]
    fn test_primary_tools() {
        assert!(ToolId::PRIMARY.iter().all(ToolId::is_primary));
        assert!(!ToolId::MemoryAdvisory.is_primary());
    }

    #[test]
    fn test_tool_id_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ToolId::ResearchAnalysis).unwrap();
        assert_eq!(json, "\"research-analysis\"");
    }
}
