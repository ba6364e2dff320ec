//! Duplicate-execution policy
//!
//! Primary tools are strictly at-most-once. The single exception is the
//! research tool, which may be retried once when its latest attempt ended
//! with a soft-failure signature. The memory-advisory tool is unlimited.

use crate::ledger::ExecutionLedger;
use crate::models::ToolId;
use serde::Serialize;

/// Canonical tag tools prepend when an upstream source is temporarily unavailable.
pub const SOURCE_UNAVAILABLE: &str = "[source unavailable]";

/// Recognized soft-failure signatures (matched case-insensitively).
const SOFT_FAILURE_SIGNATURES: &[&str] = &[
    SOURCE_UNAVAILABLE,
    "no research reports found",
    "pdf 크롤링 실패",
    "pdf 파일을 찾을 수 없습니다",
];

/// Maximum invocations of the retryable tool: the first attempt plus one retry.
const MAX_RETRYABLE_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "admission", content = "reason", rename_all = "snake_case")]
pub enum Admission {
    Allow,
    AllowAsRetry,
    Deny(String),
}

#[derive(Debug, Clone)]
pub struct DuplicationPolicy {
    retryable: ToolId,
    signatures: Vec<String>,
}

impl DuplicationPolicy {
    pub fn new() -> Self {
        Self {
            retryable: ToolId::ResearchAnalysis,
            signatures: SOFT_FAILURE_SIGNATURES
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    /// Add a soft-failure signature.
    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signatures.push(signature.to_lowercase());
        self
    }

    pub fn is_soft_failure(&self, observation: &str) -> bool {
        let lowered = observation.to_lowercase();
        self.signatures.iter().any(|s| lowered.contains(s.as_str()))
    }

    /// Decide whether `requested` may run given what the ledger already holds.
    pub fn admit(&self, ledger: &ExecutionLedger, requested: ToolId) -> Admission {
        if !requested.is_primary() {
            return Admission::Allow;
        }

        let Some(latest) = ledger.latest_attempt(requested) else {
            return Admission::Allow;
        };

        if requested == self.retryable && self.is_soft_failure(&latest.observation) {
            if ledger.attempt_count(requested) < MAX_RETRYABLE_ATTEMPTS {
                return Admission::AllowAsRetry;
            }
            return Admission::Deny(format!(
                "[duplicate blocked] {} already used its single retry. Choose another tool or give the Final Answer.",
                requested
            ));
        }

        Admission::Deny(format!(
            "[duplicate blocked] {} has already been executed. Choose another tool or give the Final Answer.",
            requested
        ))
    }
}

impl Default for DuplicationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EntryKind;

    #[test]
    fn test_first_execution_is_allowed() {
        let policy = DuplicationPolicy::new();
        let ledger = ExecutionLedger::new();
        for tool in ToolId::ALL {
            assert_eq!(policy.admit(&ledger, tool), Admission::Allow);
        }
    }

    #[test]
    fn test_completed_primary_tool_is_denied() {
        let policy = DuplicationPolicy::new();
        let mut ledger = ExecutionLedger::new();
        ledger.append(ToolId::DiscourseAnalysis, EntryKind::Executed, "score 55".into(), 7.0);

        assert!(matches!(
            policy.admit(&ledger, ToolId::DiscourseAnalysis),
            Admission::Deny(_)
        ));
    }

    #[test]
    fn test_failed_attempt_consumes_the_slot() {
        let policy = DuplicationPolicy::new();
        let mut ledger = ExecutionLedger::new();
        ledger.append(ToolId::PriceAnalysis, EntryKind::Failed, "[tool error] timeout".into(), 0.0);

        assert!(matches!(policy.admit(&ledger, ToolId::PriceAnalysis), Admission::Deny(_)));
    }

    #[test]
    fn test_research_soft_failure_allows_one_retry() {
        let policy = DuplicationPolicy::new();
        let mut ledger = ExecutionLedger::new();
        ledger.append(
            ToolId::ResearchAnalysis,
            EntryKind::Executed,
            format!("{} no reports for 삼성전자", SOURCE_UNAVAILABLE),
            1.0,
        );
        assert_eq!(
            policy.admit(&ledger, ToolId::ResearchAnalysis),
            Admission::AllowAsRetry
        );

        ledger.append(
            ToolId::ResearchAnalysis,
            EntryKind::Executed,
            format!("{} still nothing", SOURCE_UNAVAILABLE),
            1.0,
        );
        assert!(matches!(
            policy.admit(&ledger, ToolId::ResearchAnalysis),
            Admission::Deny(_)
        ));
    }

    #[test]
    fn test_soft_failure_only_retries_research() {
        let policy = DuplicationPolicy::new();
        let mut ledger = ExecutionLedger::new();
        ledger.append(
            ToolId::PriceAnalysis,
            EntryKind::Executed,
            format!("{} price feed down", SOURCE_UNAVAILABLE),
            1.0,
        );
        assert!(matches!(policy.admit(&ledger, ToolId::PriceAnalysis), Admission::Deny(_)));
    }

    #[test]
    fn test_memory_advisory_is_unlimited() {
        let policy = DuplicationPolicy::new();
        let mut ledger = ExecutionLedger::new();
        ledger.append(ToolId::MemoryAdvisory, EntryKind::Executed, "guide".into(), 5.0);
        ledger.append(ToolId::MemoryAdvisory, EntryKind::Executed, "guide".into(), 5.0);
        assert_eq!(policy.admit(&ledger, ToolId::MemoryAdvisory), Admission::Allow);
    }

    #[test]
    fn test_legacy_signatures_and_custom_signature() {
        let policy = DuplicationPolicy::new().with_signature("Upstream 503");
        assert!(policy.is_soft_failure("[PDF 크롤링 실패] 리포트를 찾을 수 없습니다"));
        assert!(policy.is_soft_failure("upstream 503 from crawler"));
        assert!(!policy.is_soft_failure("3 reports collected"));
    }
}
