//! Append-only execution ledger for one session
//!
//! The ledger is the single source of truth for what has run. Entries are
//! never mutated or removed; completion and context summaries are derived
//! views computed on demand.

use crate::models::ToolId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of distinct primary tools required before a terminal answer.
pub const REQUIRED_PRIMARY_TOOLS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Tool ran to completion and produced an observation.
    Executed,
    /// Tool raised an error; the observation carries the error text.
    Failed,
    /// Duplicate request refused; the tool was never invoked.
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub sequence: usize,
    pub tool: ToolId,
    pub kind: EntryKind,
    pub observation: String,
    /// Quality score in [0, 10]; denials always score 0.
    pub quality: f32,
}

impl LedgerEntry {
    /// An entry that represents an actual invocation of the tool.
    pub fn is_attempt(&self) -> bool {
        self.kind != EntryKind::Denied
    }

    fn first_line(&self) -> &str {
        self.observation.lines().next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionLedger {
    entries: Vec<LedgerEntry>,
}

impl ExecutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return it. Sequence indices start at 1.
    pub fn append(
        &mut self,
        tool: ToolId,
        kind: EntryKind,
        observation: String,
        quality: f32,
    ) -> &LedgerEntry {
        let entry = LedgerEntry {
            sequence: self.entries.len() + 1,
            tool,
            kind,
            observation,
            quality: if kind == EntryKind::Denied {
                0.0
            } else {
                quality.clamp(0.0, 10.0)
            },
        };
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn record_denial(&mut self, tool: ToolId, reason: String) -> &LedgerEntry {
        self.append(tool, EntryKind::Denied, reason, 0.0)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for one tool, in insertion order.
    pub fn entries_for(&self, tool: ToolId) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.tool == tool)
    }

    /// Number of real invocations (denials excluded) of a tool.
    pub fn attempt_count(&self, tool: ToolId) -> usize {
        self.entries_for(tool).filter(|e| e.is_attempt()).count()
    }

    /// Most recent real invocation of a tool.
    pub fn latest_attempt(&self, tool: ToolId) -> Option<&LedgerEntry> {
        self.entries_for(tool).filter(|e| e.is_attempt()).last()
    }

    /// Distinct primary tools with at least one non-denied entry.
    pub fn completed_primary_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.tool.is_primary() && e.is_attempt())
            .map(|e| e.tool)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Completion predicate gating acceptance of a terminal answer.
    pub fn is_complete(&self) -> bool {
        self.completed_primary_count() >= REQUIRED_PRIMARY_TOOLS
    }

    /// Primary tools that have not run yet, in canonical order.
    pub fn pending_primary(&self) -> Vec<ToolId> {
        ToolId::PRIMARY
            .into_iter()
            .filter(|tool| self.attempt_count(*tool) == 0)
            .collect()
    }

    /// Numbered one-line-per-entry summary for the next directive context.
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}. {}: {}", e.sequence, e.tool, e.first_line()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every (tool, observation) pair, for final aggregation.
    pub fn observations(&self) -> Vec<(ToolId, &str)> {
        self.entries
            .iter()
            .map(|e| (e.tool, e.observation.as_str()))
            .collect()
    }

    /// Tools that were actually invoked, in order.
    pub fn tools_used(&self) -> Vec<ToolId> {
        self.entries
            .iter()
            .filter(|e| e.is_attempt())
            .map(|e| e.tool)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_sequence() {
        let mut ledger = ExecutionLedger::new();
        ledger.append(ToolId::DiscourseAnalysis, EntryKind::Executed, "a".into(), 7.0);
        let second = ledger.append(ToolId::PriceAnalysis, EntryKind::Executed, "b".into(), 6.0);
        assert_eq!(second.sequence, 2);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_denials_do_not_complete_tools() {
        let mut ledger = ExecutionLedger::new();
        ledger.record_denial(ToolId::DiscourseAnalysis, "duplicate".into());
        assert_eq!(ledger.completed_primary_count(), 0);
        assert_eq!(ledger.entries()[0].quality, 0.0);
    }

    #[test]
    fn test_completion_predicate() {
        let mut ledger = ExecutionLedger::new();
        ledger.append(ToolId::DiscourseAnalysis, EntryKind::Executed, "a".into(), 7.0);
        ledger.append(ToolId::MemoryAdvisory, EntryKind::Executed, "m".into(), 5.0);
        ledger.append(ToolId::ResearchAnalysis, EntryKind::Failed, "err".into(), 1.0);
        assert!(!ledger.is_complete());
        assert_eq!(ledger.pending_primary(), vec![ToolId::PriceAnalysis]);

        ledger.append(ToolId::PriceAnalysis, EntryKind::Executed, "p".into(), 6.0);
        assert!(ledger.is_complete());
        assert!(ledger.pending_primary().is_empty());
    }

    #[test]
    fn test_summary_uses_first_line_only() {
        let mut ledger = ExecutionLedger::new();
        ledger.append(
            ToolId::DiscourseAnalysis,
            EntryKind::Executed,
            "Sentiment score 55/100\npositive 45%".into(),
            7.0,
        );
        ledger.append(ToolId::PriceAnalysis, EntryKind::Executed, "Neutral trend".into(), 6.0);

        assert_eq!(
            ledger.summary(),
            "1. discourse-analysis: Sentiment score 55/100\n2. price-analysis: Neutral trend"
        );
    }

    #[test]
    fn test_quality_is_clamped() {
        let mut ledger = ExecutionLedger::new();
        let entry = ledger.append(ToolId::PriceAnalysis, EntryKind::Executed, "p".into(), 14.0);
        assert_eq!(entry.quality, 10.0);
    }

    #[test]
    fn test_latest_attempt_skips_denials() {
        let mut ledger = ExecutionLedger::new();
        ledger.append(ToolId::ResearchAnalysis, EntryKind::Executed, "first".into(), 2.0);
        ledger.record_denial(ToolId::ResearchAnalysis, "denied".into());
        assert_eq!(
            ledger.latest_attempt(ToolId::ResearchAnalysis).map(|e| e.observation.as_str()),
            Some("first")
        );
        assert_eq!(ledger.attempt_count(ToolId::ResearchAnalysis), 1);
        assert_eq!(ledger.tools_used(), vec![ToolId::ResearchAnalysis]);
    }
}
