//! Directive context rendering
//!
//! The context is derived each iteration from the session and its ledger; it
//! is never stored.

use crate::ledger::{ExecutionLedger, REQUIRED_PRIMARY_TOOLS};
use crate::models::Subject;

pub const AGENT_RULES: &str = r#"You are a company analysis agent. You gather evidence with tools, then answer.

Rules:
- Reply with exactly one step: either an Action with its Action Input, or a Final Answer.
- Action and Action Input always come as a pair. An Action without an Action Input is ignored.
- Each primary tool (discourse-analysis, research-analysis, price-analysis) runs once. Do not repeat a tool that already ran.
- research-analysis may be retried once if it reported that its source was unavailable.
- memory-advisory is optional guidance from past sessions and does not count as a primary tool.
- Final Answer is accepted only after all three primary tools have run. Once they have, give the Final Answer.

Reply format:
Thought: <your reasoning>
Action: <tool id>
Action Input: <question for the tool>

or

Thought: <your reasoning>
Final Answer: <consolidated answer for the user>"#;

/// Inputs for one directive request.
pub struct DirectiveContext<'a> {
    pub query: &'a str,
    pub subject: &'a Subject,
    pub tool_catalogue: &'a str,
    pub ledger: &'a ExecutionLedger,
    /// Ordering suggestion from session memory; shown on the first iteration only.
    pub memory_hint: Option<&'a str>,
    pub correction: Option<&'a str>,
}

impl DirectiveContext<'_> {
    pub fn render(&self) -> String {
        let completed = self.ledger.completed_primary_count();
        let remaining = REQUIRED_PRIMARY_TOOLS.saturating_sub(completed);

        let mut sections = vec![
            AGENT_RULES.to_string(),
            format!("Available tools:\n{}", self.tool_catalogue),
            format!("User question: {}", self.query),
            format!("Subject: {} ({})", self.subject.name, self.subject.code),
        ];

        if self.ledger.is_empty() {
            let mut opening =
                "Start the analysis. Beginning with discourse-analysis is recommended.".to_string();
            if let Some(hint) = self.memory_hint {
                opening.push_str(&format!("\n[memory suggestion] {}", hint));
            }
            sections.push(opening);
        } else {
            sections.push(format!("Results so far:\n{}", self.ledger.summary()));
        }

        let pending = self
            .ledger
            .pending_primary()
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut progress = format!(
            "Progress: {}/{} primary tools completed (remaining {})",
            completed, REQUIRED_PRIMARY_TOOLS, remaining
        );
        if !pending.is_empty() {
            progress.push_str(&format!("\nNot yet run: {}", pending));
        }
        sections.push(progress);

        if let Some(correction) = self.correction {
            sections.push(format!("Correction:\n{}", correction));
        }

        sections.push(if remaining == 0 {
            "All primary tools have run. Give the Final Answer.".to_string()
        } else {
            "Decide the next tool.".to_string()
        });

        sections.join("\n\n")
    }
}
