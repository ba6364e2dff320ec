//! Observation quality scoring
//!
//! Scores are in [0, 10]. The heuristic rewards concrete, quantitative
//! observations and penalizes errors, soft failures and flagged leakage.

use crate::models::ToolId;
use crate::policy::duplication::SOURCE_UNAVAILABLE;
use crate::policy::leakage::REDACTION_NOTICE;

/// Prefix of observations recorded for a tool that raised an error.
pub const TOOL_ERROR_TAG: &str = "[tool error]";

pub trait QualityEvaluator: Send + Sync {
    fn evaluate(&self, tool: ToolId, observation: &str) -> f32;
}

pub struct HeuristicQualityEvaluator;

impl QualityEvaluator for HeuristicQualityEvaluator {
    fn evaluate(&self, tool: ToolId, observation: &str) -> f32 {
        let mut score = score_text(observation);

        // Advisory output is guidance, not evidence.
        if tool == ToolId::MemoryAdvisory {
            score = score.min(6.0);
        }

        score
    }
}

/// Score free text on a 0–10 scale.
pub fn score_text(text: &str) -> f32 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if trimmed.starts_with(TOOL_ERROR_TAG) {
        return 1.0;
    }

    let lowered = trimmed.to_lowercase();
    let mut score: f32 = 5.0;

    if lowered.contains(SOURCE_UNAVAILABLE) {
        score -= 3.0;
    }
    if trimmed.starts_with(REDACTION_NOTICE) {
        score -= 2.0;
    }
    if trimmed.chars().any(|c| c.is_ascii_digit()) {
        score += 1.5;
    }
    if trimmed.contains('%') || trimmed.contains("/100") {
        score += 1.0;
    }
    if trimmed.chars().count() > 80 {
        score += 1.0;
    }
    if trimmed.lines().filter(|l| !l.trim().is_empty()).count() >= 3 {
        score += 1.0;
    }

    (score.clamp(0.0, 10.0) * 10.0).round() / 10.0
}
