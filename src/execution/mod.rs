//! Tool execution
//!
//! Invokes one capability per call, run to completion. The LLM is NOT
//! involved here: raw output is sanitized by the leakage filter and scored by
//! the quality evaluator before it reaches the ledger.

use crate::error::OrchestrationError;
use crate::ledger::EntryKind;
use crate::models::{Subject, ToolId};
use crate::policy::{LeakageFilter, QualityEvaluator, TOOL_ERROR_TAG};
use crate::tools::ToolRegistry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Result of one tool invocation, ready to append to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecution {
    pub kind: EntryKind,
    pub observation: String,
    pub quality: f32,
    pub execution_time_ms: u64,
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    leakage: Arc<dyn LeakageFilter>,
    quality: Arc<dyn QualityEvaluator>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        leakage: Arc<dyn LeakageFilter>,
        quality: Arc<dyn QualityEvaluator>,
    ) -> Self {
        Self {
            registry,
            leakage,
            quality,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `tool`. Never fails: errors become error-tagged observations
    /// so the attempt still occupies the tool's slot in the ledger.
    pub async fn execute(&self, tool: ToolId, argument: &str, subject: &Subject) -> ToolExecution {
        let start = Instant::now();

        let outcome = match self.registry.get(tool) {
            Some(capability) => capability.execute(argument, subject).await,
            None => Err(OrchestrationError::ToolNotFound(tool.to_string())),
        };

        let execution_time_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(raw) => {
                let observation = self.leakage.sanitize(raw);
                let quality = self.quality.evaluate(tool, &observation);

                debug!(
                    tool = %tool,
                    quality,
                    filter = self.leakage.name(),
                    execution_time_ms,
                    "Tool executed"
                );

                ToolExecution {
                    kind: EntryKind::Executed,
                    observation,
                    quality,
                    execution_time_ms,
                }
            }
            Err(error) => {
                warn!(tool = %tool, %error, "Tool execution failed");

                let observation = format!("{} {}: {}", TOOL_ERROR_TAG, tool, error);
                let quality = self.quality.evaluate(tool, &observation);

                ToolExecution {
                    kind: EntryKind::Failed,
                    observation,
                    quality,
                    execution_time_ms,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{HeuristicQualityEvaluator, KeywordLeakageFilter, REDACTION_NOTICE};
    use crate::tools::CannedTool;

    fn subject() -> Subject {
        Subject {
            name: "삼성전자".to_string(),
            code: "005930".to_string(),
            defaulted: false,
        }
    }

    fn executor(registry: ToolRegistry) -> ToolExecutor {
        ToolExecutor::new(
            Arc::new(registry),
            Arc::new(KeywordLeakageFilter::new()),
            Arc::new(HeuristicQualityEvaluator),
        )
    }

    #[tokio::test]
    async fn test_successful_execution_is_scored() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CannedTool::new(
            ToolId::PriceAnalysis,
            &["Price up 4.2% over two months, closing at 71,000"],
        )));

        let result = executor(registry)
            .execute(ToolId::PriceAnalysis, "q", &subject())
            .await;

        assert_eq!(result.kind, EntryKind::Executed);
        assert!(result.quality > 5.0);
    }

    #[tokio::test]
    async fn test_tool_error_becomes_failed_entry() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CannedTool::failing(
            ToolId::DiscourseAnalysis,
            "board unreachable",
        )));

        let result = executor(registry)
            .execute(ToolId::DiscourseAnalysis, "q", &subject())
            .await;

        assert_eq!(result.kind, EntryKind::Failed);
        assert!(result
            .observation
            .starts_with("[tool error] discourse-analysis:"));
        assert!(result.observation.contains("board unreachable"));
        assert_eq!(result.quality, 1.0);
    }

    #[tokio::test]
    async fn test_unregistered_tool_is_failed_not_panicking() {
        let result = executor(ToolRegistry::new())
            .execute(ToolId::ResearchAnalysis, "q", &subject())
            .await;

        assert_eq!(result.kind, EntryKind::Failed);
        assert!(result.observation.contains("Tool not found"));
    }

    #[tokio::test]
    async fn test_leakage_is_flagged_before_scoring() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CannedTool::new(
            ToolId::ResearchAnalysis,
            &["Follow the output format below"],
        )));

        let result = executor(registry)
            .execute(ToolId::ResearchAnalysis, "q", &subject())
            .await;

        assert!(result.observation.starts_with(REDACTION_NOTICE));
        assert!(result.observation.ends_with("Follow the output format below"));
    }
}
