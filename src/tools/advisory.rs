use super::AnalysisTool;
use crate::memory::SessionMemory;
use crate::models::{Subject, ToolId};
use crate::Result;
use std::sync::Arc;

const RECALL_TOP_K: usize = 3;

/// Advisory tool over session memory. Never counts toward completion.
pub struct MemoryAdvisoryTool {
    memory: Arc<dyn SessionMemory>,
}

impl MemoryAdvisoryTool {
    pub fn new(memory: Arc<dyn SessionMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait::async_trait]
impl AnalysisTool for MemoryAdvisoryTool {
    fn id(&self) -> ToolId {
        ToolId::MemoryAdvisory
    }

    fn description(&self) -> &'static str {
        "Past-session guidance: similar analyses and the best-known tool ordering (advisory only)"
    }

    async fn execute(&self, argument: &str, subject: &Subject) -> Result<String> {
        let query = if argument.trim().is_empty() {
            subject.name.as_str()
        } else {
            argument
        };

        let similar = self.memory.recall(query, RECALL_TOP_K).await?;
        let ordering = self.memory.suggest_ordering(&subject.name).await?;
        let patterns = self.memory.recent_patterns().await?;

        let mut sections = Vec::new();

        sections.push(match ordering {
            Some(hint) => format!("Recommended order: {}", hint),
            None => "Recommended order: no verified sessions yet".to_string(),
        });

        if similar.is_empty() {
            sections.push("Similar sessions: none".to_string());
        } else {
            let lines = similar
                .iter()
                .map(|r| {
                    format!(
                        "- {} ({}, quality {:.1}/10)",
                        r.query,
                        if r.execution_verified { "verified" } else { "unverified" },
                        r.quality_score
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("Similar sessions:\n{}", lines));
        }

        sections.push(format!("Recent patterns:\n{}", patterns));

        Ok(sections.join("\n\n"))
    }
}
