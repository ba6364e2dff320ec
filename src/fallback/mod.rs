//! Fallback aggregation
//!
//! Invoked when the iteration budget runs out with at least one ledger entry.
//! Consolidates every recorded observation into one answer.

use crate::gemini::GeminiClient;
use crate::ledger::REQUIRED_PRIMARY_TOOLS;
use crate::models::ToolId;
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

const DIGEST_LINES_PER_OBSERVATION: usize = 3;

#[async_trait]
pub trait FallbackAggregator: Send + Sync {
    async fn aggregate(
        &self,
        query: &str,
        observations: &[(ToolId, &str)],
        subject_name: &str,
    ) -> Result<String>;
}

/// Deterministic digest of the observations. Used directly in tests and
/// offline runs, and as the last resort when a model-backed aggregator fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestAggregator;

impl DigestAggregator {
    pub fn digest(query: &str, observations: &[(ToolId, &str)], subject_name: &str) -> String {
        let covered: BTreeSet<ToolId> = observations
            .iter()
            .map(|(tool, _)| *tool)
            .filter(ToolId::is_primary)
            .collect();

        let mut out = format!("Analysis of {} for: {}\n", subject_name, query);

        for (tool, observation) in observations {
            let excerpt = observation
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .take(DIGEST_LINES_PER_OBSERVATION)
                .collect::<Vec<_>>()
                .join(" / ");
            out.push_str(&format!("\n[{}] {}", tool, excerpt));
        }

        out.push_str(&format!(
            "\n\nNote: {}/{} primary analyses contributed to this answer; it was assembled without a verified final step.",
            covered.len(),
            REQUIRED_PRIMARY_TOOLS
        ));

        out
    }
}

#[async_trait]
impl FallbackAggregator for DigestAggregator {
    async fn aggregate(
        &self,
        query: &str,
        observations: &[(ToolId, &str)],
        subject_name: &str,
    ) -> Result<String> {
        Ok(Self::digest(query, observations, subject_name))
    }
}

const SYNTHESIS_INSTRUCTION: &str = r#"You are a senior equity analyst. Combine the tool results below into one answer for the user.

- Cover investor sentiment, analyst research and price trend where results exist.
- Say plainly which analyses are missing or failed.
- Do not invent figures that are not in the results.
- Finish with a short overall view."#;

/// Model-backed synthesis of the recorded observations.
pub struct GeminiAggregator {
    client: GeminiClient,
}

impl GeminiAggregator {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: GeminiClient::new(api_key)
                .with_temperature(0.3)
                .with_max_output_tokens(2048),
        }
    }

    fn build_prompt(query: &str, observations: &[(ToolId, &str)], subject_name: &str) -> String {
        let results = observations
            .iter()
            .enumerate()
            .map(|(i, (tool, observation))| format!("{}. [{}]\n{}", i + 1, tool, observation))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "User question: {}\nSubject: {}\n\nTool results:\n{}",
            query, subject_name, results
        )
    }
}

#[async_trait]
impl FallbackAggregator for GeminiAggregator {
    async fn aggregate(
        &self,
        query: &str,
        observations: &[(ToolId, &str)],
        subject_name: &str,
    ) -> Result<String> {
        let prompt = Self::build_prompt(query, observations, subject_name);
        self.client
            .generate(&prompt, Some(SYNTHESIS_INSTRUCTION))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;

    #[tokio::test]
    async fn test_digest_lists_every_observation() {
        let observations = vec![
            (ToolId::DiscourseAnalysis, "Sentiment 55/100\npositive 45%\nnegative 35%\nneutral 20%"),
            (ToolId::MemoryAdvisory, "Recommended order: none"),
        ];

        let answer = DigestAggregator
            .aggregate("삼성전자 전망", &observations, "삼성전자")
            .await
            .unwrap();

        assert!(answer.starts_with("Analysis of 삼성전자 for: 삼성전자 전망"));
        assert!(answer.contains("[discourse-analysis] Sentiment 55/100 / positive 45% / negative 35%"));
        assert!(!answer.contains("neutral 20%"));
        assert!(answer.contains("[memory-advisory] Recommended order: none"));
        assert!(answer.contains("1/3 primary analyses"));
    }

    #[test]
    fn test_prompt_numbers_results() {
        let prompt = GeminiAggregator::build_prompt(
            "q",
            &[(ToolId::PriceAnalysis, "up 3%"), (ToolId::ResearchAnalysis, "2 reports")],
            "카카오",
        );
        assert!(prompt.contains("Subject: 카카오"));
        assert!(prompt.contains("1. [price-analysis]\nup 3%"));
        assert!(prompt.contains("2. [research-analysis]\n2 reports"));
    }

    #[tokio::test]
    async fn test_unconfigured_gemini_aggregator_errors() {
        let aggregator = GeminiAggregator::new(None);
        let result = aggregator
            .aggregate("q", &[(ToolId::PriceAnalysis, "up")], "카카오")
            .await;
        assert!(matches!(result, Err(OrchestrationError::GenerationFailure(_))));
    }
}
