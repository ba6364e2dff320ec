//! Gemini-powered directive generator

use super::DirectiveGenerator;
use crate::gemini::GeminiClient;
use crate::Result;
use async_trait::async_trait;

pub struct GeminiGenerator {
    client: GeminiClient,
}

impl GeminiGenerator {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: GeminiClient::new(api_key)
                .with_temperature(0.1)
                .with_max_output_tokens(1024),
        }
    }
}

#[async_trait]
impl DirectiveGenerator for GeminiGenerator {
    /// The rendered context already carries the agent rules, so no separate
    /// system instruction is sent.
    async fn generate(&self, context: &str) -> Result<String> {
        self.client.generate(context, None).await
    }
}
