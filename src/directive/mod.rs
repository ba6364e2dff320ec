//! Directive generation and interpretation
//!
//! A directive is the text-generation collaborator's proposal for the next
//! step. Generators produce raw text; the parser turns it into a typed
//! `Decision` before it can affect session state.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod context;
pub mod gemini;
pub mod parser;

pub use context::{DirectiveContext, AGENT_RULES};
pub use gemini::GeminiGenerator;
pub use parser::{Decision, DirectiveParser, ParsedDirective};

/// Text-generation collaborator (LLM controlled)
#[async_trait]
pub trait DirectiveGenerator: Send + Sync {
    async fn generate(&self, context: &str) -> Result<String>;
}

/// Replays a fixed sequence of replies for development & testing.
/// Keeps the loop functional and deterministic without an LLM.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    /// `Err` entries simulate generation failures.
    pub fn scripted(replies: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Every context received so far, in call order.
    pub fn contexts(&self) -> Vec<String> {
        self.contexts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DirectiveGenerator for ScriptedGenerator {
    async fn generate(&self, context: &str) -> Result<String> {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(context.to_string());
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| OrchestrationError::GenerationFailure("script poisoned".to_string()))?
            .pop_front();

        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(OrchestrationError::GenerationFailure(error)),
            None => Err(OrchestrationError::GenerationFailure(
                "script exhausted".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_generator_replays_and_records() {
        let generator = ScriptedGenerator::scripted(vec![
            Ok("Action: price-analysis\nAction Input: q".to_string()),
            Err("rate limited".to_string()),
        ]);

        assert!(generator.generate("ctx-1").await.unwrap().contains("price-analysis"));
        assert!(matches!(
            generator.generate("ctx-2").await,
            Err(OrchestrationError::GenerationFailure(e)) if e == "rate limited"
        ));
        assert!(generator.generate("ctx-3").await.is_err());

        assert_eq!(generator.contexts(), vec!["ctx-1", "ctx-2", "ctx-3"]);
        assert_eq!(generator.calls(), 3);
    }
}
