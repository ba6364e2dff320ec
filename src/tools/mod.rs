//! Tool trait and registry
//!
//! Primary tools are HTTP-backed analysis pipelines; the advisory tool reads
//! session memory. The registry is built once and shared read-only.

use crate::error::OrchestrationError;
use crate::memory::SessionMemory;
use crate::models::{Subject, ToolId};
use crate::policy::SOURCE_UNAVAILABLE;
use crate::Result;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod advisory;

pub use advisory::MemoryAdvisoryTool;

/// A capability the loop can invoke. Each call runs to completion and
/// yields one observation.
#[async_trait::async_trait]
pub trait AnalysisTool: Send + Sync {
    fn id(&self) -> ToolId;
    fn description(&self) -> &'static str;
    async fn execute(&self, argument: &str, subject: &Subject) -> Result<String>;
}

/// Tool registry for looking up and describing tools
pub struct ToolRegistry {
    tools: HashMap<ToolId, Arc<dyn AnalysisTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn AnalysisTool>) {
        self.tools.insert(tool.id(), tool);
    }

    pub fn get(&self, id: ToolId) -> Option<Arc<dyn AnalysisTool>> {
        self.tools.get(&id).cloned()
    }

    /// Registered tools in canonical order.
    pub fn list(&self) -> Vec<ToolId> {
        ToolId::ALL
            .into_iter()
            .filter(|id| self.tools.contains_key(id))
            .collect()
    }

    /// Capability catalogue shown to the text-generation collaborator.
    pub fn describe(&self) -> String {
        self.list()
            .into_iter()
            .filter_map(|id| self.tools.get(&id))
            .map(|tool| format!("- {}: {}", tool.id(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct AnalysisApiClient {
    client: Client,
    base_url: String,
}

impl AnalysisApiClient {
    fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::ToolError(format!(
                    "Analysis API request failed for {}: {}",
                    path, e
                ))
            })?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(OrchestrationError::ToolError(format!(
                "Analysis API returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

/// Turn a pipeline response into observation text.
fn render_observation(body: &Value) -> String {
    let headline = ["observation", "summary", "result"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    let details = body
        .get("details")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|line| format!("- {}", line))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|s| !s.is_empty());

    match (headline, details) {
        (Some(h), Some(d)) => format!("{}\n\n{}", h, d),
        (Some(h), None) => h,
        _ => serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string()),
    }
}

/// A research response with no documents behind it.
fn is_empty_research(body: &Value) -> bool {
    let no_documents = body.get("documents").and_then(Value::as_u64) == Some(0);
    let not_found = body
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s.eq_ignore_ascii_case("no_documents") || s.eq_ignore_ascii_case("not_found"))
        .unwrap_or(false);
    no_documents || not_found
}

/// Primary tool backed by one analysis pipeline endpoint.
pub struct PipelineTool {
    id: ToolId,
    path: &'static str,
    description: &'static str,
    api: Option<AnalysisApiClient>,
}

impl PipelineTool {
    fn new(
        id: ToolId,
        path: &'static str,
        description: &'static str,
        api: Option<AnalysisApiClient>,
    ) -> Self {
        Self {
            id,
            path,
            description,
            api,
        }
    }
}

#[async_trait::async_trait]
impl AnalysisTool for PipelineTool {
    fn id(&self) -> ToolId {
        self.id
    }

    fn description(&self) -> &'static str {
        self.description
    }

    async fn execute(&self, argument: &str, subject: &Subject) -> Result<String> {
        let api = self.api.as_ref().ok_or_else(|| {
            OrchestrationError::ToolError(
                "FINANCIAL_API_BASE_URL (or TOOLS_API_BASE_URL) is not configured".to_string(),
            )
        })?;

        if argument.trim().is_empty() {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "{} requires a non-empty question",
                self.id
            )));
        }

        let response = api
            .post_json(
                self.path,
                &json!({
                    "question": argument,
                    "stock_code": subject.code,
                    "company_name": subject.name,
                }),
            )
            .await?;

        if self.id == ToolId::ResearchAnalysis && is_empty_research(&response) {
            return Ok(format!(
                "{} No research reports found for {}. Run the other tools first or retry.",
                SOURCE_UNAVAILABLE, subject.name
            ));
        }

        Ok(render_observation(&response))
    }
}

/// Fixed-output tool for offline runs and tests. Returns its observations in
/// order (the last one repeats), counts invocations and keeps the arguments.
pub struct CannedTool {
    id: ToolId,
    responses: Mutex<Vec<std::result::Result<String, String>>>,
    arguments: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl CannedTool {
    pub fn new(id: ToolId, observations: &[&str]) -> Self {
        Self::scripted(id, observations.iter().map(|o| Ok(o.to_string())).collect())
    }

    pub fn failing(id: ToolId, error: &str) -> Self {
        Self::scripted(id, vec![Err(error.to_string())])
    }

    pub fn scripted(id: ToolId, responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            id,
            responses: Mutex::new(responses),
            arguments: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn arguments(&self) -> Vec<String> {
        self.arguments
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AnalysisTool for CannedTool {
    fn id(&self) -> ToolId {
        self.id
    }

    fn description(&self) -> &'static str {
        "Canned observations"
    }

    async fn execute(&self, argument: &str, _subject: &Subject) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut arguments) = self.arguments.lock() {
            arguments.push(argument.to_string());
        }

        let mut responses = self
            .responses
            .lock()
            .map_err(|_| OrchestrationError::ToolError("canned tool poisoned".to_string()))?;

        let next = if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses
                .first()
                .cloned()
                .unwrap_or_else(|| Ok(String::new()))
        };

        next.map_err(OrchestrationError::ToolError)
    }
}

/// Create the default registry: three HTTP-backed primary tools plus the
/// memory-advisory tool.
pub fn create_default_registry(
    tools_base_url: Option<&str>,
    memory: Arc<dyn SessionMemory>,
) -> Result<ToolRegistry> {
    let api = tools_base_url.map(AnalysisApiClient::new).transpose()?;

    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(PipelineTool::new(
        ToolId::DiscourseAnalysis,
        "/api/v1/discussion/analyze",
        "Investor discussion-board sentiment (live retail opinion)",
        api.clone(),
    )));
    registry.register(Arc::new(PipelineTool::new(
        ToolId::ResearchAnalysis,
        "/api/v1/research/analyze",
        "Analyst research reports (document crawl + analysis)",
        api.clone(),
    )));
    registry.register(Arc::new(PipelineTool::new(
        ToolId::PriceAnalysis,
        "/api/v1/price/analyze",
        "Price series analysis (last two months)",
        api,
    )));
    registry.register(Arc::new(MemoryAdvisoryTool::new(memory)));

    Ok(registry)
}
