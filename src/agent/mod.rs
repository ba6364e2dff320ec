//! Main orchestrator - implements the bounded analysis loop
//!
//! INPUT → REQUEST → DECIDE → EXECUTE → RECORD → (loop) → COMPLETE | FALLBACK
//!
//! Each iteration requests one directive, parses it into a typed decision,
//! gates it through the duplication policy and records the result in the
//! session's append-only ledger. A terminal answer is accepted only once all
//! three primary tools have run; otherwise the budget runs out and the
//! recorded observations are aggregated.

mod session;

pub use session::Session;

use crate::audit::{compute_ledger_hash, AuditLog};
use crate::config::{AgentConfig, Pacing};
use crate::directive::{Decision, DirectiveContext, DirectiveGenerator, DirectiveParser, GeminiGenerator};
use crate::execution::ToolExecutor;
use crate::fallback::{DigestAggregator, FallbackAggregator, GeminiAggregator};
use crate::memory::{build_session_memory, SessionMemory, SessionSummary};
use crate::models::{AnalysisOutcome, AuditRecord, OutcomeKind, ToolId};
use crate::policy::{Admission, DuplicationPolicy, HeuristicQualityEvaluator, KeywordLeakageFilter};
use crate::subject::SubjectCatalog;
use crate::tools::create_default_registry;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fixed iteration budget per session.
pub const MAX_ITERATIONS: u32 = 5;

pub const BUDGET_EXHAUSTED_MESSAGE: &str =
    "Reached the maximum number of iterations (5) without completing the analysis.";

/// Main orchestrator, built once and shared across sessions
pub struct Orchestrator {
    generator: Arc<dyn DirectiveGenerator>,
    executor: ToolExecutor,
    policy: DuplicationPolicy,
    parser: DirectiveParser,
    memory: Arc<dyn SessionMemory>,
    aggregator: Arc<dyn FallbackAggregator>,
    catalog: SubjectCatalog,
    pacing: Pacing,
    audit_log: AuditLog,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn DirectiveGenerator>,
        executor: ToolExecutor,
        memory: Arc<dyn SessionMemory>,
        aggregator: Arc<dyn FallbackAggregator>,
    ) -> Self {
        Self {
            generator,
            executor,
            policy: DuplicationPolicy::new(),
            parser: DirectiveParser::new(),
            memory,
            aggregator,
            catalog: SubjectCatalog::new(),
            pacing: Pacing::default(),
            audit_log: AuditLog::new(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_audit_log(mut self, audit_log: AuditLog) -> Self {
        self.audit_log = audit_log;
        self
    }

    pub fn with_policy(mut self, policy: DuplicationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn catalog(&self) -> &SubjectCatalog {
        &self.catalog
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    /// Run one session to completion.
    pub async fn run(&self, query: &str) -> Result<AnalysisOutcome> {
        self.run_with_cancellation(query, &CancellationToken::new())
            .await
    }

    /// Run one session; `cancel` abandons it between iterations, leaving the
    /// ledger recorded so far intact.
    pub async fn run_with_cancellation(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome> {
        let subject = self.catalog.resolve(query);
        let mut session = Session::new(query, subject);

        info!(
            session_id = %session.session_id,
            subject = %session.subject.name,
            code = %session.subject.code,
            "Orchestrator: starting session"
        );
        session.note(format!(
            "INPUT: query received, subject {} ({}){}",
            session.subject.name,
            session.subject.code,
            if session.subject.defaulted { " [default]" } else { "" }
        ));

        let memory_hint = match self.memory.suggest_ordering(&session.subject.name).await {
            Ok(hint) => hint,
            Err(error) => {
                warn!(session_id = %session.session_id, %error, "Memory suggestion unavailable");
                None
            }
        };
        if let Some(hint) = &memory_hint {
            session.note(format!("INPUT: memory suggestion: {}", hint));
        }

        let tool_catalogue = self.executor.registry().describe();
        let mut correction: Option<String> = None;

        while session.iteration < MAX_ITERATIONS {
            if cancel.is_cancelled() {
                return self.finish_cancelled(session).await;
            }

            session.iteration += 1;
            let iteration = session.iteration;
            let note = correction.take();

            let context = DirectiveContext {
                query,
                subject: &session.subject,
                tool_catalogue: &tool_catalogue,
                ledger: &session.ledger,
                memory_hint: if iteration == 1 { memory_hint.as_deref() } else { None },
                correction: note.as_deref(),
            }
            .render();

            session.note(format!("REQUEST: iteration {}", iteration));

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.finish_cancelled(session).await;
                }
                reply = self.request_directive(&context) => reply,
            };

            let raw = match reply {
                Ok(raw) => raw,
                Err(error) => {
                    warn!(session_id = %session.session_id, iteration, %error, "Directive generation failed");
                    session.note(format!("DECIDE: iteration {} generation failed: {}", iteration, error));
                    continue;
                }
            };

            let decision = self
                .parser
                .decide(&raw, session.ledger.completed_primary_count());

            debug!(session_id = %session.session_id, iteration, decision = %decision.label(), "Directive parsed");
            session.note(format!("DECIDE: iteration {} {}", iteration, decision.label()));

            match decision {
                Decision::Terminal { payload } => {
                    return self.finish(session, OutcomeKind::Verified, payload).await;
                }

                Decision::PrematureTerminal {
                    completed,
                    continuation,
                } => {
                    warn!(session_id = %session.session_id, iteration, completed, "Premature terminal answer rejected");
                    correction = Some(continuation);
                }

                Decision::Unparseable => {
                    warn!(session_id = %session.session_id, iteration, "Directive could not be parsed");
                }

                Decision::UnrecognizedAction { name } => {
                    warn!(session_id = %session.session_id, iteration, action = %name, "Unrecognized action");
                    let available = self
                        .executor
                        .registry()
                        .list()
                        .iter()
                        .map(ToolId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ");
                    correction = Some(format!(
                        "'{}' is not an available tool. Choose one of: {}.",
                        name, available
                    ));
                }

                Decision::Action { tool, argument } => {
                    match self.policy.admit(&session.ledger, tool) {
                        Admission::Deny(reason) => {
                            warn!(session_id = %session.session_id, iteration, tool = %tool, "Duplicate execution denied");
                            session.note(format!("DENY: {} already executed", tool));
                            session.ledger.record_denial(tool, reason.clone());
                            correction = Some(reason);
                        }
                        admission => {
                            let retry = admission == Admission::AllowAsRetry;
                            let argument = if argument.trim().is_empty() {
                                tool.default_argument(&session.subject.name, query)
                            } else {
                                argument
                            };

                            info!(session_id = %session.session_id, iteration, tool = %tool, retry, "Executing tool");

                            let execution = self
                                .executor
                                .execute(tool, &argument, &session.subject)
                                .await;

                            session.note(format!(
                                "EXECUTE: {}{} {:?} in {} ms (quality {:.1})",
                                tool,
                                if retry { " (retry)" } else { "" },
                                execution.kind,
                                execution.execution_time_ms,
                                execution.quality
                            ));
                            session.ledger.append(
                                tool,
                                execution.kind,
                                execution.observation,
                                execution.quality,
                            );
                        }
                    }
                }
            }
        }

        if session.ledger.is_empty() {
            warn!(session_id = %session.session_id, "Iteration budget exhausted with nothing recorded");
            session.note("FALLBACK: budget exhausted with no ledger entries");
            return self
                .finish(session, OutcomeKind::Failed, BUDGET_EXHAUSTED_MESSAGE.to_string())
                .await;
        }

        info!(
            session_id = %session.session_id,
            entries = session.ledger.len(),
            "Iteration budget exhausted, aggregating observations"
        );
        session.note(format!(
            "FALLBACK: budget exhausted, aggregating {} entries",
            session.ledger.len()
        ));

        let answer = self
            .aggregate(query, &session.ledger.observations(), &session.subject.name)
            .await;

        self.finish(session, OutcomeKind::Fallback, answer).await
    }

    /// Consolidate observations through the fallback aggregator, degrading to
    /// the deterministic digest if it fails.
    pub async fn aggregate(
        &self,
        query: &str,
        observations: &[(ToolId, &str)],
        subject_name: &str,
    ) -> String {
        match self
            .aggregator
            .aggregate(query, observations, subject_name)
            .await
        {
            Ok(answer) if !answer.trim().is_empty() => answer,
            Ok(_) => {
                warn!("Fallback aggregator returned an empty answer, using digest");
                DigestAggregator::digest(query, observations, subject_name)
            }
            Err(error) => {
                warn!(%error, "Fallback aggregation failed, using digest");
                DigestAggregator::digest(query, observations, subject_name)
            }
        }
    }

    /// Flush session memory before the process exits.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Orchestrator: shutting down");
        self.memory.flush().await
    }

    async fn request_directive(&self, context: &str) -> Result<String> {
        let delay = self.pacing.next_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Pacing before directive request");
            tokio::time::sleep(delay).await;
        }

        self.generator.generate(context).await
    }

    async fn finish_cancelled(&self, mut session: Session) -> Result<AnalysisOutcome> {
        warn!(
            session_id = %session.session_id,
            iteration = session.iteration,
            entries = session.ledger.len(),
            "Session cancelled"
        );
        session.note(format!("CANCEL: abandoned after {} iterations", session.iteration));

        let answer = format!(
            "Analysis cancelled after {} iterations with {} recorded results.",
            session.iteration,
            session.ledger.len()
        );
        self.finish(session, OutcomeKind::Cancelled, answer).await
    }

    async fn finish(
        &self,
        mut session: Session,
        kind: OutcomeKind,
        answer: String,
    ) -> Result<AnalysisOutcome> {
        debug_assert!(!session.terminal, "session {} finished twice", session.session_id);
        let execution_verified = session.ledger.is_complete();
        session.terminal = true;

        if matches!(kind, OutcomeKind::Verified | OutcomeKind::Fallback) {
            let summary = SessionSummary {
                query: session.query.clone(),
                tools_used: session.ledger.tools_used(),
                final_answer: answer.clone(),
                subject_name: session.subject.name.clone(),
                execution_verified,
            };
            if let Err(error) = self.memory.persist(summary).await {
                warn!(session_id = %session.session_id, %error, "Failed to persist session");
            }
        }

        session.note(format!(
            "COMPLETE: {:?} after {} iterations (verified: {}, entries: {})",
            kind,
            session.iteration,
            execution_verified,
            session.ledger.len()
        ));

        let execution_time_ms = session.elapsed_ms();
        let entries = session.ledger.entries().to_vec();

        let record = AuditRecord {
            audit_id: Uuid::new_v4(),
            session_id: session.session_id,
            query: session.query.clone(),
            subject: session.subject.clone(),
            kind,
            execution_verified,
            final_answer: answer.clone(),
            ledger_hash: compute_ledger_hash(&entries),
            ledger: Arc::new(entries.clone()),
            reasoning_trace: Arc::new(session.trace.clone()),
            created_at: Utc::now(),
            execution_time_ms,
        };
        let audit_id = self.audit_log.record(record).await?;

        info!(
            session_id = %session.session_id,
            audit_id = %audit_id,
            kind = ?kind,
            execution_verified,
            iterations = session.iteration,
            "Orchestrator: session finished"
        );

        Ok(AnalysisOutcome {
            session_id: session.session_id,
            audit_id: Some(audit_id),
            subject: session.subject,
            kind,
            answer,
            execution_verified,
            iterations: session.iteration,
            ledger: entries,
            reasoning_trace: session.trace,
            execution_time_ms,
        })
    }
}

/// Build the production orchestrator from configuration.
pub fn create_orchestrator(config: &AgentConfig) -> Result<Orchestrator> {
    let memory = build_session_memory(&config.memory);
    let registry = create_default_registry(config.tools_base_url.as_deref(), memory.clone())?;

    let executor = ToolExecutor::new(
        Arc::new(registry),
        Arc::new(KeywordLeakageFilter::new()),
        Arc::new(HeuristicQualityEvaluator),
    );

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set; every directive request will fail and sessions will fall back");
    }

    let generator = Arc::new(GeminiGenerator::new(config.gemini_api_key.clone()));
    let aggregator = Arc::new(GeminiAggregator::new(config.gemini_api_key.clone()));

    Ok(Orchestrator::new(generator, executor, memory, aggregator)
        .with_pacing(config.pacing)
        .with_audit_log(AuditLog::with_capacity(config.audit_capacity)))
}
