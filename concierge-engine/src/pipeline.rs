//! Request pipeline.
//!
//! `process_request` runs the stages in order:
//!
//! 1. analyze: intent plus optional context summary
//! 2. plan: primary strategy and ordered fallbacks
//! 3. resolve: lookup calls spliced before every strategy that names a person
//! 4. gate: anything that changes external state is parked as a proposal
//! 5. execute: lookups, then the plan with each strategy's own references resolved
//! 6. verify: advisory audit of what ran
//!
//! A parked proposal only runs through `accept_proposal`.

use crate::analyzer::Analyzer;
use crate::executor::{ExecutionContext, Executor};
use crate::gate::ConfirmationGate;
use crate::history::ConversationSource;
use crate::ledger::{PendingProposal, ProposalLedger};
use crate::planner::Planner;
use crate::resolver::{apply_resolution, extract_address, ActionBatch, Resolver};
use crate::verifier::Verifier;
use chrono::Utc;
use concierge_core::{
    AuthToken, ConciergeConfig, ConciergeError, ConciergeResult, ContextGatheringResult,
    ExecutionPlan, HealthCheck, ProposalResponse, Strategy, ToolCall, ToolResult,
    VerificationResult,
};
use concierge_llm::ProtectedBackend;
use concierge_registry::CapabilityRegistry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// What the caller gets back for a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOutcome {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ProposalResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_gathered: Option<ContextGatheringResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
}

impl RequestOutcome {
    /// Outcome carrying only the user-facing explanation of `error`.
    pub fn from_error(error: &ConciergeError) -> Self {
        Self::message_only(error.user_notice())
    }

    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tool_calls: None,
            proposal: None,
            context_gathered: None,
            verification: None,
            result: None,
        }
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.proposal.is_some()
    }
}

/// The request entry point.
///
/// Holds the injected registry and protected backend for the life of the
/// process; every request shares them and nothing else.
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    backend: Arc<ProtectedBackend>,
    config: ConciergeConfig,
    analyzer: Analyzer,
    planner: Planner,
    resolver: Resolver,
    gate: ConfirmationGate,
    executor: Executor,
    verifier: Verifier,
    ledger: ProposalLedger,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        backend: Arc<ProtectedBackend>,
        source: Arc<dyn ConversationSource>,
        config: ConciergeConfig,
    ) -> Self {
        Self {
            analyzer: Analyzer::new(
                Arc::clone(&backend),
                Arc::clone(&registry),
                source,
                config.analysis.clone(),
            ),
            planner: Planner::new(
                Arc::clone(&backend),
                Arc::clone(&registry),
                config.planner.clone(),
            ),
            resolver: Resolver::new(Arc::clone(&backend), Arc::clone(&registry)),
            gate: ConfirmationGate::new(Arc::clone(&backend), Arc::clone(&registry)),
            executor: Executor::new(Arc::clone(&registry), config.execution.capability_timeout()),
            verifier: Verifier::new(Arc::clone(&backend), Arc::clone(&registry)),
            ledger: ProposalLedger::new(config.proposals.ttl()),
            registry,
            backend,
            config,
        }
    }

    /// Handle one natural-language request.
    ///
    /// Errors are returned only when every remedy is exhausted; stage-local
    /// failures degrade inside the stage.
    pub async fn process_request(
        &self,
        text: &str,
        session_id: &str,
        auth: Option<&AuthToken>,
    ) -> ConciergeResult<RequestOutcome> {
        let request_id = Uuid::now_v7();
        let span = tracing::info_span!(
            "process_request",
            session_id = %session_id,
            request_id = %request_id
        );
        self.run_request(text, session_id, auth).instrument(span).await
    }

    async fn run_request(
        &self,
        text: &str,
        session_id: &str,
        auth: Option<&AuthToken>,
    ) -> ConciergeResult<RequestOutcome> {
        let purged = self.ledger.purge_expired(Utc::now());
        if purged > 0 {
            tracing::debug!(purged, "expired proposals removed");
        }

        let analysis = self
            .analyzer
            .analyze(text, session_id)
            .instrument(tracing::info_span!("analyze"))
            .await;
        let plan = self
            .planner
            .plan(text, &analysis)
            .instrument(tracing::info_span!("plan"))
            .await;
        let batch = self
            .resolver
            .resolve(text, plan.strategies().map(Strategy::to_tool_call).collect())
            .instrument(tracing::info_span!("resolve"))
            .await;

        let needs_confirmation = self
            .gate
            .needs_confirmation(&batch.calls, text)
            .instrument(tracing::info_span!("gate"))
            .await;

        if needs_confirmation {
            let proposal = self.gate.build_proposal(&batch.calls, text, &plan).await;
            let verification = if self.config.verification.enabled {
                Some(
                    self.verifier
                        .audit_with_bindings(text, batch.primary_calls(), &batch.bindings)
                        .instrument(tracing::info_span!("verify"))
                        .await,
                )
            } else {
                None
            };
            tracing::info!(
                proposal_id = %proposal.proposal_id,
                action_type = %proposal.action_type,
                "awaiting confirmation"
            );

            let outcome = RequestOutcome {
                message: proposal.text.clone(),
                tool_calls: Some(batch.calls.clone()),
                proposal: Some(proposal.clone()),
                context_gathered: context_if_gathered(&analysis.context),
                verification,
                result: None,
            };
            self.ledger.park(PendingProposal {
                proposal,
                plan,
                batch,
                request: text.to_string(),
                session_id: session_id.to_string(),
                context: analysis.context,
            });
            return Ok(outcome);
        }

        self.execute(
            text,
            &plan,
            &batch,
            &analysis.context,
            &ExecutionContext::read_only(auth),
        )
        .await
    }

    /// Execute a parked proposal. Each proposal runs at most once.
    pub async fn accept_proposal(
        &self,
        proposal_id: Uuid,
        auth: Option<&AuthToken>,
    ) -> ConciergeResult<RequestOutcome> {
        let pending = self.ledger.take(proposal_id, Utc::now())?;
        let span = tracing::info_span!(
            "accept_proposal",
            session_id = %pending.session_id,
            proposal_id = %proposal_id
        );
        tracing::info!(parent: &span, "proposal accepted");
        self.execute(
            &pending.request,
            &pending.plan,
            &pending.batch,
            &pending.context,
            &ExecutionContext::approved(auth, proposal_id),
        )
        .instrument(span)
        .await
    }

    /// Discard a parked proposal without executing it.
    pub fn reject_proposal(&self, proposal_id: Uuid) -> ConciergeResult<()> {
        self.ledger.discard(proposal_id)?;
        tracing::info!(proposal_id = %proposal_id, "proposal rejected");
        Ok(())
    }

    pub fn pending_proposals(&self) -> usize {
        self.ledger.len()
    }

    /// Backend availability plus registry and ledger sizes.
    pub fn health(&self) -> HealthCheck {
        self.backend
            .health()
            .with_metadata("capabilities", serde_json::json!(self.registry.len()))
            .with_metadata("pending_proposals", serde_json::json!(self.ledger.len()))
    }

    async fn execute(
        &self,
        request: &str,
        plan: &ExecutionPlan,
        batch: &ActionBatch,
        context: &ContextGatheringResult,
        ctx: &ExecutionContext<'_>,
    ) -> ConciergeResult<RequestOutcome> {
        let mut executed = Vec::new();
        let mut addresses: HashMap<usize, String> = HashMap::new();
        for (index, call) in batch.lookups() {
            executed.push(call.clone());
            let reference = call.parameter_str("name").unwrap_or_default();
            match self.executor.dispatch(call, ctx).await {
                Ok(result) => match result.data.as_ref().and_then(extract_address) {
                    Some(address) => {
                        tracing::debug!(reference = %reference, "reference resolved");
                        addresses.insert(index, address);
                    }
                    None => tracing::warn!(
                        reference = %reference,
                        "lookup returned no address, dependents proceed unresolved"
                    ),
                },
                Err(e) => tracing::warn!(
                    reference = %reference,
                    error = %e,
                    "lookup failed, dependents proceed unresolved"
                ),
            }
        }

        let plan = plan.map_parameters(|position, strategy| {
            batch
                .bindings_for(position)
                .fold(strategy.parameters().clone(), |params, binding| {
                    match addresses.get(&binding.lookup_index) {
                        Some(address) => {
                            apply_resolution(&params, &binding.parameter, &binding.reference, address)
                        }
                        None => params,
                    }
                })
        });

        let report = self
            .executor
            .run(&plan, ctx)
            .instrument(tracing::info_span!("execute"))
            .await?;
        executed.push(report.call.clone());

        let verification = if self.config.verification.enabled {
            Some(
                self.verifier
                    .audit(request, &executed)
                    .instrument(tracing::info_span!("verify"))
                    .await,
            )
        } else {
            None
        };

        let message = report
            .result
            .message
            .clone()
            .unwrap_or_else(|| format!("Completed {}.", report.call.name.replace('_', " ")));
        tracing::info!(
            method = %report.call.name,
            strategy_index = report.strategy_index,
            "request completed"
        );

        Ok(RequestOutcome {
            message,
            tool_calls: Some(executed),
            proposal: None,
            context_gathered: context_if_gathered(context),
            verification,
            result: Some(report.result),
        })
    }
}

fn context_if_gathered(context: &ContextGatheringResult) -> Option<ContextGatheringResult> {
    (!context.is_empty()).then(|| context.clone())
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("breaker", self.backend.breaker())
            .field("pending_proposals", &self.ledger.len())
            .finish()
    }
}
