//! Concierge Engine - Request Orchestration
//!
//! Turns a natural-language request into capability calls:
//! analysis, planning, dependency resolution, confirmation gating, fallback
//! execution and a post-hoc audit. `Orchestrator` is the entry point.

pub mod analyzer;
pub mod constants;
pub mod executor;
pub mod gate;
pub mod history;
pub mod ledger;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod resolver;
pub mod telemetry;
pub mod verifier;

pub use analyzer::{Analysis, Analyzer};
pub use executor::{AttemptRecord, Clearance, ExecutionContext, ExecutionReport, Executor};
pub use gate::{describe_actions, ConfirmationGate};
pub use history::{ConversationSource, NoHistory, SessionHistory};
pub use ledger::{PendingProposal, ProposalLedger};
pub use pipeline::{Orchestrator, RequestOutcome};
pub use planner::Planner;
pub use resolver::{
    apply_resolution, extract_address, is_literal_address, reference_candidates, ActionBatch,
    DependencyBinding, Resolver,
};
pub use telemetry::{init_tracer, TelemetryConfig};
pub use verifier::{missing_lookup_suggestions, Verifier};
