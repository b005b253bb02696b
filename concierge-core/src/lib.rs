//! Concierge Core - Shared Types
//!
//! Pure data structures, the error taxonomy and configuration. Every other
//! Concierge crate depends on this one; it holds no orchestration logic.

pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod intent;
pub mod llm;
pub mod plan;
pub mod proposal;
pub mod tool;
pub mod verification;

pub use capability::{
    CapabilityId, CapabilityIdParseError, ConfirmationPolicy, OperationDescriptor, ParameterSpec,
};
pub use config::{
    AnalysisConfig, BreakerConfig, ConciergeConfig, ExecutionConfig, PlannerConfig,
    ProposalConfig, RemoteCapabilityConfig, VerificationConfig,
};
pub use context::{ContextGatheringResult, ContextType, ConversationMessage};
pub use error::{
    CapabilityError, CapabilityResult, ConciergeError, ConciergeResult, ConfigError,
    ExecutionError, LlmError, LlmResult, PlanningError, ProposalError, Remedy, ResolutionError,
    VerificationError,
};
pub use health::{HealthCheck, HealthStatus};
pub use intent::{clamp_unit, Complexity, Intent, RequestScope, Urgency};
pub use llm::{CircuitState, GenerationOptions, StructuredResponse};
pub use plan::{ExecutionPlan, Strategy};
pub use proposal::ProposalResponse;
pub use tool::{ToolCall, ToolResult};
pub use verification::{
    aggregate_status, ActionAppraisal, Appropriateness, VerificationResult, VerificationStatus,
};

/// Opaque user credential passed through to capabilities.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(***)")
    }
}
