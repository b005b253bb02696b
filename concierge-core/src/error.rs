//! Error types for Concierge operations

use thiserror::Error;
use uuid::Uuid;

/// Generative backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No generative backend configured")]
    ProviderNotConfigured,

    /// The availability breaker is open; the backend was not called.
    #[error("Generative backend unavailable, retry after {retry_after_ms}ms")]
    BackendUnavailable { retry_after_ms: i64 },

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Invalid API key for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Capability dispatch and invocation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Unknown capability: {name}")]
    UnknownCapability { name: String },

    #[error("Capability {name} is not installed")]
    NotInstalled { name: String },

    #[error("Capability {capability} failed: {reason}")]
    InvocationFailed { capability: String, reason: String },

    #[error("Capability {capability} timed out after {timeout_ms}ms")]
    Timeout { capability: String, timeout_ms: i64 },

    #[error("Capability {capability} returned an unusable result")]
    InvalidResult { capability: String },

    /// A mutation-class action reached execution without an accepted proposal.
    #[error("Capability {capability} changes external state and requires confirmation")]
    ConfirmationRequired { capability: String },

    #[error("Registry has no installed capabilities")]
    EmptyRegistry,
}

/// Planning errors. Always recovered locally by the planner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanningError {
    #[error("Planning output could not be parsed: {reason}")]
    ParseFailure { reason: String },
}

/// Strategy execution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Strategy {method} failed: {reason}")]
    StrategyFailed { method: String, reason: String },

    #[error("All {attempts} strategies exhausted; last error: {last_error}")]
    AllStrategiesExhausted { attempts: usize, last_error: String },
}

/// Dependency resolution errors. Logged; the dependent action proceeds unresolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Dependency resolution failed: {reason}")]
    DependencyResolutionFailure { reason: String },
}

/// Verification errors. Logged; the verdict degrades to unclear.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Verification failed: {reason}")]
    VerificationFailure { reason: String },
}

/// Pending proposal errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProposalError {
    #[error("Proposal not found: {id}")]
    NotFound { id: Uuid },

    #[error("Proposal expired: {id}")]
    Expired { id: Uuid },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration could not be read: {reason}")]
    Unreadable { reason: String },
}

/// Master error type for all Concierge errors.
#[derive(Debug, Clone, Error)]
pub enum ConciergeError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("Proposal error: {0}")]
    Proposal(#[from] ProposalError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// What the user can do about a surfaced error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Remedy {
    Retry,
    Rephrase,
    CheckCredentials,
}

impl Remedy {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Retry => "Please try again in a moment.",
            Self::Rephrase => "Try rephrasing the request with a little more detail.",
            Self::CheckCredentials => "Check that your account connection is still valid.",
        }
    }
}

impl ConciergeError {
    /// Non-technical explanation suitable for the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Llm(LlmError::BackendUnavailable { .. }) => {
                "I'm having trouble reaching my assistant service right now.".to_string()
            }
            Self::Llm(LlmError::InvalidApiKey { .. }) => {
                "I couldn't authenticate with my assistant service.".to_string()
            }
            Self::Llm(_) => "Something went wrong while thinking about your request.".to_string(),
            Self::Capability(CapabilityError::ConfirmationRequired { .. }) => {
                "That action changes your data, so it needs your confirmation first.".to_string()
            }
            Self::Capability(CapabilityError::UnknownCapability { .. })
            | Self::Capability(CapabilityError::NotInstalled { .. }) => {
                "I don't know how to do that yet.".to_string()
            }
            Self::Capability(_) | Self::Execution(_) => {
                "I tried every way I know to complete that, but none of them worked.".to_string()
            }
            Self::Planning(_) => "I couldn't work out how to handle that request.".to_string(),
            Self::Resolution(_) => "I couldn't find who you meant.".to_string(),
            Self::Verification(_) => "I couldn't double-check that action.".to_string(),
            Self::Proposal(ProposalError::Expired { .. }) => {
                "That confirmation request has expired.".to_string()
            }
            Self::Proposal(ProposalError::NotFound { .. }) => {
                "I couldn't find anything waiting for your confirmation.".to_string()
            }
            Self::Config(_) => "The assistant is not configured correctly.".to_string(),
        }
    }

    /// Suggested remedy, where one can be classified.
    pub fn remedy(&self) -> Option<Remedy> {
        match self {
            Self::Llm(LlmError::InvalidApiKey { .. }) => Some(Remedy::CheckCredentials),
            Self::Llm(_) => Some(Remedy::Retry),
            Self::Execution(ExecutionError::AllStrategiesExhausted { last_error, .. }) => {
                let lower = last_error.to_lowercase();
                if lower.contains("unauthorized")
                    || lower.contains("forbidden")
                    || lower.contains("credential")
                    || lower.contains("token")
                {
                    Some(Remedy::CheckCredentials)
                } else if lower.contains("timed out") || lower.contains("unavailable") {
                    Some(Remedy::Retry)
                } else {
                    Some(Remedy::Rephrase)
                }
            }
            Self::Capability(CapabilityError::Timeout { .. }) => Some(Remedy::Retry),
            Self::Capability(CapabilityError::UnknownCapability { .. })
            | Self::Planning(_)
            | Self::Resolution(_) => Some(Remedy::Rephrase),
            Self::Proposal(ProposalError::Expired { .. }) => Some(Remedy::Retry),
            _ => None,
        }
    }

    /// `user_message` followed by the remedy hint.
    pub fn user_notice(&self) -> String {
        match self.remedy() {
            Some(remedy) => format!("{} {}", self.user_message(), remedy.hint()),
            None => self.user_message(),
        }
    }
}

/// Result type alias for Concierge operations.
pub type ConciergeResult<T> = Result<T, ConciergeError>;

/// Result type alias for backend calls.
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for capability calls.
pub type CapabilityResult<T> = Result<T, CapabilityError>;

// =============================================================================
// TESTS
// =============================================================================
