//! Configuration types
//!
//! Configuration is read from TOML and can be overridden per field through
//! `CONCIERGE_*` environment variables. Every section has defaults, so an
//! empty file is a valid configuration.
//!
//! # Environment Variables
//!
//! - `CONCIERGE_BREAKER_FAILURE_THRESHOLD`: consecutive failures before the breaker opens
//! - `CONCIERGE_BREAKER_COOLDOWN_SECS`: seconds an open breaker waits before a trial call
//! - `CONCIERGE_CONTEXT_CONFIDENCE_THRESHOLD`: minimum decision confidence to fetch history
//! - `CONCIERGE_MAX_CONTEXT_MESSAGES`: messages included in a summary prompt
//! - `CONCIERGE_MAX_SUMMARY_CHARS`: upper bound on the context summary
//! - `CONCIERGE_DEFAULT_PLAN_CONFIDENCE`: confidence of the keyword default plan
//! - `CONCIERGE_MAX_FALLBACKS`: fallback strategies kept per plan
//! - `CONCIERGE_CAPABILITY_TIMEOUT_SECS`: per-invocation capability timeout
//! - `CONCIERGE_PROPOSAL_TTL_SECS`: lifetime of a pending proposal
//! - `CONCIERGE_VERIFICATION_ENABLED`: run the post-execution audit

use crate::capability::CapabilityId;
use crate::error::{ConciergeResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 30;
pub const DEFAULT_CONTEXT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_MAX_CONTEXT_MESSAGES: usize = 10;
pub const DEFAULT_MAX_SUMMARY_CHARS: usize = 1200;
pub const DEFAULT_PLAN_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_MAX_FALLBACKS: usize = 3;
pub const DEFAULT_CAPABILITY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PROPOSAL_TTL_SECS: u64 = 600;

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Availability breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            cooldown_secs: DEFAULT_BREAKER_COOLDOWN_SECS,
        }
    }
}

impl BreakerConfig {
    /// Defaults overridden by `CONCIERGE_BREAKER_*`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("CONCIERGE_BREAKER_FAILURE_THRESHOLD") {
            self.failure_threshold = v;
        }
        if let Some(v) = env_parse("CONCIERGE_BREAKER_COOLDOWN_SECS") {
            self.cooldown_secs = v;
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Intent and context analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub context_confidence_threshold: f32,
    pub max_context_messages: usize,
    pub max_summary_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            context_confidence_threshold: DEFAULT_CONTEXT_CONFIDENCE_THRESHOLD,
            max_context_messages: DEFAULT_MAX_CONTEXT_MESSAGES,
            max_summary_chars: DEFAULT_MAX_SUMMARY_CHARS,
        }
    }
}

/// Planner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub default_plan_confidence: f32,
    pub max_fallbacks: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Capability used when keyword matching finds nothing.
    pub default_capability: Option<CapabilityId>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_plan_confidence: DEFAULT_PLAN_CONFIDENCE,
            max_fallbacks: DEFAULT_MAX_FALLBACKS,
            temperature: 0.1,
            max_tokens: 1024,
            default_capability: None,
        }
    }
}

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub capability_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            capability_timeout_secs: DEFAULT_CAPABILITY_TIMEOUT_SECS,
        }
    }
}

impl ExecutionConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }
}

/// Pending proposal settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    pub ttl_secs: u64,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_PROPOSAL_TTL_SECS,
        }
    }
}

impl ProposalConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Post-execution audit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub enabled: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// A capability served over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCapabilityConfig {
    /// Display name, used in logs.
    pub name: String,
    pub endpoint: String,
    /// Operations this endpoint serves.
    pub operations: Vec<CapabilityId>,
    /// Environment variable holding the bearer token, if any.
    #[serde(default)]
    pub token_env: Option<String>,
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConciergeConfig {
    pub breaker: BreakerConfig,
    pub analysis: AnalysisConfig,
    pub planner: PlannerConfig,
    pub execution: ExecutionConfig,
    pub proposals: ProposalConfig,
    pub verification: VerificationConfig,
    pub capabilities: Vec<RemoteCapabilityConfig>,
}

impl ConciergeConfig {
    /// Parse TOML, apply environment overrides and validate.
    pub fn from_toml_str(raw: &str) -> ConciergeResult<Self> {
        let mut config: Self = toml::from_str(raw).map_err(|e| ConfigError::Unreadable {
            reason: e.to_string(),
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConciergeResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> ConciergeResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.breaker.apply_env();

        if let Some(v) = env_parse("CONCIERGE_CONTEXT_CONFIDENCE_THRESHOLD") {
            self.analysis.context_confidence_threshold = v;
        }
        if let Some(v) = env_parse("CONCIERGE_MAX_CONTEXT_MESSAGES") {
            self.analysis.max_context_messages = v;
        }
        if let Some(v) = env_parse("CONCIERGE_MAX_SUMMARY_CHARS") {
            self.analysis.max_summary_chars = v;
        }
        if let Some(v) = env_parse("CONCIERGE_DEFAULT_PLAN_CONFIDENCE") {
            self.planner.default_plan_confidence = v;
        }
        if let Some(v) = env_parse("CONCIERGE_MAX_FALLBACKS") {
            self.planner.max_fallbacks = v;
        }
        if let Some(v) = env_parse("CONCIERGE_CAPABILITY_TIMEOUT_SECS") {
            self.execution.capability_timeout_secs = v;
        }
        if let Some(v) = env_parse("CONCIERGE_PROPOSAL_TTL_SECS") {
            self.proposals.ttl_secs = v;
        }
        if let Some(v) = env_parse("CONCIERGE_VERIFICATION_ENABLED") {
            self.verification.enabled = v;
        }
    }

    /// Validate that all values are within range.
    pub fn validate(&self) -> ConciergeResult<()> {
        if self.breaker.failure_threshold == 0 {
            return Err(invalid(
                "breaker.failure_threshold",
                self.breaker.failure_threshold,
                "must be greater than 0",
            ));
        }

        if self.breaker.cooldown_secs == 0 {
            return Err(invalid(
                "breaker.cooldown_secs",
                self.breaker.cooldown_secs,
                "must be greater than 0",
            ));
        }

        check_unit(
            "analysis.context_confidence_threshold",
            self.analysis.context_confidence_threshold,
        )?;
        check_unit(
            "planner.default_plan_confidence",
            self.planner.default_plan_confidence,
        )?;

        if self.analysis.max_summary_chars == 0 {
            return Err(invalid(
                "analysis.max_summary_chars",
                self.analysis.max_summary_chars,
                "must be greater than 0",
            ));
        }

        if self.planner.max_tokens == 0 {
            return Err(invalid(
                "planner.max_tokens",
                self.planner.max_tokens,
                "must be greater than 0",
            ));
        }

        if self.execution.capability_timeout_secs == 0 {
            return Err(invalid(
                "execution.capability_timeout_secs",
                self.execution.capability_timeout_secs,
                "must be greater than 0",
            ));
        }

        if self.proposals.ttl_secs == 0 {
            return Err(invalid(
                "proposals.ttl_secs",
                self.proposals.ttl_secs,
                "must be greater than 0",
            ));
        }

        for remote in &self.capabilities {
            if remote.endpoint.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: format!("capabilities.{}.endpoint", remote.name),
                }
                .into());
            }
            if remote.operations.is_empty() {
                return Err(invalid(
                    &format!("capabilities.{}.operations", remote.name),
                    "[]",
                    "must list at least one operation",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> crate::ConciergeError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn check_unit(field: &str, value: f32) -> ConciergeResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, value, "must be between 0.0 and 1.0"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
