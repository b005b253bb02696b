//! Execution planning.
//!
//! The backend proposes a primary strategy plus ordered fallbacks over the
//! installed operations. Planning never fails outward: output that cannot be
//! parsed, or that names an operation nobody serves, is replaced by a
//! keyword-matched default plan.

use crate::analyzer::Analysis;
use crate::prompts;
use concierge_core::{
    clamp_unit, ExecutionPlan, GenerationOptions, PlannerConfig, PlanningError, Strategy,
};
use concierge_llm::{decode_json, GenerativeBackend, ProtectedBackend};
use concierge_registry::CapabilityRegistry;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Confidence assumed when the backend omits one.
const UNSTATED_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanWire {
    primary_strategy: Option<StrategyWire>,
    #[serde(default)]
    fallback_strategies: Vec<StrategyWire>,
    #[serde(default)]
    expected_outcome: String,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrategyWire {
    #[serde(default)]
    method: String,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    trigger_condition: Option<String>,
}

pub struct Planner {
    backend: Arc<ProtectedBackend>,
    registry: Arc<CapabilityRegistry>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(
        backend: Arc<ProtectedBackend>,
        registry: Arc<CapabilityRegistry>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    /// Produce a plan for `request`. Only the context summary is sent to the
    /// backend, never raw history.
    pub async fn plan(&self, request: &str, analysis: &Analysis) -> ExecutionPlan {
        let prompt = prompts::planner_prompt(
            request,
            &analysis.intent,
            &analysis.context.relevant_context,
            &self.registry.catalogue(),
        );
        let options = GenerationOptions::default()
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let raw = match self
            .backend
            .generate_text(&prompt, prompts::PLANNER_SYSTEM, &options)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "planner backend unavailable, using default plan");
                return self.default_plan(request);
            }
        };

        match self.parse_plan(&raw) {
            Ok(plan) => {
                tracing::debug!(
                    primary = plan.primary_strategy.method(),
                    fallbacks = plan.fallback_strategies.len(),
                    confidence = plan.confidence,
                    "plan produced"
                );
                plan
            }
            Err(e) => {
                tracing::warn!(error = %e, "using default plan");
                self.default_plan(request)
            }
        }
    }

    /// Parse backend output into a plan over installed operations.
    ///
    /// An unusable primary rejects the whole plan; unusable fallbacks are
    /// dropped individually.
    pub fn parse_plan(&self, raw: &str) -> Result<ExecutionPlan, PlanningError> {
        let wire: PlanWire = decode_json(raw).map_err(|e| PlanningError::ParseFailure {
            reason: e.to_string(),
        })?;

        let primary = wire
            .primary_strategy
            .ok_or_else(|| PlanningError::ParseFailure {
                reason: "no primary strategy".to_string(),
            })?;
        let primary = self
            .to_strategy(primary)
            .map_err(|reason| PlanningError::ParseFailure { reason })?;

        let mut fallbacks = Vec::new();
        for candidate in wire.fallback_strategies {
            match self.to_strategy(candidate) {
                Ok(strategy) => fallbacks.push(strategy),
                Err(reason) => tracing::warn!(reason = %reason, "dropping fallback strategy"),
            }
        }
        if fallbacks.len() > self.config.max_fallbacks {
            tracing::debug!(
                proposed = fallbacks.len(),
                kept = self.config.max_fallbacks,
                "truncating fallback strategies"
            );
            fallbacks.truncate(self.config.max_fallbacks);
        }

        let outcome = if wire.expected_outcome.trim().is_empty() {
            format!("result of {}", primary.method())
        } else {
            wire.expected_outcome
        };

        Ok(ExecutionPlan::new(
            primary,
            outcome,
            clamp_unit(wire.confidence.unwrap_or(UNSTATED_CONFIDENCE)),
        )
        .with_fallbacks(fallbacks))
    }

    fn to_strategy(&self, wire: StrategyWire) -> Result<Strategy, String> {
        let descriptor = self
            .registry
            .resolve(wire.method.trim())
            .map_err(|e| e.to_string())?;
        let parameters = match wire.parameters {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => {
                return Err(format!(
                    "parameters for {} must be an object, got {}",
                    descriptor.name(),
                    other
                ))
            }
        };
        let strategy = Strategy::new(descriptor.name(), parameters, wire.reasoning);
        Ok(match wire.trigger_condition.filter(|c| !c.trim().is_empty()) {
            Some(condition) => strategy.with_trigger_condition(condition),
            None => strategy,
        })
    }

    /// Single-strategy plan built from keyword matching alone.
    pub fn default_plan(&self, request: &str) -> ExecutionPlan {
        let id = self.registry.best_match(request);
        ExecutionPlan::new(
            Strategy::new(
                id.as_str(),
                json!({ "request": request }),
                "keyword match fallback",
            ),
            format!("result of {}", id),
            self.config.default_plan_confidence,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
