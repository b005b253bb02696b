//! Confirmation gate.
//!
//! Decides whether a set of actions needs explicit user approval and, when it
//! does, builds the proposal that describes them. Any action that changes
//! external state always needs approval; borderline operations are judged by
//! the backend, and an unavailable judge counts as "yes".

use crate::prompts;
use concierge_core::{
    ConfirmationPolicy, ExecutionPlan, GenerationOptions, ProposalResponse, ToolCall,
};
use concierge_llm::{decode_json, GenerativeBackend, ProtectedBackend};
use concierge_registry::CapabilityRegistry;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateWire {
    requires_confirmation: bool,
    #[serde(default)]
    reasoning: String,
}

pub struct ConfirmationGate {
    backend: Arc<ProtectedBackend>,
    registry: Arc<CapabilityRegistry>,
}

impl ConfirmationGate {
    pub fn new(backend: Arc<ProtectedBackend>, registry: Arc<CapabilityRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Whether any of `calls` needs approval before running.
    ///
    /// Calls naming an operation that is not installed are skipped; they will
    /// fail at execution without side effects.
    pub async fn needs_confirmation(&self, calls: &[ToolCall], request: &str) -> bool {
        for call in calls {
            let Ok(descriptor) = self.registry.resolve(&call.name) else {
                continue;
            };
            if descriptor.requires_confirmation() {
                tracing::debug!(method = %call.name, "confirmation required by policy");
                return true;
            }
            if descriptor.confirmation == ConfirmationPolicy::Judge && self.judge(call, request).await {
                return true;
            }
        }
        false
    }

    async fn judge(&self, call: &ToolCall, request: &str) -> bool {
        let raw = match self
            .backend
            .generate_text(
                &prompts::gate_prompt(request, call),
                prompts::GATE_SYSTEM,
                &GenerationOptions::default().with_temperature(0.0),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(method = %call.name, error = %e, "confirmation judge unavailable, requiring confirmation");
                return true;
            }
        };
        match decode_json::<GateWire>(&raw) {
            Ok(verdict) => {
                tracing::debug!(
                    method = %call.name,
                    requires_confirmation = verdict.requires_confirmation,
                    reasoning = %verdict.reasoning,
                    "confirmation judged"
                );
                verdict.requires_confirmation
            }
            Err(e) => {
                tracing::warn!(method = %call.name, error = %e, "confirmation verdict unparseable, requiring confirmation");
                true
            }
        }
    }

    /// Describe `calls` for the user. The text comes from the backend when it
    /// is reachable and from the call parameters otherwise.
    pub async fn build_proposal(
        &self,
        calls: &[ToolCall],
        request: &str,
        plan: &ExecutionPlan,
    ) -> ProposalResponse {
        let action_type = calls
            .iter()
            .find(|c| {
                self.registry
                    .resolve(&c.name)
                    .map(|d| d.requires_confirmation())
                    .unwrap_or(false)
            })
            .or_else(|| calls.first())
            .map(|c| c.name.clone())
            .unwrap_or_default();

        let described = describe_actions(calls);
        let text = match self
            .backend
            .generate_text(
                &prompts::proposal_prompt(request, &described),
                prompts::PROPOSAL_SYSTEM,
                &GenerationOptions::default().with_max_tokens(300),
            )
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback_text(&described),
            Err(e) => {
                tracing::warn!(error = %e, "proposal text unavailable, describing actions directly");
                fallback_text(&described)
            }
        };

        ProposalResponse::new(text, action_type, plan.confidence, calls.to_vec())
    }
}

fn fallback_text(described: &str) -> String {
    format!("I'm about to:\n{}\nShall I go ahead?", described)
}

/// One line per action listing every parameter value.
pub fn describe_actions(calls: &[ToolCall]) -> String {
    calls
        .iter()
        .map(|call| {
            let params = match &call.parameters {
                Value::Object(map) if !map.is_empty() => map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, render_value(v)))
                    .collect::<Vec<_>>()
                    .join(", "),
                Value::Object(_) | Value::Null => String::new(),
                other => render_value(other),
            };
            if params.is_empty() {
                format!("- {}", call.name.replace('_', " "))
            } else {
                format!("- {} ({})", call.name.replace('_', " "), params)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render_value).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
